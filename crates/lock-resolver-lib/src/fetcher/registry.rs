use std::collections::HashMap;
use std::sync::OnceLock;

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;

use super::{FetchError, TagFetcher};
use crate::reference::ImageReference;

#[derive(Debug, Deserialize)]
struct TagList {
	/* some registries send `null` for a repository without tags */
	#[serde(default)]
	tags: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
	token: Option<String>,
	access_token: Option<String>,
}

/// Lists tags through the registry HTTP API (`/v2/<repository>/tags/list`).
///
/// Only anonymous pulls are supported. A registry answering with a Bearer challenge is asked for an anonymous token,
/// anything requiring credentials fails with [`FetchError::Auth`] or [`FetchError::Status`].
#[derive(Debug, Clone)]
pub struct RegistryFetcher {
	client: reqwest::Client,
	https_only: bool,
}

impl RegistryFetcher {
	/// # Arguments
	/// - `https_only`: when `false`, registries on `localhost` or a loopback address are contacted over plain HTTP.
	pub fn new(client: reqwest::Client, https_only: bool) -> Self {
		Self { client, https_only }
	}

	fn base_url(&self, registry: &str) -> String {
		let local = registry.starts_with("localhost") || registry.starts_with("127.");
		let scheme = if !self.https_only && local { "http" } else { "https" };
		format!("{}://{}", scheme, registry)
	}

	async fn get(&self, url: &str, token: Option<&str>) -> Result<reqwest::Response, FetchError> {
		let mut request = self.client.get(url);
		if let Some(token) = token {
			request = request.bearer_auth(token);
		}
		Ok(request.send().await?)
	}

	async fn anonymous_token(&self, challenge: &str, repository: &str) -> Result<String, FetchError> {
		let params = parse_challenge(challenge)
			.ok_or_else(|| FetchError::Auth(format!("unsupported challenge `{}`", challenge)))?;
		let realm = params.get("realm")
			.ok_or_else(|| FetchError::Auth("challenge has no realm".to_string()))?;

		let mut query = Vec::<(&str, String)>::new();
		if let Some(service) = params.get("service") {
			query.push(("service", service.clone()));
		}
		query.push(("scope", params.get("scope").cloned().unwrap_or_else(|| format!("repository:{}:pull", repository))));

		log::trace!("Requesting anonymous token from {}", realm);
		let response = self.client.get(realm).query(&query).send().await?;
		if !response.status().is_success() {
			return Err(FetchError::Status { status: response.status().as_u16(), url: realm.clone() });
		}

		let body = response.bytes().await?;
		let token: TokenResponse = serde_json::from_slice(&body)?;
		token.token
			.or(token.access_token)
			.ok_or_else(|| FetchError::Auth("token response has no token".to_string()))
	}
}

#[async_trait]
impl TagFetcher for RegistryFetcher {
	async fn tags(&self, reference: &ImageReference) -> Result<Vec<String>, FetchError> {
		let base = self.base_url(reference.registry());
		let repository = reference.api_repository();
		let mut url = format!("{}/v2/{}/tags/list", base, repository);
		let mut token: Option<String> = None;
		let mut tags = Vec::new();

		loop {
			log::trace!("Listing tags from {}", url);
			let mut response = self.get(&url, token.as_deref()).await?;

			if response.status() == reqwest::StatusCode::UNAUTHORIZED && token.is_none() {
				let challenge = response.headers()
					.get(reqwest::header::WWW_AUTHENTICATE)
					.and_then(|h| h.to_str().ok())
					.map(str::to_string)
					.ok_or_else(|| FetchError::Auth(format!("{} requires authentication", url)))?;
				token = Some(self.anonymous_token(&challenge, &repository).await?);
				response = self.get(&url, token.as_deref()).await?;
			}

			if !response.status().is_success() {
				return Err(FetchError::Status { status: response.status().as_u16(), url });
			}

			let next = response.headers()
				.get(reqwest::header::LINK)
				.and_then(|h| h.to_str().ok())
				.and_then(next_link);

			let body = response.bytes().await?;
			let list: TagList = serde_json::from_slice(&body)?;
			tags.extend(list.tags.unwrap_or_default());

			match next {
				Some(link) if link.starts_with("http://") || link.starts_with("https://") => url = link,
				Some(link) => url = format!("{}{}", base, link),
				None => break,
			}
		}

		log::debug!("Found {} tags for {}", tags.len(), reference);
		Ok(tags)
	}
}

/// Reads the parameters of a `Bearer` `WWW-Authenticate` challenge.
fn parse_challenge(challenge: &str) -> Option<HashMap<String, String>> {
	static RE: OnceLock<Regex> = OnceLock::new();
	let re = RE.get_or_init(|| Regex::new(r#"(\w+)="([^"]*)""#).expect("challenge pattern is valid"));

	let (scheme, params) = challenge.trim().split_once(' ')?;
	if !scheme.eq_ignore_ascii_case("bearer") {
		return None;
	}

	Some(re.captures_iter(params).map(|c| (c[1].to_lowercase(), c[2].to_string())).collect())
}

/// The `rel="next"` target of a `Link` header.
fn next_link(header: &str) -> Option<String> {
	static RE: OnceLock<Regex> = OnceLock::new();
	let re = RE.get_or_init(|| Regex::new(r#"<([^>]+)>\s*;\s*rel="?next"?"#).expect("link pattern is valid"));
	re.captures(header).map(|c| c[1].to_string())
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn bearer_challenge_is_parsed() {
		let params = parse_challenge(r#"Bearer realm="https://auth.example.com/token",service="registry.example.com",scope="repository:team/config:pull""#).unwrap();
		assert_eq!(params["realm"], "https://auth.example.com/token");
		assert_eq!(params["service"], "registry.example.com");
		assert_eq!(params["scope"], "repository:team/config:pull");
	}

	#[test]
	fn basic_challenge_is_unsupported() {
		assert!(parse_challenge(r#"Basic realm="registry""#).is_none());
	}

	#[test]
	fn next_link_is_found() {
		assert_eq!(next_link(r#"</v2/team/config/tags/list?n=100&last=v1.2.0>; rel="next""#).as_deref(), Some("/v2/team/config/tags/list?n=100&last=v1.2.0"));
		assert_eq!(next_link(r#"</v2/other>; rel="prev""#), None);
	}

	#[test]
	fn plain_http_only_for_local_registries() {
		let fetcher = RegistryFetcher::new(reqwest::Client::new(), false);
		assert_eq!(fetcher.base_url("localhost:5000"), "http://localhost:5000");
		assert_eq!(fetcher.base_url("registry.example.com"), "https://registry.example.com");

		let fetcher = RegistryFetcher::new(reqwest::Client::new(), true);
		assert_eq!(fetcher.base_url("localhost:5000"), "https://localhost:5000");
	}

	#[test]
	fn null_tags_read_as_empty() {
		let list: TagList = serde_json::from_str(r#"{ "name": "team/config", "tags": null }"#).unwrap();
		assert!(list.tags.unwrap_or_default().is_empty());
	}
}
