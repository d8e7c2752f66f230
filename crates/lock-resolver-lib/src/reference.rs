//! Package image references, `[registry/]repository[:tag][@digest]`.

use std::sync::OnceLock;

use regex::Regex;

/// Docker Hub, whose single component repositories live under `library/`.
const DOCKER_HUB: &str = "index.docker.io";

const MAX_DNS_LABEL: usize = 63;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReferenceError {
	#[error("reference is empty")]
	Empty,
	#[error("repository `{0}` is not valid")]
	InvalidRepository(String),
	#[error("tag `{0}` is not valid")]
	InvalidTag(String),
	#[error("digest `{0}` is not valid")]
	InvalidDigest(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageReference {
	registry: String,
	/// Whether the registry was written in the reference or filled in from the default.
	explicit_registry: bool,
	repository: String,
	tag: Option<String>,
	digest: Option<String>,
}

fn repository_regex() -> &'static Regex {
	static RE: OnceLock<Regex> = OnceLock::new();
	RE.get_or_init(|| {
		Regex::new(r"^[a-z0-9]+(?:(?:[._]|__|-+)[a-z0-9]+)*(?:/[a-z0-9]+(?:(?:[._]|__|-+)[a-z0-9]+)*)*$")
			.expect("repository pattern is valid")
	})
}

fn tag_regex() -> &'static Regex {
	static RE: OnceLock<Regex> = OnceLock::new();
	RE.get_or_init(|| Regex::new(r"^[\w][\w.-]{0,127}$").expect("tag pattern is valid"))
}

fn digest_regex() -> &'static Regex {
	static RE: OnceLock<Regex> = OnceLock::new();
	RE.get_or_init(|| Regex::new(r"^[a-z0-9]+(?:[.+_-][a-z0-9]+)*:[a-fA-F0-9]{32,}$").expect("digest pattern is valid"))
}

impl ImageReference {
	/// Parses `raw`, filling in `default_registry` when the reference does not start with a registry host.
	pub fn parse(raw: &str, default_registry: &str) -> Result<Self, ReferenceError> {
		let raw = raw.trim();
		if raw.is_empty() {
			return Err(ReferenceError::Empty);
		}

		let (name, digest) = match raw.split_once('@') {
			Some((name, digest)) => {
				if !digest_regex().is_match(digest) {
					return Err(ReferenceError::InvalidDigest(digest.to_string()));
				}
				(name, Some(digest.to_string()))
			},
			None => (raw, None),
		};

		/* a colon after the last slash separates the tag, any earlier colon belongs to a registry port */
		let last_slash = name.rfind('/').map(|i| i + 1).unwrap_or(0);
		let (name, tag) = match name[last_slash..].rfind(':') {
			Some(i) => {
				let tag = &name[last_slash + i + 1..];
				if !tag_regex().is_match(tag) {
					return Err(ReferenceError::InvalidTag(tag.to_string()));
				}
				(&name[..last_slash + i], Some(tag.to_string()))
			},
			None => (name, None),
		};

		let (registry, explicit_registry, repository) = match name.split_once('/') {
			Some((host, rest)) if host.contains('.') || host.contains(':') || host == "localhost" => {
				(host.to_string(), true, rest)
			},
			_ => (default_registry.to_string(), false, name),
		};

		if !repository_regex().is_match(repository) {
			return Err(ReferenceError::InvalidRepository(repository.to_string()));
		}

		Ok(Self { registry, explicit_registry, repository: repository.to_string(), tag, digest })
	}

	pub fn registry(&self) -> &str {
		&self.registry
	}

	/// Repository path without the registry.
	pub fn repository(&self) -> &str {
		&self.repository
	}

	/// Repository path as the registry API expects it.
	pub fn api_repository(&self) -> String {
		if self.registry == DOCKER_HUB && !self.repository.contains('/') {
			format!("library/{}", self.repository)
		} else {
			self.repository.clone()
		}
	}

	/// The reference without tag or digest, keeping the registry only if it was written out.
	pub fn context(&self) -> String {
		if self.explicit_registry {
			format!("{}/{}", self.registry, self.repository)
		} else {
			self.repository.clone()
		}
	}

	pub fn tag(&self) -> Option<&str> {
		self.tag.as_deref()
	}

	pub fn digest(&self) -> Option<&str> {
		self.digest.as_deref()
	}

	/// This reference pointing at `tag` instead of any tag or digest it had.
	pub fn with_tag(&self, tag: &str) -> String {
		format!("{}:{}", self.context(), tag)
	}
}

impl std::fmt::Display for ImageReference {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(&self.context())?;
		if let Some(tag) = &self.tag {
			write!(f, ":{}", tag)?;
		}
		if let Some(digest) = &self.digest {
			write!(f, "@{}", digest)?;
		}
		Ok(())
	}
}

/// Reduces `s` to a DNS label usable as a resource name.
///
/// Only lowercase letters and digits are kept. Separators (`.`, `/`, `:`, `-`) become `-` unless they are the first
/// or last character. The result is at most 63 characters and never starts or ends with `-`.
pub fn to_dns_label(s: &str) -> String {
	let bytes = s.as_bytes();
	let mut out = String::with_capacity(bytes.len().min(MAX_DNS_LABEL));
	for (i, b) in bytes.iter().enumerate() {
		match b {
			b'a'..=b'z' | b'0'..=b'9' => out.push(*b as char),
			b'.' | b'/' | b':' | b'-' if i != 0 && i != MAX_DNS_LABEL - 1 && i != bytes.len() - 1 => out.push('-'),
			_ => {},
		}
		if i == MAX_DNS_LABEL - 1 {
			break;
		}
	}
	out.trim_matches('-').to_string()
}

#[cfg(test)]
mod test {
	use super::*;

	fn parse(raw: &str) -> ImageReference {
		ImageReference::parse(raw, DOCKER_HUB).unwrap()
	}

	#[test]
	fn default_registry_is_filled_in() {
		let r = parse("example/provider-sql");
		assert_eq!(r.registry(), DOCKER_HUB);
		assert_eq!(r.repository(), "example/provider-sql");
		assert_eq!(r.context(), "example/provider-sql");
		assert_eq!(r.tag(), None);
	}

	#[test]
	fn registry_with_port_and_tag() {
		let r = parse("localhost:5000/team/config:v1.0.0");
		assert_eq!(r.registry(), "localhost:5000");
		assert_eq!(r.repository(), "team/config");
		assert_eq!(r.tag(), Some("v1.0.0"));
		assert_eq!(r.context(), "localhost:5000/team/config");
	}

	#[test]
	fn registry_host_needs_a_dot() {
		let r = parse("registry.example.com/team/config");
		assert_eq!(r.registry(), "registry.example.com");
		assert_eq!(r.repository(), "team/config");
	}

	#[test]
	fn digest_is_split() {
		let r = parse(&format!("team/config@sha256:{}", "a".repeat(64)));
		assert_eq!(r.repository(), "team/config");
		assert!(r.digest().is_some());
		assert_eq!(r.with_tag("v2.0.0"), "team/config:v2.0.0");
	}

	#[test]
	fn with_tag_replaces_existing_tag() {
		assert_eq!(parse("team/config:latest").with_tag("v1.5.2"), "team/config:v1.5.2");
	}

	#[test]
	fn docker_hub_official_images_use_library() {
		assert_eq!(parse("nginx").api_repository(), "library/nginx");
		assert_eq!(parse("team/nginx").api_repository(), "team/nginx");
	}

	#[test] fn uppercase_repository_is_rejected() { assert_eq!(ImageReference::parse("Team/Config", DOCKER_HUB), Err(ReferenceError::InvalidRepository("Team/Config".to_string()))) }
	#[test] fn empty_reference_is_rejected() { assert_eq!(ImageReference::parse(" ", DOCKER_HUB), Err(ReferenceError::Empty)) }
	#[test] fn bad_tag_is_rejected() { assert!(matches!(ImageReference::parse("team/config:-x", DOCKER_HUB), Err(ReferenceError::InvalidTag(_)))) }
	#[test] fn bad_digest_is_rejected() { assert!(matches!(ImageReference::parse("team/config@sha256:zz", DOCKER_HUB), Err(ReferenceError::InvalidDigest(_)))) }

	#[test] fn dns_label_replaces_separators() { assert_eq!(to_dns_label("example/provider-sql"), "example-provider-sql") }
	#[test] fn dns_label_drops_uppercase_and_symbols() { assert_eq!(to_dns_label("Team_A/config"), "eam-config") }
	#[test] fn dns_label_trims_edges() { assert_eq!(to_dns_label("/team/config/"), "team-config") }
	#[test] fn dns_label_is_bounded() { assert!(to_dns_label(&"a/".repeat(100)).len() <= MAX_DNS_LABEL) }
}
