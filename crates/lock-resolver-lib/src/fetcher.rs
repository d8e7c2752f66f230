//! Listing the published versions of a package.

use async_trait::async_trait;

use crate::reference::ImageReference;

mod registry;
pub use registry::RegistryFetcher;

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
	#[error("reqwest error: {0}")]
	Reqwest(#[from] reqwest::Error),
	#[error("JSON error: {0}")]
	SerdeJSON(#[from] serde_json::Error),
	/// The registry answered with a status other than success.
	#[error("registry returned {status} for {url}")]
	Status { status: u16, url: String },
	#[error("registry authentication failed: {0}")]
	Auth(String),
	/// Used by collaborators that are not backed by a registry.
	#[error("{0}")]
	Other(String),
}

/// Fetches the tags of an image repository.
///
/// Implementations are not given a timeout of their own, the reconcile pass that calls them is bounded.
#[async_trait]
pub trait TagFetcher: Send + Sync {
	async fn tags(&self, reference: &ImageReference) -> Result<Vec<String>, FetchError>;
}

/// Fetcher that knows of no tags, so every constraint goes unsatisfied.
#[derive(Debug, Default, Clone, Copy)]
pub struct NopFetcher;

#[async_trait]
impl TagFetcher for NopFetcher {
	async fn tags(&self, _reference: &ImageReference) -> Result<Vec<String>, FetchError> {
		Ok(Vec::new())
	}
}
