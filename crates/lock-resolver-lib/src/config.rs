//! Resolver settings, loaded from a JSON file or defaulted.

use std::time::Duration;

use serde::{Serialize, Deserialize};

/// Finalizer placed on a lock while it still lists packages.
pub const DEFAULT_FINALIZER: &str = "lock.pkg.resolver.io";

/// Registry used for references that do not name one.
pub const DEFAULT_REGISTRY: &str = "index.docker.io";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
	/// Upper bound on a single reconcile pass.
	reconcile_timeout_secs: u64,
	/// Delay before retrying a pass that hit a recoverable failure.
	short_wait_secs: u64,
	/// How long a lock rests after a clean pass before it is checked again.
	resync_secs: u64,
	backoff_base_ms: u64,
	backoff_max_secs: u64,
	finalizer: String,
	default_registry: String,
	https_only: bool,
}

impl Default for ResolverConfig {
	fn default() -> Self {
		Self {
			reconcile_timeout_secs: 60,
			short_wait_secs: 30,
			resync_secs: 60,
			backoff_base_ms: 1000,
			backoff_max_secs: 300,
			finalizer: DEFAULT_FINALIZER.to_string(),
			default_registry: DEFAULT_REGISTRY.to_string(),
			https_only: true,
		}
	}
}

impl ResolverConfig {
	/// Location of the config file, `$XDG_CONFIG_HOME/lock-resolver/config.json` or `~/.config/lock-resolver/config.json`.
	pub fn default_path() -> crate::Result<std::path::PathBuf> {
		#[cfg(target_os = "windows")]
		let path = std::env::var("APPDATA")
			.map(std::path::PathBuf::from)
			.map_err(|_| crate::Error::Config("APPDATA missing".to_string()))?;

		#[cfg(not(target_os = "windows"))]
		let path = if let Ok(e) = std::env::var("XDG_CONFIG_HOME") {
			std::path::PathBuf::from(e)
		} else {
			std::env::var("HOME")
				.map(|home| std::path::PathBuf::from(home).join(".config"))
				.map_err(|_| crate::Error::Config("HOME environment variable not set".to_string()))?
		};

		Ok(path.join("lock-resolver").join("config.json"))
	}

	pub fn load_from_disk() -> crate::Result<Self> {
		Self::load_from_path(Self::default_path()?)
	}

	pub fn load_from_path(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
		let path = path.as_ref();
		log::trace!("Loading config from {}", path.display());
		let data = std::fs::read(path)?;
		let config: ResolverConfig = serde_json::from_slice(&data)?;
		config.validate()?;
		Ok(config)
	}

	pub fn save_to_path(&self, path: impl AsRef<std::path::Path>) -> crate::Result<()> {
		let path = path.as_ref();
		if let Some(parent) = path.parent() {
			std::fs::create_dir_all(parent)?;
		}
		std::fs::write(path, serde_json::to_vec_pretty(self)?)?;
		Ok(())
	}

	fn validate(&self) -> crate::Result<()> {
		if self.reconcile_timeout_secs == 0 {
			return Err(crate::Error::Config("reconcile_timeout_secs must be greater than zero".to_string()))
		}
		if self.finalizer.is_empty() {
			return Err(crate::Error::Config("finalizer must not be empty".to_string()))
		}
		if self.default_registry.is_empty() {
			return Err(crate::Error::Config("default_registry must not be empty".to_string()))
		}
		Ok(())
	}

	pub fn reconcile_timeout(&self) -> Duration {
		Duration::from_secs(self.reconcile_timeout_secs)
	}
	pub fn set_reconcile_timeout(&mut self, timeout: Duration) {
		self.reconcile_timeout_secs = timeout.as_secs().max(1);
	}

	pub fn short_wait(&self) -> Duration {
		Duration::from_secs(self.short_wait_secs)
	}
	pub fn set_short_wait(&mut self, wait: Duration) {
		self.short_wait_secs = wait.as_secs();
	}

	pub fn resync(&self) -> Duration {
		Duration::from_secs(self.resync_secs)
	}
	pub fn set_resync(&mut self, resync: Duration) {
		self.resync_secs = resync.as_secs();
	}

	pub fn backoff_base(&self) -> Duration {
		Duration::from_millis(self.backoff_base_ms)
	}
	pub fn backoff_max(&self) -> Duration {
		Duration::from_secs(self.backoff_max_secs)
	}

	pub fn finalizer(&self) -> &str {
		&self.finalizer
	}
	pub fn set_finalizer(&mut self, finalizer: impl Into<String>) {
		self.finalizer = finalizer.into();
	}

	pub fn default_registry(&self) -> &str {
		&self.default_registry
	}
	pub fn set_default_registry(&mut self, registry: impl Into<String>) {
		self.default_registry = registry.into();
	}

	pub fn https_only(&self) -> bool {
		self.https_only
	}
	pub fn set_https_only(&mut self, https_only: bool) {
		self.https_only = https_only;
	}
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn missing_fields_use_defaults() {
		let config: ResolverConfig = serde_json::from_str(r#"{ "short_wait_secs": 5 }"#).unwrap();
		assert_eq!(config.short_wait(), Duration::from_secs(5));
		assert_eq!(config.reconcile_timeout(), Duration::from_secs(60));
		assert_eq!(config.finalizer(), DEFAULT_FINALIZER);
	}

	#[test]
	fn saved_config_loads_back() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("nested").join("config.json");
		let mut config = ResolverConfig::default();
		config.set_default_registry("registry.example.com");
		config.save_to_path(&path).unwrap();
		assert_eq!(ResolverConfig::load_from_path(&path).unwrap(), config);
	}

	#[test]
	fn zero_timeout_is_rejected() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("config.json");
		std::fs::write(&path, r#"{ "reconcile_timeout_secs": 0 }"#).unwrap();
		assert!(matches!(ResolverConfig::load_from_path(&path), Err(crate::Error::Config(_))));
	}
}
