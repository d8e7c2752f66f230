//! Turning a resolved dependency into a package installation request.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use serde::{Serialize, Deserialize};
use tokio::io::AsyncWriteExt;

use crate::lock::{Dependency, PackageType, InvalidPackageType};
use crate::reference::{ImageReference, to_dns_label};
use crate::version::ResolvedVersion;

/// A request to install a package.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PackageDescriptor {
	pub kind: PackageType,
	/// Resource name, derived from the repository so repeated requests for a package collide.
	pub name: String,
	/// Image reference including the exact tag to install.
	pub source: String,
}

impl PackageDescriptor {
	pub fn for_dependency(kind: PackageType, reference: &ImageReference, version: &ResolvedVersion) -> Self {
		Self {
			kind,
			name: to_dns_label(reference.repository()),
			source: reference.with_tag(version.original()),
		}
	}
}

#[derive(Debug, thiserror::Error)]
pub enum CreateError {
	/// A package with the same kind and name was already requested.
	#[error("package `{0}` already exists")]
	AlreadyExists(String),
	#[error("IO error: {0}")]
	IO(#[from] std::io::Error),
	#[error("JSON error: {0}")]
	SerdeJSON(#[from] serde_json::Error),
	#[error("package rejected: {0}")]
	Rejected(String),
}

/// Submits installation requests.
#[async_trait]
pub trait PackageCreator: Send + Sync {
	/// Creates `package`, failing with [`CreateError::AlreadyExists`] if its kind and name are taken.
	async fn create(&self, package: &PackageDescriptor) -> Result<(), CreateError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Materialization {
	Created(PackageDescriptor),
	/// An earlier, possibly concurrent, pass already requested this package.
	AlreadyExists(PackageDescriptor),
}

impl Materialization {
	pub fn descriptor(&self) -> &PackageDescriptor {
		match self {
			Materialization::Created(d) | Materialization::AlreadyExists(d) => d,
		}
	}
}

#[derive(Debug, thiserror::Error)]
pub enum MaterializeError {
	#[error("cannot create invalid package dependency type: {0}")]
	InvalidPackageType(#[from] InvalidPackageType),
	#[error("cannot create dependency package: {0}")]
	Create(#[source] CreateError),
}

/// Requests installation of `dependency` at `version`.
///
/// Exactly one call is made to `creator`. A package that already exists counts as success.
pub async fn materialize(creator: &dyn PackageCreator, dependency: &Dependency, reference: &ImageReference, version: &ResolvedVersion) -> Result<Materialization, MaterializeError> {
	let kind = dependency.kind()?;
	let descriptor = PackageDescriptor::for_dependency(kind, reference, version);

	match creator.create(&descriptor).await {
		Ok(()) => {
			log::info!("Created {} {} from {}", kind, descriptor.name, descriptor.source);
			Ok(Materialization::Created(descriptor))
		},
		Err(CreateError::AlreadyExists(_)) => {
			log::debug!("{} {} already exists", kind, descriptor.name);
			Ok(Materialization::AlreadyExists(descriptor))
		},
		Err(e) => Err(MaterializeError::Create(e)),
	}
}

/// Writes requests to `<dir>/<kind>s/<name>.json` for an installer to pick up.
#[derive(Debug, Clone)]
pub struct FilePackageCreator {
	dir: PathBuf,
}

impl FilePackageCreator {
	pub fn new(dir: impl Into<PathBuf>) -> Self {
		Self { dir: dir.into() }
	}

	pub fn dir(&self) -> &Path {
		&self.dir
	}

	pub fn path(&self, package: &PackageDescriptor) -> PathBuf {
		self.dir
			.join(format!("{}s", package.kind.as_str().to_lowercase()))
			.join(format!("{}.json", package.name))
	}
}

/* Distinguishes temporary files written by concurrent creates in this process */
static TEMP_FILES: AtomicU64 = AtomicU64::new(0);

/// Whether the request at `path` was completely written.
async fn is_complete(path: &Path) -> Result<bool, std::io::Error> {
	match tokio::fs::read(path).await {
		Ok(data) => Ok(serde_json::from_slice::<PackageDescriptor>(&data).is_ok()),
		Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
		Err(e) => Err(e),
	}
}

/// Links the fully written `tmp` into place at `path`. Fails with [`CreateError::AlreadyExists`] if a complete request is already there.
async fn publish(tmp: &Path, path: &Path, package: &PackageDescriptor) -> Result<(), CreateError> {
	let mut file = tokio::fs::OpenOptions::new().write(true).create_new(true).open(tmp).await?;
	file.write_all(&serde_json::to_vec_pretty(package)?).await?;
	file.sync_all().await?;
	drop(file);

	match tokio::fs::hard_link(tmp, path).await {
		Ok(()) => return Ok(()),
		Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {},
		Err(e) => return Err(e.into()),
	}

	if is_complete(path).await? {
		return Err(CreateError::AlreadyExists(package.name.clone()));
	}

	/* an earlier writer stopped partway, replace its request once */
	log::warn!("Replacing incomplete package request {}", path.display());
	match tokio::fs::remove_file(path).await {
		Ok(()) => {},
		Err(e) if e.kind() == std::io::ErrorKind::NotFound => {},
		Err(e) => return Err(e.into()),
	}
	match tokio::fs::hard_link(tmp, path).await {
		Ok(()) => Ok(()),
		Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Err(CreateError::AlreadyExists(package.name.clone())),
		Err(e) => Err(e.into()),
	}
}

#[async_trait]
impl PackageCreator for FilePackageCreator {
	async fn create(&self, package: &PackageDescriptor) -> Result<(), CreateError> {
		if package.name.is_empty() {
			return Err(CreateError::Rejected("package name is empty".to_string()));
		}

		let path = self.path(package);
		if let Some(parent) = path.parent() {
			tokio::fs::create_dir_all(parent).await?;
		}

		/* the request only appears under its real name once it is complete */
		let tmp = path.with_file_name(format!(
			".{}.{}-{}.tmp",
			package.name,
			std::process::id(),
			TEMP_FILES.fetch_add(1, Ordering::Relaxed),
		));
		let result = publish(&tmp, &path, package).await;

		match tokio::fs::remove_file(&tmp).await {
			Ok(()) => {},
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => {},
			Err(e) => log::warn!("Unable to remove {}: {}", tmp.display(), e),
		}
		result
	}
}

#[cfg(test)]
mod test {
	use super::*;

	fn dependency(kind: &str) -> Dependency {
		Dependency { package: "example/provider-sql".to_string(), package_type: kind.to_string(), constraints: ">=v0.1.0".to_string() }
	}

	fn resolved(dependency: &Dependency, version: &str) -> (ImageReference, ResolvedVersion) {
		(
			ImageReference::parse(&dependency.package, "index.docker.io").unwrap(),
			ResolvedVersion::parse(version).unwrap(),
		)
	}

	#[test]
	fn descriptor_uses_exact_version_text() {
		let dep = dependency("Provider");
		let (reference, version) = resolved(&dep, "v0.3.0");
		let descriptor = PackageDescriptor::for_dependency(PackageType::Provider, &reference, &version);
		assert_eq!(descriptor.name, "example-provider-sql");
		assert_eq!(descriptor.source, "example/provider-sql:v0.3.0");
	}

	#[tokio::test]
	async fn second_request_already_exists() {
		let dir = tempfile::tempdir().unwrap();
		let creator = FilePackageCreator::new(dir.path());
		let dep = dependency("Provider");
		let (reference, version) = resolved(&dep, "v0.3.0");

		let first = materialize(&creator, &dep, &reference, &version).await.unwrap();
		let second = materialize(&creator, &dep, &reference, &version).await.unwrap();

		assert!(matches!(first, Materialization::Created(_)));
		assert!(matches!(second, Materialization::AlreadyExists(_)));
		assert!(dir.path().join("providers").join("example-provider-sql.json").is_file());
		assert_eq!(std::fs::read_dir(dir.path().join("providers")).unwrap().count(), 1);
	}

	#[tokio::test]
	async fn incomplete_request_is_replaced() {
		let dir = tempfile::tempdir().unwrap();
		let creator = FilePackageCreator::new(dir.path());
		let dep = dependency("Provider");
		let (reference, version) = resolved(&dep, "v0.3.0");

		/* a writer that stopped before writing anything */
		let providers = dir.path().join("providers");
		std::fs::create_dir_all(&providers).unwrap();
		std::fs::write(providers.join("example-provider-sql.json"), b"").unwrap();

		let result = materialize(&creator, &dep, &reference, &version).await.unwrap();
		assert!(matches!(result, Materialization::Created(_)));

		let written: PackageDescriptor = serde_json::from_slice(&std::fs::read(providers.join("example-provider-sql.json")).unwrap()).unwrap();
		assert_eq!(written, *result.descriptor());
		assert_eq!(std::fs::read_dir(&providers).unwrap().count(), 1);

		let again = materialize(&creator, &dep, &reference, &version).await.unwrap();
		assert!(matches!(again, Materialization::AlreadyExists(_)));
	}

	#[tokio::test]
	async fn complete_request_is_kept() {
		let dir = tempfile::tempdir().unwrap();
		let creator = FilePackageCreator::new(dir.path());
		let dep = dependency("Provider");

		let (reference, older) = resolved(&dep, "v0.2.0");
		let first = materialize(&creator, &dep, &reference, &older).await.unwrap();
		let (_, newer) = resolved(&dep, "v0.3.0");
		let second = materialize(&creator, &dep, &reference, &newer).await.unwrap();
		assert!(matches!(second, Materialization::AlreadyExists(_)));

		let written: PackageDescriptor = serde_json::from_slice(&std::fs::read(creator.path(first.descriptor())).unwrap()).unwrap();
		assert_eq!(written.source, "example/provider-sql:v0.2.0");
	}

	#[tokio::test]
	async fn kinds_do_not_collide() {
		let dir = tempfile::tempdir().unwrap();
		let creator = FilePackageCreator::new(dir.path());
		for kind in ["Provider", "Configuration"] {
			let dep = dependency(kind);
			let (reference, version) = resolved(&dep, "v0.3.0");
			let result = materialize(&creator, &dep, &reference, &version).await.unwrap();
			assert!(matches!(result, Materialization::Created(_)));
		}
	}

	#[tokio::test]
	async fn unknown_kind_creates_nothing() {
		let dir = tempfile::tempdir().unwrap();
		let creator = FilePackageCreator::new(dir.path());
		let dep = dependency("Function");
		let (reference, version) = resolved(&dep, "v0.3.0");

		let err = materialize(&creator, &dep, &reference, &version).await.unwrap_err();
		assert!(matches!(err, MaterializeError::InvalidPackageType(_)));
		assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
	}
}
