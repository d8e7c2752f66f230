//! Access to persisted locks.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;

use crate::lock::Lock;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
	/// The lock does not exist, a deleted lock is not a failure.
	#[error("lock `{0}` not found")]
	NotFound(String),
	/// The lock changed since it was read. Read it again before writing.
	#[error("lock `{name}` changed since revision {revision} was read")]
	Conflict { name: String, revision: u64 },
	#[error("IO error: {0}")]
	IO(#[from] std::io::Error),
	#[error("JSON error: {0}")]
	SerdeJSON(#[from] serde_json::Error),
	/// Used by stores that are not backed by the filesystem.
	#[error("{0}")]
	Other(String),
}

#[async_trait]
pub trait LockStore: Send + Sync {
	async fn get(&self, name: &str) -> Result<Lock, StoreError>;

	/// Writes the lock's finalizers back. Packages are left as they are stored.
	///
	/// Fails with [`StoreError::Conflict`] when the stored lock is no longer the one `lock` was read from,
	/// either because its revision moved on or its packages differ. On success `lock.revision` is the new revision.
	async fn update(&self, lock: &mut Lock) -> Result<(), StoreError>;
}

/// Whether `stored` is still the lock `read` was taken from.
pub fn is_current(stored: &Lock, read: &Lock) -> bool {
	stored.revision == read.revision && stored.packages == read.packages
}

/// Keeps a lock from being deleted while packages are still installed.
///
/// Both operations are idempotent.
#[async_trait]
pub trait Finalizer: Send + Sync {
	async fn add_finalizer(&self, lock: &mut Lock) -> Result<(), StoreError>;
	async fn remove_finalizer(&self, lock: &mut Lock) -> Result<(), StoreError>;
}

/// [`Finalizer`] editing the lock's finalizer list and writing it back through a [`LockStore`].
///
/// The store is only written when the list actually changes.
pub struct StoreFinalizer {
	store: Arc<dyn LockStore>,
	finalizer: String,
}

impl StoreFinalizer {
	pub fn new(store: Arc<dyn LockStore>, finalizer: impl Into<String>) -> Self {
		Self { store, finalizer: finalizer.into() }
	}
}

#[async_trait]
impl Finalizer for StoreFinalizer {
	async fn add_finalizer(&self, lock: &mut Lock) -> Result<(), StoreError> {
		if lock.has_finalizer(&self.finalizer) {
			return Ok(());
		}
		lock.finalizers.push(self.finalizer.clone());
		self.store.update(lock).await
	}

	async fn remove_finalizer(&self, lock: &mut Lock) -> Result<(), StoreError> {
		if !lock.has_finalizer(&self.finalizer) {
			return Ok(());
		}
		lock.finalizers.retain(|f| f != &self.finalizer);
		self.store.update(lock).await
	}
}

/// Locks stored as `<dir>/<name>.json`.
///
/// Writers going through the same store are serialized. Installers editing the files directly should bump
/// `revision`, a changed package list is detected either way.
#[derive(Debug, Clone)]
pub struct FileLockStore {
	dir: PathBuf,
	writes: Arc<tokio::sync::Mutex<()>>,
}

impl FileLockStore {
	pub fn new(dir: impl Into<PathBuf>) -> Self {
		Self { dir: dir.into(), writes: Default::default() }
	}

	pub fn dir(&self) -> &Path {
		&self.dir
	}

	fn path(&self, name: &str) -> PathBuf {
		self.dir.join(format!("{}.json", name))
	}

	/// Names of every lock in the directory.
	pub async fn list(&self) -> Result<Vec<String>, StoreError> {
		let mut names = Vec::new();
		let mut entries = tokio::fs::read_dir(&self.dir).await?;
		while let Some(entry) = entries.next_entry().await? {
			let path = entry.path();
			if path.extension().map_or(false, |e| e == "json") {
				if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
					names.push(stem.to_string());
				}
			}
		}
		names.sort();
		Ok(names)
	}
}

#[async_trait]
impl LockStore for FileLockStore {
	async fn get(&self, name: &str) -> Result<Lock, StoreError> {
		let data = match tokio::fs::read(self.path(name)).await {
			Ok(d) => d,
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Err(StoreError::NotFound(name.to_string())),
			Err(e) => return Err(e.into()),
		};
		let mut lock: Lock = serde_json::from_slice(&data)?;
		/* the file name is authoritative */
		lock.name = name.to_string();
		Ok(lock)
	}

	async fn update(&self, lock: &mut Lock) -> Result<(), StoreError> {
		let _guard = self.writes.lock().await;

		let mut stored = self.get(&lock.name).await?;
		if !is_current(&stored, lock) {
			log::debug!("Lock {} changed since revision {} was read", lock.name, lock.revision);
			return Err(StoreError::Conflict { name: lock.name.clone(), revision: lock.revision });
		}
		stored.finalizers = lock.finalizers.clone();
		stored.revision += 1;

		/* Rename over the old file so readers never see a partial write */
		let path = self.path(&lock.name);
		let tmp = self.dir.join(format!(".{}.json.tmp", lock.name));
		tokio::fs::write(&tmp, serde_json::to_vec_pretty(&stored)?).await?;
		tokio::fs::rename(&tmp, &path).await?;
		log::trace!("Wrote lock {} revision {} to {}", lock.name, stored.revision, path.display());

		lock.revision = stored.revision;
		Ok(())
	}
}

#[cfg(test)]
mod test {
	use super::*;

	async fn store_with(lock: &Lock) -> (tempfile::TempDir, Arc<FileLockStore>) {
		let dir = tempfile::tempdir().unwrap();
		std::fs::write(dir.path().join(format!("{}.json", lock.name)), serde_json::to_vec(lock).unwrap()).unwrap();
		let store = Arc::new(FileLockStore::new(dir.path()));
		(dir, store)
	}

	#[tokio::test]
	async fn missing_lock_is_not_found() {
		let dir = tempfile::tempdir().unwrap();
		let store = FileLockStore::new(dir.path());
		assert!(matches!(store.get("lock").await, Err(StoreError::NotFound(_))));
	}

	#[tokio::test]
	async fn update_replaces_lock() {
		let (_dir, store) = store_with(&Lock::new("lock")).await;
		let mut lock = store.get("lock").await.unwrap();
		lock.finalizers.push("example".to_string());
		store.update(&mut lock).await.unwrap();
		assert_eq!(lock.revision, 1);
		let stored = store.get("lock").await.unwrap();
		assert_eq!(stored.finalizers, vec!["example".to_string()]);
		assert_eq!(stored.revision, 1);
		assert_eq!(store.list().await.unwrap(), vec!["lock".to_string()]);
	}

	#[tokio::test]
	async fn update_of_deleted_lock_is_not_found() {
		let dir = tempfile::tempdir().unwrap();
		let store = FileLockStore::new(dir.path());
		assert!(matches!(store.update(&mut Lock::new("gone")).await, Err(StoreError::NotFound(_))));
	}

	#[tokio::test]
	async fn finalizer_is_added_once() {
		let (_dir, store) = store_with(&Lock::new("lock")).await;
		let finalizer = StoreFinalizer::new(store.clone(), "test.finalizer");

		let mut lock = store.get("lock").await.unwrap();
		finalizer.add_finalizer(&mut lock).await.unwrap();
		finalizer.add_finalizer(&mut lock).await.unwrap();

		assert_eq!(store.get("lock").await.unwrap().finalizers, vec!["test.finalizer".to_string()]);
	}

	#[tokio::test]
	async fn finalizer_removal_keeps_others() {
		let mut lock = Lock::new("lock");
		lock.finalizers = vec!["other".to_string(), "test.finalizer".to_string()];
		let (_dir, store) = store_with(&lock).await;
		let finalizer = StoreFinalizer::new(store.clone(), "test.finalizer");

		let mut lock = store.get("lock").await.unwrap();
		finalizer.remove_finalizer(&mut lock).await.unwrap();
		finalizer.remove_finalizer(&mut lock).await.unwrap();

		assert_eq!(store.get("lock").await.unwrap().finalizers, vec!["other".to_string()]);
	}

	fn installed(source: &str) -> crate::lock::LockPackage {
		crate::lock::LockPackage {
			name: source.replace('/', "-"),
			package_type: crate::lock::PackageType::Provider,
			source: source.to_string(),
			version: "v1.0.0".to_string(),
			dependencies: Vec::new(),
		}
	}

	/// Appends a package straight to the file, the way an installer outside this process would.
	fn install_behind_store(dir: &Path, name: &str, source: &str) {
		let path = dir.join(format!("{}.json", name));
		let mut lock: Lock = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
		lock.packages.push(installed(source));
		std::fs::write(&path, serde_json::to_vec(&lock).unwrap()).unwrap();
	}

	#[tokio::test]
	async fn finalizer_write_keeps_packages_installed_after_read() {
		let mut lock = Lock::new("lock");
		lock.packages.push(installed("team/app"));
		let (dir, store) = store_with(&lock).await;
		let finalizer = StoreFinalizer::new(store.clone(), "test.finalizer");

		let mut stale = store.get("lock").await.unwrap();
		install_behind_store(dir.path(), "lock", "team/provider-sql");

		let err = finalizer.add_finalizer(&mut stale).await.unwrap_err();
		assert!(matches!(err, StoreError::Conflict { revision: 0, .. }));

		let stored = store.get("lock").await.unwrap();
		assert_eq!(stored.packages.len(), 2);
		assert!(stored.finalizers.is_empty());

		/* a fresh read goes through and keeps both packages */
		let mut fresh = store.get("lock").await.unwrap();
		finalizer.add_finalizer(&mut fresh).await.unwrap();
		let stored = store.get("lock").await.unwrap();
		assert_eq!(stored.packages.len(), 2);
		assert_eq!(stored.finalizers, vec!["test.finalizer".to_string()]);
	}

	#[tokio::test]
	async fn stale_revision_is_rejected() {
		let (_dir, store) = store_with(&Lock::new("lock")).await;

		let mut first = store.get("lock").await.unwrap();
		let mut second = store.get("lock").await.unwrap();
		first.finalizers.push("one".to_string());
		second.finalizers.push("two".to_string());

		store.update(&mut first).await.unwrap();
		assert!(matches!(store.update(&mut second).await, Err(StoreError::Conflict { .. })));
		assert_eq!(store.get("lock").await.unwrap().finalizers, vec!["one".to_string()]);
	}

	#[tokio::test]
	async fn update_does_not_write_packages() {
		let (_dir, store) = store_with(&Lock::new("lock")).await;
		let mut lock = store.get("lock").await.unwrap();
		let mut edited = lock.clone();
		edited.packages.push(installed("team/app"));

		/* packages differ from what is stored, so the caller's copy is not current */
		assert!(matches!(store.update(&mut edited).await, Err(StoreError::Conflict { .. })));
		lock.finalizers.push("example".to_string());
		store.update(&mut lock).await.unwrap();
		assert!(store.get("lock").await.unwrap().packages.is_empty());
	}
}
