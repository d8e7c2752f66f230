//! In-memory collaborators and fixtures for testing the resolver.
//!
//! The fakes count their calls and can be told to fail so tests can observe exactly what a pass did.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use lock_resolver::event::{Event, Recorder};
use lock_resolver::fetcher::{FetchError, TagFetcher};
use lock_resolver::materializer::{CreateError, PackageCreator, PackageDescriptor};
use lock_resolver::store::{is_current, LockStore, StoreError};
use lock_resolver::{Dependency, ImageReference, Lock, LockPackage, PackageType};

/* Fixtures */

pub fn dependency(package: &str, package_type: &str, constraints: &str) -> Dependency {
	Dependency {
		package: package.to_string(),
		package_type: package_type.to_string(),
		constraints: constraints.to_string(),
	}
}

pub fn provider_dependency(package: &str, constraints: &str) -> Dependency {
	dependency(package, "Provider", constraints)
}

pub fn configuration_dependency(package: &str, constraints: &str) -> Dependency {
	dependency(package, "Configuration", constraints)
}

pub fn package(source: &str, version: &str, dependencies: Vec<Dependency>) -> LockPackage {
	LockPackage {
		name: lock_resolver::reference::to_dns_label(source),
		package_type: PackageType::Configuration,
		source: source.to_string(),
		version: version.to_string(),
		dependencies,
	}
}

pub fn lock(name: &str, packages: Vec<LockPackage>) -> Lock {
	Lock { name: name.to_string(), revision: 0, finalizers: Vec::new(), packages }
}

/// Writes each lock to `<dir>/<name>.json` in a new temporary directory.
pub fn lock_dir(locks: &[Lock]) -> std::io::Result<tempfile::TempDir> {
	let dir = tempfile::tempdir()?;
	for lock in locks {
		let data = serde_json::to_vec_pretty(lock).map_err(std::io::Error::from)?;
		std::fs::write(dir.path().join(format!("{}.json", lock.name)), data)?;
	}
	Ok(dir)
}

/* Lock store */

#[derive(Debug, Default)]
pub struct MemoryLockStore {
	locks: Mutex<HashMap<String, Lock>>,
	fail_gets: AtomicBool,
	fail_updates: AtomicBool,
	updates: AtomicUsize,
}

impl MemoryLockStore {
	pub fn new() -> Self {
		Default::default()
	}

	pub fn with(locks: impl IntoIterator<Item = Lock>) -> Self {
		let store = Self::new();
		for l in locks {
			store.insert(l);
		}
		store
	}

	pub fn insert(&self, lock: Lock) {
		self.locks.lock().unwrap().insert(lock.name.clone(), lock);
	}

	pub fn remove(&self, name: &str) -> Option<Lock> {
		self.locks.lock().unwrap().remove(name)
	}

	pub fn lock(&self, name: &str) -> Option<Lock> {
		self.locks.lock().unwrap().get(name).cloned()
	}

	/// Changes a stored lock in place and bumps its revision, as an external installer would.
	pub fn edit(&self, name: &str, f: impl FnOnce(&mut Lock)) -> bool {
		match self.locks.lock().unwrap().get_mut(name) {
			Some(l) => { f(l); l.revision += 1; true },
			None => false,
		}
	}

	pub fn set_fail_gets(&self, fail: bool) {
		self.fail_gets.store(fail, Ordering::SeqCst);
	}

	pub fn set_fail_updates(&self, fail: bool) {
		self.fail_updates.store(fail, Ordering::SeqCst);
	}

	/// Number of successful updates.
	pub fn updates(&self) -> usize {
		self.updates.load(Ordering::SeqCst)
	}
}

#[async_trait]
impl LockStore for MemoryLockStore {
	async fn get(&self, name: &str) -> Result<Lock, StoreError> {
		if self.fail_gets.load(Ordering::SeqCst) {
			return Err(StoreError::Other("injected get failure".to_string()));
		}
		self.lock(name).ok_or_else(|| StoreError::NotFound(name.to_string()))
	}

	async fn update(&self, lock: &mut Lock) -> Result<(), StoreError> {
		if self.fail_updates.load(Ordering::SeqCst) {
			return Err(StoreError::Other("injected update failure".to_string()));
		}
		let mut locks = self.locks.lock().unwrap();
		let stored = locks.get_mut(&lock.name).ok_or_else(|| StoreError::NotFound(lock.name.clone()))?;
		if !is_current(stored, lock) {
			return Err(StoreError::Conflict { name: lock.name.clone(), revision: lock.revision });
		}
		stored.finalizers = lock.finalizers.clone();
		stored.revision += 1;
		lock.revision = stored.revision;
		self.updates.fetch_add(1, Ordering::SeqCst);
		Ok(())
	}
}

/* Tag fetcher */

/// Serves fixed tags per repository.
#[derive(Debug, Default)]
pub struct StaticFetcher {
	tags: HashMap<String, Vec<String>>,
	delay: Option<Duration>,
	fail: AtomicBool,
	calls: AtomicUsize,
}

impl StaticFetcher {
	pub fn new() -> Self {
		Default::default()
	}

	pub fn with_tags(mut self, repository: &str, tags: &[&str]) -> Self {
		self.tags.insert(repository.to_string(), tags.iter().map(|t| t.to_string()).collect());
		self
	}

	/// Every fetch waits this long before answering.
	pub fn with_delay(mut self, delay: Duration) -> Self {
		self.delay = Some(delay);
		self
	}

	pub fn set_fail(&self, fail: bool) {
		self.fail.store(fail, Ordering::SeqCst);
	}

	pub fn calls(&self) -> usize {
		self.calls.load(Ordering::SeqCst)
	}
}

#[async_trait]
impl TagFetcher for StaticFetcher {
	async fn tags(&self, reference: &ImageReference) -> Result<Vec<String>, FetchError> {
		self.calls.fetch_add(1, Ordering::SeqCst);
		if let Some(delay) = self.delay {
			tokio::time::sleep(delay).await;
		}
		if self.fail.load(Ordering::SeqCst) {
			return Err(FetchError::Other("injected fetch failure".to_string()));
		}
		Ok(self.tags.get(reference.repository()).cloned().unwrap_or_default())
	}
}

/* Package creator */

/// Dependencies a package declares once installed, keyed by repository.
pub type Catalog = HashMap<String, Vec<Dependency>>;

struct Installer {
	store: Arc<MemoryLockStore>,
	lock: String,
	catalog: Catalog,
}

/// Keeps created packages in memory, rejecting a second package with the same kind and name.
#[derive(Default)]
pub struct MemoryPackageCreator {
	created: Mutex<Vec<PackageDescriptor>>,
	attempts: AtomicUsize,
	fail: AtomicBool,
	installer: Option<Installer>,
}

impl MemoryPackageCreator {
	pub fn new() -> Self {
		Default::default()
	}

	/// Also adds every created package straight to `lock` in `store`, with the dependencies `catalog` lists for it.
	pub fn installing_into(store: Arc<MemoryLockStore>, lock: &str, catalog: Catalog) -> Self {
		Self {
			installer: Some(Installer { store, lock: lock.to_string(), catalog }),
			..Default::default()
		}
	}

	pub fn set_fail(&self, fail: bool) {
		self.fail.store(fail, Ordering::SeqCst);
	}

	/// Calls to `create`, successful or not.
	pub fn attempts(&self) -> usize {
		self.attempts.load(Ordering::SeqCst)
	}

	pub fn created(&self) -> Vec<PackageDescriptor> {
		self.created.lock().unwrap().clone()
	}
}

#[async_trait]
impl PackageCreator for MemoryPackageCreator {
	async fn create(&self, package: &PackageDescriptor) -> Result<(), CreateError> {
		self.attempts.fetch_add(1, Ordering::SeqCst);
		if self.fail.load(Ordering::SeqCst) {
			return Err(CreateError::Rejected("injected create failure".to_string()));
		}

		{
			let mut created = self.created.lock().unwrap();
			if created.iter().any(|c| c.kind == package.kind && c.name == package.name) {
				return Err(CreateError::AlreadyExists(package.name.clone()));
			}
			created.push(package.clone());
		}

		if let Some(installer) = &self.installer {
			let (source, version) = package.source.rsplit_once(':').unwrap_or((package.source.as_str(), ""));
			let installed = LockPackage {
				name: package.name.clone(),
				package_type: package.kind,
				source: source.to_string(),
				version: version.to_string(),
				dependencies: installer.catalog.get(source).cloned().unwrap_or_default(),
			};
			installer.store.edit(&installer.lock, |l| l.packages.push(installed));
		}

		Ok(())
	}
}

/* Event recorder */

#[derive(Debug, Default)]
pub struct RecordingRecorder {
	events: Mutex<Vec<(String, Event)>>,
}

impl RecordingRecorder {
	pub fn new() -> Self {
		Default::default()
	}

	pub fn events(&self) -> Vec<(String, Event)> {
		self.events.lock().unwrap().clone()
	}
}

impl Recorder for RecordingRecorder {
	fn record(&self, lock: &str, event: Event) {
		self.events.lock().unwrap().push((lock.to_string(), event));
	}
}
