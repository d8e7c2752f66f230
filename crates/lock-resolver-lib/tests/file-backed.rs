use std::sync::Arc;

use lock_resolver::materializer::{FilePackageCreator, Materialization, PackageDescriptor};
use lock_resolver::store::FileLockStore;
use lock_resolver::{LockStore, PackageType, PassState, ReconcilerBuilder};
use lock_resolver_test_utils::*;

#[tokio::test]
async fn pass_writes_request_and_finalizer() {
	let locks = lock_dir(&[
		lock("platform", vec![package("registry.example.com/team/platform", "v1.0.0", vec![
			provider_dependency("registry.example.com/team/provider-sql", ">=0.3.0, <0.4.0"),
		])]),
	]).unwrap();
	let packages = tempfile::tempdir().unwrap();

	let store = Arc::new(FileLockStore::new(locks.path()));
	let creator = Arc::new(FilePackageCreator::new(packages.path()));
	let fetcher = StaticFetcher::new().with_tags("team/provider-sql", &["v0.2.0", "v0.3.1", "v0.3.9", "v0.4.0"]);
	let reconciler = ReconcilerBuilder::new(store.clone(), creator.clone())
		.fetcher(Arc::new(fetcher))
		.build();

	let first = reconciler.reconcile("platform").await.unwrap();
	let descriptor = match first.state {
		PassState::Materialized(Materialization::Created(d)) => d,
		other => panic!("unexpected state {:?}", other),
	};
	assert_eq!(descriptor.source, "registry.example.com/team/provider-sql:v0.3.9");

	let written: PackageDescriptor = serde_json::from_slice(&std::fs::read(creator.path(&descriptor)).unwrap()).unwrap();
	assert_eq!(written.kind, PackageType::Provider);
	assert_eq!(written.name, "team-provider-sql");
	assert!(packages.path().join("providers").join("team-provider-sql.json").is_file());

	let stored = store.get("platform").await.unwrap();
	assert_eq!(stored.finalizers, vec!["lock.pkg.resolver.io".to_string()]);

	let second = reconciler.reconcile("platform").await.unwrap();
	assert!(matches!(second.state, PassState::Materialized(Materialization::AlreadyExists(_))));
}

#[tokio::test]
async fn deleted_lock_file_ends_pass() {
	let locks = lock_dir(&[]).unwrap();
	let packages = tempfile::tempdir().unwrap();
	let reconciler = ReconcilerBuilder::new(
		Arc::new(FileLockStore::new(locks.path())),
		Arc::new(FilePackageCreator::new(packages.path())),
	).build();

	let outcome = reconciler.reconcile("gone").await.unwrap();
	assert!(matches!(outcome.state, PassState::NotFound));
	assert_eq!(std::fs::read_dir(locks.path()).unwrap().count(), 0);
}
