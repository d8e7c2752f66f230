use std::sync::Arc;

use super::Reconciler;
use crate::config::ResolverConfig;
use crate::dependency_graph::{DependencyGraph, NewDagFn};
use crate::event::{NopRecorder, Recorder};
use crate::fetcher::{NopFetcher, TagFetcher};
use crate::materializer::PackageCreator;
use crate::store::{Finalizer, LockStore, StoreFinalizer};

/// Assembles a [`Reconciler`] from its collaborators.
///
/// Only the lock store and package creator are required. Unless replaced the reconciler uses a [`StoreFinalizer`]
/// over the same store, fetches no tags, records no events and builds a [`DependencyGraph`] each pass.
pub struct ReconcilerBuilder {
	store: Arc<dyn LockStore>,
	creator: Arc<dyn PackageCreator>,
	finalizer: Option<Arc<dyn Finalizer>>,
	fetcher: Arc<dyn TagFetcher>,
	recorder: Arc<dyn Recorder>,
	new_dag: NewDagFn,
	config: ResolverConfig,
}

impl ReconcilerBuilder {
	pub fn new(store: Arc<dyn LockStore>, creator: Arc<dyn PackageCreator>) -> Self {
		Self {
			store,
			creator,
			finalizer: None,
			fetcher: Arc::new(NopFetcher),
			recorder: Arc::new(NopRecorder),
			new_dag: DependencyGraph::new_dag,
			config: ResolverConfig::default(),
		}
	}

	pub fn finalizer(mut self, finalizer: Arc<dyn Finalizer>) -> Self {
		self.finalizer = Some(finalizer);
		self
	}

	pub fn fetcher(mut self, fetcher: Arc<dyn TagFetcher>) -> Self {
		self.fetcher = fetcher;
		self
	}

	pub fn recorder(mut self, recorder: Arc<dyn Recorder>) -> Self {
		self.recorder = recorder;
		self
	}

	pub fn new_dag(mut self, new_dag: NewDagFn) -> Self {
		self.new_dag = new_dag;
		self
	}

	pub fn config(mut self, config: ResolverConfig) -> Self {
		self.config = config;
		self
	}

	pub fn build(self) -> Reconciler {
		let finalizer: Arc<dyn Finalizer> = match self.finalizer {
			Some(f) => f,
			None => Arc::new(StoreFinalizer::new(self.store.clone(), self.config.finalizer())),
		};

		Reconciler {
			store: self.store,
			finalizer,
			creator: self.creator,
			fetcher: self.fetcher,
			recorder: self.recorder,
			new_dag: self.new_dag,
			timeout: self.config.reconcile_timeout(),
			short_wait: self.config.short_wait(),
			default_registry: self.config.default_registry().to_string(),
		}
	}
}
