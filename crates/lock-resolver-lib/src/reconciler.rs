//! A single reconcile pass over one lock.
//!
//! # Pass
//! 1. Read the lock. A missing lock ends the pass.
//! 1. With no packages installed the finalizer is removed and the pass ends.
//! 1. Otherwise the finalizer is added and the dependency graph built and sorted.
//!    A cycle ends the pass with an error before anything else happens.
//! 1. The first dependency that is not installed has its version resolved and an installation requested.
//!
//! Only one dependency is requested per pass. Once it is installed it appears in the lock, and the pass that
//! follows moves on to the next missing dependency.

use std::sync::Arc;
use std::time::Duration;

use crate::dependency_graph::{GraphError, NewDagFn};
use crate::event::{Event, Recorder};
use crate::fetcher::{FetchError, TagFetcher};
use crate::lock::{Dependency, Lock};
use crate::materializer::{self, Materialization, MaterializeError, PackageCreator};
use crate::reference::{ImageReference, ReferenceError};
use crate::store::{Finalizer, LockStore, StoreError};
use crate::version::{self, Constraint, VersionError};

mod builder;
pub use builder::ReconcilerBuilder;

/// Failures returned to whoever scheduled the pass, which should retry with a backoff.
#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
	#[error("cannot get package lock: {0}")]
	GetLock(#[source] StoreError),
	#[error("cannot build DAG: {0}")]
	BuildGraph(#[source] GraphError),
	/// The lock has a dependency cycle. Nothing is installed until the lock is corrected.
	#[error("cannot sort DAG: {0}")]
	SortGraph(#[source] GraphError),
	#[error("reconcile pass did not finish within {0:?}")]
	Timeout(Duration),
}

/// Why the missing dependency chosen by a pass could not be requested.
#[derive(Debug, thiserror::Error)]
pub enum ResolutionError {
	#[error("version constraint on dependency is invalid: {0}")]
	InvalidConstraint(#[source] VersionError),
	#[error("dependency package is not valid: {0}")]
	InvalidDependency(#[source] ReferenceError),
	#[error("cannot fetch dependency package tags: {0}")]
	FetchTags(#[source] FetchError),
	#[error("cannot find a valid version for package constraints: {0}")]
	NoValidVersion(#[source] VersionError),
	#[error(transparent)]
	Materialize(#[from] MaterializeError),
}

impl ResolutionError {
	/// Whether trying again shortly could succeed without the lock or registry changing.
	pub fn is_transient(&self) -> bool {
		matches!(self, ResolutionError::FetchTags(_) | ResolutionError::Materialize(MaterializeError::Create(_)))
	}

	fn reason(&self) -> &'static str {
		match self {
			ResolutionError::InvalidConstraint(_) => "InvalidConstraint",
			ResolutionError::InvalidDependency(_) => "InvalidDependency",
			ResolutionError::FetchTags(_) => "FetchTags",
			ResolutionError::NoValidVersion(_) => "NoValidVersion",
			ResolutionError::Materialize(MaterializeError::InvalidPackageType(_)) => "InvalidPackageType",
			ResolutionError::Materialize(MaterializeError::Create(_)) => "CreateDependency",
		}
	}
}

/// Where a pass stopped.
#[derive(Debug)]
pub enum PassState {
	/// The lock no longer exists.
	NotFound,
	/// The lock has no packages, its finalizer is removed or being removed.
	Idle,
	/// The finalizer could not be added to a lock with packages.
	FinalizerPending,
	/// Every dependency is installed.
	NothingImplied,
	ResolutionFailed { dependency: String, error: ResolutionError },
	Materialized(Materialization),
}

#[derive(Debug)]
pub struct Outcome {
	pub state: PassState,
	/// When set the pass should be repeated after this delay regardless of other triggers.
	pub requeue_after: Option<Duration>,
}

impl Outcome {
	fn done(state: PassState) -> Self {
		Self { state, requeue_after: None }
	}

	fn requeue(state: PassState, after: Duration) -> Self {
		Self { state, requeue_after: Some(after) }
	}
}

pub struct Reconciler {
	store: Arc<dyn LockStore>,
	finalizer: Arc<dyn Finalizer>,
	creator: Arc<dyn PackageCreator>,
	fetcher: Arc<dyn TagFetcher>,
	recorder: Arc<dyn Recorder>,
	new_dag: NewDagFn,

	timeout: Duration,
	short_wait: Duration,
	default_registry: String,
}

impl Reconciler {
	/// Runs one pass over the lock called `name`, giving up once the configured timeout passes.
	pub async fn reconcile(&self, name: &str) -> Result<Outcome, ReconcileError> {
		log::debug!("Reconciling lock {}", name);
		match tokio::time::timeout(self.timeout, self.pass(name)).await {
			Ok(result) => result,
			Err(_) => {
				log::debug!("Reconcile of lock {} timed out after {:?}", name, self.timeout);
				Err(ReconcileError::Timeout(self.timeout))
			},
		}
	}

	async fn pass(&self, name: &str) -> Result<Outcome, ReconcileError> {
		let mut lock = match self.store.get(name).await {
			Ok(l) => l,
			Err(StoreError::NotFound(_)) => {
				log::debug!("Lock {} not found", name);
				return Ok(Outcome::done(PassState::NotFound));
			},
			Err(e) => {
				log::debug!("cannot get package lock {}: {}", name, e);
				return Err(ReconcileError::GetLock(e));
			},
		};

		/*
		With no packages left the finalizer goes, allowing the lock to be deleted
		after every package has been uninstalled. A new package triggers another pass.
		*/
		if lock.packages.is_empty() {
			if let Err(e) = self.finalizer.remove_finalizer(&mut lock).await {
				log::debug!("cannot remove lock finalizer from {}: {}", name, e);
				return Ok(Outcome::requeue(PassState::Idle, self.short_wait));
			}
			return Ok(Outcome::done(PassState::Idle));
		}

		if let Err(e) = self.finalizer.add_finalizer(&mut lock).await {
			log::debug!("cannot add lock finalizer to {}: {}", name, e);
			return Ok(Outcome::requeue(PassState::FinalizerPending, self.short_wait));
		}

		let implied = {
			let mut dag = (self.new_dag)();
			let implied = dag.init(&lock.packages).map_err(ReconcileError::BuildGraph)?;
			/* Refuse to install anything into a graph with a cycle */
			dag.sort().map_err(ReconcileError::SortGraph)?;
			implied
		};

		let Some(dependency) = implied.into_iter().next() else {
			log::debug!("Lock {} has no missing dependencies", name);
			return Ok(Outcome::done(PassState::NothingImplied));
		};

		Ok(self.resolve(&lock, dependency).await)
	}

	/// Resolves and requests `dependency`. Failures here are never returned as errors.
	async fn resolve(&self, lock: &Lock, dependency: Dependency) -> Outcome {
		let constraint = match Constraint::parse(&dependency.constraints) {
			Ok(c) => c,
			Err(e) => return self.failed(lock, &dependency, ResolutionError::InvalidConstraint(e)),
		};

		let reference = match ImageReference::parse(&dependency.package, &self.default_registry) {
			Ok(r) => r,
			Err(e) => return self.failed(lock, &dependency, ResolutionError::InvalidDependency(e)),
		};

		/* XXX: Private registries can't be listed as no credentials are attached. */
		let tags = match self.fetcher.tags(&reference).await {
			Ok(t) => t,
			Err(e) => return self.failed(lock, &dependency, ResolutionError::FetchTags(e)),
		};

		let version = match version::select_version(dependency.identifier(), &constraint, &tags) {
			Ok(v) => v,
			Err(e) => return self.failed(lock, &dependency, ResolutionError::NoValidVersion(e)),
		};

		match materializer::materialize(self.creator.as_ref(), &dependency, &reference, &version).await {
			Ok(m) => {
				self.recorder.record(&lock.name, Event::normal(
					"ResolveDependency",
					format!("requested {} for dependency {}", m.descriptor().source, dependency.identifier()),
				));
				Outcome::done(PassState::Materialized(m))
			},
			Err(e) => self.failed(lock, &dependency, e.into()),
		}
	}

	fn failed(&self, lock: &Lock, dependency: &Dependency, error: ResolutionError) -> Outcome {
		log::debug!("lock {}: dependency {}: {}", lock.name, dependency.identifier(), error);
		self.recorder.record(&lock.name, Event::warning(error.reason(), format!("dependency {}: {}", dependency.identifier(), error)));

		let requeue = error.is_transient();
		let state = PassState::ResolutionFailed { dependency: dependency.identifier().to_string(), error };
		if requeue {
			Outcome::requeue(state, self.short_wait)
		} else {
			Outcome::done(state)
		}
	}
}
