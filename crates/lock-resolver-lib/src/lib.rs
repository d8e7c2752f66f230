//! Incremental dependency resolution for packages recorded in a lock.
//!
//! Each call to [`Reconciler::reconcile()`] is one pass: it reads the lock, checks the dependency graph for cycles
//! and requests installation of at most one missing dependency. Installing that dependency eventually adds it to the
//! lock, which triggers the next pass. [`Controller`] drives passes for a set of locks until shut down.

pub mod error;
pub use error::Result;
pub use error::Error;

pub mod config;
pub use config::ResolverConfig;

pub mod lock;
pub use lock::{Lock, LockPackage, Dependency, PackageType};

pub mod dependency_graph;
pub use dependency_graph::{Dag, DependencyGraph};

pub mod version;
pub use version::{Constraint, ResolvedVersion};

pub mod reference;
pub use reference::ImageReference;

pub mod fetcher;
pub use fetcher::TagFetcher;

pub mod store;
pub use store::{LockStore, Finalizer};

pub mod materializer;
pub use materializer::{PackageCreator, PackageDescriptor};

pub mod event;

pub mod reconciler;
pub use reconciler::{Reconciler, ReconcilerBuilder, Outcome, PassState};

pub mod controller;
pub use controller::Controller;
