//! Library error type.

pub type Result<T> = std::result::Result<T, Error>;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
	#[error("IO error: {0}")]
	IO(#[from] std::io::Error),
	#[error("JSON error: {0}")]
	SerdeJSON(#[from] serde_json::Error),
	#[error("configuration error: {0}")]
	Config(String),
	#[error("lock store error: {0}")]
	Store(#[from] crate::store::StoreError),
	#[error("graph error: {0}")]
	Graph(#[from] crate::dependency_graph::GraphError),
	#[error("reconcile error: {0}")]
	Reconcile(#[from] crate::reconciler::ReconcileError),
}
