//! Graph of installed packages and the dependencies they declare.
//!
//! Installed packages become [`NodeData::Installed`] nodes. A dependency on an identifier that is not installed
//! becomes a [`NodeData::Implied`] node, which never has outgoing edges. These are what the resolver still has to install.

use std::collections::HashMap;

use petgraph::prelude::*;

use crate::lock::{Dependency, LockPackage};

/// Constructs an empty graph for a pass.
pub type NewDagFn = fn() -> Box<dyn Dag>;

/// Operations the reconciler needs from a dependency graph.
pub trait Dag: Send {
	/// Adds `packages` and their dependency edges to the graph.
	///
	/// Returns the dependencies that no installed package fulfills, deduplicated by identifier,
	/// in the order they were first declared.
	fn init(&mut self, packages: &[LockPackage]) -> Result<Vec<Dependency>, GraphError>;

	/// Topologically sorts every node, dependencies before their dependents.
	fn sort(&self) -> Result<Vec<String>, GraphError>;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GraphError {
	/// A package in the lock has no source to identify it by.
	#[error("package `{0}` has an empty identifier")]
	EmptyIdentifier(String),
	/// A package declares a dependency without naming the package.
	#[error("package `{0}` declares a dependency with an empty identifier")]
	EmptyDependency(String),
	#[error("node `{0}` already exists")]
	DuplicateNode(String),
	#[error("node `{0}` has a circular dependency")]
	Cycle(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeData {
	/// A package present in the lock.
	Installed(LockPackage),
	/// Required by an installed package but not present in the lock.
	Implied(Dependency),
}

impl NodeData {
	pub fn identifier(&self) -> &str {
		match self {
			NodeData::Installed(p) => p.identifier(),
			NodeData::Implied(d) => d.identifier(),
		}
	}
}

/// A requirement from the source package on the target, carrying the declared constraint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EdgeData {
	pub constraints: String,
}

#[derive(Debug, Default, Clone)]
pub struct DependencyGraph {
	graph: StableDiGraph<NodeData, EdgeData>,
	index: HashMap<String, NodeIndex>,
}

impl DependencyGraph {
	pub fn new() -> Self {
		Default::default()
	}

	/// Default [`NewDagFn`].
	pub fn new_dag() -> Box<dyn Dag> {
		Box::new(Self::new())
	}

	pub fn node_count(&self) -> usize {
		self.graph.node_count()
	}

	pub fn contains(&self, identifier: &str) -> bool {
		self.index.contains_key(identifier)
	}

	pub fn node(&self, identifier: &str) -> Option<&NodeData> {
		self.index.get(identifier).map(|i| &self.graph[*i])
	}

	/// Direct dependencies of a node in declaration order. Implied nodes have none.
	pub fn neighbors(&self, identifier: &str) -> Option<Vec<&str>> {
		let mut out = Vec::<&str>::new();
		match self.node(identifier)? {
			NodeData::Installed(p) => {
				for d in &p.dependencies {
					if !out.contains(&d.identifier()) {
						out.push(d.identifier());
					}
				}
			},
			NodeData::Implied(_) => {},
		}
		Some(out)
	}

	/// Outgoing edges of a node as `(target, edge)` in the order the dependencies were declared, repeats included.
	pub fn edges(&self, identifier: &str) -> Option<Vec<(&str, &EdgeData)>> {
		let src = *self.index.get(identifier)?;
		let mut edges: Vec<_> = self.graph.edges(src).collect();
		edges.sort_by_key(|e| e.id());
		Some(edges.into_iter().map(|e| (self.graph[e.target()].identifier(), e.weight())).collect())
	}

	/// Every identifier reachable from `identifier`, excluding itself, in depth first discovery order.
	pub fn trace(&self, identifier: &str) -> Option<Vec<&str>> {
		let start = *self.index.get(identifier)?;
		let mut dfs = Dfs::new(&self.graph, start);
		let mut out = Vec::new();
		while let Some(i) = dfs.next(&self.graph) {
			if i != start {
				out.push(self.graph[i].identifier());
			}
		}
		Some(out)
	}

	fn add_node(&mut self, data: NodeData) -> Result<NodeIndex, GraphError> {
		let id = data.identifier().to_string();
		if self.index.contains_key(&id) {
			return Err(GraphError::DuplicateNode(id));
		}
		let i = self.graph.add_node(data);
		self.index.insert(id, i);
		Ok(i)
	}
}

impl Dag for DependencyGraph {
	fn init(&mut self, packages: &[LockPackage]) -> Result<Vec<Dependency>, GraphError> {
		let mut installed = Vec::<NodeIndex>::with_capacity(packages.len());
		for package in packages {
			if package.identifier().is_empty() {
				return Err(GraphError::EmptyIdentifier(package.name.clone()));
			}
			installed.push(self.add_node(NodeData::Installed(package.clone()))?);
		}

		let mut implied = Vec::<Dependency>::new();
		for (src, package) in installed.into_iter().zip(packages) {
			for dep in &package.dependencies {
				if dep.identifier().is_empty() {
					return Err(GraphError::EmptyDependency(package.identifier().to_string()));
				}
				let target = match self.index.get(dep.identifier()) {
					Some(i) => *i,
					None => {
						implied.push(dep.clone());
						self.add_node(NodeData::Implied(dep.clone()))?
					},
				};
				self.graph.add_edge(src, target, EdgeData { constraints: dep.constraints.clone() });
			}
		}

		Ok(implied)
	}

	fn sort(&self) -> Result<Vec<String>, GraphError> {
		/* toposort puts dependents before their dependencies since edges point at what is required */
		let order = petgraph::algo::toposort(&self.graph, None)
			.map_err(|cycle| GraphError::Cycle(self.graph[cycle.node_id()].identifier().to_string()))?;

		Ok(order.into_iter().rev().map(|i| self.graph[i].identifier().to_string()).collect())
	}
}
