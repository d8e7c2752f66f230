//! The persisted record of installed packages and what they depend on.
//!
//! The resolver only reads packages from a [`Lock`]. Entries are added by whatever installs a package,
//! the only thing the resolver writes back is the lock's finalizer list.

use serde::{Serialize, Deserialize};

mod package_type;
pub use package_type::{PackageType, InvalidPackageType};

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lock {
	pub name: String,
	/// Bumped on every write. A write made from an older revision is rejected by the store.
	#[serde(default)]
	pub revision: u64,
	#[serde(default)]
	pub finalizers: Vec<String>,
	#[serde(default)]
	pub packages: Vec<LockPackage>,
}

impl Lock {
	pub fn new(name: impl Into<String>) -> Self {
		Self { name: name.into(), ..Default::default() }
	}

	pub fn has_finalizer(&self, finalizer: &str) -> bool {
		self.finalizers.iter().any(|f| f == finalizer)
	}
}

/// An installed package.
///
/// Packages are identified by their `source`, the image repository they were installed from without a tag.
/// [`Dependency::package`] refers to this identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockPackage {
	pub name: String,
	#[serde(rename = "type")]
	pub package_type: PackageType,
	pub source: String,
	pub version: String,
	#[serde(default)]
	pub dependencies: Vec<Dependency>,
}

impl LockPackage {
	pub fn identifier(&self) -> &str {
		&self.source
	}
}

/// A dependency declared by an installed package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependency {
	/// Image repository of the required package.
	pub package: String,
	/// Kind of package as written in the lock, checked with [`Dependency::kind()`] before anything is created.
	#[serde(rename = "type")]
	pub package_type: String,
	/// Version range the installed package must satisfy.
	pub constraints: String,
}

impl Dependency {
	pub fn identifier(&self) -> &str {
		&self.package
	}

	pub fn kind(&self) -> Result<PackageType, InvalidPackageType> {
		self.package_type.parse()
	}
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn lock_reads_from_json() {
		let lock: Lock = serde_json::from_str(r#"{
			"name": "lock",
			"packages": [{
				"name": "platform",
				"type": "Configuration",
				"source": "example/platform",
				"version": "v1.0.0",
				"dependencies": [
					{ "package": "example/provider-sql", "type": "Provider", "constraints": ">=v0.2.0" }
				]
			}]
		}"#).unwrap();

		assert!(lock.finalizers.is_empty());
		assert_eq!(lock.packages[0].identifier(), "example/platform");
		assert_eq!(lock.packages[0].package_type, PackageType::Configuration);
		assert_eq!(lock.packages[0].dependencies[0].kind(), Ok(PackageType::Provider));
	}

	#[test]
	fn unknown_dependency_kind_is_kept_until_checked() {
		let dep: Dependency = serde_json::from_str(r#"{ "package": "a/b", "type": "Function", "constraints": "*" }"#).unwrap();
		assert_eq!(dep.kind(), Err(InvalidPackageType("Function".to_string())));
	}
}
