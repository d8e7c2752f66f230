use serde::{Serialize, Deserialize};

/// The kinds of package that can be installed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PackageType {
	/// Bundles of composition resources.
	Configuration,
	/// Controllers for external infrastructure.
	Provider,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid package type `{0}`")]
pub struct InvalidPackageType(pub String);

impl PackageType {
	pub fn as_str(&self) -> &'static str {
		match self {
			PackageType::Configuration => "Configuration",
			PackageType::Provider => "Provider",
		}
	}
}

impl std::str::FromStr for PackageType {
	type Err = InvalidPackageType;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"Configuration" => Ok(PackageType::Configuration),
			"Provider" => Ok(PackageType::Provider),
			other => Err(InvalidPackageType(other.to_string())),
		}
	}
}

impl std::fmt::Display for PackageType {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(self.as_str())
	}
}

#[cfg(test)]
mod test {
	use super::*;

	#[test] fn configuration_parses() { assert_eq!("Configuration".parse::<PackageType>(), Ok(PackageType::Configuration)) }
	#[test] fn provider_parses() { assert_eq!("Provider".parse::<PackageType>(), Ok(PackageType::Provider)) }
	#[test] fn lowercase_is_rejected() { assert!("provider".parse::<PackageType>().is_err()) }
	#[test] fn empty_is_rejected() { assert!("".parse::<PackageType>().is_err()) }
}
