//! Semantic versions as published by registries, and selection of the best one for a constraint.

use std::cmp::Ordering;

mod constraint;
pub use constraint::Constraint;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VersionError {
	#[error("`{0}` is not a semantic version")]
	InvalidVersion(String),
	#[error("version constraint `{constraint}` is invalid: {reason}")]
	InvalidConstraint { constraint: String, reason: String },
	#[error("dependency ({identifier}) does not have version in constraints ({constraint})")]
	NoValidVersion { identifier: String, constraint: String },
}

/// A parsed version which keeps the exact text it was parsed from.
///
/// Registries tag images with strings such as `v1.2.0` or `1.2`, both are accepted.
/// Ordering and equality follow semver precedence of the parsed version, [`ResolvedVersion::original()`] is
/// what should be written back out.
#[derive(Debug, Clone)]
pub struct ResolvedVersion {
	version: semver::Version,
	original: String,
}

impl ResolvedVersion {
	pub fn parse(raw: &str) -> Result<Self, VersionError> {
		let version = parse_loose(raw).ok_or_else(|| VersionError::InvalidVersion(raw.to_string()))?;
		Ok(Self { version, original: raw.to_string() })
	}

	pub fn version(&self) -> &semver::Version {
		&self.version
	}

	pub fn original(&self) -> &str {
		&self.original
	}
}

impl PartialEq for ResolvedVersion {
	fn eq(&self, other: &Self) -> bool {
		self.version == other.version
	}
}

impl Eq for ResolvedVersion {}

impl Ord for ResolvedVersion {
	fn cmp(&self, other: &Self) -> Ordering {
		self.version.cmp(&other.version)
	}
}

impl PartialOrd for ResolvedVersion {
	fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
		Some(self.cmp(other))
	}
}

impl std::fmt::Display for ResolvedVersion {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(&self.original)
	}
}

/// Parses `raw` allowing a `v` prefix and missing minor or patch numbers.
pub(crate) fn parse_loose(raw: &str) -> Option<semver::Version> {
	let trimmed = raw.strip_prefix(|c: char| c == 'v' || c == 'V').unwrap_or(raw);
	let split = trimmed.find(|c: char| c == '-' || c == '+').unwrap_or(trimmed.len());
	let (core, rest) = trimmed.split_at(split);

	let mut numbers = [0u64; 3];
	let mut count = 0;
	for part in core.split('.') {
		if count == numbers.len() || part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
			return None;
		}
		numbers[count] = part.parse().ok()?;
		count += 1;
	}

	semver::Version::parse(&format!("{}.{}.{}{}", numbers[0], numbers[1], numbers[2], rest)).ok()
}

/// Picks the highest version in `tags` satisfying `constraint`.
///
/// Tags which are not semantic versions are skipped. `identifier` is only used to describe the failure.
pub fn select_version<I, S>(identifier: &str, constraint: &Constraint, tags: I) -> Result<ResolvedVersion, VersionError>
where
	I: IntoIterator<Item = S>,
	S: AsRef<str>,
{
	let mut versions: Vec<ResolvedVersion> = tags.into_iter()
		.filter_map(|t| ResolvedVersion::parse(t.as_ref()).ok())
		.collect();
	versions.sort();

	let mut selected = None;
	for v in versions {
		if constraint.matches(&v) {
			selected = Some(v);
		}
	}

	selected.ok_or_else(|| VersionError::NoValidVersion {
		identifier: identifier.to_string(),
		constraint: constraint.as_str().to_string(),
	})
}
