use super::{ResolvedVersion, VersionError};

/// Longest operators first so `>=` is not read as `>`.
const OPERATORS: [&str; 11] = ["!=", ">=", "<=", "=>", "=<", "~>", ">", "<", "=", "~", "^"];

/// A version range such as `>=1.2.0, <2.0.0`.
///
/// - `||` separates alternatives, any of which may match.
/// - `,` separates terms of an alternative, all of which must match.
/// - Hyphen ranges (`1.2 - 1.4.5`) are inclusive on both ends.
/// - A bare version means exactly that version, partial versions and `x` / `*` act as wildcards.
/// - Pre-releases are only matched by a term naming a pre-release of the same `major.minor.patch`.
#[derive(Debug, Clone)]
pub struct Constraint {
	raw: String,
	alternatives: Vec<Alternative>,
}

#[derive(Debug, Clone)]
struct Alternative {
	req: semver::VersionReq,
	/// A version matching any of these is rejected. Partial versions exclude the whole range they cover.
	excluded: Vec<semver::Comparator>,
}

impl Constraint {
	pub fn parse(raw: &str) -> Result<Self, VersionError> {
		let invalid = |reason: String| VersionError::InvalidConstraint { constraint: raw.to_string(), reason };

		if raw.trim().is_empty() {
			return Err(invalid("constraint is empty".to_string()));
		}

		let mut alternatives = Vec::new();
		for alternative in raw.split("||") {
			let mut comparators = Vec::new();
			let mut excluded = Vec::new();
			for term in alternative.split(',') {
				parse_term(term, &mut comparators, &mut excluded).map_err(invalid)?;
			}
			alternatives.push(Alternative { req: semver::VersionReq { comparators }, excluded });
		}

		Ok(Self { raw: raw.to_string(), alternatives })
	}

	pub fn matches(&self, version: &ResolvedVersion) -> bool {
		let v = version.version();
		self.alternatives.iter().any(|a| a.req.matches(v) && !a.excluded.iter().any(|e| e.matches(v)))
	}

	/// The constraint as it was written.
	pub fn as_str(&self) -> &str {
		&self.raw
	}
}

impl std::fmt::Display for Constraint {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(&self.raw)
	}
}

fn parse_term(term: &str, comparators: &mut Vec<semver::Comparator>, excluded: &mut Vec<semver::Comparator>) -> Result<(), String> {
	let term = term.trim();
	if term.is_empty() {
		return Err("empty term".to_string());
	}

	if let Some((low, high)) = term.split_once(" - ") {
		comparators.push(comparator(">=", low)?);
		comparators.push(comparator("<=", high)?);
		return Ok(());
	}

	let (op, version) = split_operator(term);
	let version = strip_prefix(version.trim());
	if version.is_empty() {
		return Err(format!("missing version after `{}`", op));
	}

	match op {
		"!=" => {
			/* `=1.5` covers every 1.5.x, which is what `!=1.5` leaves out */
			let op = if has_wildcard(version) { "" } else { "=" };
			excluded.push(comparator(op, version)?);
		},
		/* a lone wildcard places no restriction */
		"" | "=" if matches!(version, "*" | "x" | "X") => {},
		"" | "=" => {
			let op = if has_wildcard(version) { "" } else { "=" };
			comparators.push(comparator(op, version)?);
		},
		"=>" => comparators.push(comparator(">=", version)?),
		"=<" => comparators.push(comparator("<=", version)?),
		"~>" => comparators.push(comparator("~", version)?),
		op => comparators.push(comparator(op, version)?),
	}

	Ok(())
}

fn comparator(op: &str, version: &str) -> Result<semver::Comparator, String> {
	let version = strip_prefix(version.trim());
	semver::Comparator::parse(&format!("{}{}", op, version)).map_err(|e| e.to_string())
}

fn split_operator(term: &str) -> (&str, &str) {
	for op in OPERATORS {
		if let Some(rest) = term.strip_prefix(op) {
			return (op, rest);
		}
	}
	("", term)
}

/// Drops a `v` in front of a version number.
fn strip_prefix(version: &str) -> &str {
	match version.strip_prefix(|c: char| c == 'v' || c == 'V') {
		Some(rest) if rest.starts_with(|c: char| c.is_ascii_digit()) => rest,
		_ => version,
	}
}

fn has_wildcard(version: &str) -> bool {
	version.split('.').any(|p| matches!(p, "*" | "x" | "X"))
}
