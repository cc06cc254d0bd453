//! Version gating of catalog phases.
//!
//! A phase may carry a semver requirement such as `">=2026.1.0, <2026.3.0"`.
//! Before a run the catalog is narrowed to the phases whose requirement the
//! host's `package.json` version satisfies.

use crate::catalog::schema::Catalog;
use semver::{Version, VersionReq};
use std::collections::HashSet;
use std::fmt;

/// Errors while interpreting versions or requirements.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionError {
    /// Host version string is not semver (e.g. "latest")
    InvalidVersion { value: String, source: String },
    /// Phase requirement is not a semver requirement (e.g. ">=bad")
    InvalidRequirement { value: String, source: String },
}

impl fmt::Display for VersionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VersionError::InvalidVersion { value, source } => {
                write!(f, "invalid host version '{}': {}", value, source)
            }
            VersionError::InvalidRequirement { value, source } => {
                write!(f, "invalid version_range '{}': {}", value, source)
            }
        }
    }
}

impl std::error::Error for VersionError {}

/// A phase left out of the run, with the reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedPhase {
    pub phase: String,
    pub reason: String,
}

/// Parse a host version. npm and nvm both write versions with an optional
/// leading `v`.
pub fn parse_version(raw: &str) -> Result<Version, VersionError> {
    let trimmed = raw.trim();
    let bare = trimmed.strip_prefix('v').unwrap_or(trimmed);
    Version::parse(bare).map_err(|e| VersionError::InvalidVersion {
        value: raw.to_string(),
        source: e.to_string(),
    })
}

pub fn parse_requirement(raw: &str) -> Result<VersionReq, VersionError> {
    VersionReq::parse(raw.trim()).map_err(|e| VersionError::InvalidRequirement {
        value: raw.to_string(),
        source: e.to_string(),
    })
}

/// Narrow `catalog` to the phases that may run against `host_version`.
///
/// Phases without a `version_range` always run. Phases with one are skipped
/// when the host version is unknown or falls outside the range. The input
/// catalog is left untouched.
pub fn gate(
    catalog: &Catalog,
    host_version: Option<&str>,
) -> Result<(Catalog, Vec<SkippedPhase>), VersionError> {
    if catalog.phases().iter().all(|p| p.version_range().is_none()) {
        return Ok((catalog.clone(), Vec::new()));
    }

    let host = host_version.map(parse_version).transpose()?;
    let mut skipped = Vec::new();

    for phase in catalog.phases() {
        let Some(range) = phase.version_range() else {
            continue;
        };
        let req = parse_requirement(range)?;
        let reason = match &host {
            None => Some(format!("host version unknown; phase requires {range}")),
            Some(version) if !req.matches(version) => {
                Some(format!("host version {version} does not satisfy {range}"))
            }
            Some(_) => None,
        };
        if let Some(reason) = reason {
            skipped.push(SkippedPhase {
                phase: phase.id().to_string(),
                reason,
            });
        }
    }

    let dropped: HashSet<&str> = skipped.iter().map(|s| s.phase.as_str()).collect();
    Ok((catalog.without_phases(&dropped), skipped))
}
