//! # git-pkgs — dependency history engine
//!
//! Indexes how a repository's package dependencies evolve across its git
//! history and answers time-travel queries ("what depended on X at commit
//! C?") by replaying a delta log forward from periodic snapshots.
//!
//! ## Library usage
//!
//! This crate is primarily a CLI tool. The core value types and the pure
//! purl/ecosystem helpers live in the library crate so they can be shared
//! with integration tests and downstream tooling.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

// ─── Core value types ────────────────────────────────────────────────

/// Whether a tracked file is a human-authored manifest or a machine-generated
/// lockfile. Lockfiles carry pinned versions; manifests carry constraints.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ManifestKind {
    Manifest,
    Lockfile,
}

impl ManifestKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ManifestKind::Manifest => "manifest",
            ManifestKind::Lockfile => "lockfile",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "manifest" => Some(ManifestKind::Manifest),
            "lockfile" => Some(ManifestKind::Lockfile),
            _ => None,
        }
    }
}

/// Kind of mutation recorded in the delta log.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
    Added,
    Modified,
    Removed,
}

impl ChangeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeType::Added => "added",
            ChangeType::Modified => "modified",
            ChangeType::Removed => "removed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "added" => Some(ChangeType::Added),
            "modified" => Some(ChangeType::Modified),
            "removed" => Some(ChangeType::Removed),
            _ => None,
        }
    }
}

/// A single dependency as carried in memory during analysis and
/// reconstruction. Identity within a commit is `(manifest_path, name)`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependency {
    pub manifest_path: String,
    pub name: String,
    pub ecosystem: String,
    pub kind: ManifestKind,
    pub purl: String,
    /// Constraint (manifest) or pinned version (lockfile), byte-exact as the
    /// parser normalized it.
    pub requirement: String,
    /// Free-form: "runtime", "development", "build", "indirect", ...
    pub dependency_type: String,
}

/// Composite key for the rolling state map: `(manifest_path, name)`.
pub type DepKey = (String, String);

/// The in-memory rolling snapshot during indexing: after processing commit C
/// it equals the set reconstructible by replaying all deltas up to C.
pub type DependencyState = HashMap<DepKey, Dependency>;

/// Key a dependency for the state map.
pub fn dep_key(dep: &Dependency) -> DepKey {
    (dep.manifest_path.clone(), dep.name.clone())
}

// ─── Ecosystem name spaces ──────────────────────────────────────────
//
// Three namespaces exist: internal lowercase (used everywhere in this
// crate), purl types, and OSV-style mixed case. One static table drives
// all conversions.

/// (internal, purl type, OSV name)
const ECOSYSTEMS: &[(&str, &str, &str)] = &[
    ("rubygems", "gem", "RubyGems"),
    ("npm", "npm", "npm"),
    ("pypi", "pypi", "PyPI"),
    ("cargo", "cargo", "crates.io"),
    ("go", "golang", "Go"),
    ("packagist", "composer", "Packagist"),
    ("maven", "maven", "Maven"),
    ("nuget", "nuget", "NuGet"),
    ("hex", "hex", "Hex"),
];

/// Purl type for an internal ecosystem name, if the ecosystem is known.
pub fn purl_type(ecosystem: &str) -> Option<&'static str> {
    ECOSYSTEMS.iter().find(|(i, _, _)| *i == ecosystem).map(|(_, p, _)| *p)
}

/// OSV-style name for an internal ecosystem name.
pub fn osv_ecosystem(ecosystem: &str) -> Option<&'static str> {
    ECOSYSTEMS.iter().find(|(i, _, _)| *i == ecosystem).map(|(_, _, o)| *o)
}

/// Internal lowercase name for an OSV-style ecosystem name.
pub fn ecosystem_from_osv(osv: &str) -> Option<&'static str> {
    ECOSYSTEMS.iter().find(|(_, _, o)| *o == osv).map(|(i, _, _)| *i)
}

/// All internal ecosystem names with a purl mapping.
pub fn known_ecosystems() -> impl Iterator<Item = &'static str> {
    ECOSYSTEMS.iter().map(|(i, _, _)| *i)
}

// ─── Purl derivation ────────────────────────────────────────────────

/// Build a canonical package URL: `pkg:<type>/<name>[@<version>]`.
///
/// The version suffix is included only for lockfile-sourced dependencies;
/// manifests contribute constraints, not pinned versions. Ecosystems
/// outside the static table fall back to their internal name as the type.
///
/// # Examples
///
/// ```
/// use git_pkgs::{build_purl, ManifestKind};
///
/// assert_eq!(build_purl("rubygems", "rails", ManifestKind::Manifest, "~> 7.0"),
///            "pkg:gem/rails");
/// assert_eq!(build_purl("rubygems", "rails", ManifestKind::Lockfile, "7.0.4"),
///            "pkg:gem/rails@7.0.4");
/// ```
pub fn build_purl(ecosystem: &str, name: &str, kind: ManifestKind, requirement: &str) -> String {
    let ptype = purl_type(ecosystem).unwrap_or(ecosystem);
    match kind {
        ManifestKind::Lockfile if !requirement.is_empty() => {
            format!("pkg:{}/{}@{}", ptype, name, requirement)
        }
        _ => format!("pkg:{}/{}", ptype, name),
    }
}

// ─── Tests ───────────────────────────────────────────────────────────


// ─── Property-based tests (proptest) ─────────────────────────────────
