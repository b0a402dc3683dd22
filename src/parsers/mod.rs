//! Manifest/lockfile parsing: the `ManifestParser` capability set and the
//! registry the analyzer queries.
//!
//! Parsers are deterministic, perform no I/O, and answer `None` for
//! malformed content instead of raising. The registry applies the built-in
//! deny list (SBOM summaries, checksum files) and the configured ignore
//! rules before consulting any parser.

pub mod cargo;
pub mod go;
pub mod npm;
pub mod pypi;
pub mod rubygems;

use git_pkgs::ManifestKind;

use crate::config::Config;

// ─── Parser contract ────────────────────────────────────────────────

/// One dependency as read out of a manifest or lockfile.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParsedDependency {
    pub name: String,
    pub requirement: String,
    pub dependency_type: String,
}

impl ParsedDependency {
    pub fn new(name: impl Into<String>, requirement: impl Into<String>, dependency_type: &str) -> Self {
        Self {
            name: name.into(),
            requirement: requirement.into(),
            dependency_type: dependency_type.to_string(),
        }
    }
}

/// Parse result for one recognized file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ManifestOutput {
    pub ecosystem: &'static str,
    pub kind: ManifestKind,
    pub dependencies: Vec<ParsedDependency>,
}

/// One implementation per ecosystem, registered into the registry at
/// startup.
pub trait ManifestParser: Send + Sync {
    /// Internal lowercase ecosystem name.
    fn ecosystem(&self) -> &'static str;

    /// Cheap path-pattern check: could this path belong to me at all?
    fn recognize(&self, path: &str) -> bool;

    /// Full parse. `None` means "not recognized" (including malformed
    /// content); never an error.
    fn parse(&self, path: &str, bytes: &[u8]) -> Option<ManifestOutput>;
}

// ─── Deny list ──────────────────────────────────────────────────────
//
// Files that look like dependency data but must never be indexed:
// checksum companions and SBOM exports.

const DENY_BASENAMES: &[&str] = &["go.sum", "bom.json", "sbom.json"];
const DENY_SUFFIXES: &[&str] = &[".cdx.json", ".spdx.json", ".sha256", ".sha512"];

fn is_denied(path: &str) -> bool {
    let base = file_name(path);
    DENY_BASENAMES.contains(&base) || DENY_SUFFIXES.iter().any(|s| base.ends_with(s))
}

/// Final path component of a repo-relative path.
pub fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

// ─── Registry ───────────────────────────────────────────────────────

/// Startup-built set of parsers, filtered by the `pkgs.ecosystems` allow
/// list, plus the ignore rules from config.
pub struct ParserRegistry {
    config: Config,
    parsers: Vec<Box<dyn ManifestParser>>,
}

impl ParserRegistry {
    pub fn new(config: &Config) -> Self {
        let all: Vec<Box<dyn ManifestParser>> = vec![
            Box::new(rubygems::RubygemsParser),
            Box::new(npm::NpmParser),
            Box::new(cargo::CargoParser),
            Box::new(pypi::PypiParser),
            Box::new(go::GoParser),
        ];
        let parsers = all
            .into_iter()
            .filter(|p| config.ecosystem_enabled(p.ecosystem()))
            .collect();
        Self { config: config.clone(), parsers }
    }

    /// Cheap path-level recognition used for blob-change filtering.
    pub fn recognize(&self, path: &str) -> bool {
        if is_denied(path) || self.config.is_path_ignored(path) {
            return false;
        }
        self.parsers.iter().any(|p| p.recognize(path))
    }

    /// Parse a recognized path. The first parser that recognizes the path
    /// wins; duplicate names within one file keep the first occurrence.
    pub fn parse(&self, path: &str, bytes: &[u8]) -> Option<ManifestOutput> {
        if is_denied(path) || self.config.is_path_ignored(path) {
            return None;
        }
        let parser = self.parsers.iter().find(|p| p.recognize(path))?;
        let mut output = parser.parse(path, bytes)?;
        dedupe_first_wins(&mut output.dependencies);
        Some(output)
    }
}

fn dedupe_first_wins(deps: &mut Vec<ParsedDependency>) {
    let mut seen = std::collections::HashSet::new();
    deps.retain(|d| seen.insert(d.name.clone()));
}

// ─── Tests ───────────────────────────────────────────────────────────
