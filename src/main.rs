//! Dependency history engine for git repositories.
//!
//! Binary crate entry point. All CLI logic is in the `cli` module; the
//! engine modules are declared here.

// Re-export core types from the library crate
pub use git_pkgs::{build_purl, ChangeType, Dependency, DependencyState, ManifestKind};

mod analyzer;
mod branches;
mod cli;
mod config;
mod error;
mod git;
mod indexer;
mod parsers;
mod reconstruct;
mod store;

pub use error::PkgsError;

#[cfg(test)]
mod testutil;

fn main() {
    cli::run();
}
