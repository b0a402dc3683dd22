//! Point-in-time reconstruction: nearest snapshot plus forward delta
//! replay. Matches the indexer's in-memory state after the target commit
//! exactly.

use git_pkgs::{dep_key, ChangeType, Dependency, DependencyState};

use crate::error::PkgsError;
use crate::git::GitReader;
use crate::parsers::ParserRegistry;
use crate::store::{BranchRow, ReplayChange, Store};

pub struct Reconstructor<'a> {
    store: &'a Store,
}

impl<'a> Reconstructor<'a> {
    pub fn new(store: &'a Store) -> Self {
        Self { store }
    }

    /// Dependency set at `(branch, commit)`, sorted by `(path, name)` for
    /// stable output.
    pub fn at_commit(&self, branch: &BranchRow, hash: &str) -> Result<Vec<Dependency>, PkgsError> {
        let state = self.state_at(branch, hash)?;
        Ok(sorted(state))
    }

    /// Rolling-state form: exactly what the indexer held right after
    /// processing the commit.
    pub fn state_at(&self, branch: &BranchRow, hash: &str) -> Result<DependencyState, PkgsError> {
        let commit = self.store.commit_by_hash(hash)?.ok_or_else(|| {
            PkgsError::CommitNotIndexed { hash: hash.to_string(), branch: branch.name.clone() }
        })?;
        let position = self.store.position_of(branch.id, commit.id)?.ok_or_else(|| {
            PkgsError::CommitNotIndexed { hash: hash.to_string(), branch: branch.name.clone() }
        })?;

        let mut state = DependencyState::new();
        let after = match self.store.nearest_snapshot(branch.id, commit.committed_at, position)? {
            Some((snapshot_commit, at, pos)) => {
                for dep in self.store.snapshot_dependencies(snapshot_commit)? {
                    state.insert(dep_key(&dep), dep);
                }
                Some((at, pos))
            }
            None => None,
        };

        for change in
            self.store.changes_in_range(branch.id, after, (commit.committed_at, position))?
        {
            apply_change(&mut state, change);
        }
        Ok(state)
    }
}

/// Fold one delta-log row into a state map.
pub fn apply_change(state: &mut DependencyState, change: ReplayChange) {
    let key = (change.manifest_path.clone(), change.name.clone());
    match change.change_type {
        ChangeType::Added | ChangeType::Modified => {
            state.insert(
                key,
                Dependency {
                    manifest_path: change.manifest_path,
                    name: change.name,
                    ecosystem: change.ecosystem,
                    kind: change.kind,
                    purl: change.purl,
                    requirement: change.requirement,
                    dependency_type: change.dependency_type,
                },
            );
        }
        ChangeType::Removed => {
            state.remove(&key);
        }
    }
}

/// Stateless mode: no store, so list and parse the tree at the commit
/// directly. Delta-derived data (`previous_requirement`) is unavailable
/// here by construction.
pub fn stateless(
    reader: &dyn GitReader,
    registry: &ParserRegistry,
    hash: &str,
) -> Result<Vec<Dependency>, PkgsError> {
    Ok(sorted(stateless_state(reader, registry, hash)?))
}

/// State-map form of the stateless path (seeds `init --from`).
pub fn stateless_state(
    reader: &dyn GitReader,
    registry: &ParserRegistry,
    hash: &str,
) -> Result<DependencyState, PkgsError> {
    let mut state = DependencyState::new();
    for path in reader.tree_paths(hash)? {
        if !registry.recognize(&path) {
            continue;
        }
        let Some(bytes) = reader.blob_at(hash, &path)? else { continue };
        let Some(output) = registry.parse(&path, &bytes) else { continue };
        for parsed in output.dependencies {
            let dep = Dependency {
                manifest_path: path.clone(),
                purl: git_pkgs::build_purl(
                    output.ecosystem,
                    &parsed.name,
                    output.kind,
                    &parsed.requirement,
                ),
                name: parsed.name,
                ecosystem: output.ecosystem.to_string(),
                kind: output.kind,
                requirement: parsed.requirement,
                dependency_type: parsed.dependency_type,
            };
            state.entry(dep_key(&dep)).or_insert(dep);
        }
    }
    Ok(state)
}

fn sorted(state: DependencyState) -> Vec<Dependency> {
    let mut deps: Vec<Dependency> = state.into_values().collect();
    deps.sort_by(|a, b| {
        (a.manifest_path.as_str(), a.name.as_str()).cmp(&(b.manifest_path.as_str(), b.name.as_str()))
    });
    deps
}

// ─── Tests ───────────────────────────────────────────────────────────
//
// End-to-end reconstruction (against real repositories and a real indexer
// run) lives in indexer_tests.rs; here only the fold rules.

#[cfg(test)]
mod tests {
    use super::*;
    use git_pkgs::ManifestKind;

    fn replay(name: &str, ct: ChangeType, requirement: &str) -> ReplayChange {
        ReplayChange {
            manifest_path: "Gemfile".into(),
            name: name.into(),
            ecosystem: "rubygems".into(),
            kind: ManifestKind::Manifest,
            purl: format!("pkg:gem/{}", name),
            change_type: ct,
            requirement: requirement.into(),
            dependency_type: "runtime".into(),
        }
    }

    #[test]
    fn test_apply_added_then_modified_then_removed() {
        let mut state = DependencyState::new();

        apply_change(&mut state, replay("rails", ChangeType::Added, "~> 7.0"));
        assert_eq!(state.len(), 1);
        assert_eq!(state[&("Gemfile".to_string(), "rails".to_string())].requirement, "~> 7.0");

        apply_change(&mut state, replay("rails", ChangeType::Modified, "~> 7.1"));
        assert_eq!(state.len(), 1);
        assert_eq!(state[&("Gemfile".to_string(), "rails".to_string())].requirement, "~> 7.1");

        apply_change(&mut state, replay("rails", ChangeType::Removed, "~> 7.1"));
        assert!(state.is_empty());
    }

    #[test]
    fn test_removal_of_absent_key_is_noop() {
        let mut state = DependencyState::new();
        apply_change(&mut state, replay("rails", ChangeType::Removed, ">= 0"));
        assert!(state.is_empty());
    }
}
