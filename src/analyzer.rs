//! Per-commit dependency analysis: turn one commit plus the rolling
//! dependency state into a delta, updating the state in place.
//!
//! Parser rejections and missing blobs are recovered here (they demote to
//! "no dependencies from this path"); git errors propagate.

use std::collections::HashMap;

use tracing::warn;

use git_pkgs::{build_purl, ChangeType, Dependency, DependencyState};

use crate::error::PkgsError;
use crate::git::{ChangeStatus, CommitRef, GitReader};
use crate::parsers::ParserRegistry;
use crate::store::PendingChange;

pub struct DependencyAnalyzer<'a> {
    reader: &'a dyn GitReader,
    registry: &'a ParserRegistry,
}

impl<'a> DependencyAnalyzer<'a> {
    pub fn new(reader: &'a dyn GitReader, registry: &'a ParserRegistry) -> Self {
        Self { reader, registry }
    }

    /// Compute the commit's delta and fold it into `state`. Merge commits
    /// contribute nothing and leave the state untouched.
    ///
    /// Deterministic: for the same `(commit, state, parsers)` the emitted
    /// delta is identical, including order.
    pub fn analyze(
        &self,
        commit: &CommitRef,
        state: &mut DependencyState,
    ) -> Result<Vec<PendingChange>, PkgsError> {
        if commit.is_merge() {
            return Ok(Vec::new());
        }

        let mut delta = Vec::new();
        for changed in self.reader.changed_paths(&commit.hash)? {
            if !self.registry.recognize(&changed.path) {
                continue;
            }

            let current = match changed.status {
                ChangeStatus::Removed => Vec::new(),
                _ => match self.reader.blob_at(&commit.hash, &changed.path)? {
                    Some(bytes) => self.parse_path(&changed.path, &bytes),
                    None => {
                        warn!(
                            commit = %commit.short_hash(),
                            path = %changed.path,
                            "changed blob missing from object db, treating as removed"
                        );
                        Vec::new()
                    }
                },
            };

            self.diff_path(&changed.path, current, state, &mut delta);
        }
        Ok(delta)
    }

    /// Parse a blob into fully-formed dependencies. A rejected parse yields
    /// an empty set, which reads as "everything previously observed under
    /// this path is gone".
    fn parse_path(&self, path: &str, bytes: &[u8]) -> Vec<Dependency> {
        let Some(output) = self.registry.parse(path, bytes) else {
            return Vec::new();
        };
        output
            .dependencies
            .into_iter()
            .map(|parsed| Dependency {
                manifest_path: path.to_string(),
                purl: build_purl(output.ecosystem, &parsed.name, output.kind, &parsed.requirement),
                name: parsed.name,
                ecosystem: output.ecosystem.to_string(),
                kind: output.kind,
                requirement: parsed.requirement,
                dependency_type: parsed.dependency_type,
            })
            .collect()
    }

    /// Diff one touched path: additions and modifications in parser output
    /// order, then removals in name order.
    fn diff_path(
        &self,
        path: &str,
        current: Vec<Dependency>,
        state: &mut DependencyState,
        delta: &mut Vec<PendingChange>,
    ) {
        let previous: HashMap<String, Dependency> = state
            .iter()
            .filter(|((p, _), _)| p == path)
            .map(|((_, name), dep)| (name.clone(), dep.clone()))
            .collect();

        let mut seen = std::collections::HashSet::new();
        for dep in current {
            if !seen.insert(dep.name.clone()) {
                continue;
            }
            match previous.get(&dep.name) {
                None => {
                    delta.push(pending(&dep, ChangeType::Added, None));
                    state.insert((path.to_string(), dep.name.clone()), dep);
                }
                Some(prev) => {
                    let differs = prev.requirement != dep.requirement
                        || prev.dependency_type != dep.dependency_type
                        || prev.ecosystem != dep.ecosystem
                        || prev.purl != dep.purl;
                    if differs {
                        delta.push(pending(
                            &dep,
                            ChangeType::Modified,
                            Some(prev.requirement.clone()),
                        ));
                        state.insert((path.to_string(), dep.name.clone()), dep);
                    }
                }
            }
        }

        let mut removed: Vec<&Dependency> =
            previous.values().filter(|d| !seen.contains(&d.name)).collect();
        removed.sort_by(|a, b| a.name.cmp(&b.name));
        for dep in removed {
            delta.push(pending(dep, ChangeType::Removed, None));
            state.remove(&(path.to_string(), dep.name.clone()));
        }
    }
}

fn pending(dep: &Dependency, change_type: ChangeType, previous: Option<String>) -> PendingChange {
    PendingChange {
        manifest_path: dep.manifest_path.clone(),
        ecosystem: dep.ecosystem.clone(),
        kind: dep.kind,
        name: dep.name.clone(),
        purl: dep.purl.clone(),
        change_type,
        // On removal this is the last-seen value.
        requirement: dep.requirement.clone(),
        previous_requirement: previous,
        dependency_type: dep.dependency_type.clone(),
    }
}

// ─── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::git::{ChangedPath, CommitIter};
    use git_pkgs::ManifestKind;

    /// Scripted reader: one virtual commit with fixed changed paths and
    /// blob contents.
    struct FakeReader {
        commit: CommitRef,
        changed: Vec<ChangedPath>,
        blobs: HashMap<String, Vec<u8>>,
    }

    impl FakeReader {
        fn new(parent_count: usize, changed: Vec<(ChangeStatus, &str)>, blobs: Vec<(&str, &[u8])>) -> Self {
            Self {
                commit: CommitRef {
                    hash: "f".repeat(40),
                    message: "test".into(),
                    author_name: "t".into(),
                    author_email: "t@example.com".into(),
                    committed_at: 100,
                    parent_count,
                },
                changed: changed
                    .into_iter()
                    .map(|(status, path)| ChangedPath { status, path: path.to_string() })
                    .collect(),
                blobs: blobs.into_iter().map(|(p, b)| (p.to_string(), b.to_vec())).collect(),
            }
        }
    }

    impl GitReader for FakeReader {
        fn resolve_ref(&self, _: &str) -> Result<Option<String>, PkgsError> {
            Ok(None)
        }
        fn default_branch(&self) -> Result<String, PkgsError> {
            Ok("main".into())
        }
        fn branch_exists(&self, _: &str) -> Result<bool, PkgsError> {
            Ok(false)
        }
        fn branch_tip(&self, name: &str) -> Result<String, PkgsError> {
            Err(PkgsError::BranchNotFound(name.to_string()))
        }
        fn commit_info(&self, _: &str) -> Result<CommitRef, PkgsError> {
            Ok(self.commit.clone())
        }
        fn parents(&self, _: &str) -> Result<Vec<CommitRef>, PkgsError> {
            Ok(Vec::new())
        }
        fn walk<'b>(&'b self, _: &str, _: Option<&str>) -> Result<CommitIter<'b>, PkgsError> {
            Ok(Box::new(std::iter::once(Ok(self.commit.clone()))))
        }
        fn changed_paths(&self, _: &str) -> Result<Vec<ChangedPath>, PkgsError> {
            Ok(self.changed.clone())
        }
        fn blob_at(&self, _: &str, path: &str) -> Result<Option<Vec<u8>>, PkgsError> {
            Ok(self.blobs.get(path).cloned())
        }
        fn blob_before(&self, _: &str, _: &str) -> Result<Option<Vec<u8>>, PkgsError> {
            Ok(None)
        }
        fn tree_paths(&self, _: &str) -> Result<Vec<String>, PkgsError> {
            Ok(self.blobs.keys().cloned().collect())
        }
    }

    fn registry() -> ParserRegistry {
        ParserRegistry::new(&Config::default())
    }

    fn analyze(reader: &FakeReader, state: &mut DependencyState) -> Vec<PendingChange> {
        let registry = registry();
        DependencyAnalyzer::new(reader, &registry).analyze(&reader.commit, state).unwrap()
    }

    #[test]
    fn test_initial_add_emits_added_only() {
        let reader = FakeReader::new(
            0,
            vec![(ChangeStatus::Added, "Gemfile")],
            vec![("Gemfile", b"gem \"rails\", \"~> 7.0\"\n")],
        );
        let mut state = DependencyState::new();
        let delta = analyze(&reader, &mut state);

        assert_eq!(delta.len(), 1);
        assert_eq!(delta[0].change_type, ChangeType::Added);
        assert_eq!(delta[0].name, "rails");
        assert_eq!(delta[0].requirement, "~> 7.0");
        assert_eq!(delta[0].previous_requirement, None);
        assert_eq!(delta[0].purl, "pkg:gem/rails");
        assert_eq!(state.len(), 1);
    }

    #[test]
    fn test_modify_carries_previous_requirement() {
        let reader = FakeReader::new(
            1,
            vec![(ChangeStatus::Modified, "Gemfile")],
            vec![("Gemfile", b"gem \"rails\", \"~> 7.1\"\n")],
        );
        let mut state = DependencyState::new();
        state.insert(
            ("Gemfile".into(), "rails".into()),
            Dependency {
                manifest_path: "Gemfile".into(),
                name: "rails".into(),
                ecosystem: "rubygems".into(),
                kind: ManifestKind::Manifest,
                purl: "pkg:gem/rails".into(),
                requirement: "~> 7.0".into(),
                dependency_type: "runtime".into(),
            },
        );

        let delta = analyze(&reader, &mut state);
        assert_eq!(delta.len(), 1);
        assert_eq!(delta[0].change_type, ChangeType::Modified);
        assert_eq!(delta[0].requirement, "~> 7.1");
        assert_eq!(delta[0].previous_requirement.as_deref(), Some("~> 7.0"));
        assert_eq!(state[&("Gemfile".to_string(), "rails".to_string())].requirement, "~> 7.1");
    }

    #[test]
    fn test_unchanged_requirement_emits_nothing() {
        let reader = FakeReader::new(
            1,
            vec![(ChangeStatus::Modified, "Gemfile")],
            vec![("Gemfile", b"gem \"rails\", \"~> 7.0\"\n")],
        );
        let mut state = DependencyState::new();
        state.insert(
            ("Gemfile".into(), "rails".into()),
            Dependency {
                manifest_path: "Gemfile".into(),
                name: "rails".into(),
                ecosystem: "rubygems".into(),
                kind: ManifestKind::Manifest,
                purl: "pkg:gem/rails".into(),
                requirement: "~> 7.0".into(),
                dependency_type: "runtime".into(),
            },
        );
        let delta = analyze(&reader, &mut state);
        assert!(delta.is_empty());
        assert_eq!(state.len(), 1);
    }

    #[test]
    fn test_removed_file_drops_all_previous() {
        let reader = FakeReader::new(1, vec![(ChangeStatus::Removed, "Gemfile")], vec![]);
        let mut state = DependencyState::new();
        for name in ["rails", "rake"] {
            state.insert(
                ("Gemfile".into(), name.into()),
                Dependency {
                    manifest_path: "Gemfile".into(),
                    name: name.into(),
                    ecosystem: "rubygems".into(),
                    kind: ManifestKind::Manifest,
                    purl: format!("pkg:gem/{}", name),
                    requirement: ">= 0".into(),
                    dependency_type: "runtime".into(),
                },
            );
        }

        let delta = analyze(&reader, &mut state);
        assert_eq!(delta.len(), 2);
        assert!(delta.iter().all(|c| c.change_type == ChangeType::Removed));
        // Removals come out in name order.
        assert_eq!(delta[0].name, "rails");
        assert_eq!(delta[1].name, "rake");
        // Last-seen requirement is preserved on the removal row.
        assert_eq!(delta[0].requirement, ">= 0");
        assert!(state.is_empty());
    }

    #[test]
    fn test_parse_reject_reads_as_removal() {
        let reader = FakeReader::new(
            1,
            vec![(ChangeStatus::Modified, "package.json")],
            vec![("package.json", b"{broken json")],
        );
        let mut state = DependencyState::new();
        state.insert(
            ("package.json".into(), "express".into()),
            Dependency {
                manifest_path: "package.json".into(),
                name: "express".into(),
                ecosystem: "npm".into(),
                kind: ManifestKind::Manifest,
                purl: "pkg:npm/express".into(),
                requirement: "^4.0.0".into(),
                dependency_type: "runtime".into(),
            },
        );

        let delta = analyze(&reader, &mut state);
        assert_eq!(delta.len(), 1);
        assert_eq!(delta[0].change_type, ChangeType::Removed);
        assert!(state.is_empty());
    }

    #[test]
    fn test_merge_commit_contributes_nothing() {
        let reader = FakeReader::new(
            2,
            vec![(ChangeStatus::Added, "Gemfile")],
            vec![("Gemfile", b"gem \"rails\"\n")],
        );
        let mut state = DependencyState::new();
        let delta = analyze(&reader, &mut state);
        assert!(delta.is_empty());
        assert!(state.is_empty());
    }

    #[test]
    fn test_rename_is_remove_plus_add() {
        let reader = FakeReader::new(
            1,
            vec![(ChangeStatus::Removed, "Gemfile"), (ChangeStatus::Added, "apps/web/Gemfile")],
            vec![("apps/web/Gemfile", b"gem \"rails\", \"~> 7.0\"\n")],
        );
        let mut state = DependencyState::new();
        state.insert(
            ("Gemfile".into(), "rails".into()),
            Dependency {
                manifest_path: "Gemfile".into(),
                name: "rails".into(),
                ecosystem: "rubygems".into(),
                kind: ManifestKind::Manifest,
                purl: "pkg:gem/rails".into(),
                requirement: "~> 7.0".into(),
                dependency_type: "runtime".into(),
            },
        );

        let delta = analyze(&reader, &mut state);
        assert_eq!(delta.len(), 2);
        let removed = delta.iter().find(|c| c.change_type == ChangeType::Removed).unwrap();
        let added = delta.iter().find(|c| c.change_type == ChangeType::Added).unwrap();
        assert_eq!(removed.manifest_path, "Gemfile");
        assert_eq!(added.manifest_path, "apps/web/Gemfile");
        assert_eq!(state.len(), 1);
    }

    #[test]
    fn test_manifest_and_lockfile_coexist_with_distinct_purls() {
        let reader = FakeReader::new(
            0,
            vec![(ChangeStatus::Added, "Gemfile"), (ChangeStatus::Added, "Gemfile.lock")],
            vec![
                ("Gemfile", b"gem \"rails\", \">= 0\"\n"),
                ("Gemfile.lock", b"GEM\n  specs:\n    rails (7.0.4)\n"),
            ],
        );
        let mut state = DependencyState::new();
        let delta = analyze(&reader, &mut state);

        assert_eq!(delta.len(), 2);
        let manifest = delta.iter().find(|c| c.kind == ManifestKind::Manifest).unwrap();
        let lockfile = delta.iter().find(|c| c.kind == ManifestKind::Lockfile).unwrap();
        assert_eq!(manifest.purl, "pkg:gem/rails");
        assert_eq!(lockfile.purl, "pkg:gem/rails@7.0.4");
        assert_eq!(state.len(), 2);
    }

    #[test]
    fn test_dependency_type_change_is_modified() {
        let reader = FakeReader::new(
            1,
            vec![(ChangeStatus::Modified, "Gemfile")],
            vec![("Gemfile", b"group :development do\n  gem \"rspec\", \"~> 3.0\"\nend\n")],
        );
        let mut state = DependencyState::new();
        state.insert(
            ("Gemfile".into(), "rspec".into()),
            Dependency {
                manifest_path: "Gemfile".into(),
                name: "rspec".into(),
                ecosystem: "rubygems".into(),
                kind: ManifestKind::Manifest,
                purl: "pkg:gem/rspec".into(),
                requirement: "~> 3.0".into(),
                dependency_type: "runtime".into(),
            },
        );

        let delta = analyze(&reader, &mut state);
        assert_eq!(delta.len(), 1);
        assert_eq!(delta[0].change_type, ChangeType::Modified);
        assert_eq!(delta[0].dependency_type, "development");
    }

    #[test]
    fn test_determinism() {
        let reader = FakeReader::new(
            0,
            vec![(ChangeStatus::Added, "Gemfile"), (ChangeStatus::Added, "package.json")],
            vec![
                ("Gemfile", b"gem \"rails\"\ngem \"rake\"\n"),
                ("package.json", br#"{"dependencies": {"a": "1", "b": "2", "c": "3"}}"#),
            ],
        );
        let mut s1 = DependencyState::new();
        let mut s2 = DependencyState::new();
        let d1 = analyze(&reader, &mut s1);
        let d2 = analyze(&reader, &mut s2);
        assert_eq!(d1, d2);
        assert_eq!(s1, s2);
    }
}
