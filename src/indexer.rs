//! The indexing pipeline: walk a branch's first-parent history, analyze
//! each commit against the rolling state, buffer rows, and flush them in
//! bounded transactional batches.
//!
//! Snapshot cadence: full-state snapshot rows every `snapshot_interval`
//! dependency-changing commits, plus — unconditionally — at the last
//! processed commit, so the tip of every indexed branch reconstructs from
//! at most one snapshot load.
//!
//! Merge commits are recorded (commit row + branch link) but never
//! analyzed; a dependency introduced only on a merged side branch becomes
//! visible to reconstruction only when a later first-parent commit touches
//! the manifest.

use tracing::{debug, info};

use git_pkgs::DependencyState;

use crate::analyzer::DependencyAnalyzer;
use crate::config::Config;
use crate::error::PkgsError;
use crate::git::GitReader;
use crate::parsers::ParserRegistry;
use crate::reconstruct::{self, Reconstructor};
use crate::store::{BranchRow, PendingCommit, Store};

/// Counters reported back to the CLI after a run.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IndexOutcome {
    pub branch: String,
    pub commits: usize,
    pub dep_commits: usize,
    pub changes: usize,
    pub snapshots: usize,
}

pub struct Indexer<'a> {
    reader: &'a dyn GitReader,
    registry: &'a ParserRegistry,
    config: &'a Config,
}

impl<'a> Indexer<'a> {
    pub fn new(reader: &'a dyn GitReader, registry: &'a ParserRegistry, config: &'a Config) -> Self {
        Self { reader, registry, config }
    }

    /// Full index of a branch, optionally starting after `from` (any
    /// ref-ish). The store may already hold other branches; shared commits
    /// are deduplicated by hash. Runs in relaxed-durability bulk mode.
    pub fn init(
        &self,
        store: &mut Store,
        branch_name: &str,
        from: Option<&str>,
    ) -> Result<IndexOutcome, PkgsError> {
        if !self.reader.branch_exists(branch_name)? {
            return Err(PkgsError::BranchNotFound(branch_name.to_string()));
        }
        let branch = store.create_branch(branch_name)?;
        if branch.last_indexed_commit_id.is_some() {
            return Err(PkgsError::StoreConflict(format!(
                "branch '{}' is already indexed; run 'git-pkgs update' or 'git-pkgs init --force'",
                branch_name
            )));
        }

        // `--from` seeds the state with the dependency set at that commit
        // (parsed directly from its tree) and forces a snapshot at the
        // first processed commit so replay never has to cross the gap.
        let (since, state, seed_snapshot) = match from {
            Some(refish) => {
                let hash = self
                    .reader
                    .resolve_ref(refish)?
                    .ok_or_else(|| PkgsError::RefUnresolvable(refish.to_string()))?;
                let state = reconstruct::stateless_state(self.reader, self.registry, &hash)?;
                (Some(hash), state, true)
            }
            None => (None, DependencyState::new(), false),
        };

        store.begin_bulk()?;
        let result = self.run(store, &branch, since.as_deref(), state, seed_snapshot, 0);
        store.end_bulk()?;
        result
    }

    /// Incremental index from the branch cursor. Idempotent: a branch that
    /// is already at its tip writes nothing.
    pub fn update(&self, store: &mut Store, branch_name: &str) -> Result<IndexOutcome, PkgsError> {
        let branch = store
            .branch_by_name(branch_name)?
            .ok_or_else(|| PkgsError::BranchNotTracked(branch_name.to_string()))?;
        if !self.reader.branch_exists(branch_name)? {
            return Err(PkgsError::BranchNotFound(branch_name.to_string()));
        }

        let (since, state) = match branch.last_indexed_commit_id {
            Some(id) => {
                let cursor = store.commit_by_id(id)?.ok_or_else(|| {
                    PkgsError::CorruptState(format!("branch cursor points at missing commit {}", id))
                })?;
                let state = Reconstructor::new(store).state_at(&branch, &cursor.hash)?;
                (Some(cursor.hash), state)
            }
            None => (None, DependencyState::new()),
        };

        // Resume protocol: keep the snapshot cadence aligned with an
        // uninterrupted run by counting dep-changing commits since the last
        // stored snapshot.
        let dep_commits_seen = store.dep_commits_since_snapshot(branch.id)? as usize;
        self.run(store, &branch, since.as_deref(), state, false, dep_commits_seen)
    }

    fn run(
        &self,
        store: &mut Store,
        branch: &BranchRow,
        since: Option<&str>,
        mut state: DependencyState,
        mut force_snapshot: bool,
        dep_commits_seen: usize,
    ) -> Result<IndexOutcome, PkgsError> {
        let analyzer = DependencyAnalyzer::new(self.reader, self.registry);
        let batch_size = self.config.batch_size();
        let snapshot_interval = self.config.snapshot_interval();

        let mut outcome = IndexOutcome { branch: branch.name.clone(), ..IndexOutcome::default() };
        let mut position = store.next_position(branch.id)?;
        let mut pending: Vec<PendingCommit> = Vec::new();
        let mut dep_counter = dep_commits_seen;
        // Tip tracking for the unconditional final snapshot: hash of the
        // last processed commit and whether its snapshot already exists.
        let mut tip: Option<(String, bool)> = None;

        for item in self.reader.walk(&branch.name, since)? {
            let commit = item?;
            let delta = analyzer.analyze(&commit, &mut state)?;

            let mut snapshot = None;
            if !delta.is_empty() {
                outcome.dep_commits += 1;
                dep_counter += 1;
                if dep_counter % snapshot_interval == 0 {
                    snapshot = Some(state.values().cloned().collect());
                }
            }
            if force_snapshot {
                snapshot.get_or_insert_with(|| state.values().cloned().collect());
                force_snapshot = false;
            }
            if snapshot.is_some() {
                outcome.snapshots += 1;
            }

            outcome.commits += 1;
            outcome.changes += delta.len();
            tip = Some((commit.hash.clone(), snapshot.is_some()));
            pending.push(PendingCommit { commit, changes: delta, snapshot });

            if pending.len() >= batch_size {
                position = store.flush(branch.id, position, &pending)?;
                pending.clear();
                debug!(branch = %branch.name, commits = outcome.commits, "batch flushed");
            }
        }

        // Coverage invariant: the tip always carries a snapshot.
        if let Some(last) = pending.last_mut() {
            if last.snapshot.is_none() {
                last.snapshot = Some(state.values().cloned().collect());
                outcome.snapshots += 1;
            }
        }
        if !pending.is_empty() {
            store.flush(branch.id, position, &pending)?;
        } else if let Some((tip_hash, has_snapshot)) = &tip {
            // The tip landed exactly on a batch boundary and is already
            // flushed; materialize its snapshot separately.
            if !has_snapshot {
                let row = store.commit_by_hash(tip_hash)?.ok_or_else(|| {
                    PkgsError::CorruptState(format!("flushed commit {} not found", tip_hash))
                })?;
                if !store.has_snapshot(row.id)? {
                    let deps: Vec<_> = state.values().cloned().collect();
                    store.write_snapshot(row.id, &deps)?;
                    outcome.snapshots += 1;
                }
            }
        }

        if outcome.commits > 0 {
            info!(
                branch = %branch.name,
                commits = outcome.commits,
                dep_commits = outcome.dep_commits,
                changes = outcome.changes,
                "indexed"
            );
        } else {
            debug!(branch = %branch.name, "branch already up to date");
        }
        Ok(outcome)
    }
}

// ─── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
#[path = "indexer_tests.rs"]
mod tests;
