//! Git access layer: the narrow read-only `GitReader` seam the engine is
//! written against, plus its libgit2 implementation.
//!
//! Everything here is read-only. The walk is first-parent simplified and
//! yields commits oldest-first so the indexer can stream state forward.

use std::path::Path;

use git2::{BranchType, Delta, ObjectType, Oid, Repository, Sort, TreeWalkMode, TreeWalkResult};

use crate::error::PkgsError;

// ─── Types ──────────────────────────────────────────────────────────

/// Commit metadata as carried through the pipeline.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommitRef {
    /// 40-char content hash.
    pub hash: String,
    pub message: String,
    pub author_name: String,
    pub author_email: String,
    /// Commit timestamp, seconds since epoch.
    pub committed_at: i64,
    pub parent_count: usize,
}

impl CommitRef {
    pub fn is_merge(&self) -> bool {
        self.parent_count > 1
    }

    pub fn short_hash(&self) -> &str {
        &self.hash[..self.hash.len().min(8)]
    }
}

/// Status of one path in a commit's diff against its first parent.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChangeStatus {
    Added,
    Modified,
    Removed,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChangedPath {
    pub status: ChangeStatus,
    pub path: String,
}

/// Lazy commit stream; the walker never materializes the full history.
pub type CommitIter<'a> = Box<dyn Iterator<Item = Result<CommitRef, PkgsError>> + 'a>;

// ─── Reader seam ────────────────────────────────────────────────────

/// Read-only git operations the engine needs. One implementation wraps
/// libgit2; tests substitute scripted fakes.
pub trait GitReader {
    /// Resolve any ref-ish string to a commit hash, `None` when it does not
    /// resolve.
    fn resolve_ref(&self, name: &str) -> Result<Option<String>, PkgsError>;

    /// Repository default branch: remote HEAD pointer, else the checked-out
    /// branch, else a probe of common names.
    fn default_branch(&self) -> Result<String, PkgsError>;

    fn branch_exists(&self, name: &str) -> Result<bool, PkgsError>;

    fn branch_tip(&self, name: &str) -> Result<String, PkgsError>;

    fn commit_info(&self, hash: &str) -> Result<CommitRef, PkgsError>;

    /// Parent commits of a commit, first parent first; empty for a root
    /// commit.
    fn parents(&self, hash: &str) -> Result<Vec<CommitRef>, PkgsError>;

    /// Walk a branch's first-parent history in topological +
    /// reverse-chronological order, oldest first, excluding everything
    /// reachable from `since` when given.
    fn walk<'a>(&'a self, branch: &str, since: Option<&str>) -> Result<CommitIter<'a>, PkgsError>;

    /// Paths changed versus the first parent, or the full tree listing for
    /// a parentless commit.
    fn changed_paths(&self, hash: &str) -> Result<Vec<ChangedPath>, PkgsError>;

    /// Blob contents at `path` in the commit's tree; `None` when absent.
    fn blob_at(&self, hash: &str, path: &str) -> Result<Option<Vec<u8>>, PkgsError>;

    /// Blob contents at `path` in the first parent's tree; `None` when
    /// absent or parentless.
    fn blob_before(&self, hash: &str, path: &str) -> Result<Option<Vec<u8>>, PkgsError>;

    /// All blob paths in the commit's tree (stateless reconstruction).
    fn tree_paths(&self, hash: &str) -> Result<Vec<String>, PkgsError>;
}

// ─── libgit2 implementation ─────────────────────────────────────────

pub struct Git2Reader {
    repo: Repository,
}

impl Git2Reader {
    /// Discover the repository at or above `path`.
    pub fn open(path: &Path) -> Result<Self, PkgsError> {
        match Repository::discover(path) {
            Ok(repo) => Ok(Self { repo }),
            Err(e) if e.code() == git2::ErrorCode::NotFound => Err(PkgsError::NotInRepository),
            Err(e) => Err(e.into()),
        }
    }

    pub fn git_dir(&self) -> &Path {
        self.repo.path()
    }

    pub fn repo(&self) -> &Repository {
        &self.repo
    }

    fn find_commit(&self, hash: &str) -> Result<git2::Commit<'_>, PkgsError> {
        let oid = Oid::from_str(hash).map_err(|_| PkgsError::RefUnresolvable(hash.to_string()))?;
        self.repo
            .find_commit(oid)
            .map_err(|_| PkgsError::RefUnresolvable(hash.to_string()))
    }

    fn commit_ref(commit: &git2::Commit<'_>) -> CommitRef {
        CommitRef {
            hash: commit.id().to_string(),
            message: commit.message().unwrap_or("").to_string(),
            author_name: commit.author().name().unwrap_or("").to_string(),
            author_email: commit.author().email().unwrap_or("").to_string(),
            committed_at: commit.time().seconds(),
            parent_count: commit.parent_count(),
        }
    }

    fn tree_blob(
        &self,
        tree: &git2::Tree<'_>,
        path: &str,
    ) -> Result<Option<Vec<u8>>, PkgsError> {
        let entry = match tree.get_path(Path::new(path)) {
            Ok(entry) => entry,
            Err(e) if e.code() == git2::ErrorCode::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let object = entry.to_object(&self.repo)?;
        Ok(object.as_blob().map(|b| b.content().to_vec()))
    }
}

impl GitReader for Git2Reader {
    fn resolve_ref(&self, name: &str) -> Result<Option<String>, PkgsError> {
        match self.repo.revparse_single(name) {
            Ok(object) => match object.peel_to_commit() {
                Ok(commit) => Ok(Some(commit.id().to_string())),
                Err(_) => Ok(None),
            },
            Err(e) if e.code() == git2::ErrorCode::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn default_branch(&self) -> Result<String, PkgsError> {
        // Prefer the remote HEAD pointer.
        if let Ok(reference) = self.repo.find_reference("refs/remotes/origin/HEAD") {
            if let Some(target) = reference.symbolic_target() {
                if let Some(name) = target.strip_prefix("refs/remotes/origin/") {
                    return Ok(name.to_string());
                }
            }
        }
        // Then the checked-out branch.
        if let Ok(head) = self.repo.head() {
            if head.is_branch() {
                if let Some(name) = head.shorthand() {
                    return Ok(name.to_string());
                }
            }
        }
        // Last resort: probe common names.
        for name in ["main", "master", "trunk", "develop"] {
            if self.branch_exists(name)? {
                return Ok(name.to_string());
            }
        }
        Err(PkgsError::RefUnresolvable("HEAD".to_string()))
    }

    fn branch_exists(&self, name: &str) -> Result<bool, PkgsError> {
        Ok(self.repo.find_branch(name, BranchType::Local).is_ok())
    }

    fn branch_tip(&self, name: &str) -> Result<String, PkgsError> {
        let branch = self
            .repo
            .find_branch(name, BranchType::Local)
            .map_err(|_| PkgsError::BranchNotFound(name.to_string()))?;
        let commit = branch.get().peel_to_commit()?;
        Ok(commit.id().to_string())
    }

    fn commit_info(&self, hash: &str) -> Result<CommitRef, PkgsError> {
        Ok(Self::commit_ref(&self.find_commit(hash)?))
    }

    fn parents(&self, hash: &str) -> Result<Vec<CommitRef>, PkgsError> {
        let commit = self.find_commit(hash)?;
        Ok(commit.parents().map(|p| Self::commit_ref(&p)).collect())
    }

    fn walk<'a>(&'a self, branch: &str, since: Option<&str>) -> Result<CommitIter<'a>, PkgsError> {
        let tip = self.branch_tip(branch)?;
        let mut revwalk = self.repo.revwalk()?;
        revwalk.push(Oid::from_str(&tip)?)?;
        if let Some(since) = since {
            let oid =
                Oid::from_str(since).map_err(|_| PkgsError::RefUnresolvable(since.to_string()))?;
            revwalk.hide(oid)?;
        }
        revwalk.set_sorting(Sort::TOPOLOGICAL | Sort::TIME | Sort::REVERSE)?;
        revwalk.simplify_first_parent()?;

        let repo = &self.repo;
        Ok(Box::new(revwalk.map(move |res| {
            let oid = res?;
            let commit = repo.find_commit(oid)?;
            Ok(Self::commit_ref(&commit))
        })))
    }

    fn changed_paths(&self, hash: &str) -> Result<Vec<ChangedPath>, PkgsError> {
        let commit = self.find_commit(hash)?;
        let tree = commit.tree()?;

        if commit.parent_count() == 0 {
            return Ok(self
                .tree_paths(hash)?
                .into_iter()
                .map(|path| ChangedPath { status: ChangeStatus::Added, path })
                .collect());
        }

        let parent_tree = commit.parent(0)?.tree()?;
        let diff = self.repo.diff_tree_to_tree(Some(&parent_tree), Some(&tree), None)?;

        let mut changed = Vec::new();
        for delta in diff.deltas() {
            let status = match delta.status() {
                Delta::Added | Delta::Copied => ChangeStatus::Added,
                Delta::Deleted => ChangeStatus::Removed,
                _ => ChangeStatus::Modified,
            };
            let path = match status {
                ChangeStatus::Removed => delta.old_file().path(),
                _ => delta.new_file().path().or_else(|| delta.old_file().path()),
            };
            if let Some(path) = path {
                changed.push(ChangedPath { status, path: path.to_string_lossy().to_string() });
            }
        }
        Ok(changed)
    }

    fn blob_at(&self, hash: &str, path: &str) -> Result<Option<Vec<u8>>, PkgsError> {
        let commit = self.find_commit(hash)?;
        let tree = commit.tree()?;
        self.tree_blob(&tree, path)
    }

    fn blob_before(&self, hash: &str, path: &str) -> Result<Option<Vec<u8>>, PkgsError> {
        let commit = self.find_commit(hash)?;
        if commit.parent_count() == 0 {
            return Ok(None);
        }
        let tree = commit.parent(0)?.tree()?;
        self.tree_blob(&tree, path)
    }

    fn tree_paths(&self, hash: &str) -> Result<Vec<String>, PkgsError> {
        let commit = self.find_commit(hash)?;
        let tree = commit.tree()?;
        let mut paths = Vec::new();
        tree.walk(TreeWalkMode::PreOrder, |dir, entry| {
            if matches!(entry.kind(), Some(ObjectType::Blob)) {
                if let Some(name) = entry.name() {
                    paths.push(format!("{}{}", dir, name));
                }
            }
            TreeWalkResult::Ok
        })?;
        Ok(paths)
    }
}

// ─── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
#[path = "git_tests.rs"]
mod tests;
