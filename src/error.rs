//! Unified error type for the dependency history engine.

use thiserror::Error;

/// All errors that can terminate an index or query operation.
///
/// Parser rejections and lazy blob-read misses are recovered inside the
/// analyzer and never surface here.
#[derive(Error, Debug)]
pub enum PkgsError {
    /// No git directory found at or above the working directory
    #[error("not in a git repository (or any parent up to mount point)")]
    NotInRepository,

    /// Query issued before any index was built
    #[error("no dependency index found at '{path}'. Build one first:\n  git-pkgs init")]
    StoreMissing { path: String },

    /// Store schema version differs from what this binary expects
    #[error("store schema version is {found}, expected {expected} (run with a matching version, or rebuild with 'git-pkgs init --force')")]
    SchemaMismatch { found: i64, expected: i64 },

    /// Named branch absent in the repository
    #[error("branch '{0}' not found in this repository")]
    BranchNotFound(String),

    /// Branch is known to the repository but was never registered for tracking
    #[error("branch '{0}' is not tracked. Track it first:\n  git-pkgs branch add {0}")]
    BranchNotTracked(String),

    /// Ref string does not resolve to a commit
    #[error("cannot resolve ref '{0}'")]
    RefUnresolvable(String),

    /// Commit resolves in git but was never indexed on the given branch
    #[error("commit {hash} is not indexed on branch '{branch}'. Bring the index up to date:\n  git-pkgs update")]
    CommitNotIndexed { hash: String, branch: String },

    /// Previously indexed data can no longer be read back consistently
    #[error("corrupt index state: {0}")]
    CorruptState(String),

    /// Unique-constraint violation during a normal (non-resume) insert
    #[error("store conflict: {0}")]
    StoreConflict(String),

    /// Underlying libgit2 failure
    #[error("git error: {0}")]
    Git(#[from] git2::Error),

    /// Underlying SQLite failure
    #[error("store error: {0}")]
    Store(#[from] rusqlite::Error),

    /// I/O error (store file removal, directory access)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_missing_directs_to_init() {
        let err = PkgsError::StoreMissing { path: "/repo/.git/pkgs.sqlite3".into() };
        let msg = err.to_string();
        assert!(msg.contains("/repo/.git/pkgs.sqlite3"));
        assert!(msg.contains("git-pkgs init"));
    }

    #[test]
    fn test_schema_mismatch_display() {
        let err = PkgsError::SchemaMismatch { found: 3, expected: 1 };
        let msg = err.to_string();
        assert!(msg.contains("3"));
        assert!(msg.contains("1"));
    }

    #[test]
    fn test_branch_not_tracked_display() {
        let err = PkgsError::BranchNotTracked("develop".into());
        assert!(err.to_string().contains("branch add develop"));
    }

    #[test]
    fn test_store_error_from_conversion() {
        let sqlite_err = rusqlite::Error::InvalidQuery;
        let err: PkgsError = sqlite_err.into();
        assert!(matches!(err, PkgsError::Store(_)));
    }

    #[test]
    fn test_io_error_from_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: PkgsError = io_err.into();
        assert!(matches!(err, PkgsError::Io(_)));
    }
}
