//! Shared test fixtures: programmatically built git repositories with
//! deterministic, strictly increasing commit timestamps.

use std::cell::Cell;
use std::fs;
use std::path::Path;

use git2::{Repository, RepositoryInitOptions, Signature, Time};
use tempfile::TempDir;

/// A scratch repository on disk. Commits are created through the index so
/// the working directory, index, and HEAD stay consistent.
pub struct TestRepo {
    pub dir: TempDir,
    pub repo: Repository,
    clock: Cell<i64>,
}

impl TestRepo {
    pub fn new() -> Self {
        let dir = TempDir::new().expect("create temp dir");
        let mut opts = RepositoryInitOptions::new();
        opts.initial_head("main");
        let repo = Repository::init_opts(dir.path(), &opts).expect("init repo");
        {
            let mut config = repo.config().expect("open config");
            config.set_str("user.name", "Test Author").unwrap();
            config.set_str("user.email", "test@example.com").unwrap();
        }
        Self { dir, repo, clock: Cell::new(1_700_000_000) }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    fn signature(&self) -> Signature<'static> {
        let at = self.clock.get() + 10;
        self.clock.set(at);
        Signature::new("Test Author", "test@example.com", &Time::new(at, 0)).unwrap()
    }

    fn commit_index(&self, message: &str) -> String {
        let mut index = self.repo.index().unwrap();
        let tree_id = index.write_tree().unwrap();
        index.write().unwrap();
        let tree = self.repo.find_tree(tree_id).unwrap();

        let head = self.repo.head().ok().and_then(|h| h.peel_to_commit().ok());
        let parents: Vec<_> = head.iter().collect();

        let sig = self.signature();
        let oid = self
            .repo
            .commit(Some("HEAD"), &sig, &sig, message, &tree, &parents)
            .unwrap();
        oid.to_string()
    }

    /// Write and/or delete files, stage everything, and commit. Returns the
    /// hash.
    pub fn commit_change(
        &self,
        files: &[(&str, &str)],
        removals: &[&str],
        message: &str,
    ) -> String {
        let mut index = self.repo.index().unwrap();
        for (path, contents) in files {
            let full = self.dir.path().join(path);
            if let Some(parent) = full.parent() {
                fs::create_dir_all(parent).unwrap();
            }
            fs::write(&full, contents).unwrap();
            index.add_path(Path::new(path)).unwrap();
        }
        for path in removals {
            index.remove_path(Path::new(path)).unwrap();
            fs::remove_file(self.dir.path().join(path)).unwrap();
        }
        index.write().unwrap();
        self.commit_index(message)
    }

    /// Write the given files, stage them, and commit. Returns the hash.
    pub fn commit_files(&self, files: &[(&str, &str)], message: &str) -> String {
        self.commit_change(files, &[], message)
    }

    /// Delete a tracked file and commit the removal.
    pub fn remove_file(&self, path: &str, message: &str) -> String {
        self.commit_change(&[], &[path], message)
    }

    /// Create a branch at the current HEAD.
    pub fn branch(&self, name: &str) {
        let head = self.repo.head().unwrap().peel_to_commit().unwrap();
        self.repo.branch(name, &head, false).unwrap();
    }

    /// Switch HEAD (and the working tree) to a branch.
    pub fn checkout(&self, name: &str) {
        self.repo.set_head(&format!("refs/heads/{}", name)).unwrap();
        let mut opts = git2::build::CheckoutBuilder::new();
        opts.force();
        self.repo.checkout_head(Some(&mut opts)).unwrap();
    }

    /// Create a two-parent merge commit on the current branch, taking the
    /// merged branch's tree wholesale (the content does not matter to the
    /// engine: merges are recorded but never analyzed).
    pub fn merge_branch(&self, name: &str, message: &str) -> String {
        let theirs = self
            .repo
            .find_branch(name, git2::BranchType::Local)
            .unwrap()
            .get()
            .peel_to_commit()
            .unwrap();
        let their_tree = theirs.tree().unwrap();
        let head = self.repo.head().unwrap().peel_to_commit().unwrap();

        let sig = self.signature();
        let oid = self
            .repo
            .commit(Some("HEAD"), &sig, &sig, message, &their_tree, &[&head, &theirs])
            .unwrap();

        // Sync index + workdir with the new HEAD.
        let mut opts = git2::build::CheckoutBuilder::new();
        opts.force();
        self.repo.checkout_head(Some(&mut opts)).unwrap();
        oid.to_string()
    }

    pub fn head_hash(&self) -> String {
        self.repo.head().unwrap().peel_to_commit().unwrap().id().to_string()
    }
}
