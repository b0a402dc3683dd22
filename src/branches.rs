//! Branch tracking: register, remove, and enumerate indexed branches.

use crate::config::Config;
use crate::error::PkgsError;
use crate::git::GitReader;
use crate::indexer::{IndexOutcome, Indexer};
use crate::parsers::ParserRegistry;
use crate::store::{BranchStats, Store};

pub struct BranchManager<'a> {
    reader: &'a dyn GitReader,
    registry: &'a ParserRegistry,
    config: &'a Config,
}

impl<'a> BranchManager<'a> {
    pub fn new(reader: &'a dyn GitReader, registry: &'a ParserRegistry, config: &'a Config) -> Self {
        Self { reader, registry, config }
    }

    /// Register a branch for tracking and run a full index over it.
    pub fn add(&self, store: &mut Store, name: &str) -> Result<IndexOutcome, PkgsError> {
        Indexer::new(self.reader, self.registry, self.config).init(store, name, None)
    }

    /// Stop tracking a branch. Only the branch row and its commit links are
    /// deleted; commits shared with other tracked branches stay. Returns
    /// false when the branch was not tracked.
    pub fn remove(&self, store: &mut Store, name: &str) -> Result<bool, PkgsError> {
        store.remove_branch(name)
    }

    /// Tracked branches with derived stats, sorted by name.
    pub fn list(&self, store: &Store) -> Result<Vec<BranchStats>, PkgsError> {
        store.branch_stats()
    }

    /// The repository's default branch.
    pub fn default_branch(&self) -> Result<String, PkgsError> {
        self.reader.default_branch()
    }
}

// ─── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::Git2Reader;
    use crate::testutil::TestRepo;

    const GEMFILE: &str = "gem \"rails\", \"~> 7.0\"\n";

    struct Fixture {
        reader: Git2Reader,
        registry: ParserRegistry,
        config: Config,
    }

    impl Fixture {
        fn new(repo: &TestRepo) -> Self {
            let reader = Git2Reader::open(repo.path()).unwrap();
            let config = Config::default();
            let registry = ParserRegistry::new(&config);
            Self { reader, registry, config }
        }

        fn manager(&self) -> BranchManager<'_> {
            BranchManager::new(&self.reader, &self.registry, &self.config)
        }

        fn store(&self) -> Store {
            Store::create(&self.config.store_path(self.reader.git_dir())).unwrap()
        }
    }

    #[test]
    fn test_add_registers_and_fully_indexes() {
        let repo = TestRepo::new();
        repo.commit_files(&[("Gemfile", GEMFILE)], "add rails");
        repo.commit_files(&[("README.md", "docs")], "docs only");

        let fixture = Fixture::new(&repo);
        let manager = fixture.manager();
        let mut store = fixture.store();

        let outcome = manager.add(&mut store, "main").unwrap();
        assert_eq!(outcome.branch, "main");
        assert_eq!(outcome.commits, 2);
        assert_eq!(outcome.dep_commits, 1);

        let listed = manager.list(&store).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].name, "main");
        assert_eq!(listed[0].commit_count, 2);
        assert_eq!(listed[0].dep_commit_count, 1);
        assert_eq!(listed[0].last_indexed_hash.as_deref(), Some(repo.head_hash().as_str()));
    }

    #[test]
    fn test_add_unknown_branch_is_typed_error() {
        let repo = TestRepo::new();
        repo.commit_files(&[("Gemfile", GEMFILE)], "add rails");

        let fixture = Fixture::new(&repo);
        let mut store = fixture.store();
        let err = fixture.manager().add(&mut store, "missing").unwrap_err();
        assert!(matches!(err, PkgsError::BranchNotFound(_)));
        assert!(fixture.manager().list(&store).unwrap().is_empty());
    }

    #[test]
    fn test_remove_untracks_only_that_branch() {
        let repo = TestRepo::new();
        repo.commit_files(&[("Gemfile", GEMFILE)], "add rails");
        repo.branch("release");
        repo.commit_files(&[("Gemfile", "gem \"rails\", \"~> 7.1\"\n")], "bump");

        let fixture = Fixture::new(&repo);
        let manager = fixture.manager();
        let mut store = fixture.store();
        manager.add(&mut store, "main").unwrap();
        manager.add(&mut store, "release").unwrap();

        assert!(manager.remove(&mut store, "release").unwrap());
        // Repeated removal reports "was not tracked".
        assert!(!manager.remove(&mut store, "release").unwrap());

        let listed = manager.list(&store).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].name, "main");
        // The shared commit is still linked to the surviving branch.
        assert_eq!(listed[0].commit_count, 2);
    }

    #[test]
    fn test_default_branch_is_checked_out() {
        let repo = TestRepo::new();
        repo.commit_files(&[("Gemfile", GEMFILE)], "add rails");

        let fixture = Fixture::new(&repo);
        assert_eq!(fixture.manager().default_branch().unwrap(), "main");
    }
}
