//! Engine configuration, read once from git config at CLI entry and passed
//! by reference into the Indexer and Reconstructor.
//!
//! Recognized keys (all under the `pkgs` section): `ignoredDirs`,
//! `ignoredFiles`, `ecosystems`, `batchSize`, `snapshotInterval`, `dbPath`.

use std::path::{Path, PathBuf};

use regex::Regex;
use tracing::warn;

/// Default number of commits buffered between transactional flushes.
pub const DEFAULT_BATCH_SIZE: usize = 500;

/// Default number of dependency-changing commits between snapshots.
pub const DEFAULT_SNAPSHOT_INTERVAL: usize = 50;

/// Store file name inside the git directory.
pub const STORE_FILE_NAME: &str = "pkgs.sqlite3";

#[derive(Clone, Debug, Default)]
pub struct Config {
    /// Directory prefixes excluded from manifest recognition.
    pub ignored_dirs: Vec<String>,
    /// File globs excluded from manifest recognition (kept for display).
    pub ignored_files: Vec<String>,
    /// Compiled forms of `ignored_files`: (matches the full path, regex).
    pub(crate) ignored_file_patterns: Vec<(bool, Regex)>,
    /// If non-empty, only these ecosystems are indexed (lowercase).
    pub ecosystems: Vec<String>,
    /// Commits per transactional flush.
    pub batch_size: Option<usize>,
    /// Dep-changing commits between snapshots.
    pub snapshot_interval: Option<usize>,
    /// Store file override.
    pub db_path: Option<PathBuf>,
}

impl Config {
    /// Read the `pkgs.*` keys from the repository's git config. Missing keys
    /// fall back to defaults; unparsable values are warned about and skipped.
    pub fn from_repo(repo: &git2::Repository) -> Self {
        let mut cfg = Config::default();
        let git_config = match repo.config().and_then(|mut c| c.snapshot()) {
            Ok(c) => c,
            Err(e) => {
                warn!(error = %e, "failed to read git config, using defaults");
                return cfg;
            }
        };

        cfg.ignored_dirs = multivar(&git_config, "pkgs.ignoreddirs");
        cfg.ignored_files = multivar(&git_config, "pkgs.ignoredfiles");
        cfg.ecosystems = multivar(&git_config, "pkgs.ecosystems")
            .into_iter()
            .map(|e| e.to_lowercase())
            .collect();

        if let Ok(n) = git_config.get_i64("pkgs.batchsize") {
            if n > 0 {
                cfg.batch_size = Some(n as usize);
            } else {
                warn!(value = n, "ignoring non-positive pkgs.batchSize");
            }
        }
        if let Ok(n) = git_config.get_i64("pkgs.snapshotinterval") {
            if n > 0 {
                cfg.snapshot_interval = Some(n as usize);
            } else {
                warn!(value = n, "ignoring non-positive pkgs.snapshotInterval");
            }
        }
        if let Ok(p) = git_config.get_string("pkgs.dbpath") {
            cfg.db_path = Some(PathBuf::from(p));
        }

        cfg.compile_ignore_patterns();
        cfg
    }

    /// Build a config from explicit values (tests and library callers).
    pub fn with_ignores(ignored_dirs: Vec<String>, ignored_files: Vec<String>) -> Self {
        let mut cfg = Config { ignored_dirs, ignored_files, ..Config::default() };
        cfg.compile_ignore_patterns();
        cfg
    }

    fn compile_ignore_patterns(&mut self) {
        self.ignored_file_patterns = self
            .ignored_files
            .iter()
            .filter_map(|glob| match glob_to_regex(glob) {
                // Globs with a slash match the full path, bare globs the
                // basename.
                Some(re) => Some((glob.contains('/'), re)),
                None => {
                    warn!(glob = %glob, "ignoring unparsable pkgs.ignoredFiles glob");
                    None
                }
            })
            .collect();
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size.unwrap_or(DEFAULT_BATCH_SIZE)
    }

    pub fn snapshot_interval(&self) -> usize {
        self.snapshot_interval.unwrap_or(DEFAULT_SNAPSHOT_INTERVAL)
    }

    /// Resolved store file location for a repository.
    pub fn store_path(&self, git_dir: &Path) -> PathBuf {
        match &self.db_path {
            Some(p) => p.clone(),
            None => git_dir.join(STORE_FILE_NAME),
        }
    }

    /// True when the ecosystem passes the `pkgs.ecosystems` allow list.
    pub fn ecosystem_enabled(&self, ecosystem: &str) -> bool {
        self.ecosystems.is_empty() || self.ecosystems.iter().any(|e| e == &ecosystem.to_lowercase())
    }

    /// True when the repo-relative path is excluded by `ignoredDirs` or
    /// `ignoredFiles`.
    pub fn is_path_ignored(&self, path: &str) -> bool {
        for dir in &self.ignored_dirs {
            let prefix = dir.trim_end_matches('/');
            if prefix.is_empty() {
                continue;
            }
            if path.starts_with(prefix)
                && (path.len() == prefix.len() || path.as_bytes()[prefix.len()] == b'/')
            {
                return true;
            }
        }

        let basename = path.rsplit('/').next().unwrap_or(path);
        for (full_path, re) in &self.ignored_file_patterns {
            let candidate = if *full_path { path } else { basename };
            if re.is_match(candidate) {
                return true;
            }
        }
        false
    }
}

/// Split a multi-valued git config key; each value may itself be a
/// comma-separated list (both `git config --add` style and one-line style
/// are accepted).
fn multivar(config: &git2::Config, key: &str) -> Vec<String> {
    let mut values = Vec::new();
    if let Ok(mut entries) = config.multivar(key, None) {
        let _ = entries.for_each(|entry| {
            if let Some(v) = entry.value() {
                for part in v.split(',') {
                    let part = part.trim();
                    if !part.is_empty() {
                        values.push(part.to_string());
                    }
                }
            }
        });
    }
    values
}

/// Translate a shell-style glob (`*`, `?`) into an anchored regex.
fn glob_to_regex(glob: &str) -> Option<Regex> {
    let mut pattern = String::with_capacity(glob.len() + 8);
    pattern.push('^');
    for c in glob.chars() {
        match c {
            '*' => pattern.push_str(".*"),
            '?' => pattern.push('.'),
            c => pattern.push_str(&regex::escape(&c.to_string())),
        }
    }
    pattern.push('$');
    Regex::new(&pattern).ok()
}
