//! SQLite persistence: commits, branches, manifests, the delta log, and
//! snapshots, one store file per repository.
//!
//! All rows for one indexed batch are written in a single transaction, so a
//! crash always leaves the history a prefix of the fully indexed sequence.
//! Inserts that can legitimately re-run during a resume are
//! conflict-ignoring; branch-commit rows are not (an in-branch duplicate is
//! a bug, surfaced as `StoreConflict`).

use std::path::{Path, PathBuf};

use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;

use git_pkgs::{ChangeType, Dependency, ManifestKind};

use crate::error::PkgsError;
use crate::git::CommitRef;

/// Bump on incompatible schema changes; migrations go into `MIGRATIONS`.
pub const SCHEMA_VERSION: i64 = 1;

/// Sequential migration steps: entry N upgrades version N to N+1.
const MIGRATIONS: &[fn(&Connection) -> Result<(), rusqlite::Error>] = &[];

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS meta (
    key   TEXT PRIMARY KEY,
    value INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS commits (
    id              INTEGER PRIMARY KEY,
    hash            TEXT NOT NULL UNIQUE,
    message         TEXT NOT NULL,
    author_name     TEXT NOT NULL,
    author_email    TEXT NOT NULL,
    committed_at    INTEGER NOT NULL,
    has_dep_changes INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS branches (
    id                     INTEGER PRIMARY KEY,
    name                   TEXT NOT NULL UNIQUE,
    last_indexed_commit_id INTEGER REFERENCES commits(id)
);

CREATE TABLE IF NOT EXISTS branch_commits (
    id        INTEGER PRIMARY KEY,
    branch_id INTEGER NOT NULL REFERENCES branches(id) ON DELETE CASCADE,
    commit_id INTEGER NOT NULL REFERENCES commits(id),
    position  INTEGER NOT NULL,
    UNIQUE (branch_id, commit_id)
);
CREATE INDEX IF NOT EXISTS idx_branch_commits_position
    ON branch_commits (branch_id, position);

CREATE TABLE IF NOT EXISTS manifests (
    id        INTEGER PRIMARY KEY,
    path      TEXT NOT NULL,
    ecosystem TEXT NOT NULL,
    kind      TEXT NOT NULL,
    UNIQUE (path, ecosystem, kind)
);

CREATE TABLE IF NOT EXISTS dependency_changes (
    id                   INTEGER PRIMARY KEY,
    commit_id            INTEGER NOT NULL REFERENCES commits(id),
    manifest_id          INTEGER NOT NULL REFERENCES manifests(id),
    name                 TEXT NOT NULL,
    ecosystem            TEXT NOT NULL,
    purl                 TEXT NOT NULL,
    change_type          TEXT NOT NULL,
    requirement          TEXT NOT NULL,
    previous_requirement TEXT,
    dependency_type      TEXT NOT NULL,
    UNIQUE (commit_id, manifest_id, name)
);
CREATE INDEX IF NOT EXISTS idx_changes_name ON dependency_changes (name);
CREATE INDEX IF NOT EXISTS idx_changes_ecosystem ON dependency_changes (ecosystem);
CREATE INDEX IF NOT EXISTS idx_changes_commit_name ON dependency_changes (commit_id, name);

CREATE TABLE IF NOT EXISTS dependency_snapshots (
    id              INTEGER PRIMARY KEY,
    commit_id       INTEGER NOT NULL REFERENCES commits(id),
    manifest_id     INTEGER NOT NULL REFERENCES manifests(id),
    name            TEXT NOT NULL,
    ecosystem       TEXT NOT NULL,
    purl            TEXT NOT NULL,
    requirement     TEXT NOT NULL,
    dependency_type TEXT NOT NULL,
    UNIQUE (commit_id, manifest_id, name)
);
CREATE INDEX IF NOT EXISTS idx_snapshots_commit ON dependency_snapshots (commit_id);
";

// ─── Row types ──────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommitRow {
    pub id: i64,
    pub hash: String,
    pub message: String,
    pub author_name: String,
    pub author_email: String,
    pub committed_at: i64,
    pub has_dep_changes: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BranchRow {
    pub id: i64,
    pub name: String,
    pub last_indexed_commit_id: Option<i64>,
}

/// Derived per-branch numbers for `branch list`.
#[derive(Clone, Debug)]
pub struct BranchStats {
    pub name: String,
    pub last_indexed_hash: Option<String>,
    pub commit_count: i64,
    pub dep_commit_count: i64,
}

/// One delta-log row as replayed by the reconstructor.
#[derive(Clone, Debug)]
pub struct ReplayChange {
    pub manifest_path: String,
    pub name: String,
    pub ecosystem: String,
    pub kind: ManifestKind,
    pub purl: String,
    pub change_type: ChangeType,
    pub requirement: String,
    pub dependency_type: String,
}

/// One delta-log row as shown by `log <package>`, with the commit's
/// authorship attached ("who added rails?").
#[derive(Clone, Debug)]
pub struct ChangeLogEntry {
    pub commit_hash: String,
    pub committed_at: i64,
    pub author_name: String,
    pub author_email: String,
    pub manifest_path: String,
    pub name: String,
    pub ecosystem: String,
    pub change_type: ChangeType,
    pub requirement: String,
    pub previous_requirement: Option<String>,
    pub dependency_type: String,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StoreTotals {
    pub commits: i64,
    pub dep_commits: i64,
    pub branches: i64,
    pub manifests: i64,
    pub changes: i64,
    pub snapshot_rows: i64,
}

// ─── Pending batch rows ─────────────────────────────────────────────

/// One delta-log row waiting for the next flush.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PendingChange {
    pub manifest_path: String,
    pub ecosystem: String,
    pub kind: ManifestKind,
    pub name: String,
    pub purl: String,
    pub change_type: ChangeType,
    pub requirement: String,
    pub previous_requirement: Option<String>,
    pub dependency_type: String,
}

/// Everything the indexer buffered for one commit.
#[derive(Clone, Debug)]
pub struct PendingCommit {
    pub commit: CommitRef,
    pub changes: Vec<PendingChange>,
    /// Full-state snapshot rows to materialize at this commit.
    pub snapshot: Option<Vec<Dependency>>,
}

// ─── Store ──────────────────────────────────────────────────────────

/// How version drift on open is treated.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OpenMode {
    Strict,
    Migrate,
}

#[derive(Debug)]
pub struct Store {
    conn: Connection,
    path: PathBuf,
}

impl Store {
    /// Open an existing store; `StoreMissing` when the file is absent.
    pub fn open(path: &Path) -> Result<Self, PkgsError> {
        Self::open_with_mode(path, OpenMode::Strict)
    }

    pub fn open_with_mode(path: &Path, mode: OpenMode) -> Result<Self, PkgsError> {
        if !path.exists() {
            return Err(PkgsError::StoreMissing { path: path.display().to_string() });
        }
        let store = Self::connect(path)?;
        store.check_version(mode)?;
        Ok(store)
    }

    /// Open or create the store file, applying the schema when new.
    pub fn create(path: &Path) -> Result<Self, PkgsError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let store = Self::connect(path)?;
        store.conn.execute_batch(SCHEMA)?;
        store.conn.execute(
            "INSERT OR IGNORE INTO meta (key, value) VALUES ('schema_version', ?1)",
            params![SCHEMA_VERSION],
        )?;
        store.check_version(OpenMode::Strict)?;
        Ok(store)
    }

    fn connect(path: &Path) -> Result<Self, PkgsError> {
        let conn = Connection::open(path)?;
        // journal_mode is a query-style pragma: it reports the mode back.
        conn.query_row("PRAGMA journal_mode = WAL", [], |_| Ok(()))?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.pragma_update(None, "synchronous", "FULL")?;
        Ok(Self { conn, path: path.to_path_buf() })
    }

    /// Remove the store file (and its WAL/SHM siblings) if present.
    pub fn destroy(path: &Path) -> Result<(), PkgsError> {
        for suffix in ["", "-wal", "-shm"] {
            let mut file = path.as_os_str().to_owned();
            file.push(suffix);
            match std::fs::remove_file(PathBuf::from(file)) {
                Ok(()) => (),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => (),
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn check_version(&self, mode: OpenMode) -> Result<(), PkgsError> {
        let found: Option<i64> = self
            .conn
            .query_row("SELECT value FROM meta WHERE key = 'schema_version'", [], |r| r.get(0))
            .optional()?;
        let mut found = found.ok_or_else(|| {
            PkgsError::CorruptState("store has no schema_version row".to_string())
        })?;

        if found != SCHEMA_VERSION && mode == OpenMode::Migrate {
            while found < SCHEMA_VERSION {
                let step = usize::try_from(found - 1).ok().and_then(|i| MIGRATIONS.get(i));
                let Some(step) = step else { break };
                debug!(from = found, "migrating store schema");
                step(&self.conn)?;
                found += 1;
                self.conn.execute(
                    "UPDATE meta SET value = ?1 WHERE key = 'schema_version'",
                    params![found],
                )?;
            }
        }

        if found != SCHEMA_VERSION {
            return Err(PkgsError::SchemaMismatch { found, expected: SCHEMA_VERSION });
        }
        Ok(())
    }

    /// Relaxed durability for a full initial index: the WAL journal still
    /// orders writes, fsync is deferred to the OS.
    pub fn begin_bulk(&self) -> Result<(), PkgsError> {
        self.conn.pragma_update(None, "synchronous", "OFF")?;
        Ok(())
    }

    pub fn end_bulk(&self) -> Result<(), PkgsError> {
        self.conn.pragma_update(None, "synchronous", "FULL")?;
        Ok(())
    }

    // ─── Branches ───────────────────────────────────────────────────

    pub fn branch_by_name(&self, name: &str) -> Result<Option<BranchRow>, PkgsError> {
        Ok(self
            .conn
            .query_row(
                "SELECT id, name, last_indexed_commit_id FROM branches WHERE name = ?1",
                params![name],
                |r| {
                    Ok(BranchRow {
                        id: r.get(0)?,
                        name: r.get(1)?,
                        last_indexed_commit_id: r.get(2)?,
                    })
                },
            )
            .optional()?)
    }

    pub fn create_branch(&self, name: &str) -> Result<BranchRow, PkgsError> {
        self.conn
            .execute("INSERT OR IGNORE INTO branches (name) VALUES (?1)", params![name])?;
        self.branch_by_name(name)?
            .ok_or_else(|| PkgsError::CorruptState(format!("branch '{}' vanished", name)))
    }

    /// Delete the branch row and its commit links. Commits themselves are
    /// shared across branches and stay. Returns false when untracked.
    pub fn remove_branch(&self, name: &str) -> Result<bool, PkgsError> {
        let affected = self.conn.execute("DELETE FROM branches WHERE name = ?1", params![name])?;
        Ok(affected > 0)
    }

    pub fn branch_stats(&self) -> Result<Vec<BranchStats>, PkgsError> {
        let mut stmt = self.conn.prepare(
            "SELECT b.name,
                    (SELECT hash FROM commits WHERE id = b.last_indexed_commit_id),
                    (SELECT COUNT(*) FROM branch_commits bc WHERE bc.branch_id = b.id),
                    (SELECT COUNT(*) FROM branch_commits bc
                       JOIN commits c ON c.id = bc.commit_id
                      WHERE bc.branch_id = b.id AND c.has_dep_changes)
             FROM branches b ORDER BY b.name",
        )?;
        let rows = stmt.query_map([], |r| {
            Ok(BranchStats {
                name: r.get(0)?,
                last_indexed_hash: r.get(1)?,
                commit_count: r.get(2)?,
                dep_commit_count: r.get(3)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Next dense position on a branch (0 for a fresh branch).
    pub fn next_position(&self, branch_id: i64) -> Result<i64, PkgsError> {
        let max: Option<i64> = self.conn.query_row(
            "SELECT MAX(position) FROM branch_commits WHERE branch_id = ?1",
            params![branch_id],
            |r| r.get(0),
        )?;
        Ok(max.map_or(0, |m| m + 1))
    }

    // ─── Commits ────────────────────────────────────────────────────

    pub fn commit_by_hash(&self, hash: &str) -> Result<Option<CommitRow>, PkgsError> {
        Ok(self
            .conn
            .query_row(
                "SELECT id, hash, message, author_name, author_email, committed_at, has_dep_changes
                 FROM commits WHERE hash = ?1",
                params![hash],
                |r| {
                    Ok(CommitRow {
                        id: r.get(0)?,
                        hash: r.get(1)?,
                        message: r.get(2)?,
                        author_name: r.get(3)?,
                        author_email: r.get(4)?,
                        committed_at: r.get(5)?,
                        has_dep_changes: r.get(6)?,
                    })
                },
            )
            .optional()?)
    }

    pub fn commit_by_id(&self, id: i64) -> Result<Option<CommitRow>, PkgsError> {
        Ok(self
            .conn
            .query_row(
                "SELECT id, hash, message, author_name, author_email, committed_at, has_dep_changes
                 FROM commits WHERE id = ?1",
                params![id],
                |r| {
                    Ok(CommitRow {
                        id: r.get(0)?,
                        hash: r.get(1)?,
                        message: r.get(2)?,
                        author_name: r.get(3)?,
                        author_email: r.get(4)?,
                        committed_at: r.get(5)?,
                        has_dep_changes: r.get(6)?,
                    })
                },
            )
            .optional()?)
    }

    pub fn position_of(&self, branch_id: i64, commit_id: i64) -> Result<Option<i64>, PkgsError> {
        Ok(self
            .conn
            .query_row(
                "SELECT position FROM branch_commits WHERE branch_id = ?1 AND commit_id = ?2",
                params![branch_id, commit_id],
                |r| r.get(0),
            )
            .optional()?)
    }

    // ─── Flush ──────────────────────────────────────────────────────

    /// Write a buffered batch in one transaction: commit rows (upsert),
    /// branch-commit links, delta-log rows, snapshot rows, and the advanced
    /// branch cursor. Returns the next free position.
    pub fn flush(
        &mut self,
        branch_id: i64,
        first_position: i64,
        batch: &[PendingCommit],
    ) -> Result<i64, PkgsError> {
        if batch.is_empty() {
            return Ok(first_position);
        }
        let tx = self.conn.transaction()?;
        let mut position = first_position;
        let mut last_commit_id = 0i64;

        for pending in batch {
            let commit_id = upsert_commit(&tx, &pending.commit, !pending.changes.is_empty())?;
            insert_branch_commit(&tx, branch_id, commit_id, position)?;
            position += 1;

            for change in &pending.changes {
                let manifest_id =
                    find_or_create_manifest(&tx, &change.manifest_path, &change.ecosystem, change.kind)?;
                tx.execute(
                    "INSERT OR IGNORE INTO dependency_changes
                       (commit_id, manifest_id, name, ecosystem, purl, change_type,
                        requirement, previous_requirement, dependency_type)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                    params![
                        commit_id,
                        manifest_id,
                        change.name,
                        change.ecosystem,
                        change.purl,
                        change.change_type.as_str(),
                        change.requirement,
                        change.previous_requirement,
                        change.dependency_type,
                    ],
                )?;
            }

            if let Some(snapshot) = &pending.snapshot {
                insert_snapshot_rows(&tx, commit_id, snapshot)?;
            }
            last_commit_id = commit_id;
        }

        tx.execute(
            "UPDATE branches SET last_indexed_commit_id = ?1 WHERE id = ?2",
            params![last_commit_id, branch_id],
        )?;
        tx.commit()?;
        debug!(rows = batch.len(), "flushed batch");
        Ok(position)
    }

    /// Materialize snapshot rows at an already-written commit (the
    /// unconditional tip snapshot).
    pub fn write_snapshot(&mut self, commit_id: i64, deps: &[Dependency]) -> Result<(), PkgsError> {
        let tx = self.conn.transaction()?;
        insert_snapshot_rows(&tx, commit_id, deps)?;
        tx.commit()?;
        Ok(())
    }

    /// Dependency-changing commits on the branch after its most recent
    /// snapshot commit. Seeds the snapshot-cadence counter on resume so an
    /// interrupted run and an uninterrupted one place snapshots at the same
    /// commits.
    pub fn dep_commits_since_snapshot(&self, branch_id: i64) -> Result<i64, PkgsError> {
        Ok(self.conn.query_row(
            "SELECT COUNT(*)
             FROM branch_commits bc
             JOIN commits c ON c.id = bc.commit_id
             WHERE bc.branch_id = ?1 AND c.has_dep_changes
               AND bc.position > COALESCE(
                     (SELECT MAX(bc2.position)
                      FROM branch_commits bc2
                      WHERE bc2.branch_id = ?1
                        AND EXISTS (SELECT 1 FROM dependency_snapshots s
                                    WHERE s.commit_id = bc2.commit_id)),
                     -1)",
            params![branch_id],
            |r| r.get(0),
        )?)
    }

    pub fn has_snapshot(&self, commit_id: i64) -> Result<bool, PkgsError> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM dependency_snapshots WHERE commit_id = ?1",
            params![commit_id],
            |r| r.get(0),
        )?;
        Ok(count > 0)
    }

    // ─── Reconstruction queries ─────────────────────────────────────

    /// Nearest snapshot commit on the branch at or before the target
    /// `(committed_at, position)` point: `(commit_id, committed_at,
    /// position)`.
    pub fn nearest_snapshot(
        &self,
        branch_id: i64,
        committed_at: i64,
        position: i64,
    ) -> Result<Option<(i64, i64, i64)>, PkgsError> {
        Ok(self
            .conn
            .query_row(
                "SELECT c.id, c.committed_at, bc.position
                 FROM commits c
                 JOIN branch_commits bc ON bc.commit_id = c.id AND bc.branch_id = ?1
                 WHERE EXISTS (SELECT 1 FROM dependency_snapshots s WHERE s.commit_id = c.id)
                   AND (c.committed_at < ?2 OR (c.committed_at = ?2 AND bc.position <= ?3))
                 ORDER BY c.committed_at DESC, bc.position DESC
                 LIMIT 1",
                params![branch_id, committed_at, position],
                |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
            )
            .optional()?)
    }

    pub fn snapshot_dependencies(&self, commit_id: i64) -> Result<Vec<Dependency>, PkgsError> {
        let mut stmt = self.conn.prepare(
            "SELECT m.path, s.name, s.ecosystem, m.kind, s.purl, s.requirement, s.dependency_type
             FROM dependency_snapshots s
             JOIN manifests m ON m.id = s.manifest_id
             WHERE s.commit_id = ?1",
        )?;
        let rows = stmt.query_map(params![commit_id], |r| {
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, String>(1)?,
                r.get::<_, String>(2)?,
                r.get::<_, String>(3)?,
                r.get::<_, String>(4)?,
                r.get::<_, String>(5)?,
                r.get::<_, String>(6)?,
            ))
        })?;

        let mut deps = Vec::new();
        for row in rows {
            let (path, name, ecosystem, kind, purl, requirement, dependency_type) = row?;
            deps.push(Dependency {
                manifest_path: path,
                name,
                ecosystem,
                kind: parse_kind(&kind)?,
                purl,
                requirement,
                dependency_type,
            });
        }
        Ok(deps)
    }

    /// Delta-log rows on the branch strictly after `after` and up to (and
    /// including) `until`, in replay order: committed_at, then branch
    /// position, then insertion order.
    pub fn changes_in_range(
        &self,
        branch_id: i64,
        after: Option<(i64, i64)>,
        until: (i64, i64),
    ) -> Result<Vec<ReplayChange>, PkgsError> {
        let (after_ts, after_pos) = after.unwrap_or((i64::MIN, i64::MIN));
        let mut stmt = self.conn.prepare(
            "SELECT m.path, dc.name, dc.ecosystem, m.kind, dc.purl, dc.change_type,
                    dc.requirement, dc.dependency_type
             FROM dependency_changes dc
             JOIN commits c ON c.id = dc.commit_id
             JOIN branch_commits bc ON bc.commit_id = c.id AND bc.branch_id = ?1
             JOIN manifests m ON m.id = dc.manifest_id
             WHERE (c.committed_at > ?2 OR (c.committed_at = ?2 AND bc.position > ?3))
               AND (c.committed_at < ?4 OR (c.committed_at = ?4 AND bc.position <= ?5))
             ORDER BY c.committed_at ASC, bc.position ASC, dc.id ASC",
        )?;
        let rows = stmt.query_map(
            params![branch_id, after_ts, after_pos, until.0, until.1],
            |r| {
                Ok((
                    r.get::<_, String>(0)?,
                    r.get::<_, String>(1)?,
                    r.get::<_, String>(2)?,
                    r.get::<_, String>(3)?,
                    r.get::<_, String>(4)?,
                    r.get::<_, String>(5)?,
                    r.get::<_, String>(6)?,
                    r.get::<_, String>(7)?,
                ))
            },
        )?;

        let mut changes = Vec::new();
        for row in rows {
            let (path, name, ecosystem, kind, purl, change_type, requirement, dependency_type) =
                row?;
            changes.push(ReplayChange {
                manifest_path: path,
                name,
                ecosystem,
                kind: parse_kind(&kind)?,
                purl,
                change_type: parse_change_type(&change_type)?,
                requirement,
                dependency_type,
            });
        }
        Ok(changes)
    }

    // ─── Reporting queries ──────────────────────────────────────────

    /// Full change history of one package, optionally limited to a branch,
    /// oldest first.
    pub fn changes_for_package(
        &self,
        name: &str,
        branch_id: Option<i64>,
    ) -> Result<Vec<ChangeLogEntry>, PkgsError> {
        let sql = format!(
            "SELECT c.hash, c.committed_at, c.author_name, c.author_email,
                    m.path, dc.name, dc.ecosystem, dc.change_type,
                    dc.requirement, dc.previous_requirement, dc.dependency_type
             FROM dependency_changes dc
             JOIN commits c ON c.id = dc.commit_id
             JOIN manifests m ON m.id = dc.manifest_id
             {}
             WHERE dc.name = ?1
             ORDER BY c.committed_at ASC, dc.id ASC",
            match branch_id {
                Some(_) => "JOIN branch_commits bc ON bc.commit_id = c.id AND bc.branch_id = ?2",
                None => "",
            }
        );
        let mut stmt = self.conn.prepare(&sql)?;

        // change_type comes back as text; parse it outside the row mapper
        // so a bad value surfaces as CorruptState, not a SQLite error.
        let map_row = |r: &rusqlite::Row<'_>| {
            Ok((
                ChangeLogEntry {
                    commit_hash: r.get(0)?,
                    committed_at: r.get(1)?,
                    author_name: r.get(2)?,
                    author_email: r.get(3)?,
                    manifest_path: r.get(4)?,
                    name: r.get(5)?,
                    ecosystem: r.get(6)?,
                    change_type: ChangeType::Added,
                    requirement: r.get(8)?,
                    previous_requirement: r.get(9)?,
                    dependency_type: r.get(10)?,
                },
                r.get::<_, String>(7)?,
            ))
        };
        let rows: Vec<_> = match branch_id {
            Some(id) => stmt
                .query_map(params![name, id], map_row)?
                .collect::<Result<Vec<_>, _>>()?,
            None => stmt.query_map(params![name], map_row)?.collect::<Result<Vec<_>, _>>()?,
        };

        let mut entries = Vec::new();
        for (mut entry, change_type) in rows {
            entry.change_type = parse_change_type(&change_type)?;
            entries.push(entry);
        }
        Ok(entries)
    }

    pub fn totals(&self) -> Result<StoreTotals, PkgsError> {
        let one = |sql: &str| -> Result<i64, rusqlite::Error> {
            self.conn.query_row(sql, [], |r| r.get(0))
        };
        Ok(StoreTotals {
            commits: one("SELECT COUNT(*) FROM commits")?,
            dep_commits: one("SELECT COUNT(*) FROM commits WHERE has_dep_changes")?,
            branches: one("SELECT COUNT(*) FROM branches")?,
            manifests: one("SELECT COUNT(*) FROM manifests")?,
            changes: one("SELECT COUNT(*) FROM dependency_changes")?,
            snapshot_rows: one("SELECT COUNT(*) FROM dependency_snapshots")?,
        })
    }
}

// ─── Transaction helpers ────────────────────────────────────────────

/// Commits are keyed by content hash across branches: the existing row is
/// preserved, only `has_dep_changes` may flip false→true.
fn upsert_commit(
    tx: &rusqlite::Transaction<'_>,
    commit: &CommitRef,
    has_dep_changes: bool,
) -> Result<i64, PkgsError> {
    tx.execute(
        "INSERT INTO commits (hash, message, author_name, author_email, committed_at, has_dep_changes)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
         ON CONFLICT(hash) DO UPDATE
            SET has_dep_changes = commits.has_dep_changes OR excluded.has_dep_changes",
        params![
            commit.hash,
            commit.message,
            commit.author_name,
            commit.author_email,
            commit.committed_at,
            has_dep_changes,
        ],
    )?;
    Ok(tx.query_row("SELECT id FROM commits WHERE hash = ?1", params![commit.hash], |r| r.get(0))?)
}

fn insert_branch_commit(
    tx: &rusqlite::Transaction<'_>,
    branch_id: i64,
    commit_id: i64,
    position: i64,
) -> Result<(), PkgsError> {
    match tx.execute(
        "INSERT INTO branch_commits (branch_id, commit_id, position) VALUES (?1, ?2, ?3)",
        params![branch_id, commit_id, position],
    ) {
        Ok(_) => Ok(()),
        Err(rusqlite::Error::SqliteFailure(e, _))
            if e.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            Err(PkgsError::StoreConflict(format!(
                "commit {} already linked to branch {}",
                commit_id, branch_id
            )))
        }
        Err(e) => Err(e.into()),
    }
}

/// Conflict-ignoring insert followed by a lookup; the single-writer model
/// makes this race-free.
fn find_or_create_manifest(
    tx: &rusqlite::Transaction<'_>,
    path: &str,
    ecosystem: &str,
    kind: ManifestKind,
) -> Result<i64, PkgsError> {
    tx.execute(
        "INSERT OR IGNORE INTO manifests (path, ecosystem, kind) VALUES (?1, ?2, ?3)",
        params![path, ecosystem, kind.as_str()],
    )?;
    Ok(tx.query_row(
        "SELECT id FROM manifests WHERE path = ?1 AND ecosystem = ?2 AND kind = ?3",
        params![path, ecosystem, kind.as_str()],
        |r| r.get(0),
    )?)
}

fn insert_snapshot_rows(
    tx: &rusqlite::Transaction<'_>,
    commit_id: i64,
    deps: &[Dependency],
) -> Result<(), PkgsError> {
    for dep in deps {
        let manifest_id = find_or_create_manifest(tx, &dep.manifest_path, &dep.ecosystem, dep.kind)?;
        tx.execute(
            "INSERT OR IGNORE INTO dependency_snapshots
               (commit_id, manifest_id, name, ecosystem, purl, requirement, dependency_type)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                commit_id,
                manifest_id,
                dep.name,
                dep.ecosystem,
                dep.purl,
                dep.requirement,
                dep.dependency_type,
            ],
        )?;
    }
    Ok(())
}

fn parse_kind(s: &str) -> Result<ManifestKind, PkgsError> {
    ManifestKind::parse(s)
        .ok_or_else(|| PkgsError::CorruptState(format!("unknown manifest kind '{}'", s)))
}

fn parse_change_type(s: &str) -> Result<ChangeType, PkgsError> {
    ChangeType::parse(s)
        .ok_or_else(|| PkgsError::CorruptState(format!("unknown change type '{}'", s)))
}

// ─── Tests ───────────────────────────────────────────────────────────
