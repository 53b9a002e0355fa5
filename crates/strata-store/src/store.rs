//! SQLite storage for repositories, commits, files, versions and lines.
//!
//! A commit is written in two steps: a [`Session`] inserts the commit row
//! (incomplete) together with everything derived from it, then a second
//! session flips the completion flag. A commit row left incomplete by a
//! crash is purged and rewritten the next time the commit is ingested.

use std::collections::HashSet;
use std::path::Path;

use rusqlite::{params, Connection, OptionalExtension, Transaction, TransactionBehavior};
use strata_core::{truncate_chars, LineEvent, StrataError, Totals};

/// Maximum stored length of a commit message, in characters.
pub const MAX_MESSAGE_CHARS: usize = 3000;
/// Maximum stored length of an author name or email.
pub const MAX_AUTHOR_CHARS: usize = 255;
/// Maximum stored length of a file path.
pub const MAX_PATH_CHARS: usize = 500;
/// Maximum stored length of a changed line.
pub const MAX_LINE_CHARS: usize = 3000;
/// Maximum stored length of a repository location.
pub const MAX_URL_CHARS: usize = 500;

const SCHEMA_SQL: &str = "
    CREATE TABLE IF NOT EXISTS repository (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL UNIQUE,
        url TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS commits (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        repository_id INTEGER NOT NULL REFERENCES repository(id),
        hash TEXT NOT NULL,
        message TEXT NOT NULL,
        author TEXT NOT NULL,
        email TEXT NOT NULL,
        timestamp INTEGER NOT NULL,
        added_files INTEGER NOT NULL DEFAULT 0,
        deleted_files INTEGER NOT NULL DEFAULT 0,
        modified_files INTEGER NOT NULL DEFAULT 0,
        renamed_files INTEGER NOT NULL DEFAULT 0,
        project_size INTEGER NOT NULL DEFAULT 0,
        project_file_count INTEGER NOT NULL DEFAULT 0,
        complete INTEGER NOT NULL DEFAULT 0,
        UNIQUE (repository_id, hash)
    );
    CREATE INDEX IF NOT EXISTS idx_commits_time ON commits(repository_id, timestamp);

    CREATE TABLE IF NOT EXISTS files (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        repository_id INTEGER NOT NULL REFERENCES repository(id),
        commit_id INTEGER NOT NULL REFERENCES commits(id),
        path TEXT NOT NULL,
        language TEXT,
        timestamp INTEGER NOT NULL,
        precursor_file_id INTEGER REFERENCES files(id)
    );
    CREATE INDEX IF NOT EXISTS idx_files_path ON files(repository_id, path, timestamp);
    CREATE INDEX IF NOT EXISTS idx_files_commit ON files(commit_id);

    CREATE TABLE IF NOT EXISTS versions (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        file_id INTEGER NOT NULL REFERENCES files(id),
        commit_id INTEGER NOT NULL REFERENCES commits(id),
        path TEXT NOT NULL,
        lines_added INTEGER NOT NULL,
        lines_deleted INTEGER NOT NULL,
        file_size INTEGER NOT NULL,
        deleted INTEGER NOT NULL DEFAULT 0,
        UNIQUE (file_id, commit_id)
    );
    CREATE INDEX IF NOT EXISTS idx_versions_commit ON versions(commit_id);

    CREATE TABLE IF NOT EXISTS lines (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        version_id INTEGER NOT NULL REFERENCES versions(id),
        line_number INTEGER NOT NULL,
        kind INTEGER NOT NULL,
        text TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_lines_version ON lines(version_id);

    CREATE TABLE IF NOT EXISTS issues (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        repository_id INTEGER NOT NULL REFERENCES repository(id),
        key TEXT NOT NULL,
        UNIQUE (repository_id, key)
    );

    CREATE TABLE IF NOT EXISTS commit_issues (
        commit_id INTEGER NOT NULL REFERENCES commits(id),
        issue_id INTEGER NOT NULL REFERENCES issues(id),
        PRIMARY KEY (commit_id, issue_id)
    );
";

/// Commit metadata written when a commit's batch starts.
#[derive(Debug, Clone)]
pub struct NewCommit<'a> {
    /// Owning repository.
    pub repository_id: i64,
    /// Backend commit identifier.
    pub hash: &'a str,
    /// Full message; truncated on insert.
    pub message: &'a str,
    /// Author name; truncated on insert.
    pub author: &'a str,
    /// Author email; truncated on insert.
    pub email: &'a str,
    /// Unix timestamp.
    pub timestamp: i64,
    /// Sizes of the four change sets: added, deleted, modified, renamed.
    pub counts: [usize; 4],
}

/// A file identity about to be created.
#[derive(Debug, Clone)]
pub struct NewFile<'a> {
    /// Owning repository.
    pub repository_id: i64,
    /// Commit row that introduced this identity.
    pub commit_id: i64,
    /// Repository-relative path.
    pub path: &'a str,
    /// Language tag from the extension map.
    pub language: Option<&'a str>,
    /// Validity start.
    pub timestamp: i64,
    /// File this one was renamed from.
    pub precursor_file_id: Option<i64>,
}

/// A persisted file identity.
///
/// # Examples
///
/// ```
/// use strata_store::FileRecord;
///
/// let file = FileRecord {
///     id: 1,
///     commit_id: 1,
///     path: "src/lib.rs".into(),
///     language: Some("rust".into()),
///     timestamp: 1_700_000_000,
///     precursor_file_id: None,
/// };
/// assert!(file.precursor_file_id.is_none());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    /// Row id.
    pub id: i64,
    /// Commit row that created it.
    pub commit_id: i64,
    /// Path.
    pub path: String,
    /// Language tag, if the extension is mapped.
    pub language: Option<String>,
    /// Validity start.
    pub timestamp: i64,
    /// Predecessor across a rename.
    pub precursor_file_id: Option<i64>,
}

/// A content version of a file in one commit.
#[derive(Debug, Clone)]
pub struct NewVersion<'a> {
    /// File identity.
    pub file_id: i64,
    /// Commit row.
    pub commit_id: i64,
    /// Path at this commit.
    pub path: &'a str,
    /// Lines added in forward time.
    pub lines_added: u64,
    /// Lines deleted in forward time.
    pub lines_deleted: u64,
    /// Recorded size in bytes.
    pub file_size: i64,
    /// Whether the commit deleted the file.
    pub deleted: bool,
}

/// Size and liveness recorded by a file's newest version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionState {
    /// Recorded size in bytes.
    pub file_size: i64,
    /// Whether that version deleted the file.
    pub deleted: bool,
}

/// SQLite-backed store of mined history.
///
/// # Examples
///
/// ```
/// use strata_store::Store;
///
/// let store = Store::in_memory().unwrap();
/// let id = store.register_repository("core", "/src/core").unwrap();
/// assert_eq!(store.register_repository("core", "/src/core").unwrap(), id);
/// ```
pub struct Store {
    pub(crate) conn: Connection,
}

impl Store {
    /// Open or create a database at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`StrataError::Database`] if the database cannot be opened or
    /// its schema created.
    pub fn open(path: &Path) -> Result<Self, StrataError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                StrataError::Database(format!("failed to create database directory: {e}"))
            })?;
        }
        let conn = Connection::open(path)
            .map_err(|e| StrataError::Database(format!("failed to open database: {e}")))?;
        let mode: String = conn
            .pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))
            .map_err(|e| StrataError::Database(format!("failed to enable WAL: {e}")))?;
        tracing::debug!(path = %path.display(), journal_mode = %mode, "opened database");

        let store = Self { conn };
        store.init_schema()?;
        Ok(store)
    }

    /// Create an in-memory store (for testing).
    ///
    /// # Errors
    ///
    /// Returns [`StrataError::Database`] if schema creation fails.
    pub fn in_memory() -> Result<Self, StrataError> {
        let conn = Connection::open_in_memory().map_err(|e| {
            StrataError::Database(format!("failed to create in-memory database: {e}"))
        })?;

        let store = Self { conn };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<(), StrataError> {
        self.conn
            .execute_batch("PRAGMA synchronous = NORMAL; PRAGMA foreign_keys = ON;")
            .map_err(|e| StrataError::Database(format!("failed to set pragmas: {e}")))?;
        self.conn
            .execute_batch(SCHEMA_SQL)
            .map_err(|e| StrataError::Database(format!("failed to create schema: {e}")))?;
        Ok(())
    }

    /// Resolve the repository row for `name`, creating it on first use.
    ///
    /// # Errors
    ///
    /// Returns [`StrataError::Database`] on query or insert failure.
    pub fn register_repository(&self, name: &str, url: &str) -> Result<i64, StrataError> {
        self.conn
            .execute(
                "INSERT OR IGNORE INTO repository (name, url) VALUES (?1, ?2)",
                params![name, truncate_chars(url, MAX_URL_CHARS)],
            )
            .map_err(|e| StrataError::Database(format!("failed to register repository: {e}")))?;

        self.repository_id(name)?.ok_or_else(|| {
            StrataError::Database(format!("repository '{name}' vanished after insert"))
        })
    }

    /// Id of the repository called `name`, if it was ever ingested.
    ///
    /// # Errors
    ///
    /// Returns [`StrataError::Database`] on query failure.
    pub fn repository_id(&self, name: &str) -> Result<Option<i64>, StrataError> {
        self.conn
            .query_row(
                "SELECT id FROM repository WHERE name = ?1",
                params![name],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| StrataError::Database(format!("failed to look up repository: {e}")))
    }

    /// Identifiers of every commit already fully ingested for `repository_id`.
    ///
    /// # Errors
    ///
    /// Returns [`StrataError::Database`] on query failure.
    pub fn completed_commits(&self, repository_id: i64) -> Result<HashSet<String>, StrataError> {
        let mut stmt = self
            .conn
            .prepare("SELECT hash FROM commits WHERE repository_id = ?1 AND complete = 1")
            .map_err(|e| StrataError::Database(format!("failed to prepare query: {e}")))?;

        let rows = stmt
            .query_map(params![repository_id], |row| row.get(0))
            .map_err(|e| StrataError::Database(format!("failed to query commits: {e}")))?;

        let mut hashes = HashSet::new();
        for row in rows {
            let hash: String =
                row.map_err(|e| StrataError::Database(format!("failed to read row: {e}")))?;
            hashes.insert(hash);
        }
        Ok(hashes)
    }

    /// Totals recorded on the most recently applied complete commit, or zero
    /// for a repository with no history yet.
    ///
    /// # Errors
    ///
    /// Returns [`StrataError::Database`] on query failure.
    pub fn latest_totals(&self, repository_id: i64) -> Result<Totals, StrataError> {
        let totals = self
            .conn
            .query_row(
                "SELECT project_size, project_file_count FROM commits
                 WHERE repository_id = ?1 AND complete = 1
                 ORDER BY id DESC LIMIT 1",
                params![repository_id],
                |row| {
                    Ok(Totals {
                        project_size: row.get(0)?,
                        file_count: row.get(1)?,
                    })
                },
            )
            .optional()
            .map_err(|e| StrataError::Database(format!("failed to read totals: {e}")))?;
        Ok(totals.unwrap_or_default())
    }

    /// Number of commit rows for `repository_id`, complete or not.
    ///
    /// # Errors
    ///
    /// Returns [`StrataError::Database`] on query failure.
    pub fn commit_count(&self, repository_id: i64) -> Result<usize, StrataError> {
        let count: i64 = self
            .conn
            .query_row(
                "SELECT COUNT(*) FROM commits WHERE repository_id = ?1",
                params![repository_id],
                |row| row.get(0),
            )
            .map_err(|e| StrataError::Database(format!("failed to count commits: {e}")))?;
        Ok(count as usize)
    }

    /// Latest file timestamp written by a complete commit, if any.
    ///
    /// # Errors
    ///
    /// Returns [`StrataError::Database`] on query failure.
    pub fn file_watermark(&self, repository_id: i64) -> Result<Option<i64>, StrataError> {
        self.conn
            .query_row(
                "SELECT MAX(f.timestamp) FROM files f
                 JOIN commits c ON c.id = f.commit_id
                 WHERE f.repository_id = ?1 AND c.complete = 1",
                params![repository_id],
                |row| row.get(0),
            )
            .map_err(|e| StrataError::Database(format!("failed to read file watermark: {e}")))
    }

    /// Source location recorded for `repository_id`.
    ///
    /// # Errors
    ///
    /// Returns [`StrataError::Database`] on query failure.
    pub fn repository_location(&self, repository_id: i64) -> Result<Option<String>, StrataError> {
        self.conn
            .query_row(
                "SELECT url FROM repository WHERE id = ?1",
                params![repository_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| StrataError::Database(format!("failed to read repository: {e}")))
    }

    /// Start an immediate write transaction.
    ///
    /// # Errors
    ///
    /// Returns [`StrataError::Database`] if the write lock cannot be taken.
    pub fn session(&mut self) -> Result<Session<'_>, StrataError> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|e| StrataError::Database(format!("failed to begin transaction: {e}")))?;
        Ok(Session { tx })
    }
}

/// One atomic batch of writes.
///
/// Nothing is visible to other connections until [`Session::commit`];
/// dropping an uncommitted session rolls it back.
pub struct Session<'a> {
    tx: Transaction<'a>,
}

impl Session<'_> {
    /// Insert the commit row, or reclaim it if a previous run left it
    /// incomplete. Returns the commit row id.
    ///
    /// # Errors
    ///
    /// Returns [`StrataError::Database`] if the commit is already complete or
    /// a statement fails.
    pub fn begin_commit(&self, commit: &NewCommit<'_>) -> Result<i64, StrataError> {
        let existing: Option<(i64, bool)> = self
            .tx
            .query_row(
                "SELECT id, complete FROM commits WHERE repository_id = ?1 AND hash = ?2",
                params![commit.repository_id, commit.hash],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .map_err(|e| StrataError::Database(format!("failed to look up commit: {e}")))?;

        let [added, deleted, modified, renamed] = commit.counts.map(|n| n as i64);
        let message = truncate_chars(commit.message, MAX_MESSAGE_CHARS);
        let author = truncate_chars(commit.author, MAX_AUTHOR_CHARS);
        let email = truncate_chars(commit.email, MAX_AUTHOR_CHARS);

        match existing {
            Some((_, true)) => Err(StrataError::Database(format!(
                "commit {} is already ingested",
                commit.hash
            ))),
            Some((id, false)) => {
                tracing::debug!(commit = commit.hash, "reclaiming incomplete commit");
                self.purge_commit(id)?;
                self.tx
                    .execute(
                        "UPDATE commits SET message = ?2, author = ?3, email = ?4, timestamp = ?5,
                         added_files = ?6, deleted_files = ?7, modified_files = ?8,
                         renamed_files = ?9
                         WHERE id = ?1",
                        params![id, message, author, email, commit.timestamp, added, deleted, modified, renamed],
                    )
                    .map_err(|e| StrataError::Database(format!("failed to update commit: {e}")))?;
                Ok(id)
            }
            None => {
                self.tx
                    .execute(
                        "INSERT INTO commits
                         (repository_id, hash, message, author, email, timestamp,
                          added_files, deleted_files, modified_files, renamed_files)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                        params![
                            commit.repository_id,
                            commit.hash,
                            message,
                            author,
                            email,
                            commit.timestamp,
                            added,
                            deleted,
                            modified,
                            renamed
                        ],
                    )
                    .map_err(|e| StrataError::Database(format!("failed to insert commit: {e}")))?;
                Ok(self.tx.last_insert_rowid())
            }
        }
    }

    fn purge_commit(&self, commit_id: i64) -> Result<(), StrataError> {
        self.tx
            .execute_batch(&format!(
                "DELETE FROM lines WHERE version_id IN
                     (SELECT id FROM versions WHERE commit_id = {commit_id});
                 DELETE FROM versions WHERE commit_id = {commit_id};
                 DELETE FROM files WHERE commit_id = {commit_id};
                 DELETE FROM commit_issues WHERE commit_id = {commit_id};"
            ))
            .map_err(|e| StrataError::Database(format!("failed to purge commit rows: {e}")))
    }

    /// Most recent file row for `path` with timestamp at or before `as_of`,
    /// ignoring rows created by `exclude_commit_id`.
    ///
    /// # Errors
    ///
    /// Returns [`StrataError::Database`] on query failure.
    pub fn latest_file(
        &self,
        repository_id: i64,
        path: &str,
        as_of: i64,
        exclude_commit_id: i64,
    ) -> Result<Option<FileRecord>, StrataError> {
        latest_file(&self.tx, repository_id, path, as_of, Some(exclude_commit_id))
    }

    /// Newest version of `file_id`, if it has one.
    ///
    /// # Errors
    ///
    /// Returns [`StrataError::Database`] on query failure.
    pub fn latest_version(&self, file_id: i64) -> Result<Option<VersionState>, StrataError> {
        self.tx
            .query_row(
                "SELECT file_size, deleted FROM versions WHERE file_id = ?1
                 ORDER BY id DESC LIMIT 1",
                params![file_id],
                |row| {
                    Ok(VersionState {
                        file_size: row.get(0)?,
                        deleted: row.get(1)?,
                    })
                },
            )
            .optional()
            .map_err(|e| StrataError::Database(format!("failed to read file version: {e}")))
    }

    /// Insert a file identity and return its id.
    ///
    /// # Errors
    ///
    /// Returns [`StrataError::Database`] on insert failure.
    pub fn insert_file(&self, file: &NewFile<'_>) -> Result<i64, StrataError> {
        self.tx
            .execute(
                "INSERT INTO files
                 (repository_id, commit_id, path, language, timestamp, precursor_file_id)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    file.repository_id,
                    file.commit_id,
                    truncate_chars(file.path, MAX_PATH_CHARS),
                    file.language,
                    file.timestamp,
                    file.precursor_file_id
                ],
            )
            .map_err(|e| StrataError::Database(format!("failed to insert file: {e}")))?;
        Ok(self.tx.last_insert_rowid())
    }

    /// Insert a version and return its id. A second version for the same
    /// file and commit reuses the existing row.
    ///
    /// # Errors
    ///
    /// Returns [`StrataError::Database`] on insert failure.
    pub fn insert_version(&self, version: &NewVersion<'_>) -> Result<i64, StrataError> {
        let inserted = self
            .tx
            .execute(
                "INSERT OR IGNORE INTO versions
                 (file_id, commit_id, path, lines_added, lines_deleted, file_size, deleted)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    version.file_id,
                    version.commit_id,
                    truncate_chars(version.path, MAX_PATH_CHARS),
                    version.lines_added as i64,
                    version.lines_deleted as i64,
                    version.file_size,
                    version.deleted
                ],
            )
            .map_err(|e| StrataError::Database(format!("failed to insert version: {e}")))?;
        if inserted == 1 {
            return Ok(self.tx.last_insert_rowid());
        }

        tracing::debug!(path = version.path, "version already recorded for this commit");
        self.tx
            .query_row(
                "SELECT id FROM versions WHERE file_id = ?1 AND commit_id = ?2",
                params![version.file_id, version.commit_id],
                |row| row.get(0),
            )
            .map_err(|e| StrataError::Database(format!("failed to re-read version: {e}")))
    }

    /// Insert the changed lines of a version.
    ///
    /// # Errors
    ///
    /// Returns [`StrataError::Database`] on insert failure.
    pub fn insert_lines(&self, version_id: i64, lines: &[LineEvent]) -> Result<(), StrataError> {
        let mut stmt = self
            .tx
            .prepare_cached(
                "INSERT INTO lines (version_id, line_number, kind, text) VALUES (?1, ?2, ?3, ?4)",
            )
            .map_err(|e| StrataError::Database(format!("failed to prepare insert: {e}")))?;

        for line in lines {
            stmt.execute(params![
                version_id,
                line.number,
                line.kind.code(),
                truncate_chars(&line.text, MAX_LINE_CHARS)
            ])
            .map_err(|e| StrataError::Database(format!("failed to insert line: {e}")))?;
        }
        Ok(())
    }

    /// Resolve the issue row for `key`, creating it on first use.
    ///
    /// # Errors
    ///
    /// Returns [`StrataError::Database`] on query or insert failure.
    pub fn upsert_issue(&self, repository_id: i64, key: &str) -> Result<i64, StrataError> {
        self.tx
            .execute(
                "INSERT OR IGNORE INTO issues (repository_id, key) VALUES (?1, ?2)",
                params![repository_id, key],
            )
            .map_err(|e| StrataError::Database(format!("failed to insert issue: {e}")))?;
        self.tx
            .query_row(
                "SELECT id FROM issues WHERE repository_id = ?1 AND key = ?2",
                params![repository_id, key],
                |row| row.get(0),
            )
            .map_err(|e| StrataError::Database(format!("failed to read issue: {e}")))
    }

    /// Link a commit to an issue.
    ///
    /// # Errors
    ///
    /// Returns [`StrataError::Database`] on insert failure.
    pub fn link_issue(&self, commit_id: i64, issue_id: i64) -> Result<(), StrataError> {
        self.tx
            .execute(
                "INSERT OR IGNORE INTO commit_issues (commit_id, issue_id) VALUES (?1, ?2)",
                params![commit_id, issue_id],
            )
            .map_err(|e| StrataError::Database(format!("failed to link issue: {e}")))?;
        Ok(())
    }

    /// Record the running totals after this commit.
    ///
    /// # Errors
    ///
    /// Returns [`StrataError::Database`] on update failure.
    pub fn set_totals(&self, commit_id: i64, totals: Totals) -> Result<(), StrataError> {
        self.tx
            .execute(
                "UPDATE commits SET project_size = ?2, project_file_count = ?3 WHERE id = ?1",
                params![commit_id, totals.project_size, totals.file_count],
            )
            .map_err(|e| StrataError::Database(format!("failed to record totals: {e}")))?;
        Ok(())
    }

    /// Flag a commit whose derived rows are all durable.
    ///
    /// # Errors
    ///
    /// Returns [`StrataError::Database`] on update failure.
    pub fn mark_complete(&self, commit_id: i64) -> Result<(), StrataError> {
        self.tx
            .execute(
                "UPDATE commits SET complete = 1 WHERE id = ?1",
                params![commit_id],
            )
            .map_err(|e| StrataError::Database(format!("failed to mark commit complete: {e}")))?;
        Ok(())
    }

    /// Apply the batch durably.
    ///
    /// # Errors
    ///
    /// Returns [`StrataError::Database`] if the commit fails; the batch is
    /// rolled back.
    pub fn commit(self) -> Result<(), StrataError> {
        self.tx
            .commit()
            .map_err(|e| StrataError::Database(format!("failed to commit transaction: {e}")))
    }

    /// Discard the batch.
    ///
    /// # Errors
    ///
    /// Returns [`StrataError::Database`] if the rollback fails.
    pub fn close(self) -> Result<(), StrataError> {
        self.tx
            .rollback()
            .map_err(|e| StrataError::Database(format!("failed to roll back transaction: {e}")))
    }
}

pub(crate) fn latest_file(
    conn: &Connection,
    repository_id: i64,
    path: &str,
    as_of: i64,
    exclude_commit_id: Option<i64>,
) -> Result<Option<FileRecord>, StrataError> {
    conn.query_row(
        "SELECT id, commit_id, path, language, timestamp, precursor_file_id FROM files
         WHERE repository_id = ?1 AND path = ?2 AND timestamp <= ?3
           AND commit_id <> ?4
         ORDER BY timestamp DESC, id DESC LIMIT 1",
        params![
            repository_id,
            truncate_chars(path, MAX_PATH_CHARS),
            as_of,
            exclude_commit_id.unwrap_or(-1)
        ],
        file_record,
    )
    .optional()
    .map_err(|e| StrataError::Database(format!("failed to look up file: {e}")))
}

pub(crate) fn file_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<FileRecord> {
    Ok(FileRecord {
        id: row.get(0)?,
        commit_id: row.get(1)?,
        path: row.get(2)?,
        language: row.get(3)?,
        timestamp: row.get(4)?,
        precursor_file_id: row.get(5)?,
    })
}
