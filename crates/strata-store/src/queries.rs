//! Read-only analytics over ingested history.

use std::collections::HashSet;

use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};
use strata_core::{LineEvent, LineKind, StrataError, Totals};

use crate::store::{file_record, latest_file, Store};

/// One link of a file's rename chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineageEntry {
    /// File row id.
    pub file_id: i64,
    /// Path of this identity.
    pub path: String,
    /// Validity start.
    pub timestamp: i64,
    /// Commit that created the identity.
    pub commit: String,
    /// Predecessor, if the identity came from a rename.
    pub precursor_file_id: Option<i64>,
}

/// Line activity over a time window.
///
/// # Examples
///
/// ```
/// use strata_store::ChurnReport;
///
/// let report = ChurnReport { from: 0, to: 10, commits: 2, lines_added: 7, lines_deleted: 3 };
/// assert_eq!(report.churn(), 10);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChurnReport {
    /// Window start (inclusive), unix seconds.
    pub from: i64,
    /// Window end (exclusive), unix seconds.
    pub to: i64,
    /// Complete commits inside the window.
    pub commits: i64,
    /// Lines added by those commits.
    pub lines_added: i64,
    /// Lines deleted by those commits.
    pub lines_deleted: i64,
}

impl ChurnReport {
    /// Added plus deleted lines.
    pub fn churn(&self) -> i64 {
        self.lines_added + self.lines_deleted
    }
}

/// A commit ranked by how many files it touched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitSummary {
    /// Commit identifier.
    pub hash: String,
    /// Unix timestamp.
    pub timestamp: i64,
    /// Sum of the four change counts.
    pub file_changes: i64,
    /// First line of the message.
    pub summary: String,
}

/// Activity of one calendar year (UTC).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct YearStats {
    /// Calendar year.
    pub year: i32,
    /// Complete commits in the year.
    pub commits: i64,
    /// Files added, deleted, modified or renamed.
    pub file_changes: i64,
    /// `file_changes / commits`.
    pub changes_per_commit: f64,
    /// Largest commits by file changes, biggest first.
    pub top_commits: Vec<CommitSummary>,
}

/// Row totals of one repository.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RowCounts {
    /// Commit rows, complete or not.
    pub commits: i64,
    /// File identities.
    pub files: i64,
    /// File versions.
    pub versions: i64,
    /// Changed lines.
    pub lines: i64,
    /// Distinct issue keys.
    pub issues: i64,
    /// Commit to issue links.
    pub issue_links: i64,
}

const FILE_CHANGES: &str = "(added_files + deleted_files + modified_files + renamed_files)";

impl Store {
    /// Latest file for `path` as of `as_of`, followed by its precursors,
    /// newest first. Empty if the path was never tracked by then.
    ///
    /// # Errors
    ///
    /// Returns [`StrataError::Database`] on query failure.
    pub fn lineage(
        &self,
        repository_id: i64,
        path: &str,
        as_of: i64,
    ) -> Result<Vec<LineageEntry>, StrataError> {
        let mut chain = Vec::new();
        let mut seen = HashSet::new();
        let mut current = latest_file(&self.conn, repository_id, path, as_of, None)?;

        while let Some(file) = current {
            if !seen.insert(file.id) {
                tracing::warn!(file_id = file.id, "precursor cycle detected");
                break;
            }
            let commit: String = self
                .conn
                .query_row(
                    "SELECT hash FROM commits WHERE id = ?1",
                    params![file.commit_id],
                    |row| row.get(0),
                )
                .map_err(|e| StrataError::Database(format!("failed to read commit: {e}")))?;

            current = match file.precursor_file_id {
                Some(id) => self
                    .conn
                    .query_row(
                        "SELECT id, commit_id, path, language, timestamp, precursor_file_id
                         FROM files WHERE id = ?1",
                        params![id],
                        file_record,
                    )
                    .optional()
                    .map_err(|e| StrataError::Database(format!("failed to read file: {e}")))?,
                None => None,
            };
            chain.push(LineageEntry {
                file_id: file.id,
                path: file.path,
                timestamp: file.timestamp,
                commit,
                precursor_file_id: file.precursor_file_id,
            });
        }
        Ok(chain)
    }

    /// Lines added and deleted by complete commits with `from <= timestamp < to`.
    ///
    /// # Errors
    ///
    /// Returns [`StrataError::Database`] on query failure.
    pub fn churn(&self, repository_id: i64, from: i64, to: i64) -> Result<ChurnReport, StrataError> {
        let (commits, lines_added, lines_deleted) = self
            .conn
            .query_row(
                "SELECT COUNT(DISTINCT c.id),
                        COALESCE(SUM(v.lines_added), 0),
                        COALESCE(SUM(v.lines_deleted), 0)
                 FROM commits c LEFT JOIN versions v ON v.commit_id = c.id
                 WHERE c.repository_id = ?1 AND c.complete = 1
                   AND c.timestamp >= ?2 AND c.timestamp < ?3",
                params![repository_id, from, to],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .map_err(|e| StrataError::Database(format!("failed to compute churn: {e}")))?;

        Ok(ChurnReport {
            from,
            to,
            commits,
            lines_added,
            lines_deleted,
        })
    }

    /// Per-year commit and file-change counts with the `top` largest commits
    /// of each year.
    ///
    /// # Errors
    ///
    /// Returns [`StrataError::Database`] on query failure.
    pub fn yearly_stats(&self, repository_id: i64, top: usize) -> Result<Vec<YearStats>, StrataError> {
        let mut stmt = self
            .conn
            .prepare(&format!(
                "SELECT CAST(strftime('%Y', timestamp, 'unixepoch') AS INTEGER) AS year,
                        COUNT(*), SUM({FILE_CHANGES})
                 FROM commits WHERE repository_id = ?1 AND complete = 1
                 GROUP BY year ORDER BY year"
            ))
            .map_err(|e| StrataError::Database(format!("failed to prepare query: {e}")))?;

        let rows = stmt
            .query_map(params![repository_id], |row| {
                Ok((row.get::<_, i32>(0)?, row.get::<_, i64>(1)?, row.get::<_, i64>(2)?))
            })
            .map_err(|e| StrataError::Database(format!("failed to query years: {e}")))?;

        let mut years = Vec::new();
        for row in rows {
            let (year, commits, file_changes) =
                row.map_err(|e| StrataError::Database(format!("failed to read row: {e}")))?;
            let changes_per_commit = if commits > 0 {
                file_changes as f64 / commits as f64
            } else {
                0.0
            };
            years.push(YearStats {
                year,
                commits,
                file_changes,
                changes_per_commit,
                top_commits: self.top_commits(repository_id, year, top)?,
            });
        }
        Ok(years)
    }

    fn top_commits(
        &self,
        repository_id: i64,
        year: i32,
        limit: usize,
    ) -> Result<Vec<CommitSummary>, StrataError> {
        let mut stmt = self
            .conn
            .prepare(&format!(
                "SELECT hash, timestamp, {FILE_CHANGES}, message FROM commits
                 WHERE repository_id = ?1 AND complete = 1
                   AND CAST(strftime('%Y', timestamp, 'unixepoch') AS INTEGER) = ?2
                 ORDER BY 3 DESC, timestamp ASC, id ASC LIMIT ?3"
            ))
            .map_err(|e| StrataError::Database(format!("failed to prepare query: {e}")))?;

        let rows = stmt
            .query_map(params![repository_id, year, limit as i64], |row| {
                let message: String = row.get(3)?;
                Ok(CommitSummary {
                    hash: row.get(0)?,
                    timestamp: row.get(1)?,
                    file_changes: row.get(2)?,
                    summary: message.lines().next().unwrap_or("").to_string(),
                })
            })
            .map_err(|e| StrataError::Database(format!("failed to query commits: {e}")))?;

        let mut commits = Vec::new();
        for row in rows {
            commits.push(row.map_err(|e| StrataError::Database(format!("failed to read row: {e}")))?);
        }
        Ok(commits)
    }

    /// Number of rows of each kind stored for `repository_id`.
    ///
    /// # Errors
    ///
    /// Returns [`StrataError::Database`] on query failure.
    pub fn row_counts(&self, repository_id: i64) -> Result<RowCounts, StrataError> {
        self.conn
            .query_row(
                "SELECT
                    (SELECT COUNT(*) FROM commits WHERE repository_id = ?1),
                    (SELECT COUNT(*) FROM files WHERE repository_id = ?1),
                    (SELECT COUNT(*) FROM versions v JOIN files f ON f.id = v.file_id
                        WHERE f.repository_id = ?1),
                    (SELECT COUNT(*) FROM lines l JOIN versions v ON v.id = l.version_id
                        JOIN files f ON f.id = v.file_id WHERE f.repository_id = ?1),
                    (SELECT COUNT(*) FROM issues WHERE repository_id = ?1),
                    (SELECT COUNT(*) FROM commit_issues ci JOIN commits c ON c.id = ci.commit_id
                        WHERE c.repository_id = ?1)",
                params![repository_id],
                |row| {
                    Ok(RowCounts {
                        commits: row.get(0)?,
                        files: row.get(1)?,
                        versions: row.get(2)?,
                        lines: row.get(3)?,
                        issues: row.get(4)?,
                        issue_links: row.get(5)?,
                    })
                },
            )
            .map_err(|e| StrataError::Database(format!("failed to count rows: {e}")))
    }

    /// Running totals recorded on the complete commit `hash`.
    ///
    /// # Errors
    ///
    /// Returns [`StrataError::Database`] on query failure.
    pub fn commit_totals(&self, repository_id: i64, hash: &str) -> Result<Option<Totals>, StrataError> {
        self.conn
            .query_row(
                "SELECT project_size, project_file_count FROM commits
                 WHERE repository_id = ?1 AND hash = ?2 AND complete = 1",
                params![repository_id, hash],
                |row| {
                    Ok(Totals {
                        project_size: row.get(0)?,
                        file_count: row.get(1)?,
                    })
                },
            )
            .optional()
            .map_err(|e| StrataError::Database(format!("failed to read commit totals: {e}")))
    }

    /// Changed lines recorded for `path` in commit `hash`, in diff order.
    ///
    /// # Errors
    ///
    /// Returns [`StrataError::Database`] on query failure.
    pub fn changed_lines(
        &self,
        repository_id: i64,
        hash: &str,
        path: &str,
    ) -> Result<Vec<LineEvent>, StrataError> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT l.line_number, l.kind, l.text FROM lines l
                 JOIN versions v ON v.id = l.version_id
                 JOIN commits c ON c.id = v.commit_id
                 WHERE c.repository_id = ?1 AND c.hash = ?2 AND v.path = ?3
                 ORDER BY l.id",
            )
            .map_err(|e| StrataError::Database(format!("failed to prepare query: {e}")))?;

        let rows = stmt
            .query_map(params![repository_id, hash, path], |row| {
                Ok((row.get::<_, u32>(0)?, row.get::<_, i64>(1)?, row.get::<_, String>(2)?))
            })
            .map_err(|e| StrataError::Database(format!("failed to query lines: {e}")))?;

        let mut lines = Vec::new();
        for row in rows {
            let (number, code, text) =
                row.map_err(|e| StrataError::Database(format!("failed to read row: {e}")))?;
            let kind = LineKind::from_code(code)
                .ok_or_else(|| StrataError::Database(format!("unknown line kind {code}")))?;
            lines.push(LineEvent { number, kind, text });
        }
        Ok(lines)
    }
}
