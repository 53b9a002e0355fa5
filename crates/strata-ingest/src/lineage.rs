//! File identity resolution across renames.

use strata_core::StrataError;
use strata_store::{FileRecord, Session};

/// Finds the persisted file a path refers to at a point in time.
///
/// Lookups ignore rows written by the commit being applied, so a commit
/// never resolves against its own files.
///
/// Commit times are not monotonic along a branch. File rows are stamped
/// with an effective timestamp that never falls below the newest file row
/// already applied, so a timestamp lookup always sees every earlier commit.
#[derive(Debug, Clone, Copy)]
pub struct LineageTracker {
    repository_id: i64,
    watermark: Option<i64>,
}

impl LineageTracker {
    /// Tracker for one repository with no applied history.
    pub fn new(repository_id: i64) -> Self {
        Self {
            repository_id,
            watermark: None,
        }
    }

    /// Continue after history whose newest file row is stamped `watermark`.
    pub fn resume_after(mut self, watermark: Option<i64>) -> Self {
        self.watermark = watermark;
        self
    }

    /// Timestamp to stamp and query file rows of a commit made at
    /// `committed`.
    ///
    /// # Examples
    ///
    /// ```
    /// use strata_ingest::lineage::LineageTracker;
    ///
    /// let mut tracker = LineageTracker::new(1);
    /// tracker.advance(2000);
    /// assert_eq!(tracker.effective_timestamp(1000), 2000);
    /// assert_eq!(tracker.effective_timestamp(3000), 3000);
    /// ```
    pub fn effective_timestamp(&self, committed: i64) -> i64 {
        self.watermark.map_or(committed, |w| w.max(committed))
    }

    /// Record that a commit made at `committed` was applied.
    pub fn advance(&mut self, committed: i64) {
        self.watermark = Some(self.effective_timestamp(committed));
    }

    /// Current owner of `path` as of `as_of`, excluding files created by
    /// `commit_id`.
    ///
    /// # Errors
    ///
    /// Returns [`StrataError::Database`] on query failure.
    pub fn current_file(
        &self,
        session: &Session<'_>,
        path: &str,
        as_of: i64,
        commit_id: i64,
    ) -> Result<Option<FileRecord>, StrataError> {
        session.latest_file(self.repository_id, path, as_of, commit_id)
    }

    /// Precursor of a rename from `old_path` to `new_path`.
    ///
    /// Returns `None`, with a warning, when `old_path` was never tracked; the
    /// caller then records `new_path` as a new file.
    ///
    /// # Errors
    ///
    /// Returns [`StrataError::Database`] on query failure.
    pub fn resolve_rename(
        &self,
        session: &Session<'_>,
        old_path: &str,
        new_path: &str,
        as_of: i64,
        commit_id: i64,
    ) -> Result<Option<FileRecord>, StrataError> {
        let precursor = self.current_file(session, old_path, as_of, commit_id)?;
        match &precursor {
            Some(file) => tracing::debug!(
                from = old_path,
                to = new_path,
                precursor = file.id,
                "linked rename"
            ),
            None => tracing::warn!(
                from = old_path,
                to = new_path,
                "rename source was never tracked, recording as added"
            ),
        }
        Ok(precursor)
    }
}
