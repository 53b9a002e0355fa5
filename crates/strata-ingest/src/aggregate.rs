//! Running project size and file count per repository.

use std::collections::HashMap;
use std::sync::Mutex;

use strata_core::{StrataError, Totals};
use strata_store::Store;

/// Signed size and file-count change accumulated over one commit.
///
/// # Examples
///
/// ```
/// use strata_ingest::aggregate::CommitDelta;
///
/// let mut delta = CommitDelta::default();
/// delta.added(120);
/// delta.modified(80, 100);
/// delta.deleted(30);
/// assert_eq!(delta.size, 120 - 20 - 30);
/// assert_eq!(delta.files, 0);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommitDelta {
    /// Bytes gained (negative when shrinking).
    pub size: i64,
    /// Files gained (negative when removing).
    pub files: i64,
}

impl CommitDelta {
    /// A new file of `size` bytes.
    pub fn added(&mut self, size: i64) {
        self.size += size;
        self.files += 1;
    }

    /// A file whose last recorded size was `previous_size` was removed.
    pub fn deleted(&mut self, previous_size: i64) {
        self.size -= previous_size;
        self.files -= 1;
    }

    /// A file changed from `previous_size` to `size` bytes.
    pub fn modified(&mut self, size: i64, previous_size: i64) {
        self.size += size - previous_size;
    }

    /// Whether the commit changes neither size nor count.
    pub fn is_zero(&self) -> bool {
        self.size == 0 && self.files == 0
    }
}

/// Per-repository running totals.
///
/// Totals are seeded from the store once and then advanced in memory, one
/// commit at a time. The lock serializes every update for a repository, so
/// commit *n* always builds on the totals of commit *n - 1*.
///
/// # Examples
///
/// ```
/// use strata_core::Totals;
/// use strata_ingest::aggregate::{AggregateMetricsTracker, CommitDelta};
///
/// let tracker = AggregateMetricsTracker::new();
/// tracker.seed(1, Totals { project_size: 100, file_count: 2 });
/// let totals = tracker.apply(1, CommitDelta { size: -40, files: 1 }).unwrap();
/// assert_eq!(totals, Totals { project_size: 60, file_count: 3 });
/// ```
#[derive(Debug, Default)]
pub struct AggregateMetricsTracker {
    totals: Mutex<HashMap<i64, Totals>>,
}

impl AggregateMetricsTracker {
    /// Empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed `repository_id` from the totals of its latest complete commit.
    ///
    /// # Errors
    ///
    /// Returns [`StrataError::Database`] if the totals cannot be read.
    pub fn load(&self, store: &Store, repository_id: i64) -> Result<Totals, StrataError> {
        let totals = store.latest_totals(repository_id)?;
        self.seed(repository_id, totals);
        tracing::debug!(
            repository_id,
            project_size = totals.project_size,
            file_count = totals.file_count,
            "loaded running totals"
        );
        Ok(totals)
    }

    /// Set the running totals of `repository_id`.
    pub fn seed(&self, repository_id: i64, totals: Totals) {
        self.lock().insert(repository_id, totals);
    }

    /// Current totals of `repository_id`, if seeded.
    pub fn current(&self, repository_id: i64) -> Option<Totals> {
        self.lock().get(&repository_id).copied()
    }

    /// Advance `repository_id` by one commit's delta and return the new
    /// totals.
    ///
    /// # Errors
    ///
    /// Returns [`StrataError::Database`] if the repository was never seeded
    /// or was invalidated since.
    pub fn apply(&self, repository_id: i64, delta: CommitDelta) -> Result<Totals, StrataError> {
        let mut totals = self.lock();
        let entry = totals.get_mut(&repository_id).ok_or_else(|| {
            StrataError::Database(format!("running totals of repository {repository_id} are not loaded"))
        })?;
        *entry = entry.advance(delta.size, delta.files);
        Ok(*entry)
    }

    /// Forget the in-memory totals of `repository_id`, e.g. after the batch
    /// that advanced them was rolled back.
    pub fn invalidate(&self, repository_id: i64) {
        self.lock().remove(&repository_id);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<i64, Totals>> {
        // a poisoned map still holds consistent totals: every update is a single insert
        self.totals
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
