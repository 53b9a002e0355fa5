//! Seams between the ingester and a version-control system.

use strata_core::{CommitDescriptor, PreviousCommit, RawChange, StrataError};

/// How a branch's history is walked.
///
/// # Examples
///
/// ```
/// use strata_gitpulse::backend::WalkOptions;
///
/// let opts = WalkOptions::default();
/// assert_eq!(opts.branch, "master");
/// assert!(opts.first_parent);
/// ```
#[derive(Debug, Clone)]
pub struct WalkOptions {
    /// Branch to walk (default: `master`).
    pub branch: String,
    /// Follow only first parents (default: true).
    pub first_parent: bool,
}

impl Default for WalkOptions {
    fn default() -> Self {
        Self {
            branch: "master".into(),
            first_parent: true,
        }
    }
}

/// A version-control repository shared by all ingestion workers.
///
/// Implementations must be `Sync`; per-thread state lives in the
/// [`BackendHandle`] each worker opens for itself.
pub trait VcsBackend: Sync {
    /// Per-worker accessor.
    type Handle: BackendHandle;

    /// Location recorded on the repository row.
    fn location(&self) -> String;

    /// Commits of the walked branch, oldest first. A parent is always listed
    /// before its children.
    ///
    /// # Errors
    ///
    /// Returns [`StrataError::Vcs`] if the branch cannot be resolved or walked.
    fn list_commits(&self, options: &WalkOptions) -> Result<Vec<CommitDescriptor>, StrataError>;

    /// Open an independent handle for one worker thread.
    ///
    /// # Errors
    ///
    /// Returns [`StrataError::Vcs`] if the repository cannot be opened.
    fn open_handle(&self) -> Result<Self::Handle, StrataError>;
}

/// Per-worker access to commit contents.
pub trait BackendHandle {
    /// Structural diff between `previous` and `commit`, one entry per path.
    ///
    /// # Errors
    ///
    /// Returns [`StrataError::Vcs`] if either side cannot be read.
    fn classify_changes(
        &self,
        commit: &str,
        previous: &PreviousCommit,
    ) -> Result<Vec<RawChange>, StrataError>;

    /// Unified diff text for `path` comparing `commit` against `previous`,
    /// i.e. lines only present in `commit` carry a `-` marker. `path` is the
    /// forward-time path: the new path for additions, modifications and
    /// renames, the old path for deletions. Empty when the path has no
    /// textual change.
    ///
    /// # Errors
    ///
    /// Returns [`StrataError::Vcs`] if the diff cannot be produced.
    fn unified_diff(
        &self,
        commit: &str,
        previous: &PreviousCommit,
        path: &str,
    ) -> Result<String, StrataError>;
}
