use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Hash of git's empty tree, used as the baseline of a root commit.
pub const EMPTY_TREE_ID: &str = "4b825dc642cb6eb9a060e54bf8d69288fbee4904";

/// A commit as listed by the version-control backend.
///
/// # Examples
///
/// ```
/// use strata_core::CommitDescriptor;
///
/// let commit = CommitDescriptor {
///     id: "9fceb02".into(),
///     parents: vec![],
///     author: "alice".into(),
///     email: "alice@example.com".into(),
///     message: "initial import".into(),
///     timestamp: 1_700_000_000,
/// };
/// assert!(commit.is_root());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitDescriptor {
    /// Stable commit identifier (full hash).
    pub id: String,
    /// Parent identifiers, first parent first.
    pub parents: Vec<String>,
    /// Author name.
    pub author: String,
    /// Author email.
    pub email: String,
    /// Full commit message.
    pub message: String,
    /// Unix timestamp of the commit.
    pub timestamp: i64,
}

impl CommitDescriptor {
    /// Whether the commit has no parent.
    pub fn is_root(&self) -> bool {
        self.parents.is_empty()
    }

    /// Whether the commit has more than one parent.
    pub fn is_merge(&self) -> bool {
        self.parents.len() > 1
    }

    /// The baseline this commit is compared against: its first parent, or
    /// the empty tree for a root commit.
    pub fn previous(&self) -> PreviousCommit {
        match self.parents.first() {
            Some(parent) => PreviousCommit::Commit(parent.clone()),
            None => PreviousCommit::EmptyTree,
        }
    }
}

/// Baseline side of a commit comparison.
///
/// # Examples
///
/// ```
/// use strata_core::{PreviousCommit, EMPTY_TREE_ID};
///
/// assert_eq!(PreviousCommit::EmptyTree.id(), EMPTY_TREE_ID);
/// assert_eq!(PreviousCommit::Commit("abc".into()).id(), "abc");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PreviousCommit {
    /// A real parent commit.
    Commit(String),
    /// Sentinel for root commits: every file appears added.
    EmptyTree,
}

impl PreviousCommit {
    /// Identifier of the baseline; the empty tree hash for the sentinel.
    pub fn id(&self) -> &str {
        match self {
            PreviousCommit::Commit(id) => id,
            PreviousCommit::EmptyTree => EMPTY_TREE_ID,
        }
    }

    /// Whether this is the empty-tree sentinel.
    pub fn is_empty_tree(&self) -> bool {
        matches!(self, PreviousCommit::EmptyTree)
    }
}

/// Backend classification of a single changed path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    /// Present only in the new commit.
    Added,
    /// Present only in the previous commit.
    Deleted,
    /// Present in both, content changed.
    Modified,
    /// Moved from another path.
    Renamed {
        /// Path in the previous commit.
        from: String,
    },
}

/// One entry of the backend's structural diff between two commits.
///
/// `path` is the path on the new side (the old side for deletions) and
/// `size` the byte size of the blob on that side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawChange {
    /// Path the change applies to.
    pub path: String,
    /// Classification reported by the backend.
    pub kind: ChangeKind,
    /// Blob size in bytes.
    pub size: u64,
}

/// A changed file with its blob size.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileChange {
    /// Repository-relative path.
    pub path: String,
    /// Blob size in bytes on the side where the file exists.
    pub size: u64,
}

/// A rename pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenamedFile {
    /// Path before the rename.
    pub old_path: String,
    /// Path after the rename.
    pub new_path: String,
    /// Blob size of the new path.
    pub size: u64,
}

/// Four disjoint change sets for one commit.
///
/// # Examples
///
/// ```
/// use strata_core::ChangeSet;
///
/// let changes = ChangeSet::default();
/// assert!(changes.is_empty());
/// assert_eq!(changes.len(), 0);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeSet {
    /// Files that appear in this commit.
    pub added: Vec<FileChange>,
    /// Files removed by this commit.
    pub deleted: Vec<FileChange>,
    /// Files whose content changed in place.
    pub modified: Vec<FileChange>,
    /// Files moved to a new path.
    pub renamed: Vec<RenamedFile>,
}

impl ChangeSet {
    /// Whether all four sets are empty.
    pub fn is_empty(&self) -> bool {
        self.added.is_empty()
            && self.deleted.is_empty()
            && self.modified.is_empty()
            && self.renamed.is_empty()
    }

    /// Total number of changed files.
    pub fn len(&self) -> usize {
        self.added.len() + self.deleted.len() + self.modified.len() + self.renamed.len()
    }
}

/// Direction of a changed line in forward time.
///
/// # Examples
///
/// ```
/// use strata_core::LineKind;
///
/// assert_eq!(LineKind::Added.to_string(), "added");
/// assert_eq!(LineKind::Deleted.code(), 0);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineKind {
    /// Line introduced by the commit.
    Added,
    /// Line removed by the commit.
    Deleted,
}

impl LineKind {
    /// Integer tag stored in the `lines` table (1 = added, 0 = deleted).
    pub fn code(self) -> i64 {
        match self {
            LineKind::Added => 1,
            LineKind::Deleted => 0,
        }
    }

    /// Inverse of [`LineKind::code`].
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            1 => Some(LineKind::Added),
            0 => Some(LineKind::Deleted),
            _ => None,
        }
    }
}

impl fmt::Display for LineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LineKind::Added => write!(f, "added"),
            LineKind::Deleted => write!(f, "deleted"),
        }
    }
}

/// A single changed line recovered from diff text.
///
/// `number` is 1-based: post-change numbering for additions, pre-change
/// numbering for deletions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineEvent {
    /// Line number on the side the line belongs to.
    pub number: u32,
    /// Forward-time direction.
    pub kind: LineKind,
    /// Line content without the diff marker.
    pub text: String,
}

/// Running project size and file count of a repository.
///
/// # Examples
///
/// ```
/// use strata_core::Totals;
///
/// let t = Totals { project_size: 100, file_count: 2 }.advance(-40, 1);
/// assert_eq!(t, Totals { project_size: 60, file_count: 3 });
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Totals {
    /// Sum of the recorded sizes of all live files, in bytes.
    pub project_size: i64,
    /// Number of live files.
    pub file_count: i64,
}

impl Totals {
    /// Totals after applying signed deltas.
    pub fn advance(self, size_delta: i64, file_count_delta: i64) -> Self {
        Self {
            project_size: self.project_size + size_delta,
            file_count: self.file_count + file_count_delta,
        }
    }
}

/// Truncate `text` to at most `max` characters, on a character boundary.
///
/// # Examples
///
/// ```
/// use strata_core::truncate_chars;
///
/// assert_eq!(truncate_chars("héllo", 2), "hé");
/// assert_eq!(truncate_chars("abc", 10), "abc");
/// ```
pub fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Output format for CLI subcommands.
///
/// Implements [`FromStr`] so it can be used directly with `clap` argument parsing.
///
/// # Examples
///
/// ```
/// use strata_core::OutputFormat;
///
/// let fmt: OutputFormat = "json".parse().unwrap();
/// assert_eq!(fmt, OutputFormat::Json);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human-readable tables and summaries.
    #[default]
    Text,
    /// Machine-readable JSON with camelCase keys.
    Json,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            other => Err(format!("unknown output format: {other}")),
        }
    }
}
