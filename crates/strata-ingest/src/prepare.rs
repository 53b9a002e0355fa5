//! Worker-side commit preparation.
//!
//! Everything that only needs the version-control backend happens here,
//! off the writer thread: change classification, diff retrieval and diff
//! parsing.

use std::collections::HashMap;

use strata_core::{ChangeSet, CommitDescriptor, StrataError};
use strata_difflens::parser::{parse_hunks, Orientation, ParsedDiff};
use strata_gitpulse::backend::BackendHandle;
use strata_gitpulse::classify::classify;

/// A commit ready to be written.
#[derive(Debug, Clone)]
pub struct PreparedCommit {
    /// The commit as listed by the backend.
    pub descriptor: CommitDescriptor,
    /// Classified changes against the commit's baseline.
    pub changes: ChangeSet,
    /// Parsed line detail per forward-time path. `None` when the diff text
    /// could not be parsed.
    pub diffs: HashMap<String, Option<ParsedDiff>>,
}

impl PreparedCommit {
    /// Parsed diff of `path`, if it parsed.
    pub fn diff(&self, path: &str) -> Option<&ParsedDiff> {
        self.diffs.get(path).and_then(Option::as_ref)
    }
}

/// Classify `descriptor` and parse the diff text of every changed path.
///
/// Malformed diff text only drops that path's line detail.
///
/// # Errors
///
/// Returns [`StrataError::Vcs`] if the backend cannot classify the commit or
/// produce a diff.
pub fn prepare_commit<H: BackendHandle>(
    handle: &H,
    descriptor: CommitDescriptor,
) -> Result<PreparedCommit, StrataError> {
    let previous = descriptor.previous();
    let changes = classify(handle, &descriptor.id, &previous)?;

    let paths = changes
        .added
        .iter()
        .chain(&changes.deleted)
        .chain(&changes.modified)
        .map(|c| c.path.as_str())
        .chain(changes.renamed.iter().map(|r| r.new_path.as_str()));

    let mut diffs = HashMap::new();
    for path in paths {
        let text = handle.unified_diff(&descriptor.id, &previous, path)?;
        let parsed = match parse_hunks(&text, Orientation::Reversed) {
            Ok(parsed) => Some(parsed),
            Err(e) => {
                tracing::warn!(commit = %descriptor.id, path, error = %e, "skipping line detail");
                None
            }
        };
        diffs.insert(path.to_string(), parsed);
    }

    tracing::debug!(
        commit = %descriptor.id,
        changed = changes.len(),
        "prepared commit"
    );
    Ok(PreparedCommit {
        descriptor,
        changes,
        diffs,
    })
}

#[cfg(test)]
mod tests {
    use strata_core::{ChangeKind, LineKind, PreviousCommit, RawChange};

    use super::*;

    struct FixedHandle {
        changes: Vec<RawChange>,
        diffs: HashMap<String, String>,
    }

    impl BackendHandle for FixedHandle {
        fn classify_changes(
            &self,
            _commit: &str,
            _previous: &PreviousCommit,
        ) -> Result<Vec<RawChange>, StrataError> {
            Ok(self.changes.clone())
        }

        fn unified_diff(
            &self,
            _commit: &str,
            _previous: &PreviousCommit,
            path: &str,
        ) -> Result<String, StrataError> {
            Ok(self.diffs.get(path).cloned().unwrap_or_default())
        }
    }

    fn descriptor(parents: &[&str]) -> CommitDescriptor {
        CommitDescriptor {
            id: "c2".into(),
            parents: parents.iter().map(|p| p.to_string()).collect(),
            author: "a".into(),
            email: "a@example.com".into(),
            message: "m".into(),
            timestamp: 10,
        }
    }

    #[test]
    fn diffs_are_parsed_in_forward_time() {
        let handle = FixedHandle {
            changes: vec![RawChange {
                path: "a.py".into(),
                kind: ChangeKind::Modified,
                size: 4,
            }],
            diffs: HashMap::from([(
                "a.py".to_string(),
                "@@ -1 +1 @@\n-new\n+old\n".to_string(),
            )]),
        };

        let prepared = prepare_commit(&handle, descriptor(&["c1"])).unwrap();
        let diff = prepared.diff("a.py").unwrap();
        assert_eq!(diff.events[0].kind, LineKind::Added);
        assert_eq!(diff.events[0].text, "new");
        assert_eq!(diff.events[1].kind, LineKind::Deleted);
        assert_eq!(diff.events[1].text, "old");
    }

    #[test]
    fn malformed_diff_keeps_the_change_without_lines() {
        let handle = FixedHandle {
            changes: vec![RawChange {
                path: "a.py".into(),
                kind: ChangeKind::Modified,
                size: 4,
            }],
            diffs: HashMap::from([("a.py".to_string(), "@@ -x +1 @@\n+a\n".to_string())]),
        };

        let prepared = prepare_commit(&handle, descriptor(&["c1"])).unwrap();
        assert_eq!(prepared.changes.modified.len(), 1);
        assert!(prepared.diffs.contains_key("a.py"));
        assert!(prepared.diff("a.py").is_none());
    }

    #[test]
    fn root_commit_changes_are_all_added() {
        let handle = FixedHandle {
            changes: vec![RawChange {
                path: "a.py".into(),
                kind: ChangeKind::Modified,
                size: 4,
            }],
            diffs: HashMap::new(),
        };

        let prepared = prepare_commit(&handle, descriptor(&[])).unwrap();
        assert_eq!(prepared.changes.added.len(), 1);
        assert!(prepared.changes.modified.is_empty());
        assert!(prepared.changes.deleted.is_empty());
    }
}
