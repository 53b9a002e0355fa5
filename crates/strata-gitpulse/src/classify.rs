//! Change classification.
//!
//! Folds the backend's per-path entries into four sets. A root
//! commit is compared against the empty tree, so every path it touches is
//! reported as added. A path reported both added and deleted is a
//! modification.

use std::collections::BTreeMap;

use strata_core::{ChangeKind, ChangeSet, FileChange, PreviousCommit, RawChange, RenamedFile, StrataError};

use crate::backend::BackendHandle;

/// Classify the changes of `commit` against `previous`.
///
/// # Errors
///
/// Propagates [`StrataError::Vcs`] from the backend.
pub fn classify<H: BackendHandle>(
    handle: &H,
    commit: &str,
    previous: &PreviousCommit,
) -> Result<ChangeSet, StrataError> {
    let raw = handle.classify_changes(commit, previous)?;
    Ok(classify_raw(raw, previous.is_empty_tree()))
}

/// Fold raw backend entries into a [`ChangeSet`].
///
/// Each set is ordered by path and no path is listed twice. The new path of
/// a rename is never also added or modified; it may be the path of a file
/// the same commit deletes, which is applied first.
///
/// # Examples
///
/// ```
/// use strata_core::{ChangeKind, RawChange};
/// use strata_gitpulse::classify::classify_raw;
///
/// let raw = vec![
///     RawChange { path: "a.rs".into(), kind: ChangeKind::Added, size: 10 },
///     RawChange { path: "a.rs".into(), kind: ChangeKind::Deleted, size: 4 },
/// ];
/// let changes = classify_raw(raw, false);
/// assert!(changes.added.is_empty());
/// assert_eq!(changes.modified.len(), 1);
/// assert_eq!(changes.modified[0].size, 10);
/// ```
pub fn classify_raw(raw: Vec<RawChange>, is_root: bool) -> ChangeSet {
    let mut added: BTreeMap<String, u64> = BTreeMap::new();
    let mut deleted: BTreeMap<String, u64> = BTreeMap::new();
    let mut modified: BTreeMap<String, u64> = BTreeMap::new();
    let mut renamed: BTreeMap<String, RenamedFile> = BTreeMap::new();

    for change in raw {
        if is_root {
            added.insert(change.path, change.size);
            continue;
        }
        match change.kind {
            ChangeKind::Added => {
                added.insert(change.path, change.size);
            }
            ChangeKind::Deleted => {
                deleted.insert(change.path, change.size);
            }
            ChangeKind::Modified => {
                modified.insert(change.path, change.size);
            }
            ChangeKind::Renamed { from } => {
                renamed.insert(
                    change.path.clone(),
                    RenamedFile {
                        old_path: from,
                        new_path: change.path,
                        size: change.size,
                    },
                );
            }
        }
    }

    // add + delete of one path is an in-place rewrite
    let rewritten: Vec<String> = added
        .keys()
        .filter(|path| deleted.contains_key(*path))
        .cloned()
        .collect();
    for path in rewritten {
        deleted.remove(&path);
        if let Some(size) = added.remove(&path) {
            modified.entry(path).or_insert(size);
        }
    }

    // a rename owns its new path; a deletion of the old occupant stays
    for path in renamed.keys() {
        added.remove(path);
        modified.remove(path);
    }
    for path in modified.keys() {
        added.remove(path);
        deleted.remove(path);
    }

    ChangeSet {
        added: into_changes(added),
        deleted: into_changes(deleted),
        modified: into_changes(modified),
        renamed: renamed.into_values().collect(),
    }
}

fn into_changes(map: BTreeMap<String, u64>) -> Vec<FileChange> {
    map.into_iter()
        .map(|(path, size)| FileChange { path, size })
        .collect()
}
