//! Git history extraction via git2.
//!
//! Walks a branch oldest first, classifies each commit's tree changes with
//! rename detection, and renders per-file patches comparing a commit
//! against its baseline.

use std::cell::RefCell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use git2::{Delta, DiffFindOptions, DiffOptions, FileMode, Oid, Patch, Repository, Sort, Tree};
use strata_core::{ChangeKind, CommitDescriptor, PreviousCommit, RawChange, StrataError};

use crate::backend::{BackendHandle, VcsBackend, WalkOptions};

/// A git repository on disk.
///
/// # Examples
///
/// ```no_run
/// use strata_gitpulse::backend::{VcsBackend, WalkOptions};
/// use strata_gitpulse::mining::GitBackend;
///
/// let backend = GitBackend::new(".");
/// let commits = backend.list_commits(&WalkOptions::default()).unwrap();
/// for c in &commits {
///     println!("{} {}", &c.id[..8], c.author);
/// }
/// ```
#[derive(Debug, Clone)]
pub struct GitBackend {
    path: PathBuf,
}

impl GitBackend {
    /// Backend for the repository at `path`. Nothing is opened until used.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Repository location.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn open(&self) -> Result<Repository, StrataError> {
        Repository::open(&self.path)
            .map_err(|e| StrataError::Vcs(format!("failed to open repository: {e}")))
    }
}

impl VcsBackend for GitBackend {
    type Handle = GitHandle;

    fn location(&self) -> String {
        self.path.display().to_string()
    }

    fn list_commits(&self, options: &WalkOptions) -> Result<Vec<CommitDescriptor>, StrataError> {
        let repo = self.open()?;

        let mut revwalk = repo
            .revwalk()
            .map_err(|e| StrataError::Vcs(format!("failed to create revwalk: {e}")))?;
        revwalk
            .set_sorting(Sort::TOPOLOGICAL | Sort::REVERSE)
            .map_err(|e| StrataError::Vcs(format!("failed to set walk order: {e}")))?;

        let branch = &options.branch;
        let reference = repo
            .resolve_reference_from_short_name(branch)
            .map_err(|e| StrataError::Vcs(format!("failed to resolve branch '{branch}': {e}")))?;
        let oid = reference
            .peel_to_commit()
            .map_err(|e| StrataError::Vcs(format!("branch '{branch}' has no commit: {e}")))?
            .id();
        revwalk
            .push(oid)
            .map_err(|e| StrataError::Vcs(format!("failed to push oid: {e}")))?;
        if options.first_parent {
            revwalk
                .simplify_first_parent()
                .map_err(|e| StrataError::Vcs(format!("failed to simplify walk: {e}")))?;
        }

        let mut commits = Vec::new();
        for oid_result in revwalk {
            let oid = oid_result.map_err(|e| StrataError::Vcs(format!("revwalk error: {e}")))?;
            let commit = repo
                .find_commit(oid)
                .map_err(|e| StrataError::Vcs(format!("failed to find commit: {e}")))?;

            let author = commit.author();
            commits.push(CommitDescriptor {
                id: oid.to_string(),
                parents: commit.parent_ids().map(|id| id.to_string()).collect(),
                author: author.name().unwrap_or("unknown").to_string(),
                email: author.email().unwrap_or("unknown").to_string(),
                message: String::from_utf8_lossy(commit.message_bytes()).into_owned(),
                timestamp: commit.time().seconds(),
            });
        }

        tracing::debug!(branch = %branch, commits = commits.len(), "listed commits");
        Ok(commits)
    }

    fn open_handle(&self) -> Result<GitHandle, StrataError> {
        Ok(GitHandle {
            repo: self.open()?,
            patches: RefCell::new(None),
        })
    }
}

/// Rendered patches for one `(commit, previous)` pair, keyed by forward path.
struct PatchCache {
    commit: String,
    previous: PreviousCommit,
    texts: HashMap<String, String>,
}

/// A worker's own view of the repository.
///
/// Patches are rendered for a whole commit the first time any of its paths
/// is requested and kept until a different commit is asked for.
pub struct GitHandle {
    repo: Repository,
    patches: RefCell<Option<PatchCache>>,
}

impl GitHandle {
    fn commit_tree(&self, commit: &str) -> Result<Tree<'_>, StrataError> {
        let oid = Oid::from_str(commit)
            .map_err(|e| StrataError::Vcs(format!("invalid commit id '{commit}': {e}")))?;
        self.repo
            .find_commit(oid)
            .and_then(|c| c.tree())
            .map_err(|e| StrataError::Vcs(format!("failed to get tree of {commit}: {e}")))
    }

    fn previous_tree(&self, previous: &PreviousCommit) -> Result<Option<Tree<'_>>, StrataError> {
        match previous {
            PreviousCommit::Commit(id) => self.commit_tree(id).map(Some),
            PreviousCommit::EmptyTree => Ok(None),
        }
    }

    fn blob_size(&self, oid: Oid) -> Result<u64, StrataError> {
        if oid.is_zero() {
            return Ok(0);
        }
        self.repo
            .find_blob(oid)
            .map(|blob| blob.size() as u64)
            .map_err(|e| StrataError::Vcs(format!("failed to read blob {oid}: {e}")))
    }

    fn diff_with_renames(
        &self,
        old: Option<&Tree<'_>>,
        new: Option<&Tree<'_>>,
    ) -> Result<git2::Diff<'_>, StrataError> {
        let mut diff_opts = DiffOptions::new();
        let mut diff = self
            .repo
            .diff_tree_to_tree(old, new, Some(&mut diff_opts))
            .map_err(|e| StrataError::Vcs(format!("failed to compute diff: {e}")))?;

        let mut find_opts = DiffFindOptions::new();
        find_opts.renames(true);
        diff.find_similar(Some(&mut find_opts))
            .map_err(|e| StrataError::Vcs(format!("failed to find renames: {e}")))?;
        Ok(diff)
    }

    /// Render every patch of the reversed diff `commit -> previous`.
    fn render_patches(
        &self,
        commit: &str,
        previous: &PreviousCommit,
    ) -> Result<HashMap<String, String>, StrataError> {
        let commit_tree = self.commit_tree(commit)?;
        let previous_tree = self.previous_tree(previous)?;
        let diff = self.diff_with_renames(Some(&commit_tree), previous_tree.as_ref())?;

        let mut texts = HashMap::new();
        for (idx, delta) in diff.deltas().enumerate() {
            // Reversed: "added" here means the file only exists before the commit.
            let side = match delta.status() {
                Delta::Added => delta.new_file(),
                _ => delta.old_file(),
            };
            let Some(path) = side.path().map(path_string) else {
                continue;
            };

            let Some(mut patch) = Patch::from_diff(&diff, idx)
                .map_err(|e| StrataError::Vcs(format!("failed to build patch for {path}: {e}")))?
            else {
                continue;
            };
            let buf = patch
                .to_buf()
                .map_err(|e| StrataError::Vcs(format!("failed to render patch for {path}: {e}")))?;
            texts.insert(path, String::from_utf8_lossy(&buf).into_owned());
        }
        Ok(texts)
    }
}

impl BackendHandle for GitHandle {
    fn classify_changes(
        &self,
        commit: &str,
        previous: &PreviousCommit,
    ) -> Result<Vec<RawChange>, StrataError> {
        let commit_tree = self.commit_tree(commit)?;
        let previous_tree = self.previous_tree(previous)?;
        let diff = self.diff_with_renames(previous_tree.as_ref(), Some(&commit_tree))?;

        let mut changes = Vec::new();
        for delta in diff.deltas() {
            let old_file = delta.old_file();
            let new_file = delta.new_file();

            // submodule pointers are not files
            if new_file.mode() == FileMode::Commit || old_file.mode() == FileMode::Commit {
                continue;
            }

            let change = match delta.status() {
                Delta::Added | Delta::Copied => new_file.path().map(|p| RawChange {
                    path: path_string(p),
                    kind: ChangeKind::Added,
                    size: 0,
                }),
                Delta::Deleted => old_file.path().map(|p| RawChange {
                    path: path_string(p),
                    kind: ChangeKind::Deleted,
                    size: 0,
                }),
                Delta::Modified | Delta::Typechange => new_file.path().map(|p| RawChange {
                    path: path_string(p),
                    kind: ChangeKind::Modified,
                    size: 0,
                }),
                Delta::Renamed => match (old_file.path(), new_file.path()) {
                    (Some(from), Some(to)) => Some(RawChange {
                        path: path_string(to),
                        kind: ChangeKind::Renamed {
                            from: path_string(from),
                        },
                        size: 0,
                    }),
                    _ => None,
                },
                _ => None,
            };
            let Some(mut change) = change else {
                continue;
            };

            let blob = match change.kind {
                ChangeKind::Deleted => old_file.id(),
                _ => new_file.id(),
            };
            change.size = self.blob_size(blob)?;
            changes.push(change);
        }

        Ok(changes)
    }

    fn unified_diff(
        &self,
        commit: &str,
        previous: &PreviousCommit,
        path: &str,
    ) -> Result<String, StrataError> {
        let mut cache = self.patches.borrow_mut();
        let fresh = match cache.as_ref() {
            Some(entry) => entry.commit != commit || &entry.previous != previous,
            None => true,
        };
        if fresh {
            *cache = Some(PatchCache {
                commit: commit.to_string(),
                previous: previous.clone(),
                texts: self.render_patches(commit, previous)?,
            });
        }

        Ok(cache
            .as_ref()
            .and_then(|entry| entry.texts.get(path))
            .cloned()
            .unwrap_or_default())
    }
}

fn path_string(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}
