//! Scripted in-memory version-control backend.

#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::{Arc, Mutex};

use strata_core::{ChangeKind, CommitDescriptor, PreviousCommit, RawChange, StrataError};
use strata_gitpulse::backend::{BackendHandle, VcsBackend, WalkOptions};

type Snapshot = BTreeMap<String, String>;

#[derive(Default)]
struct Script {
    commits: Vec<CommitDescriptor>,
    snapshots: BTreeMap<String, Snapshot>,
    renames: BTreeMap<String, Vec<(String, String)>>,
    garbled: BTreeMap<String, BTreeSet<String>>,
    failing: Mutex<HashSet<String>>,
}

/// Builds a linear history one snapshot at a time.
pub struct HistoryBuilder {
    script: Script,
    current: Snapshot,
    clock: i64,
}

impl HistoryBuilder {
    pub fn new() -> Self {
        Self {
            script: Script::default(),
            current: Snapshot::new(),
            clock: 1_600_000_000,
        }
    }

    pub fn write(&mut self, path: &str, content: &str) -> &mut Self {
        self.current.insert(path.to_string(), content.to_string());
        self
    }

    pub fn remove(&mut self, path: &str) -> &mut Self {
        self.current.remove(path);
        self
    }

    pub fn contains(&self, path: &str) -> bool {
        self.current.contains_key(path)
    }

    pub fn paths(&self) -> Vec<String> {
        self.current.keys().cloned().collect()
    }

    /// Move `from` to `to` and report it as a rename in the next commit.
    pub fn rename(&mut self, from: &str, to: &str) -> &mut Self {
        if let Some(content) = self.current.remove(from) {
            self.current.insert(to.to_string(), content);
            let id = format!("c{}", self.script.commits.len() + 1);
            self.script
                .renames
                .entry(id)
                .or_default()
                .push((from.to_string(), to.to_string()));
        }
        self
    }

    /// Stamp the next commit at `at` regardless of its parent's time.
    pub fn set_clock(&mut self, at: i64) -> &mut Self {
        self.clock = at - 60;
        self
    }

    /// Serve an unparseable diff for `path` in the next commit.
    pub fn garble_diff(&mut self, path: &str) -> &mut Self {
        let id = format!("c{}", self.script.commits.len() + 1);
        self.script.garbled.entry(id).or_default().insert(path.to_string());
        self
    }

    /// Snapshot the working state as the next commit; returns its id.
    pub fn commit(&mut self, message: &str) -> String {
        let id = format!("c{}", self.script.commits.len() + 1);
        let parents = self
            .script
            .commits
            .last()
            .map(|c| vec![c.id.clone()])
            .unwrap_or_default();
        self.clock += 60;
        self.script.commits.push(CommitDescriptor {
            id: id.clone(),
            parents,
            author: "alice".into(),
            email: "alice@example.com".into(),
            message: message.into(),
            timestamp: self.clock,
        });
        self.script.snapshots.insert(id.clone(), self.current.clone());
        id
    }

    /// Totals a correct replay must end with.
    pub fn expected_totals(&self) -> (i64, i64) {
        let size = self.current.values().map(|c| c.len() as i64).sum();
        (size, self.current.len() as i64)
    }

    pub fn build(self) -> ScriptedBackend {
        ScriptedBackend {
            script: Arc::new(self.script),
            limit: None,
        }
    }
}

#[derive(Clone)]
pub struct ScriptedBackend {
    script: Arc<Script>,
    limit: Option<usize>,
}

impl ScriptedBackend {
    /// The same history cut after the first `n` commits.
    pub fn truncated(&self, n: usize) -> Self {
        Self {
            script: Arc::clone(&self.script),
            limit: Some(n),
        }
    }

    /// Make every backend call for `commit` fail until [`Self::heal`].
    pub fn break_commit(&self, commit: &str) {
        self.failing().insert(commit.to_string());
    }

    pub fn heal(&self) {
        self.failing().clear();
    }

    pub fn commit_ids(&self) -> Vec<String> {
        self.script.commits.iter().map(|c| c.id.clone()).collect()
    }

    pub fn timestamp_of(&self, commit: &str) -> i64 {
        self.script
            .commits
            .iter()
            .find(|c| c.id == commit)
            .map(|c| c.timestamp)
            .unwrap_or_default()
    }

    fn failing(&self) -> std::sync::MutexGuard<'_, HashSet<String>> {
        self.script.failing.lock().unwrap()
    }
}

impl VcsBackend for ScriptedBackend {
    type Handle = ScriptedHandle;

    fn location(&self) -> String {
        "/scripted/demo".into()
    }

    fn list_commits(&self, _options: &WalkOptions) -> Result<Vec<CommitDescriptor>, StrataError> {
        let n = self.limit.unwrap_or(self.script.commits.len());
        Ok(self.script.commits.iter().take(n).cloned().collect())
    }

    fn open_handle(&self) -> Result<ScriptedHandle, StrataError> {
        Ok(ScriptedHandle {
            script: Arc::clone(&self.script),
        })
    }
}

pub struct ScriptedHandle {
    script: Arc<Script>,
}

impl ScriptedHandle {
    fn check(&self, commit: &str) -> Result<(), StrataError> {
        if self.script.failing.lock().unwrap().contains(commit) {
            return Err(StrataError::Vcs(format!("commit {commit} unavailable")));
        }
        Ok(())
    }

    fn snapshot(&self, id: &str) -> Snapshot {
        self.script.snapshots.get(id).cloned().unwrap_or_default()
    }

    fn previous_snapshot(&self, previous: &PreviousCommit) -> Snapshot {
        match previous {
            PreviousCommit::Commit(id) => self.snapshot(id),
            PreviousCommit::EmptyTree => Snapshot::new(),
        }
    }

    fn renames(&self, commit: &str) -> Vec<(String, String)> {
        self.script.renames.get(commit).cloned().unwrap_or_default()
    }
}

impl BackendHandle for ScriptedHandle {
    fn classify_changes(
        &self,
        commit: &str,
        previous: &PreviousCommit,
    ) -> Result<Vec<RawChange>, StrataError> {
        self.check(commit)?;
        let new = self.snapshot(commit);
        let old = self.previous_snapshot(previous);
        let renames = self.renames(commit);
        let moved_from: HashSet<&str> = renames.iter().map(|(from, _)| from.as_str()).collect();
        let moved_to: HashSet<&str> = renames.iter().map(|(_, to)| to.as_str()).collect();

        let mut changes = Vec::new();
        for (from, to) in &renames {
            changes.push(RawChange {
                path: to.clone(),
                kind: ChangeKind::Renamed { from: from.clone() },
                size: new.get(to).map_or(0, |c| c.len() as u64),
            });
        }
        for (path, content) in &new {
            if moved_to.contains(path.as_str()) {
                continue;
            }
            match old.get(path) {
                None => changes.push(RawChange {
                    path: path.clone(),
                    kind: ChangeKind::Added,
                    size: content.len() as u64,
                }),
                Some(before) if before != content => changes.push(RawChange {
                    path: path.clone(),
                    kind: ChangeKind::Modified,
                    size: content.len() as u64,
                }),
                Some(_) => {}
            }
        }
        for (path, content) in &old {
            if !new.contains_key(path) && !moved_from.contains(path.as_str()) {
                changes.push(RawChange {
                    path: path.clone(),
                    kind: ChangeKind::Deleted,
                    size: content.len() as u64,
                });
            }
        }
        Ok(changes)
    }

    fn unified_diff(
        &self,
        commit: &str,
        previous: &PreviousCommit,
        path: &str,
    ) -> Result<String, StrataError> {
        self.check(commit)?;
        if self.script.garbled.get(commit).is_some_and(|paths| paths.contains(path)) {
            return Ok("@@ -x +1 @@\n+broken\n".into());
        }
        let new = self.snapshot(commit);
        let old = self.previous_snapshot(previous);
        let old_path = self
            .renames(commit)
            .into_iter()
            .find(|(_, to)| to == path)
            .map(|(from, _)| from)
            .unwrap_or_else(|| path.to_string());

        let current = new.get(path).cloned().unwrap_or_default();
        let before = old.get(&old_path).cloned().unwrap_or_default();
        // the miner reads diff(commit, previous)
        Ok(reversed_hunk(&current, &before))
    }
}

/// A single hunk turning `from` into `to`, trimmed to the changed region.
pub fn reversed_hunk(from: &str, to: &str) -> String {
    let a: Vec<&str> = from.lines().collect();
    let b: Vec<&str> = to.lines().collect();
    let mut prefix = 0;
    while prefix < a.len() && prefix < b.len() && a[prefix] == b[prefix] {
        prefix += 1;
    }
    let mut suffix = 0;
    while suffix < a.len() - prefix
        && suffix < b.len() - prefix
        && a[a.len() - 1 - suffix] == b[b.len() - 1 - suffix]
    {
        suffix += 1;
    }
    let removed = &a[prefix..a.len() - suffix];
    let inserted = &b[prefix..b.len() - suffix];
    if removed.is_empty() && inserted.is_empty() {
        return String::new();
    }

    let start = |count: usize| if count == 0 { prefix } else { prefix + 1 };
    let mut text = format!(
        "diff --git a/file b/file\n--- a/file\n+++ b/file\n@@ -{},{} +{},{} @@\n",
        start(removed.len()),
        removed.len(),
        start(inserted.len()),
        inserted.len()
    );
    for line in removed {
        text.push('-');
        text.push_str(line);
        text.push('\n');
    }
    for line in inserted {
        text.push('+');
        text.push_str(line);
        text.push('\n');
    }
    text
}
