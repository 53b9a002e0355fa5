//! Branch replay.
//!
//! The producer feeds unseen commits, oldest first, into a bounded job
//! queue. Workers each hold their own backend handle and turn jobs into
//! [`PreparedCommit`]s. The writer, on the calling thread, puts finished
//! commits back into branch order and applies them one at a time, so
//! lineage and running totals always see history in causal order.
//!
//! A commit is only taken off the queue once a slot in the in-flight window
//! is free; the writer frees a slot per applied commit, which bounds both the
//! queue and the resequencing buffer.
//!
//! When a commit fails the run stops admitting work. Every later commit is
//! deferred to the next run, because applying it would build on totals and
//! file rows that are missing.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use crossbeam_channel::{bounded, Receiver, Sender};
use serde::{Deserialize, Serialize};
use strata_core::{CommitDescriptor, StrataConfig, StrataError, Totals};
use strata_gitpulse::backend::{VcsBackend, WalkOptions};
use strata_store::{FileRecord, NewCommit, NewFile, NewVersion, Session, Store, VersionState};

use crate::aggregate::{AggregateMetricsTracker, CommitDelta};
use crate::issues::{IssueCache, IssueReferenceExtractor};
use crate::lineage::LineageTracker;
use crate::prepare::{prepare_commit, PreparedCommit};

/// A commit that could not be applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedCommit {
    /// Commit identifier.
    pub commit: String,
    /// Error message.
    pub reason: String,
}

/// Outcome of one ingestion run.
///
/// # Examples
///
/// ```
/// use strata_core::Totals;
/// use strata_ingest::IngestReport;
///
/// let report = IngestReport {
///     repository: "core".into(),
///     repository_id: 1,
///     total_commits: 10,
///     skipped: 7,
///     skipped_merges: 0,
///     applied: 3,
///     failed: vec![],
///     deferred: 0,
///     totals: Totals { project_size: 2048, file_count: 12 },
/// };
/// assert!(report.is_success());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestReport {
    /// Repository name.
    pub repository: String,
    /// Repository row id.
    pub repository_id: i64,
    /// Commits listed on the branch.
    pub total_commits: usize,
    /// Commits already ingested by an earlier run.
    pub skipped: usize,
    /// Merge commits left out of a full-graph walk.
    pub skipped_merges: usize,
    /// Commits applied by this run.
    pub applied: usize,
    /// Commits that failed; retried next run.
    pub failed: Vec<FailedCommit>,
    /// Commits not attempted after a failure; retried next run.
    pub deferred: usize,
    /// Running totals after the last applied commit.
    pub totals: Totals,
}

impl IngestReport {
    /// Whether every unseen commit was applied.
    pub fn is_success(&self) -> bool {
        self.failed.is_empty() && self.deferred == 0
    }
}

struct Job {
    index: usize,
    descriptor: CommitDescriptor,
}

struct Outcome {
    index: usize,
    commit: String,
    result: Result<PreparedCommit, StrataError>,
}

/// Replays a branch of one repository into a [`Store`].
///
/// # Examples
///
/// ```no_run
/// use strata_core::StrataConfig;
/// use strata_gitpulse::mining::GitBackend;
/// use strata_ingest::IngestionCoordinator;
/// use strata_store::Store;
///
/// let config = StrataConfig::default();
/// let backend = GitBackend::new(".");
/// let mut store = Store::open(&config.database.path).unwrap();
/// let report = IngestionCoordinator::new(&backend, &config)
///     .unwrap()
///     .ingest(&mut store)
///     .unwrap();
/// println!("applied {} commits", report.applied);
/// ```
pub struct IngestionCoordinator<'a, B: VcsBackend> {
    backend: &'a B,
    config: &'a StrataConfig,
    extractor: IssueReferenceExtractor,
    aggregate: AggregateMetricsTracker,
}

impl<'a, B: VcsBackend> IngestionCoordinator<'a, B> {
    /// Coordinator for `backend` using `config`.
    ///
    /// # Errors
    ///
    /// Returns [`StrataError::Config`] if the configuration is invalid.
    pub fn new(backend: &'a B, config: &'a StrataConfig) -> Result<Self, StrataError> {
        config.validate()?;
        Ok(Self {
            backend,
            config,
            extractor: IssueReferenceExtractor::new(&config.issues.pattern)?,
            aggregate: AggregateMetricsTracker::new(),
        })
    }

    /// Running totals kept by this coordinator.
    pub fn aggregate(&self) -> &AggregateMetricsTracker {
        &self.aggregate
    }

    /// Ingest every commit of the configured branch not yet in `store`.
    ///
    /// # Errors
    ///
    /// Returns an error only if the run cannot start: the repository row or
    /// the resumability set cannot be read, or the backend cannot list the
    /// branch. Failures of individual commits are reported in
    /// [`IngestReport::failed`].
    pub fn ingest(&self, store: &mut Store) -> Result<IngestReport, StrataError> {
        let location = canonical_location(self.backend.location());
        let name = self
            .config
            .repository
            .name
            .clone()
            .unwrap_or_else(|| repository_name(&location));

        let repository_id = store.register_repository(&name, &location)?;
        let completed = store.completed_commits(repository_id)?;
        self.aggregate.load(store, repository_id)?;

        let mining = &self.config.mining;
        let commits = self.backend.list_commits(&WalkOptions {
            branch: mining.branch.clone(),
            first_parent: mining.first_parent,
        })?;
        let total_commits = commits.len();

        let mut skipped = 0;
        let mut skipped_merges = 0;
        let mut pending = Vec::new();
        for commit in commits {
            if completed.contains(&commit.id) {
                skipped += 1;
            } else if !mining.first_parent && mining.skip_merges && commit.is_merge() {
                skipped_merges += 1;
            } else {
                pending.push(commit);
            }
        }

        tracing::info!(
            repository = %name,
            branch = %mining.branch,
            total = total_commits,
            skipped,
            pending = pending.len(),
            workers = mining.workers,
            "starting ingestion"
        );

        let mut writer = CommitWriter {
            repository_id,
            config: self.config,
            lineage: LineageTracker::new(repository_id)
                .resume_after(store.file_watermark(repository_id)?),
            aggregate: &self.aggregate,
            extractor: &self.extractor,
            issues: IssueCache::new(),
        };
        let (applied, failed) = self.run_pipeline(store, &mut writer, pending);
        let deferred_from = applied + failed.len();

        let totals = match self.aggregate.current(repository_id) {
            Some(totals) => totals,
            None => store.latest_totals(repository_id)?,
        };
        let report = IngestReport {
            repository: name,
            repository_id,
            total_commits,
            skipped,
            skipped_merges,
            applied,
            failed,
            deferred: total_commits - skipped - skipped_merges - deferred_from,
            totals,
        };

        if report.is_success() {
            tracing::info!(
                applied = report.applied,
                project_size = totals.project_size,
                file_count = totals.file_count,
                "ingestion finished"
            );
        } else {
            tracing::warn!(
                applied = report.applied,
                failed = report.failed.len(),
                deferred = report.deferred,
                "ingestion stopped early, remaining commits will be retried"
            );
        }
        Ok(report)
    }

    /// Prepare `pending` on the worker pool and apply it in order. Returns
    /// the number of applied commits and the failure, if any.
    fn run_pipeline(
        &self,
        store: &mut Store,
        writer: &mut CommitWriter<'_>,
        pending: Vec<CommitDescriptor>,
    ) -> (usize, Vec<FailedCommit>) {
        let total = pending.len();
        if total == 0 {
            return (0, Vec::new());
        }

        let capacity = self.config.mining.queue_capacity.max(1);
        let workers = self.config.mining.workers.max(1);
        let progress_step = (total / 100).max(1);
        let halt = AtomicBool::new(false);
        let backend = self.backend;

        let mut applied = 0;
        let mut failed = Vec::new();

        std::thread::scope(|s| {
            let (job_tx, job_rx) = bounded::<Job>(capacity);
            let (outcome_tx, outcome_rx) = bounded::<Outcome>(capacity);
            let (slot_tx, slot_rx) = bounded::<()>(capacity);
            let halt = &halt;

            s.spawn(move || {
                for (index, descriptor) in pending.into_iter().enumerate() {
                    if halt.load(Ordering::Relaxed) || slot_tx.send(()).is_err() {
                        break;
                    }
                    if job_tx.send(Job { index, descriptor }).is_err() {
                        break;
                    }
                }
            });

            for worker in 0..workers {
                let job_rx = job_rx.clone();
                let outcome_tx = outcome_tx.clone();
                s.spawn(move || run_worker(worker, backend, job_rx, outcome_tx, halt));
            }
            drop(job_rx);
            drop(outcome_tx);

            let mut next = 0;
            let mut buffered: BTreeMap<usize, Outcome> = BTreeMap::new();
            'writer: while next < total {
                let Ok(outcome) = outcome_rx.recv() else {
                    break;
                };
                buffered.insert(outcome.index, outcome);

                while let Some(outcome) = buffered.remove(&next) {
                    next += 1;
                    let _ = slot_rx.try_recv();

                    let result = outcome
                        .result
                        .and_then(|prepared| writer.apply(store, &prepared));
                    match result {
                        Ok(totals) => {
                            applied += 1;
                            tracing::debug!(
                                commit = %outcome.commit,
                                project_size = totals.project_size,
                                file_count = totals.file_count,
                                "applied commit"
                            );
                            if applied % progress_step == 0 || applied == total {
                                tracing::info!(
                                    percent = applied * 100 / total,
                                    applied,
                                    total,
                                    "ingestion progress"
                                );
                            }
                        }
                        Err(e) => {
                            tracing::error!(commit = %outcome.commit, error = %e, "commit failed");
                            failed.push(FailedCommit {
                                commit: outcome.commit,
                                reason: e.to_string(),
                            });
                            halt.store(true, Ordering::Relaxed);
                            break 'writer;
                        }
                    }
                }
            }

            // unblock the producer and any worker waiting on a full channel
            drop(outcome_rx);
            drop(slot_rx);
        });

        (applied, failed)
    }
}

fn run_worker<B: VcsBackend>(
    worker: usize,
    backend: &B,
    jobs: Receiver<Job>,
    outcomes: Sender<Outcome>,
    halt: &AtomicBool,
) {
    let handle = backend.open_handle();
    if let Err(e) = &handle {
        tracing::error!(worker, error = %e, "worker could not open the repository");
    }

    for job in jobs.iter() {
        if halt.load(Ordering::Relaxed) {
            break;
        }
        let commit = job.descriptor.id.clone();
        let result = match &handle {
            Ok(handle) => prepare_commit(handle, job.descriptor),
            Err(e) => Err(StrataError::Vcs(format!("repository unavailable: {e}"))),
        };
        let outcome = Outcome {
            index: job.index,
            commit,
            result,
        };
        if outcomes.send(outcome).is_err() {
            break;
        }
    }
}

/// Applies prepared commits to the store, one at a time.
struct CommitWriter<'a> {
    repository_id: i64,
    config: &'a StrataConfig,
    lineage: LineageTracker,
    aggregate: &'a AggregateMetricsTracker,
    extractor: &'a IssueReferenceExtractor,
    issues: IssueCache,
}

impl CommitWriter<'_> {
    /// Write one commit: its rows in one batch, then the completion flag.
    fn apply(&mut self, store: &mut Store, prepared: &PreparedCommit) -> Result<Totals, StrataError> {
        let result = self.try_apply(store, prepared);
        match &result {
            Ok(_) => self.lineage.advance(prepared.descriptor.timestamp),
            Err(_) => {
                self.issues.discard();
                self.aggregate.invalidate(self.repository_id);
            }
        }
        result
    }

    fn try_apply(&mut self, store: &mut Store, prepared: &PreparedCommit) -> Result<Totals, StrataError> {
        let session = store.session()?;
        let (commit_id, totals) = self.write_batch(&session, prepared)?;
        session.commit()?;
        self.issues.commit();

        let session = store.session()?;
        session.mark_complete(commit_id)?;
        session.commit()?;
        Ok(totals)
    }

    fn write_batch(
        &mut self,
        session: &Session<'_>,
        prepared: &PreparedCommit,
    ) -> Result<(i64, Totals), StrataError> {
        let commit = &prepared.descriptor;
        let changes = &prepared.changes;
        let timestamp = self.lineage.effective_timestamp(commit.timestamp);
        if timestamp != commit.timestamp {
            tracing::debug!(
                commit = %commit.id,
                committed = commit.timestamp,
                effective = timestamp,
                "commit predates an applied commit, stamping files at the later time"
            );
        }

        let commit_id = session.begin_commit(&NewCommit {
            repository_id: self.repository_id,
            hash: &commit.id,
            message: &commit.message,
            author: &commit.author,
            email: &commit.email,
            timestamp: commit.timestamp,
            counts: [
                changes.added.len(),
                changes.deleted.len(),
                changes.modified.len(),
                changes.renamed.len(),
            ],
        })?;

        let mut delta = CommitDelta::default();

        for change in &changes.deleted {
            let Some((file, state)) = self.live_file(session, &change.path, timestamp, commit_id)? else {
                continue;
            };
            delta.deleted(state.file_size);
            self.write_version(session, prepared, commit_id, &file, &change.path, 0, true)?;
        }

        for change in &changes.modified {
            let Some((file, state)) = self.live_file(session, &change.path, timestamp, commit_id)? else {
                continue;
            };
            let size = change.size as i64;
            delta.modified(size, state.file_size);
            self.write_version(session, prepared, commit_id, &file, &change.path, size, false)?;
        }

        for rename in &changes.renamed {
            let precursor = self
                .lineage
                .resolve_rename(session, &rename.old_path, &rename.new_path, timestamp, commit_id)?;
            let carried = match &precursor {
                Some(file) => match session.latest_version(file.id)? {
                    Some(state) if state.deleted => {
                        tracing::warn!(
                            from = %rename.old_path,
                            to = %rename.new_path,
                            "rename source was already deleted, recording as added"
                        );
                        None
                    }
                    Some(state) => Some((file.id, state.file_size)),
                    None => Some((file.id, rename.size as i64)),
                },
                None => None,
            };

            let (precursor_id, size) = match carried {
                Some((id, size)) => (Some(id), size),
                None => {
                    delta.added(rename.size as i64);
                    (None, rename.size as i64)
                }
            };
            let file = self.insert_file(session, commit_id, &rename.new_path, timestamp, precursor_id)?;
            self.write_version(session, prepared, commit_id, &file, &rename.new_path, size, false)?;
        }

        for change in &changes.added {
            let size = change.size as i64;
            delta.added(size);
            let file = self.insert_file(session, commit_id, &change.path, timestamp, None)?;
            self.write_version(session, prepared, commit_id, &file, &change.path, size, false)?;
        }

        for key in self.extractor.extract(&commit.message) {
            let issue_id = match self.issues.get(&key) {
                Some(id) => id,
                None => {
                    let id = session.upsert_issue(self.repository_id, &key)?;
                    self.issues.stage(&key, id);
                    id
                }
            };
            session.link_issue(commit_id, issue_id)?;
        }

        let totals = self.aggregate.apply(self.repository_id, delta)?;
        session.set_totals(commit_id, totals)?;
        Ok((commit_id, totals))
    }

    /// The file currently at `path` together with its latest version, or
    /// `None` (with a warning) when there is no live file to change.
    fn live_file(
        &self,
        session: &Session<'_>,
        path: &str,
        as_of: i64,
        commit_id: i64,
    ) -> Result<Option<(FileRecord, VersionState)>, StrataError> {
        let Some(file) = self.lineage.current_file(session, path, as_of, commit_id)? else {
            tracing::warn!(path, "change to a file that was never tracked, skipping");
            return Ok(None);
        };
        let state = session.latest_version(file.id)?.unwrap_or(VersionState {
            file_size: 0,
            deleted: false,
        });
        if state.deleted {
            tracing::warn!(path, "change to a deleted file, skipping");
            return Ok(None);
        }
        Ok(Some((file, state)))
    }

    fn insert_file(
        &self,
        session: &Session<'_>,
        commit_id: i64,
        path: &str,
        timestamp: i64,
        precursor_file_id: Option<i64>,
    ) -> Result<FileRecord, StrataError> {
        let language = self.config.languages.language_for(path);
        let id = session.insert_file(&NewFile {
            repository_id: self.repository_id,
            commit_id,
            path,
            language,
            timestamp,
            precursor_file_id,
        })?;
        Ok(FileRecord {
            id,
            commit_id,
            path: path.to_string(),
            language: language.map(str::to_string),
            timestamp,
            precursor_file_id,
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn write_version(
        &self,
        session: &Session<'_>,
        prepared: &PreparedCommit,
        commit_id: i64,
        file: &FileRecord,
        path: &str,
        file_size: i64,
        deleted: bool,
    ) -> Result<(), StrataError> {
        let parsed = prepared.diff(path);
        let version_id = session.insert_version(&NewVersion {
            file_id: file.id,
            commit_id,
            path,
            lines_added: parsed.map_or(0, |p| p.lines_added()),
            lines_deleted: parsed.map_or(0, |p| p.lines_deleted()),
            file_size,
            deleted,
        })?;

        let wants_lines =
            self.config.mining.write_lines && self.config.languages.language_for(path).is_some();
        if let Some(parsed) = parsed.filter(|_| wants_lines) {
            session.insert_lines(version_id, &parsed.events)?;
        }
        Ok(())
    }
}

/// Absolute form of a repository location, or the location unchanged when
/// it cannot be resolved on disk.
fn canonical_location(location: String) -> String {
    std::fs::canonicalize(&location)
        .map(|path| path.display().to_string())
        .unwrap_or(location)
}

/// Default repository name: the last component of its location.
pub fn repository_name(location: &str) -> String {
    let path = Path::new(location);
    let resolved = std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
    resolved
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| location.to_string())
}
