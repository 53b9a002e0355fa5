mod common;

use common::{HistoryBuilder, ScriptedBackend};
use strata_core::{LineEvent, LineKind, StrataConfig, Totals};
use strata_ingest::{IngestReport, IngestionCoordinator};
use strata_store::Store;

fn config(workers: usize) -> StrataConfig {
    let mut config = StrataConfig::default();
    config.mining.workers = workers;
    config.mining.queue_capacity = 8;
    config
}

fn ingest(backend: &ScriptedBackend, store: &mut Store, config: &StrataConfig) -> IngestReport {
    IngestionCoordinator::new(backend, config)
        .unwrap()
        .ingest(store)
        .unwrap()
}

fn totals(size: i64, count: i64) -> Totals {
    Totals {
        project_size: size,
        file_count: count,
    }
}

#[test]
fn root_commit_adds_every_file() {
    let mut history = HistoryBuilder::new();
    history.write("main.py", "print(1)\n").write("README.md", "# t\n");
    history.commit("initial import");
    let backend = history.build();

    let mut store = Store::in_memory().unwrap();
    let report = ingest(&backend, &mut store, &config(1));

    assert!(report.is_success());
    assert_eq!(report.repository, "demo");
    assert_eq!(report.applied, 1);
    assert_eq!(report.totals, totals(13, 2));

    let rows = store.row_counts(report.repository_id).unwrap();
    assert_eq!(rows.files, 2);
    assert_eq!(rows.versions, 2);
    // only the python file has a mapped language
    assert_eq!(rows.lines, 1);
}

#[test]
fn empty_commit_keeps_totals() {
    let mut history = HistoryBuilder::new();
    history.write("a.py", "one\n");
    history.commit("add a");
    let empty = history.commit("nothing");
    let backend = history.build();

    let mut store = Store::in_memory().unwrap();
    let report = ingest(&backend, &mut store, &config(1));
    assert_eq!(report.applied, 2);

    let repo = report.repository_id;
    assert_eq!(store.commit_totals(repo, &empty).unwrap(), Some(totals(4, 1)));
    let rows = store.row_counts(repo).unwrap();
    assert_eq!(rows.commits, 2);
    assert_eq!(rows.files, 1);
    assert_eq!(rows.versions, 1);
}

#[test]
fn second_run_skips_ingested_commits() {
    let mut history = HistoryBuilder::new();
    history.write("a.py", "one\n").write("b.py", "two\n");
    history.commit("c1");
    history.write("a.py", "one\nmore\n");
    history.commit("c2");
    history.remove("b.py");
    history.commit("c3");
    let backend = history.build();
    let config = config(2);

    let mut store = Store::in_memory().unwrap();
    let first = ingest(&backend, &mut store, &config);
    let rows = store.row_counts(first.repository_id).unwrap();

    let second = ingest(&backend, &mut store, &config);
    assert!(second.is_success());
    assert_eq!(second.applied, 0);
    assert_eq!(second.skipped, 3);
    assert_eq!(second.repository_id, first.repository_id);
    assert_eq!(second.totals, first.totals);
    assert_eq!(store.row_counts(first.repository_id).unwrap(), rows);
}

#[test]
fn new_commits_are_picked_up_on_the_next_run() {
    let mut history = HistoryBuilder::new();
    history.write("a.py", "one\n");
    history.commit("c1");
    history.write("b.py", "two\n");
    history.commit("c2");
    let backend = history.build();
    let config = config(1);

    let mut store = Store::in_memory().unwrap();
    let first = ingest(&backend.truncated(1), &mut store, &config);
    assert_eq!(first.totals, totals(4, 1));

    let second = ingest(&backend, &mut store, &config);
    assert_eq!(second.skipped, 1);
    assert_eq!(second.applied, 1);
    assert_eq!(second.totals, totals(8, 2));
}

#[test]
fn deletion_removes_the_previous_size() {
    let mut history = HistoryBuilder::new();
    history.write("a.py", "12345\n").write("b.py", "x\n");
    history.commit("c1");
    history.remove("a.py");
    let c2 = history.commit("drop a");
    let backend = history.build();

    let mut store = Store::in_memory().unwrap();
    let report = ingest(&backend, &mut store, &config(1));

    assert_eq!(report.totals, totals(2, 1));
    let repo = report.repository_id;
    let rows = store.row_counts(repo).unwrap();
    assert_eq!(rows.files, 2);
    assert_eq!(rows.versions, 3);

    let deleted = store.changed_lines(repo, &c2, "a.py").unwrap();
    assert_eq!(
        deleted,
        vec![LineEvent {
            number: 1,
            kind: LineKind::Deleted,
            text: "12345".into(),
        }]
    );
}

#[test]
fn renames_chain_file_identities() {
    let mut history = HistoryBuilder::new();
    history.write("a.py", "body\n");
    history.commit("c1");
    history.rename("a.py", "b.py");
    history.commit("move to b");
    history.rename("b.py", "c.py");
    history.commit("move to c");
    let backend = history.build();

    let mut store = Store::in_memory().unwrap();
    let report = ingest(&backend, &mut store, &config(1));
    assert!(report.is_success());
    assert_eq!(report.totals, totals(5, 1));

    let chain = store.lineage(report.repository_id, "c.py", i64::MAX).unwrap();
    let paths: Vec<&str> = chain.iter().map(|e| e.path.as_str()).collect();
    assert_eq!(paths, vec!["c.py", "b.py", "a.py"]);
    assert_eq!(chain[0].precursor_file_id, Some(chain[1].file_id));
    assert_eq!(chain[1].precursor_file_id, Some(chain[2].file_id));
    assert_eq!(chain[2].precursor_file_id, None);
}

fn out_of_order_history() -> ScriptedBackend {
    let mut history = HistoryBuilder::new();
    history.set_clock(2000);
    history.write("a.py", "hello\n").write("b.py", "x\n");
    history.commit("c1");
    // committed before its parent
    history.set_clock(1000);
    history.remove("a.py").write("b.py", "0123456789abcdef\n");
    history.commit("c2");
    history.set_clock(500);
    history.rename("b.py", "c.py");
    history.commit("c3");
    history.build()
}

#[test]
fn commit_older_than_its_parent_still_updates_totals() {
    let backend = out_of_order_history();
    let mut store = Store::in_memory().unwrap();
    let report = ingest(&backend, &mut store, &config(2));

    assert!(report.is_success(), "{report:?}");
    assert_eq!(report.totals, totals(17, 1));
    let repo = report.repository_id;
    assert_eq!(store.commit_totals(repo, "c1").unwrap(), Some(totals(8, 2)));
    assert_eq!(store.commit_totals(repo, "c2").unwrap(), Some(totals(17, 1)));

    let chain = store.lineage(repo, "c.py", i64::MAX).unwrap();
    let paths: Vec<&str> = chain.iter().map(|e| e.path.as_str()).collect();
    assert_eq!(paths, vec!["c.py", "b.py"]);
    assert_eq!(chain[0].commit, "c3");

    // commit rows keep the recorded time
    let late = store.churn(repo, 500, 501).unwrap();
    assert_eq!(late.commits, 1);
    let rows = store.row_counts(repo).unwrap();
    assert_eq!(rows.files, 3);
    assert_eq!(rows.versions, 5);
}

#[test]
fn resumed_run_keeps_file_times_monotonic() {
    let backend = out_of_order_history();
    let mut store = Store::in_memory().unwrap();
    let first = ingest(&backend.truncated(1), &mut store, &config(1));
    assert_eq!(first.totals, totals(8, 2));

    let report = ingest(&backend, &mut store, &config(1));
    assert!(report.is_success(), "{report:?}");
    assert_eq!(report.skipped, 1);
    assert_eq!(report.applied, 2);
    assert_eq!(report.totals, totals(17, 1));

    let chain = store.lineage(report.repository_id, "c.py", i64::MAX).unwrap();
    assert_eq!(chain.len(), 2);
}

#[test]
fn malformed_hunk_header_keeps_the_version() {
    let mut history = HistoryBuilder::new();
    history.write("a.py", "one\n");
    history.commit("c1");
    history.write("a.py", "one\ntwo\nthree\n").garble_diff("a.py");
    let broken = history.commit("c2");
    let backend = history.build();

    let mut store = Store::in_memory().unwrap();
    let report = ingest(&backend, &mut store, &config(1));
    assert!(report.is_success(), "{report:?}");
    assert_eq!(report.totals, totals(14, 1));

    let repo = report.repository_id;
    assert_eq!(store.commit_totals(repo, &broken).unwrap(), Some(totals(14, 1)));
    assert!(store.changed_lines(repo, &broken, "a.py").unwrap().is_empty());

    let rows = store.row_counts(repo).unwrap();
    assert_eq!(rows.versions, 2);
    // only the root commit's line survives
    assert_eq!(rows.lines, 1);

    let at = backend.timestamp_of(&broken);
    let churn = store.churn(repo, at, at + 1).unwrap();
    assert_eq!(churn.commits, 1);
    assert_eq!(churn.churn(), 0);
}

#[test]
fn changed_lines_are_recorded_in_forward_time() {
    let mut history = HistoryBuilder::new();
    history.write("a.py", "one\n");
    history.commit("c1");
    history.write("a.py", "one\ntwo\n");
    let c2 = history.commit("append");
    history.write("a.py", "two\n");
    let c3 = history.commit("drop first line");
    let backend = history.build();

    let mut store = Store::in_memory().unwrap();
    let report = ingest(&backend, &mut store, &config(1));
    let repo = report.repository_id;

    assert_eq!(
        store.changed_lines(repo, &c2, "a.py").unwrap(),
        vec![LineEvent {
            number: 2,
            kind: LineKind::Added,
            text: "two".into(),
        }]
    );
    assert_eq!(
        store.changed_lines(repo, &c3, "a.py").unwrap(),
        vec![LineEvent {
            number: 1,
            kind: LineKind::Deleted,
            text: "one".into(),
        }]
    );

    let window = store
        .churn(repo, backend.timestamp_of(&c2), backend.timestamp_of(&c3) + 1)
        .unwrap();
    assert_eq!(window.commits, 2);
    assert_eq!(window.lines_added, 1);
    assert_eq!(window.lines_deleted, 1);
}

#[test]
fn line_rows_can_be_disabled() {
    let mut history = HistoryBuilder::new();
    history.write("a.py", "one\ntwo\n");
    history.commit("c1");
    let backend = history.build();
    let mut config = config(1);
    config.mining.write_lines = false;

    let mut store = Store::in_memory().unwrap();
    let report = ingest(&backend, &mut store, &config);
    let rows = store.row_counts(report.repository_id).unwrap();
    assert_eq!(rows.versions, 1);
    assert_eq!(rows.lines, 0);
    assert_eq!(
        store
            .churn(report.repository_id, 0, i64::MAX)
            .unwrap()
            .lines_added,
        2
    );
}

#[test]
fn issue_references_are_linked() {
    let mut history = HistoryBuilder::new();
    history.write("a.py", "1\n");
    history.commit("fix #12 and #7");
    history.write("a.py", "2\n");
    history.commit("follow-up for #12");
    history.write("a.py", "3\n");
    history.commit("no reference");
    let backend = history.build();

    let mut store = Store::in_memory().unwrap();
    let report = ingest(&backend, &mut store, &config(1));
    let rows = store.row_counts(report.repository_id).unwrap();
    assert_eq!(rows.issues, 2);
    assert_eq!(rows.issue_links, 3);
}

#[test]
fn custom_issue_pattern_uses_whole_match() {
    let mut history = HistoryBuilder::new();
    history.write("a.py", "1\n");
    history.commit("CORE-1: start, see #5");
    let backend = history.build();
    let mut config = config(1);
    config.issues.pattern = "[A-Z]+-[0-9]+".into();

    let mut store = Store::in_memory().unwrap();
    let report = ingest(&backend, &mut store, &config);
    let rows = store.row_counts(report.repository_id).unwrap();
    assert_eq!(rows.issues, 1);
    assert_eq!(rows.issue_links, 1);
}

#[test]
fn invalid_issue_pattern_is_a_config_error() {
    let backend = HistoryBuilder::new().build();
    let mut config = config(1);
    config.issues.pattern = "(".into();
    assert!(IngestionCoordinator::new(&backend, &config).is_err());
}

#[test]
fn configured_name_overrides_location() {
    let mut history = HistoryBuilder::new();
    history.write("a.py", "1\n");
    history.commit("c1");
    let backend = history.build();
    let mut config = config(1);
    config.repository.name = Some("upstream".into());

    let mut store = Store::in_memory().unwrap();
    let report = ingest(&backend, &mut store, &config);
    assert_eq!(report.repository, "upstream");
    assert_eq!(
        store.repository_id("upstream").unwrap(),
        Some(report.repository_id)
    );
}

#[test]
fn failed_commit_defers_the_rest_and_is_retried() {
    let mut history = HistoryBuilder::new();
    for i in 0..6 {
        history.write(&format!("f{i}.py"), &"x".repeat(i + 1));
        history.commit(&format!("c{i}"));
    }
    let backend = history.build();
    let ids = backend.commit_ids();
    let config = config(3);

    let mut clean_store = Store::in_memory().unwrap();
    let clean = ingest(&backend, &mut clean_store, &config);

    backend.break_commit(&ids[2]);
    let mut store = Store::in_memory().unwrap();
    let broken = ingest(&backend, &mut store, &config);

    assert!(!broken.is_success());
    assert_eq!(broken.applied, 2);
    assert_eq!(broken.failed.len(), 1);
    assert_eq!(broken.failed[0].commit, ids[2]);
    assert_eq!(broken.deferred, 3);
    let repo = broken.repository_id;
    assert_eq!(store.commit_count(repo).unwrap(), 2);
    assert_eq!(store.commit_totals(repo, &ids[1]).unwrap(), Some(broken.totals));
    assert_eq!(store.commit_totals(repo, &ids[2]).unwrap(), None);

    backend.heal();
    let retried = ingest(&backend, &mut store, &config);
    assert!(retried.is_success());
    assert_eq!(retried.skipped, 2);
    assert_eq!(retried.applied, 4);
    assert_eq!(retried.totals, clean.totals);
    assert_eq!(
        store.row_counts(repo).unwrap(),
        clean_store.row_counts(clean.repository_id).unwrap()
    );
}

/// Deterministic linear-congruential sequence.
struct Lcg(u64);

impl Lcg {
    fn next(&mut self, bound: usize) -> usize {
        self.0 = self
            .0
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1_442_695_040_888_963_407);
        ((self.0 >> 33) as usize) % bound
    }
}

fn random_history(commits: usize) -> (ScriptedBackend, (i64, i64)) {
    let mut rng = Lcg(7);
    let mut history = HistoryBuilder::new();
    let mut serial = 0;

    for n in 0..commits {
        let mut touched: Vec<String> = Vec::new();
        for _ in 0..=rng.next(3) {
            let paths: Vec<String> = history
                .paths()
                .into_iter()
                .filter(|p| !touched.contains(p))
                .collect();
            let op = if paths.is_empty() { 0 } else { rng.next(4) };
            match op {
                0 => {
                    serial += 1;
                    let path = format!("src/m{serial}.py");
                    let body = "line\n".repeat(rng.next(5) + 1);
                    history.write(&path, &body);
                    touched.push(path);
                }
                1 => {
                    let path = paths[rng.next(paths.len())].clone();
                    let body = format!("rev {n}\n").repeat(rng.next(4) + 1);
                    history.write(&path, &body);
                    touched.push(path);
                }
                2 => {
                    let path = paths[rng.next(paths.len())].clone();
                    history.remove(&path);
                    touched.push(path);
                }
                _ => {
                    serial += 1;
                    let from = paths[rng.next(paths.len())].clone();
                    let to = format!("lib/r{serial}.py");
                    history.rename(&from, &to);
                    touched.push(from);
                    touched.push(to);
                }
            }
        }
        history.commit(&format!("change {n} (#{})", n % 17));
    }

    let expected = history.expected_totals();
    (history.build(), expected)
}

#[test]
fn worker_count_does_not_change_the_result() {
    let (backend, (size, count)) = random_history(500);

    let mut serial_store = Store::in_memory().unwrap();
    let serial = ingest(&backend, &mut serial_store, &config(1));
    let mut parallel_store = Store::in_memory().unwrap();
    let parallel = ingest(&backend, &mut parallel_store, &config(4));

    assert!(serial.is_success());
    assert!(parallel.is_success());
    assert_eq!(serial.applied, 500);
    assert_eq!(parallel.applied, 500);
    assert_eq!(serial.totals, totals(size, count));
    assert_eq!(parallel.totals, serial.totals);
    assert_eq!(
        parallel_store.row_counts(parallel.repository_id).unwrap(),
        serial_store.row_counts(serial.repository_id).unwrap()
    );

    let ids = backend.commit_ids();
    for id in ids.iter().step_by(37) {
        assert_eq!(
            parallel_store.commit_totals(parallel.repository_id, id).unwrap(),
            serial_store.commit_totals(serial.repository_id, id).unwrap()
        );
    }
}
