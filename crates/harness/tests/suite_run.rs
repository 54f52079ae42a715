//! End-to-end orchestrator runs against an endpoint-mode server backed
//! by the scripted connector.

mod common;

use std::fs;
use std::path::Path;
use std::sync::Arc;

use common::ScriptedConnector;
use regatta_harness::{
    EndpointServer, Error, Harness, Lane, Outcome, Reporter, Server, TestFile, TestSuite,
};

#[derive(Default)]
struct CollectingReporter {
    outcomes: Vec<(String, &'static str)>,
    diffs: Vec<String>,
}

impl Reporter for CollectingReporter {
    fn suite_started(&mut self, _suite: &str, _mode: &str) {}

    fn test_finished(
        &mut self,
        _lane_id: &str,
        full_name: &str,
        _mode: &str,
        outcome: Outcome,
        diff: Option<&str>,
    ) {
        self.outcomes.push((full_name.to_string(), outcome.name()));
        if let Some(diff) = diff {
            self.diffs.push(diff.to_string());
        }
    }

    fn suite_finished(&mut self, _suite: &str, _mode: &str, _code: i32) {}
}

fn harness_for(
    suite_dir: &Path,
    lane_dir: &Path,
    connector: Arc<ScriptedConnector>,
    force: bool,
    bodies: &[(&str, &str)],
) -> Harness {
    let lane = Arc::new(Lane::new(lane_dir, "1").unwrap());
    let mut suite = TestSuite::new("smoke", "scripted endpoint suite");
    for (name, body) in bodies {
        let path = suite_dir.join(name);
        if !path.exists() {
            fs::write(&path, body).unwrap();
        }
        suite.add_test(TestFile::new(path));
    }
    suite.add_mode(Server::Endpoint(EndpointServer::new(
        "127.0.0.1",
        connector,
        "SimpleStrategy",
        1,
    )));
    let mut harness = Harness::new(lane, force);
    harness.add_suite(suite);
    harness
}

const BODIES: &[(&str, &str)] = &[
    ("a.test.cql", "SELECT * FROM t;\n"),
    ("b.test.cql", "-- setup\nINSERT INTO t (pk) VALUES (1);\n"),
];

#[tokio::test]
async fn first_run_creates_goldens_and_second_run_passes() {
    let dir = tempfile::tempdir().unwrap();
    let connector = Arc::new(ScriptedConnector::new());

    let mut harness = harness_for(dir.path(), &dir.path().join("lane1"), connector.clone(), false, BODIES);
    let mut reporter = CollectingReporter::default();
    let summary = harness.run(&mut reporter).await.unwrap();

    assert_eq!(summary.code, 0);
    assert!(summary.failed.is_empty());
    assert_eq!(
        reporter.outcomes,
        vec![
            ("smoke/a.test.cql".to_string(), "new"),
            ("smoke/b.test.cql".to_string(), "new"),
        ]
    );
    assert_eq!(
        fs::read_to_string(dir.path().join("a.result")).unwrap(),
        "SELECT * FROM t;\n  pk | v\n  1  | x\n"
    );

    // Keyspace setup went through the admin session first: drop before
    // (re)create, so a stale keyspace never taints the run.
    let executed = connector.executed();
    assert!(executed[0].starts_with("DROP KEYSPACE IF EXISTS regatta"));
    assert!(executed[1].starts_with("CREATE KEYSPACE IF NOT EXISTS regatta"));

    // Unchanged rerun on a fresh harness: everything passes, nothing
    // is rejected.
    let mut harness = harness_for(dir.path(), &dir.path().join("lane2"), connector, false, BODIES);
    let mut reporter = CollectingReporter::default();
    let summary = harness.run(&mut reporter).await.unwrap();
    assert_eq!(summary.code, 0);
    assert_eq!(
        reporter.outcomes,
        vec![
            ("smoke/a.test.cql".to_string(), "pass"),
            ("smoke/b.test.cql".to_string(), "pass"),
        ]
    );
    assert!(!dir.path().join("a.reject").exists());
}

#[tokio::test]
async fn edited_golden_fails_and_force_mode_continues() {
    let dir = tempfile::tempdir().unwrap();
    let connector = Arc::new(ScriptedConnector::new());

    let mut harness = harness_for(dir.path(), &dir.path().join("lane1"), connector.clone(), false, BODIES);
    harness.run(&mut CollectingReporter::default()).await.unwrap();

    // Sabotage the first golden file.
    fs::write(dir.path().join("a.result"), "SELECT * FROM t;\n  empty\n").unwrap();

    // Without force the suite stops at the first mismatch.
    let mut harness = harness_for(dir.path(), &dir.path().join("lane2"), connector.clone(), false, BODIES);
    let mut reporter = CollectingReporter::default();
    let summary = harness.run(&mut reporter).await.unwrap();
    assert_eq!(summary.code, 1);
    assert_eq!(summary.failed, vec!["smoke/a.test.cql".to_string()]);
    assert_eq!(reporter.outcomes.len(), 1);
    assert!(dir.path().join("a.reject").exists());
    assert!(reporter.diffs[0].contains("-  empty"));

    // With force the remaining tests still run.
    let mut harness = harness_for(dir.path(), &dir.path().join("lane3"), connector, true, BODIES);
    let mut reporter = CollectingReporter::default();
    let summary = harness.run(&mut reporter).await.unwrap();
    assert_eq!(summary.code, 1);
    assert_eq!(
        reporter.outcomes,
        vec![
            ("smoke/a.test.cql".to_string(), "fail"),
            ("smoke/b.test.cql".to_string(), "pass"),
        ]
    );
}

#[tokio::test]
async fn transport_failure_aborts_the_whole_run() {
    let dir = tempfile::tempdir().unwrap();
    let connector = Arc::new(ScriptedConnector::new());

    let bodies: &[(&str, &str)] = &[
        ("crash.test.cql", "SELECT BOOM;\n"),
        ("after.test.cql", "SELECT 1;\n"),
    ];
    let mut harness = harness_for(dir.path(), &dir.path().join("lane1"), connector, true, bodies);
    let err = harness.run(&mut CollectingReporter::default()).await.unwrap_err();

    // Force-mode does not attenuate transport failures.
    assert!(matches!(err, Error::Transport(_)));
    assert!(!dir.path().join("after.result").exists());
}

#[tokio::test]
async fn connection_refused_is_an_infra_error() {
    let dir = tempfile::tempdir().unwrap();
    let connector = Arc::new(ScriptedConnector {
        refuse: true,
        ..ScriptedConnector::new()
    });

    let mut harness = harness_for(dir.path(), &dir.path().join("lane1"), connector, false, BODIES);
    let err = harness.run(&mut CollectingReporter::default()).await.unwrap_err();
    assert!(matches!(err, Error::Connect { .. }));
}
