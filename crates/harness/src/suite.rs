//! Suite orchestration
//!
//! Binds discovered suites to server modes and sequences the runs:
//! one suite at a time, one mode at a time, one test at a time against
//! one connection. The only parallelism anywhere is cluster bring-up
//! inside `Server::start`.

use std::sync::Arc;

use tracing::info;

use crate::engine::{Outcome, TestFile};
use crate::error::Result;
use crate::lane::Lane;
use crate::server::Server;

/// Sink for per-test results. Rendering (colors, tables) lives behind
/// this seam, outside the core.
pub trait Reporter: Send {
    fn suite_started(&mut self, suite: &str, mode: &str);

    /// `diff` is only present for a fail outcome.
    fn test_finished(
        &mut self,
        lane_id: &str,
        full_name: &str,
        mode: &str,
        outcome: Outcome,
        diff: Option<&str>,
    );

    fn suite_finished(&mut self, suite: &str, mode: &str, code: i32);
}

/// A named collection of test files plus the server modes to run them
/// against.
#[derive(Debug)]
pub struct TestSuite {
    pub name: String,
    pub description: String,
    pub tests: Vec<TestFile>,
    pub servers: Vec<Server>,
}

impl TestSuite {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        TestSuite {
            name: name.into(),
            description: description.into(),
            tests: Vec::new(),
            servers: Vec::new(),
        }
    }

    pub fn add_mode(&mut self, server: Server) {
        self.servers.push(server);
    }

    pub fn add_test(&mut self, test: TestFile) {
        self.tests.push(test);
    }

    pub fn is_empty(&self) -> bool {
        self.tests.is_empty()
    }
}

/// Per-run result handed back to the caller.
#[derive(Debug, Default)]
pub struct RunSummary {
    /// 0 clean, 1 on any content mismatch
    pub code: i32,
    /// Union of failed `suite/test` identifiers across all suites
    pub failed: Vec<String>,
}

/// The main harness state: one lane, the discovered suites, and the
/// force flag ("go on after an individual test failure").
pub struct Harness {
    lane: Arc<Lane>,
    suites: Vec<TestSuite>,
    force: bool,
}

impl Harness {
    pub fn new(lane: Arc<Lane>, force: bool) -> Self {
        Harness {
            lane,
            suites: Vec::new(),
            force,
        }
    }

    pub fn lane(&self) -> &Arc<Lane> {
        &self.lane
    }

    pub fn add_suite(&mut self, suite: TestSuite) {
        self.suites.push(suite);
    }

    /// Run every suite against every configured mode.
    ///
    /// Content mismatches respect force-mode; any infrastructure
    /// failure (server start, connection, transport mid-file) aborts
    /// the whole run with `Err`.
    pub async fn run(&mut self, reporter: &mut dyn Reporter) -> Result<RunSummary> {
        let mut summary = RunSummary::default();

        for suite in &mut self.suites {
            let mut stop_suite = false;
            for server in &mut suite.servers {
                if stop_suite {
                    break;
                }
                // Cleared before the next suite/mode starts, not after
                // the previous one ends, to keep artefacts inspectable.
                self.lane.clear_before_next_suite();

                let mode = server.mode_name();
                info!(suite = %suite.name, mode, "preparing suite");
                reporter.suite_started(&suite.name, mode);
                server.start(&self.lane).await?;
                let mut conn = server.connect()?;

                let mut mode_code = 0;
                for test in &suite.tests {
                    let full_name = format!("{}/{}", suite.name, test.name);
                    let outcome = match test.run(conn.as_mut(), &self.lane) {
                        Ok(outcome) => outcome,
                        Err(e) => {
                            conn.close();
                            return Err(e);
                        }
                    };
                    if outcome == Outcome::Fail {
                        let diff = test.diff().unwrap_or_default();
                        reporter.test_finished(
                            self.lane.id(),
                            &full_name,
                            mode,
                            outcome,
                            Some(&diff),
                        );
                        mode_code = 1;
                        self.lane.record_failure(full_name);
                        if !self.force {
                            stop_suite = true;
                            break;
                        }
                    } else {
                        reporter.test_finished(self.lane.id(), &full_name, mode, outcome, None);
                    }
                }
                conn.close();
                reporter.suite_finished(&suite.name, mode, mode_code);

                if mode_code != 0 {
                    summary.code = 1;
                }
                summary.failed.extend(self.lane.take_failures());
            }
        }

        Ok(summary)
    }
}
