//! Terminal rendering of run progress and the final summary.

use colored::Colorize;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};

use regatta_harness::{Outcome, Reporter, RunSummary};

const HEADER_WIDTH: usize = 80;

fn outcome_cell(outcome: Outcome) -> String {
    match outcome {
        Outcome::Pass => outcome.name().green().to_string(),
        Outcome::New => outcome.name().blue().to_string(),
        Outcome::Fail => outcome.name().red().to_string(),
    }
}

/// Colorize a unified diff, leaving the two `---`/`+++` header lines
/// alone.
fn colorize_diff(diff: &str) -> String {
    let mut out = String::new();
    for (i, line) in diff.lines().enumerate() {
        let rendered = if i < 2 {
            line.normal()
        } else if line.starts_with('+') {
            line.green()
        } else if line.starts_with('-') {
            line.red()
        } else {
            line.normal()
        };
        out.push_str(&rendered.to_string());
        out.push('\n');
    }
    out
}

/// Progress reporter printing one line per finished test, a diff after
/// every failure and a table of failures at the end.
#[derive(Default)]
pub struct ConsoleReporter {
    header_printed: bool,
    passed: usize,
    created: usize,
    failed: usize,
}

impl ConsoleReporter {
    pub fn new() -> Self {
        ConsoleReporter::default()
    }

    /// Print the final accounting once the whole run is over.
    pub fn summarize(&self, summary: &RunSummary) {
        println!("{}", "=".repeat(HEADER_WIDTH));
        println!(
            "passed: {}  new: {}  failed: {}",
            self.passed, self.created, self.failed
        );

        if !summary.failed.is_empty() {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["failed test", "reject file"]);
            for name in &summary.failed {
                let reject = name
                    .strip_suffix("test.cql")
                    .map(|stem| format!("{stem}reject"))
                    .unwrap_or_else(|| name.clone());
                table.add_row(vec![name.clone(), reject]);
            }
            println!("{table}");
        }
    }
}

impl Reporter for ConsoleReporter {
    fn suite_started(&mut self, suite: &str, mode: &str) {
        if !self.header_printed {
            println!("{}", "=".repeat(HEADER_WIDTH));
            println!("{:>5} {:<50} {:<18} {:<8}", "LANE", "TEST", "MODE", "RESULT");
            self.header_printed = true;
        }
        println!("{}", format!("-- {suite} ({mode}) --").dimmed());
    }

    fn test_finished(
        &mut self,
        lane_id: &str,
        full_name: &str,
        mode: &str,
        outcome: Outcome,
        diff: Option<&str>,
    ) {
        match outcome {
            Outcome::Pass => self.passed += 1,
            Outcome::New => self.created += 1,
            Outcome::Fail => self.failed += 1,
        }
        println!(
            "{:>5} {:<50} {:<18} {:<8}",
            lane_id,
            full_name,
            mode,
            outcome_cell(outcome)
        );
        if let Some(diff) = diff {
            print!("{}", colorize_diff(diff));
        }
    }

    fn suite_finished(&mut self, _suite: &str, _mode: &str, _code: i32) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plain() {
        colored::control::set_override(false);
    }

    #[test]
    fn diff_headers_stay_uncolored_and_body_lines_survive() {
        plain();
        let diff = "--- golden\n+++ reject\n@@ -1 +1 @@\n-old\n+new\n";
        assert_eq!(colorize_diff(diff), diff);
    }

    #[test]
    fn counters_track_outcomes() {
        plain();
        let mut reporter = ConsoleReporter::new();
        reporter.suite_started("s", "single");
        reporter.test_finished("1", "s/a.test.cql", "single", Outcome::New, None);
        reporter.test_finished("1", "s/b.test.cql", "single", Outcome::Pass, None);
        reporter.test_finished("1", "s/c.test.cql", "single", Outcome::Fail, Some("--- a\n"));
        assert_eq!(
            (reporter.passed, reporter.created, reporter.failed),
            (1, 1, 1)
        );
    }
}
