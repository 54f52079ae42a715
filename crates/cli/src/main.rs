//! regatta - golden-file test runner for CQL-compatible servers
//!
//! Discovers test suites under the configured source tree, provisions
//! the server modes each suite asks for, runs every test file and
//! compares the output against recorded golden files.
//!
//! Exit codes: 0 clean, 1 on any content mismatch, 2 on an
//! infrastructure failure, 130 on interrupt.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::error;

mod adapter;
mod config;
mod discovery;
mod report;

use regatta_harness::{Harness, Lane};

/// Golden-file test runner for CQL-compatible database servers
#[derive(Parser)]
#[command(name = "regatta")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Keep running a suite after a test fails
    #[arg(short, long)]
    force: bool,

    /// Skip provisioning and run everything against a pre-installed
    /// server at this address
    #[arg(long)]
    uri: Option<String>,

    /// Directory holding the server binary
    #[arg(long)]
    builddir: Option<PathBuf>,

    /// Root directory of the test suites
    #[arg(long)]
    srcdir: Option<PathBuf>,

    /// Directory for server data, logs and rejected output
    #[arg(long)]
    vardir: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Substring patterns selecting which tests run (all when empty)
    patterns: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_target(false)
        .init();

    let mut config = config::Config::load()?;
    if let Some(builddir) = cli.builddir {
        config.builddir = builddir;
    }
    if let Some(srcdir) = cli.srcdir {
        config.srcdir = srcdir;
    }
    if let Some(vardir) = cli.vardir {
        config.vardir = vardir;
    }

    let connector = adapter::ShellConnector::new(config.shell.clone());
    let suites = discovery::discover(&config, connector, cli.uri.as_deref(), &cli.patterns)?;
    if suites.is_empty() {
        println!("no tests selected");
        return Ok(());
    }

    let lane = Arc::new(Lane::new(config.vardir.join("lane"), "1")?);
    let mut harness = Harness::new(lane.clone(), cli.force);
    for suite in suites {
        harness.add_suite(suite);
    }

    // On interrupt, kill whatever is running and leave suite-scoped
    // artefacts (data dirs, logs) in place for inspection.
    let interrupted_lane = lane.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            interrupted_lane.clear_before_exit();
            std::process::exit(130);
        }
    });

    let mut reporter = report::ConsoleReporter::new();
    match harness.run(&mut reporter).await {
        Ok(summary) => {
            reporter.summarize(&summary);
            lane.clear_before_exit();
            std::process::exit(summary.code);
        }
        Err(e) => {
            error!("run aborted: {e}");
            lane.clear_before_exit();
            std::process::exit(2);
        }
    }
}
