//! Suite discovery
//!
//! A test suite is a direct subdirectory of `srcdir` carrying a
//! `suite.yaml` manifest. The manifest names the server modes the
//! suite runs against; the suite's test files are every `*.test.cql`
//! in the directory, in lexical order.

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::debug;
use walkdir::WalkDir;

use regatta_harness::{
    ClusterServer, Connector, EndpointServer, Error, ProvisionOptions, Server, SingleServer,
    TestFile, TestSuite, TEST_SUFFIX,
};

use crate::config::Config;

pub const MANIFEST_FILE: &str = "suite.yaml";

/// Address used for `uri` mode when no `--uri` override is given.
const DEFAULT_URI: &str = "127.0.0.1";

#[derive(Debug, Deserialize)]
struct Manifest {
    description: String,
    #[serde(default = "default_modes")]
    modes: Vec<String>,
}

fn default_modes() -> Vec<String> {
    vec!["single".to_string()]
}

fn provision_options(config: &Config) -> ProvisionOptions {
    ProvisionOptions {
        binary: config.binary_path(),
        ready_marker: config.ready_marker.clone(),
        start_timeout: Duration::from_secs(config.start_timeout_secs),
        replication_strategy: config.replication_strategy.clone(),
        replication_factor: config.replication_factor,
        ..ProvisionOptions::default()
    }
}

fn server_for_mode(
    tag: &str,
    config: &Config,
    connector: &Arc<dyn Connector>,
    uri: Option<&str>,
) -> Result<Server> {
    let server = match tag {
        "uri" => Server::Endpoint(EndpointServer::new(
            uri.unwrap_or(DEFAULT_URI),
            connector.clone(),
            config.replication_strategy.clone(),
            config.replication_factor,
        )),
        "single" => Server::Single(SingleServer::new(
            connector.clone(),
            provision_options(config),
        )),
        "cluster" => Server::Cluster(ClusterServer::new(
            connector.clone(),
            provision_options(config),
            config.cluster_size,
        )),
        other => return Err(Error::UnknownMode(other.to_string()).into()),
    };
    Ok(server)
}

/// Whether `full_name` ("suite/file.test.cql") is selected by the
/// given patterns. No patterns selects everything; otherwise one
/// substring match suffices, and a file is never included twice.
fn selected(full_name: &str, patterns: &[String]) -> bool {
    patterns.is_empty() || patterns.iter().any(|p| full_name.contains(p.as_str()))
}

/// Scan `srcdir` for suites and assemble them, ready to run.
///
/// `uri` replaces every suite's configured modes with a single
/// endpoint mode at that address. Suites left without any test after
/// pattern filtering are dropped.
pub fn discover(
    config: &Config,
    connector: Arc<dyn Connector>,
    uri: Option<&str>,
    patterns: &[String],
) -> Result<Vec<TestSuite>> {
    let mut suites = Vec::new();

    let mut dirs: Vec<_> = fs::read_dir(&config.srcdir)
        .with_context(|| format!("scanning suite root {}", config.srcdir.display()))?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_dir() && path.join(MANIFEST_FILE).is_file())
        .collect();
    dirs.sort();

    for dir in dirs {
        let suite = load_suite(&dir, config, &connector, uri, patterns)?;
        match suite {
            Some(suite) => suites.push(suite),
            None => debug!(dir = %dir.display(), "suite has no selected tests, skipping"),
        }
    }

    Ok(suites)
}

fn load_suite(
    dir: &Path,
    config: &Config,
    connector: &Arc<dyn Connector>,
    uri: Option<&str>,
    patterns: &[String],
) -> Result<Option<TestSuite>> {
    let name = dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let manifest_path = dir.join(MANIFEST_FILE);
    let text = fs::read_to_string(&manifest_path)
        .with_context(|| format!("reading {}", manifest_path.display()))?;
    let manifest: Manifest = serde_yaml::from_str(&text)
        .with_context(|| format!("malformed manifest {}", manifest_path.display()))?;

    let mut suite = TestSuite::new(&name, &manifest.description);

    let mut files: Vec<_> = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.into_path())
        .filter(|path| {
            path.file_name()
                .map(|n| n.to_string_lossy().ends_with(TEST_SUFFIX))
                .unwrap_or(false)
        })
        .collect();
    files.sort();

    for path in files {
        let test = TestFile::new(path);
        let full_name = format!("{}/{}", name, test.name);
        if selected(&full_name, patterns) {
            suite.add_test(test);
        }
    }

    if suite.is_empty() {
        return Ok(None);
    }

    // Mode tags are validated even when --uri overrides them, so a
    // typo in a manifest never passes silently.
    for tag in &manifest.modes {
        let server = server_for_mode(tag, config, connector, uri)?;
        if uri.is_none() {
            suite.add_mode(server);
        }
    }
    if uri.is_some() {
        suite.add_mode(server_for_mode("uri", config, connector, uri)?);
    }

    Ok(Some(suite))
}
