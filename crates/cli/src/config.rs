//! Harness configuration
//!
//! Loaded from `~/.regatta.yaml` when present; every field has a
//! default and every field can be overridden from the command line.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

pub const CONFIG_FILE: &str = ".regatta.yaml";

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Directory holding the server binary
    pub builddir: PathBuf,
    /// Root directory of the test suites
    pub srcdir: PathBuf,
    /// Directory the lane (server data, logs, rejects) lives under
    pub vardir: PathBuf,
    /// Server binary name, resolved inside `builddir`
    pub binary: String,
    /// Interactive shell binary used to talk to the server
    pub shell: String,
    /// Regex matched against the server log to detect readiness
    pub ready_marker: String,
    /// Seconds to wait for the readiness marker
    pub start_timeout_secs: u64,
    /// Node count for cluster mode
    pub cluster_size: usize,
    /// Replication strategy for the test keyspace
    pub replication_strategy: String,
    /// Replication factor for the test keyspace (cluster mode uses the
    /// cluster size instead)
    pub replication_factor: usize,
}

impl Default for Config {
    fn default() -> Self {
        let home = home_dir();
        Config {
            builddir: home.join("scylla/build/dev"),
            srcdir: home.join("scylla/tests"),
            vardir: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            binary: "scylla".to_string(),
            shell: "cqlsh".to_string(),
            ready_marker: "initialization completed".to_string(),
            start_timeout_secs: 300,
            cluster_size: 3,
            replication_strategy: "SimpleStrategy".to_string(),
            replication_factor: 1,
        }
    }
}

fn home_dir() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| PathBuf::from("."))
}

impl Config {
    /// Defaults, overlaid with `~/.regatta.yaml` when it exists.
    pub fn load() -> Result<Self> {
        Self::load_from(&home_dir().join(CONFIG_FILE))
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        match fs::read_to_string(path) {
            Ok(text) => serde_yaml::from_str(&text)
                .with_context(|| format!("malformed configuration in {}", path.display())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Config::default()),
            Err(e) => Err(e).with_context(|| format!("reading {}", path.display())),
        }
    }

    pub fn binary_path(&self) -> PathBuf {
        self.builddir.join(&self.binary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_derive_from_the_home_directory() {
        let config = Config::default();
        assert!(config.builddir.ends_with("scylla/build/dev"));
        assert!(config.srcdir.ends_with("scylla/tests"));
        assert!(config.builddir.is_absolute() || config.builddir.starts_with("."));
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(&dir.path().join(CONFIG_FILE)).unwrap();
        assert_eq!(config.binary, "scylla");
        assert_eq!(config.shell, "cqlsh");
        assert_eq!(config.cluster_size, 3);
    }

    #[test]
    fn partial_file_keeps_defaults_for_the_rest() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        fs::write(&path, "builddir: /opt/db/build\ncluster_size: 5\n").unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.builddir, PathBuf::from("/opt/db/build"));
        assert_eq!(config.cluster_size, 5);
        assert_eq!(config.binary, "scylla");
        assert_eq!(config.binary_path(), PathBuf::from("/opt/db/build/scylla"));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        fs::write(&path, "bulddir: /tmp\n").unwrap();
        assert!(Config::load_from(&path).is_err());
    }
}
