//! Error types for the regatta harness
//!
//! Every variant here is an infrastructure failure: it aborts the
//! current suite/mode regardless of force-mode. Server-reported query
//! errors are ordinary rendered output and never surface through this
//! type.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using the harness Error
pub type Result<T> = std::result::Result<T, Error>;

/// Harness error types
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{path}: {source}")]
    Path {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("server binary {0} is missing or not executable")]
    BinaryNotExecutable(PathBuf),

    #[error("failed to start server {addr} on lane {lane}, check server log at {log}")]
    StartupTimeout {
        addr: String,
        lane: String,
        log: PathBuf,
    },

    #[error("invalid readiness pattern '{pattern}': {source}")]
    ReadinessPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("no free loopback address left on lane {0}")]
    AddressPoolExhausted(String),

    #[error("connecting to '{addr}' failed: {reason}")]
    Connect { addr: String, reason: String },

    #[error("transport failure while executing statement: {0}")]
    Transport(String),

    #[error("invalid server state transition: {from} -> {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("unknown server mode '{0}'")]
    UnknownMode(String),

    #[error("internal error: {0}")]
    Internal(String),
}
