//! Connection boundary
//!
//! The wire protocol and driver live outside the harness. The core
//! only needs two capabilities: execute one statement and get back the
//! rendered text, and open sessions to an address. Table rendering and
//! driver-specific error-code mapping belong to the adapter that
//! implements these traits.

use std::fmt;

use crate::error::Result;

/// One session against a server.
pub trait Connection: Send {
    /// Execute a single statement and return its rendered response.
    ///
    /// A server-reported query error is ordinary output: the adapter
    /// renders it and returns `Ok`. `Err` means a transport or
    /// driver-internal failure and aborts the run.
    fn execute(&mut self, statement: &str) -> Result<String>;

    fn close(&mut self);
}

/// Session factory owned by the Connection adapter.
pub trait Connector: Send + Sync {
    /// Open a session to `addr`, scoped to `namespace` when given.
    fn connect(&self, addr: &str, namespace: Option<&str>) -> Result<Box<dyn Connection>>;
}

impl fmt::Debug for dyn Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Connection")
    }
}

impl fmt::Debug for dyn Connector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Connector")
    }
}
