//! Endpoint mode: a pre-installed server reachable at a known address
//!
//! The spawned modes embed this one and delegate to it once their
//! process is up, so keyspace setup lives in exactly one place.

use std::sync::Arc;

use tracing::debug;

use super::ServerState;
use crate::connect::{Connection, Connector};
use crate::error::{Error, Result};
use crate::lane::{Artefact, Lane};

/// The keyspace every test runs in.
pub const NAMESPACE: &str = "regatta";

const DROP_NAMESPACE: &str = "DROP KEYSPACE IF EXISTS regatta";

fn create_namespace(strategy: &str, factor: usize) -> String {
    format!(
        "CREATE KEYSPACE IF NOT EXISTS {NAMESPACE} WITH REPLICATION = \
         {{ 'class': '{strategy}', 'replication_factor' : {factor} }} AND DURABLE_WRITES=true"
    )
}

/// Suite-scoped artefact dropping the test keyspace. Owns the admin
/// session it needs; if the server is already gone by removal time the
/// drop quietly fails.
struct NamespaceDrop {
    conn: Box<dyn Connection>,
}

impl Artefact for NamespaceDrop {
    fn remove(&mut self) {
        if let Err(e) = self.conn.execute(DROP_NAMESPACE) {
            debug!("dropping test keyspace failed (server may be gone): {e}");
        }
        self.conn.close();
    }
}

#[derive(Debug)]
pub struct EndpointServer {
    addr: String,
    replication_strategy: String,
    replication_factor: usize,
    connector: Arc<dyn Connector>,
    state: ServerState,
}

impl EndpointServer {
    pub fn new(
        addr: impl Into<String>,
        connector: Arc<dyn Connector>,
        replication_strategy: impl Into<String>,
        replication_factor: usize,
    ) -> Self {
        let mut strategy = replication_strategy.into();
        if strategy.is_empty() {
            strategy = "SimpleStrategy".to_string();
        }
        EndpointServer {
            addr: addr.into(),
            replication_strategy: strategy,
            replication_factor: replication_factor.max(1),
            connector,
            state: ServerState::NotInstalled,
        }
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    pub(crate) fn set_addr(&mut self, addr: String) {
        self.addr = addr;
    }

    /// Open an administrative session and (re)create the test
    /// keyspace: drop-if-exists before create-if-not-exists, so a
    /// keyspace left over from an aborted run never taints this one.
    /// The drop is registered as a suite-scoped artefact.
    pub fn start(&mut self, lane: &Arc<Lane>) -> Result<()> {
        let mut admin = self.connector.connect(&self.addr, None)?;
        admin.execute(DROP_NAMESPACE)?;
        admin.execute(&create_namespace(
            &self.replication_strategy,
            self.replication_factor,
        ))?;
        lane.add_suite_artefact(Box::new(NamespaceDrop { conn: admin }));
        self.state = ServerState::Ready;
        Ok(())
    }

    /// Open a test session scoped to the test keyspace.
    pub fn connect(&mut self) -> Result<Box<dyn Connection>> {
        if self.state < ServerState::Ready {
            return Err(Error::InvalidStateTransition {
                from: self.state.name().to_string(),
                to: ServerState::Connected.name().to_string(),
            });
        }
        let conn = self
            .connector
            .connect(&self.addr, Some(NAMESPACE))
            .map_err(|e| Error::Connect {
                addr: self.addr.clone(),
                reason: e.to_string(),
            })?;
        self.state = ServerState::Connected;
        Ok(conn)
    }
}
