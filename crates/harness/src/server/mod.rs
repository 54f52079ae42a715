//! Server provisioning state machine
//!
//! Three ways to put a server under test: connect to a pre-installed
//! endpoint, spawn a single instance inside the lane, or bring up a
//! coordinated cluster of instances. The spawned variants compose the
//! endpoint variant and delegate keyspace setup and session creation
//! to it once their process is confirmed ready.

mod cluster;
mod endpoint;
mod single;

pub use cluster::ClusterServer;
pub use endpoint::{EndpointServer, NAMESPACE};
pub use single::SingleServer;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::connect::Connection;
use crate::error::Result;
use crate::lane::Lane;

/// Progress of one provisioned instance. Only ever advances; no step
/// is valid before its predecessor completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) enum ServerState {
    NotInstalled,
    Installed,
    Started,
    Ready,
    Connected,
}

impl ServerState {
    pub(crate) fn name(self) -> &'static str {
        match self {
            ServerState::NotInstalled => "not-installed",
            ServerState::Installed => "installed",
            ServerState::Started => "started",
            ServerState::Ready => "ready",
            ServerState::Connected => "connected",
        }
    }
}

/// Knobs for provisioning spawned server instances.
#[derive(Debug, Clone)]
pub struct ProvisionOptions {
    /// Path to the server binary
    pub binary: PathBuf,
    /// Environment variable naming the configuration directory
    pub conf_env: String,
    /// Regex matched against the server log to detect readiness
    pub ready_marker: String,
    /// How long to wait for the readiness marker
    pub start_timeout: Duration,
    /// Replication strategy for the test keyspace
    pub replication_strategy: String,
    /// Replication factor for the test keyspace
    pub replication_factor: usize,
}

impl Default for ProvisionOptions {
    fn default() -> Self {
        ProvisionOptions {
            binary: PathBuf::from("scylla"),
            conf_env: "SCYLLA_CONF".to_string(),
            ready_marker: "initialization completed".to_string(),
            start_timeout: Duration::from_secs(300),
            replication_strategy: "SimpleStrategy".to_string(),
            replication_factor: 1,
        }
    }
}

/// The closed set of server provisioning modes. Unknown mode tags are
/// rejected during suite discovery, never here.
#[derive(Debug)]
pub enum Server {
    /// A pre-installed server reachable at a known address
    Endpoint(EndpointServer),
    /// One instance spawned inside the lane
    Single(SingleServer),
    /// A coordinated multi-node cluster spawned inside the lane
    Cluster(ClusterServer),
}

impl Server {
    pub async fn start(&mut self, lane: &Arc<Lane>) -> Result<()> {
        match self {
            Server::Endpoint(server) => server.start(lane),
            Server::Single(server) => server.start(lane).await,
            Server::Cluster(server) => server.start(lane).await,
        }
    }

    pub fn connect(&mut self) -> Result<Box<dyn Connection>> {
        match self {
            Server::Endpoint(server) => server.connect(),
            Server::Single(server) => server.connect(),
            Server::Cluster(server) => server.connect(),
        }
    }

    pub fn mode_name(&self) -> &'static str {
        match self {
            Server::Endpoint(_) => "uri",
            Server::Single(_) => "single",
            Server::Cluster(_) => "cluster",
        }
    }
}
