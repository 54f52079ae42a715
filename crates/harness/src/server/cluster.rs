//! Cluster mode: a coordinated multi-node bring-up
//!
//! Every node gets its own leased address; all nodes share one seed
//! list and one cluster identifier, and the replication factor is the
//! node count. Node starts run concurrently and are joined with a
//! barrier; the first error is surfaced, siblings are never cancelled,
//! and every node that did start stays registered for teardown.

use std::sync::Arc;

use futures::future::join_all;
use tracing::info;
use uuid::Uuid;

use super::{ProvisionOptions, SingleServer};
use crate::connect::{Connection, Connector};
use crate::error::{Error, Result};
use crate::lane::{AddressLease, Lane};

#[derive(Debug)]
pub struct ClusterServer {
    connector: Arc<dyn Connector>,
    options: ProvisionOptions,
    size: usize,
    nodes: Vec<SingleServer>,
}

impl ClusterServer {
    pub fn new(connector: Arc<dyn Connector>, options: ProvisionOptions, size: usize) -> Self {
        ClusterServer {
            connector,
            options,
            size: size.max(1),
            nodes: Vec::new(),
        }
    }

    pub fn nodes(&self) -> &[SingleServer] {
        &self.nodes
    }

    pub async fn start(&mut self, lane: &Arc<Lane>) -> Result<()> {
        let mut addrs = Vec::with_capacity(self.size);
        for _ in 0..self.size {
            let addr = lane.lease_addr()?;
            lane.add_suite_artefact(Box::new(AddressLease::new(
                Arc::downgrade(lane),
                addr.clone(),
            )));
            addrs.push(addr);
        }
        let seeds = addrs.join(", ");
        let cluster_name = Uuid::new_v4().to_string();
        info!(size = self.size, cluster = %cluster_name, "starting cluster");

        let mut options = self.options.clone();
        options.replication_factor = self.size;

        let mut launches = Vec::with_capacity(self.size);
        for addr in addrs {
            let mut node = SingleServer::for_cluster(
                Arc::clone(&self.connector),
                options.clone(),
                addr,
                seeds.clone(),
                cluster_name.clone(),
            );
            let lane = Arc::clone(lane);
            launches.push(tokio::spawn(async move {
                let outcome = node.start(&lane).await;
                (node, outcome)
            }));
        }

        // Barrier: every launch runs to completion, a failing node
        // never cancels its siblings. Nodes are collected back even on
        // failure so partially-started instances stay owned.
        let mut first_err = None;
        for joined in join_all(launches).await {
            let (node, outcome) =
                joined.map_err(|e| Error::Internal(format!("cluster start task panicked: {e}")))?;
            self.nodes.push(node);
            if let Err(e) = outcome {
                first_err.get_or_insert(e);
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    pub fn connect(&mut self) -> Result<Box<dyn Connection>> {
        let node = self.nodes.first_mut().ok_or(Error::InvalidStateTransition {
            from: "not-installed".to_string(),
            to: "connected".to_string(),
        })?;
        node.connect()
    }
}
