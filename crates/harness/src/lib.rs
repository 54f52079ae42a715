//! Regatta harness core
//!
//! Provisions database server instances, runs scripted query workloads
//! against them and compares the produced output to recorded golden
//! files.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │  Harness                                                     │
//! │    ├── Lane: working dir + ordered artefact queues           │
//! │    │     exit-scoped (processes) / suite-scoped (data, dirs, │
//! │    │     keyspaces, address leases)                          │
//! │    ├── Server: endpoint | single | cluster                   │
//! │    │     install -> start -> ready -> connected              │
//! │    └── TestFile: echo lines, assemble statements, execute,   │
//! │          byte-compare against golden, reject + diff on fail  │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! The wire driver, discovery, configuration and terminal rendering
//! live outside this crate, behind the [`connect::Connector`] and
//! [`suite::Reporter`] seams.

pub mod connect;
pub mod engine;
pub mod error;
pub mod lane;
pub mod server;
pub mod suite;

pub use connect::{Connection, Connector};
pub use engine::{Outcome, TestFile, TEST_SUFFIX};
pub use error::{Error, Result};
pub use lane::{Artefact, Lane};
pub use server::{ClusterServer, EndpointServer, ProvisionOptions, Server, SingleServer};
pub use suite::{Harness, Reporter, RunSummary, TestSuite};
