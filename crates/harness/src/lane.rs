//! Scoped-resource lifecycle: artefacts and the test lane
//!
//! An artefact is anything a test or suite leaves behind while it runs:
//! a spawned server process, its data directory, a keyspace created on
//! a running server, a leased loopback address. Exit-scoped artefacts
//! are removed on harness exit or interrupt; suite-scoped artefacts are
//! removed before the next suite starts, not after the current one
//! ends, so data directories and logs stay available for inspection
//! after a crash or failure.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Weak;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

/// A single scoped external resource.
///
/// Removal is best-effort: by the time a suite-scoped artefact is
/// drained its dependencies (e.g. the server a keyspace lived on) may
/// already be gone, so implementations log failures instead of
/// propagating them.
pub trait Artefact: Send {
    fn remove(&mut self);
}

#[derive(Default)]
struct LaneInner {
    /// Artefacts removed on harness exit or interrupt, in append order
    exit_scoped: Vec<Box<dyn Artefact>>,
    /// Artefacts removed before the next suite, in append order
    suite_scoped: Vec<Box<dyn Artefact>>,
    /// Loopback addresses currently leased to servers
    leased: BTreeSet<String>,
    /// Failed test identifiers for the current suite pass
    failed: Vec<String>,
}

/// A test lane: an isolated working directory plus resource tracking
/// for one harness run.
///
/// All mutable state sits behind one lock so the interrupt listener and
/// a concurrent cluster bring-up never race on queue mutation.
pub struct Lane {
    dir: PathBuf,
    id: String,
    inner: Mutex<LaneInner>,
}

impl Lane {
    /// Create the lane, wiping any data a previous run left in its
    /// directory. Called exactly once per harness run; a directory
    /// error here is fatal infrastructure failure.
    pub fn new(dir: impl Into<PathBuf>, id: impl Into<String>) -> Result<Self> {
        let dir = dir.into();
        match fs::remove_dir_all(&dir) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(Error::Path { path: dir, source: e }),
        }
        fs::create_dir_all(&dir).map_err(|e| Error::Path {
            path: dir.clone(),
            source: e,
        })?;
        Ok(Lane {
            dir,
            id: id.into(),
            inner: Mutex::new(LaneInner::default()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn add_exit_artefact(&self, artefact: Box<dyn Artefact>) {
        self.inner.lock().exit_scoped.push(artefact);
    }

    pub fn add_suite_artefact(&self, artefact: Box<dyn Artefact>) {
        self.inner.lock().suite_scoped.push(artefact);
    }

    /// Number of (exit-scoped, suite-scoped) artefacts currently queued.
    pub fn pending_artefacts(&self) -> (usize, usize) {
        let inner = self.inner.lock();
        (inner.exit_scoped.len(), inner.suite_scoped.len())
    }

    /// Remove every queued artefact and reset the failed-test list.
    /// Called before preparing the next suite/mode so nothing from the
    /// previous run leaks into it.
    ///
    /// Exit-scoped artefacts (running processes) drain first, then
    /// suite-scoped ones (keyspaces, data dirs, leases), each in append
    /// order. Both queues are swapped out under the lock before any
    /// removal runs: a racing interrupt can never drain the same
    /// artefact twice.
    pub fn clear_before_next_suite(&self) {
        let (mut exit_scoped, mut suite_scoped) = {
            let mut inner = self.inner.lock();
            inner.failed.clear();
            (
                std::mem::take(&mut inner.exit_scoped),
                std::mem::take(&mut inner.suite_scoped),
            )
        };
        debug!(
            lane = %self.id,
            exit = exit_scoped.len(),
            suite = suite_scoped.len(),
            "clearing lane artefacts"
        );
        for artefact in &mut exit_scoped {
            artefact.remove();
        }
        for artefact in &mut suite_scoped {
            artefact.remove();
        }
    }

    /// Abort path: remove only exit-scoped artefacts (kill live
    /// processes), deliberately leaving the lane directory and
    /// suite-scoped state on disk for postmortem inspection.
    pub fn clear_before_exit(&self) {
        let mut exit_scoped = std::mem::take(&mut self.inner.lock().exit_scoped);
        if !exit_scoped.is_empty() {
            info!(lane = %self.id, count = exit_scoped.len(), "removing exit-scoped artefacts");
        }
        for artefact in &mut exit_scoped {
            artefact.remove();
        }
    }

    /// Lease a loopback address unique within this lane. Every server
    /// instance needs its own address since all instances of a cluster
    /// share one port.
    pub fn lease_addr(&self) -> Result<String> {
        let mut inner = self.inner.lock();
        for host in 2u8..=254 {
            let addr = format!("127.0.0.{host}");
            if !inner.leased.contains(&addr) {
                inner.leased.insert(addr.clone());
                return Ok(addr);
            }
        }
        Err(Error::AddressPoolExhausted(self.id.clone()))
    }

    /// Return a leased address to the pool.
    pub fn release_addr(&self, addr: &str) {
        if !self.inner.lock().leased.remove(addr) {
            warn!(lane = %self.id, addr, "releasing an address that was not leased");
        }
    }

    /// Record a failed test identifier for the current suite pass.
    pub fn record_failure(&self, full_name: impl Into<String>) {
        self.inner.lock().failed.push(full_name.into());
    }

    /// Drain the failed-test identifiers accumulated so far.
    pub fn take_failures(&self) -> Vec<String> {
        std::mem::take(&mut self.inner.lock().failed)
    }
}

/// Suite-scoped artefact returning a leased address to the lane pool.
/// The address is taken on first removal, so a lease is released
/// exactly once even if the artefact is drained defensively twice.
pub struct AddressLease {
    lane: Weak<Lane>,
    addr: Option<String>,
}

impl AddressLease {
    pub fn new(lane: Weak<Lane>, addr: String) -> Self {
        AddressLease {
            lane,
            addr: Some(addr),
        }
    }
}

impl Artefact for AddressLease {
    fn remove(&mut self) {
        if let (Some(lane), Some(addr)) = (self.lane.upgrade(), self.addr.take()) {
            lane.release_addr(&addr);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex as StdMutex};

    struct Recorder {
        tag: u32,
        log: Arc<StdMutex<Vec<u32>>>,
    }

    impl Artefact for Recorder {
        fn remove(&mut self) {
            self.log.lock().unwrap().push(self.tag);
        }
    }

    fn lane() -> Lane {
        let dir = tempfile::tempdir().unwrap();
        Lane::new(dir.into_path(), "1").unwrap()
    }

    #[test]
    fn new_lane_wipes_previous_data() {
        let dir = tempfile::tempdir().unwrap();
        let stale = dir.path().join("lane").join("old.log");
        fs::create_dir_all(stale.parent().unwrap()).unwrap();
        fs::write(&stale, "leftover").unwrap();

        let lane = Lane::new(dir.path().join("lane"), "1").unwrap();
        assert!(lane.dir().exists());
        assert!(!stale.exists());
    }

    #[test]
    fn clear_drains_exit_then_suite_in_append_order() {
        let lane = lane();
        let log = Arc::new(StdMutex::new(Vec::new()));
        lane.add_suite_artefact(Box::new(Recorder { tag: 10, log: log.clone() }));
        lane.add_exit_artefact(Box::new(Recorder { tag: 1, log: log.clone() }));
        lane.add_exit_artefact(Box::new(Recorder { tag: 2, log: log.clone() }));
        lane.add_suite_artefact(Box::new(Recorder { tag: 11, log: log.clone() }));

        lane.clear_before_next_suite();
        assert_eq!(*log.lock().unwrap(), vec![1, 2, 10, 11]);
        assert_eq!(lane.pending_artefacts(), (0, 0));
    }

    #[test]
    fn clear_before_exit_leaves_suite_artefacts() {
        let lane = lane();
        let log = Arc::new(StdMutex::new(Vec::new()));
        lane.add_exit_artefact(Box::new(Recorder { tag: 1, log: log.clone() }));
        lane.add_suite_artefact(Box::new(Recorder { tag: 10, log: log.clone() }));

        lane.clear_before_exit();
        assert_eq!(*log.lock().unwrap(), vec![1]);
        assert_eq!(lane.pending_artefacts(), (0, 1));
    }

    #[test]
    fn leases_are_unique_and_released_once() {
        let lane = Arc::new(lane());
        let a = lane.lease_addr().unwrap();
        let b = lane.lease_addr().unwrap();
        assert_ne!(a, b);

        let mut release = AddressLease::new(Arc::downgrade(&lane), a.clone());
        release.remove();
        // Second removal is a no-op, the lease was already returned.
        release.remove();
        assert_eq!(lane.lease_addr().unwrap(), a);
    }

    #[test]
    fn clear_resets_failed_list() {
        let lane = lane();
        lane.record_failure("suite/test");
        lane.clear_before_next_suite();
        assert!(lane.take_failures().is_empty());
    }

    #[test]
    fn failures_accumulate_until_taken() {
        let lane = lane();
        lane.record_failure("lwt/insert.test.cql");
        lane.record_failure("lwt/delete.test.cql");
        assert_eq!(
            lane.take_failures(),
            vec!["lwt/insert.test.cql", "lwt/delete.test.cql"]
        );
        assert!(lane.take_failures().is_empty());
    }
}
