//! Single mode: one server instance spawned inside the lane
//!
//! The instance gets a leased loopback address, a private subdirectory
//! of the lane and a configuration file rendered from a template. Its
//! stdout/stderr go to a log file which is polled for the readiness
//! marker. The process-kill artefact is registered the moment the
//! process exists, before the readiness wait, so an interrupt during a
//! stuck boot still kills it.

use std::fs::{self, File};
use std::io::Read;
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::sync::Arc;
use std::time::{Duration, Instant};

use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{EndpointServer, ProvisionOptions, ServerState};
use crate::connect::{Connection, Connector};
use crate::error::{Error, Result};
use crate::lane::{AddressLease, Artefact, Lane};

/// Log poll interval while waiting for the readiness marker
const START_POLL: Duration = Duration::from_millis(10);

/// How long a terminated server gets to die gracefully before SIGKILL
const STOP_GRACE: Duration = Duration::from_secs(3);

const STOP_POLL: Duration = Duration::from_millis(50);

const CONFIG_FILE: &str = "server.yaml";

const CONFIG_TEMPLATE: &str = "\
cluster_name: {{cluster_name}}
developer_mode: true
data_file_directories:
    - {{dir}}/data
commitlog_directory: {{dir}}/commitlog
hints_directory: {{dir}}/hints
view_hints_directory: {{dir}}/view_hints

listen_address: {{addr}}
rpc_address: {{addr}}
api_address: {{addr}}
prometheus_address: {{addr}}

seed_provider:
    - class_name: org.apache.cassandra.locator.SimpleSeedProvider
      parameters:
          - seeds: {{seeds}}

skip_wait_for_gossip_to_settle: {{skip_gossip}}
ring_delay_ms: 3000
";

/// Plain named-field substitution: every `{{name}}` in the template is
/// replaced with its value.
fn render_config(template: &str, fields: &[(&str, &str)]) -> String {
    let mut rendered = template.to_string();
    for (name, value) in fields {
        rendered = rendered.replace(&format!("{{{{{name}}}}}"), value);
    }
    rendered
}

/// Exit-scoped artefact killing the spawned server: SIGTERM first,
/// with a forced-kill fallback that stays armed for the grace window
/// and is disarmed the moment the exit is observed. The child is
/// always reaped, so the pid is never signalled after reuse.
struct StopServer {
    child: Child,
}

impl Artefact for StopServer {
    fn remove(&mut self) {
        let pid = self.child.id();
        info!(pid, "stopping server");
        let _ = kill(Pid::from_raw(pid as i32), Signal::SIGTERM);
        let start = Instant::now();
        while start.elapsed() < STOP_GRACE {
            match self.child.try_wait() {
                Ok(Some(status)) => {
                    info!(pid, %status, "stopped server");
                    return;
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(pid, "waiting for server exit failed: {e}");
                    break;
                }
            }
            std::thread::sleep(STOP_POLL);
        }
        let _ = kill(Pid::from_raw(pid as i32), Signal::SIGKILL);
        let _ = self.child.wait();
        info!(pid, "stopped server (forced)");
    }
}

/// Suite-scoped artefact removing the instance directory and log file.
/// Registered at install time and drained before the next suite, so
/// the data stays on disk for inspection until then.
struct Uninstall {
    dir: PathBuf,
    log: PathBuf,
}

impl Artefact for Uninstall {
    fn remove(&mut self) {
        if let Err(e) = fs::remove_dir_all(&self.dir) {
            debug!(dir = %self.dir.display(), "removing instance dir: {e}");
        }
        if let Err(e) = fs::remove_file(&self.log) {
            debug!(log = %self.log.display(), "removing instance log: {e}");
        }
    }
}

#[derive(Debug)]
pub struct SingleServer {
    endpoint: EndpointServer,
    options: ProvisionOptions,
    /// Instance address; empty until leased, unless preset by a cluster
    addr: String,
    /// Seed list; defaults to the instance's own address
    seeds: String,
    /// Cluster identifier; defaults to a fresh uuid
    cluster_name: String,
    /// Gossip settle knob, only nonzero for clustered instances
    skip_gossip: u32,
    dir: PathBuf,
    log_path: PathBuf,
    log_reader: Option<File>,
    log_buf: Vec<u8>,
    pid: Option<u32>,
    state: ServerState,
}

impl SingleServer {
    pub fn new(connector: Arc<dyn Connector>, options: ProvisionOptions) -> Self {
        let endpoint = EndpointServer::new(
            "",
            connector,
            options.replication_strategy.clone(),
            options.replication_factor,
        );
        SingleServer {
            endpoint,
            options,
            addr: String::new(),
            seeds: String::new(),
            cluster_name: String::new(),
            skip_gossip: 0,
            dir: PathBuf::new(),
            log_path: PathBuf::new(),
            log_reader: None,
            log_buf: Vec::new(),
            pid: None,
            state: ServerState::NotInstalled,
        }
    }

    /// An instance pre-wired by a cluster: shared seed list, shared
    /// cluster name, its slot's address, and gossip enabled.
    pub(crate) fn for_cluster(
        connector: Arc<dyn Connector>,
        options: ProvisionOptions,
        addr: String,
        seeds: String,
        cluster_name: String,
    ) -> Self {
        let mut server = SingleServer::new(connector, options);
        server.addr = addr;
        server.seeds = seeds;
        server.cluster_name = cluster_name;
        server.skip_gossip = 5;
        server
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn log_path(&self) -> &PathBuf {
        &self.log_path
    }

    pub async fn start(&mut self, lane: &Arc<Lane>) -> Result<()> {
        self.find_executable()?;
        self.install(lane)?;
        info!(addr = %self.addr, "starting server");
        self.spawn(lane)?;
        self.wait_ready(lane).await?;
        info!(addr = %self.addr, "started server");
        self.endpoint.set_addr(self.addr.clone());
        self.endpoint.start(lane)
    }

    pub fn connect(&mut self) -> Result<Box<dyn Connection>> {
        if self.state < ServerState::Ready {
            return Err(Error::InvalidStateTransition {
                from: self.state.name().to_string(),
                to: ServerState::Connected.name().to_string(),
            });
        }
        self.state = ServerState::Connected;
        self.endpoint.connect()
    }

    /// Checked before anything is leased or registered, so a missing
    /// binary leaves no artefacts behind.
    fn find_executable(&self) -> Result<()> {
        use std::os::unix::fs::PermissionsExt;

        let meta = fs::metadata(&self.options.binary)
            .map_err(|_| Error::BinaryNotExecutable(self.options.binary.clone()))?;
        if !meta.is_file() || meta.permissions().mode() & 0o111 == 0 {
            return Err(Error::BinaryNotExecutable(self.options.binary.clone()));
        }
        Ok(())
    }

    fn install(&mut self, lane: &Arc<Lane>) -> Result<()> {
        if self.addr.is_empty() {
            let addr = lane.lease_addr()?;
            lane.add_suite_artefact(Box::new(AddressLease::new(
                Arc::downgrade(lane),
                addr.clone(),
            )));
            self.addr = addr;
        }
        if self.seeds.is_empty() {
            self.seeds = self.addr.clone();
        }
        if self.cluster_name.is_empty() {
            self.cluster_name = Uuid::new_v4().to_string();
        }

        // Instance subdirectory and log live inside the lane and are
        // named after the address, so one lane can host a cluster.
        self.dir = lane.dir().join(&self.addr);
        self.log_path = lane.dir().join(format!("{}.log", self.addr));
        lane.add_suite_artefact(Box::new(Uninstall {
            dir: self.dir.clone(),
            log: self.log_path.clone(),
        }));

        fs::create_dir_all(&self.dir).map_err(|e| Error::Path {
            path: self.dir.clone(),
            source: e,
        })?;

        let config = render_config(
            CONFIG_TEMPLATE,
            &[
                ("cluster_name", &self.cluster_name),
                ("dir", &self.dir.display().to_string()),
                ("addr", &self.addr),
                ("seeds", &self.seeds),
                ("skip_gossip", &self.skip_gossip.to_string()),
            ],
        );
        let config_path = self.dir.join(CONFIG_FILE);
        fs::write(&config_path, config).map_err(|e| Error::Path {
            path: config_path,
            source: e,
        })?;

        self.state = ServerState::Installed;
        Ok(())
    }

    fn spawn(&mut self, lane: &Arc<Lane>) -> Result<()> {
        let log_out = File::create(&self.log_path).map_err(|e| Error::Path {
            path: self.log_path.clone(),
            source: e,
        })?;
        let log_err = log_out.try_clone()?;
        // Separate descriptor for polling, so reads never chase the
        // writer's file position.
        self.log_reader = Some(File::open(&self.log_path)?);

        let child = Command::new(&self.options.binary)
            .arg("--smp=1")
            .current_dir(&self.dir)
            .env(&self.options.conf_env, &self.dir)
            .stdin(Stdio::null())
            .stdout(Stdio::from(log_out))
            .stderr(Stdio::from(log_err))
            .spawn()
            .map_err(|e| Error::Path {
                path: self.options.binary.clone(),
                source: e,
            })?;

        self.pid = Some(child.id());
        debug!(addr = %self.addr, pid = child.id(), "spawned server process");
        // Registered before the readiness wait: an interrupt during a
        // stuck boot must still kill the process.
        lane.add_exit_artefact(Box::new(StopServer { child }));

        self.state = ServerState::Started;
        Ok(())
    }

    /// Poll the log for the readiness marker at a fixed short interval
    /// until the timeout elapses. Blocks only this instance's start
    /// path, not sibling nodes or the interrupt listener.
    async fn wait_ready(&mut self, lane: &Arc<Lane>) -> Result<()> {
        let marker = regex::bytes::Regex::new(&self.options.ready_marker).map_err(|e| {
            Error::ReadinessPattern {
                pattern: self.options.ready_marker.clone(),
                source: e,
            }
        })?;

        let started = Instant::now();
        loop {
            let reader = self
                .log_reader
                .as_mut()
                .ok_or_else(|| Error::Internal("log reader missing before readiness wait".into()))?;
            reader.read_to_end(&mut self.log_buf)?;
            if marker.is_match(&self.log_buf) {
                self.state = ServerState::Ready;
                return Ok(());
            }
            if started.elapsed() > self.options.start_timeout {
                return Err(Error::StartupTimeout {
                    addr: self.addr.clone(),
                    lane: lane.id().to_string(),
                    log: self.log_path.clone(),
                });
            }
            tokio::time::sleep(START_POLL).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_substitutes_every_named_field() {
        let rendered = render_config(
            CONFIG_TEMPLATE,
            &[
                ("cluster_name", "cafe"),
                ("dir", "/var/lane/127.0.0.2"),
                ("addr", "127.0.0.2"),
                ("seeds", "127.0.0.2, 127.0.0.3"),
                ("skip_gossip", "5"),
            ],
        );
        assert!(rendered.contains("cluster_name: cafe"));
        assert!(rendered.contains("- /var/lane/127.0.0.2/data"));
        assert!(rendered.contains("listen_address: 127.0.0.2"));
        assert!(rendered.contains("- seeds: 127.0.0.2, 127.0.0.3"));
        assert!(rendered.contains("skip_wait_for_gossip_to_settle: 5"));
        assert!(!rendered.contains("{{"));
    }

    #[test]
    fn render_leaves_unknown_fields_alone() {
        let rendered = render_config("a: {{a}}\nb: {{b}}\n", &[("a", "1")]);
        assert_eq!(rendered, "a: 1\nb: {{b}}\n");
    }
}
