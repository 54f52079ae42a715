//! Shell-out connection adapter
//!
//! Talks to the server through its interactive shell (`cqlsh` or a
//! compatible binary), one process invocation per statement. Query
//! errors are part of the rendered output, exactly like row results;
//! only a failure to reach the server or to spawn the shell at all
//! surfaces as a harness error.

use std::process::{Command, Output, Stdio};
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;

use regatta_harness::{Connection, Connector, Error, Result};

/// Wire-protocol error codes, keyed by the exception name the shell
/// prints. Unrecognized errors fall back to `0x0000 (Server error)`.
static ERROR_CODES: Lazy<Vec<(&'static str, u16, &'static str)>> = Lazy::new(|| {
    vec![
        ("ServerError", 0x0000, "Server error"),
        ("ProtocolError", 0x000A, "Protocol error"),
        ("AuthenticationFailed", 0x0100, "Bad credentials"),
        ("Unavailable", 0x1000, "Unavailable exception"),
        ("OverloadedException", 0x1001, "Overloaded"),
        ("IsBootstrappingException", 0x1002, "Is bootstrapping"),
        ("TruncateException", 0x1003, "Truncate error"),
        ("WriteTimeout", 0x1100, "Write timeout"),
        ("ReadTimeout", 0x1200, "Read timeout"),
        ("ReadFailure", 0x1300, "Read failure"),
        ("FunctionFailure", 0x1400, "Function failure"),
        ("WriteFailure", 0x1500, "Write failure"),
        ("CDCWriteFailure", 0x1600, "CDC write failure"),
        ("SyntaxException", 0x2000, "Syntax error"),
        ("UnauthorizedException", 0x2100, "Unauthorized"),
        ("InvalidRequest", 0x2200, "Invalid query"),
        ("ConfigurationException", 0x2300, "Config error"),
        ("AlreadyExists", 0x2400, "Already exists"),
        ("Unprepared", 0x2500, "Unprepared"),
    ]
});

/// `code=2200` as printed by server-side error reports. The digits
/// are the protocol error code in hex, without the 0x prefix.
static INLINE_CODE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"code=([0-9a-fA-F]{1,4})").expect("inline code regex"));

/// `<stdin>:1:` prefixes the shell puts before error text.
static STDIN_PREFIX_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^<stdin>:\d+(:\d+)?:\s*").expect("stdin prefix regex"));

const MESSAGE_CAP: usize = 80;

fn looks_unreachable(stderr: &str) -> bool {
    stderr.contains("Connection refused")
        || stderr.contains("Unable to connect")
        || stderr.contains("Connection error")
}

/// Render a failed invocation the way results are rendered, so error
/// expectations live in golden files like any other output.
fn render_error(stderr: &str) -> String {
    let first_line = stderr.lines().find(|l| !l.trim().is_empty()).unwrap_or("");
    let message = STDIN_PREFIX_RE.replace(first_line.trim(), "");
    let message: String = message.chars().take(MESSAGE_CAP).collect();

    let (code, label) = INLINE_CODE_RE
        .captures(stderr)
        .and_then(|c| u16::from_str_radix(&c[1], 16).ok())
        .and_then(|code| {
            ERROR_CODES
                .iter()
                .find(|(_, c, _)| *c == code)
                .map(|(_, c, label)| (*c, *label))
        })
        .or_else(|| {
            ERROR_CODES
                .iter()
                .find(|(name, _, _)| stderr.contains(name))
                .map(|(_, c, label)| (*c, *label))
        })
        .unwrap_or((0x0000, "Server error"));

    format!("  status: ERROR\n  code: {code:#06x} ({label})\n  message: \"{message}\"\n")
}

/// Indent the shell's stdout two spaces per line; an empty response
/// renders as a bare acknowledgement.
fn render_rows(stdout: &str) -> String {
    if stdout.trim().is_empty() {
        return "  OK\n".to_string();
    }
    let mut out = String::new();
    for line in stdout.lines() {
        out.push_str("  ");
        out.push_str(line.trim_end());
        out.push('\n');
    }
    out
}

/// Connector spawning one shell process per statement.
pub struct ShellConnector {
    shell: String,
}

impl ShellConnector {
    pub fn new(shell: impl Into<String>) -> Arc<Self> {
        Arc::new(ShellConnector {
            shell: shell.into(),
        })
    }
}

impl Connector for ShellConnector {
    /// Probes the server with an empty statement so unreachable
    /// servers fail at connect time, not on the first test.
    fn connect(&self, addr: &str, namespace: Option<&str>) -> Result<Box<dyn Connection>> {
        let mut conn = ShellConnection {
            shell: self.shell.clone(),
            addr: addr.to_string(),
            namespace: namespace.map(str::to_string),
        };
        let output = conn.invoke("")?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if looks_unreachable(&stderr) {
                return Err(Error::Connect {
                    addr: addr.to_string(),
                    reason: stderr.lines().next().unwrap_or("unreachable").to_string(),
                });
            }
        }
        Ok(Box::new(conn))
    }
}

struct ShellConnection {
    shell: String,
    addr: String,
    namespace: Option<String>,
}

impl ShellConnection {
    fn invoke(&self, statement: &str) -> Result<Output> {
        let mut cmd = Command::new(&self.shell);
        cmd.arg("--no-color");
        if let Some(ns) = &self.namespace {
            cmd.args(["-k", ns]);
        }
        cmd.args(["-e", statement])
            .arg(&self.addr)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        cmd.output()
            .map_err(|e| Error::Transport(format!("spawning {}: {e}", self.shell)))
    }
}

impl Connection for ShellConnection {
    fn execute(&mut self, statement: &str) -> Result<String> {
        let output = self.invoke(statement)?;
        if output.status.success() {
            return Ok(render_rows(&String::from_utf8_lossy(&output.stdout)));
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        if looks_unreachable(&stderr) {
            // The server went away mid-run.
            return Err(Error::Transport(format!(
                "{} unreachable: {}",
                self.addr,
                stderr.lines().next().unwrap_or("connection lost")
            )));
        }
        Ok(render_error(&stderr))
    }

    // Nothing held open between invocations.
    fn close(&mut self) {}
}
