//! Test execution and golden-file comparison
//!
//! A test file is a script of statements. Each source line is echoed
//! verbatim into the produced output; statements are assembled across
//! lines until a `;`-terminated line and submitted as one unit, with
//! the rendered response appended right after the completing line. The
//! produced output is then byte-compared against the recorded golden
//! file.

use std::fs;
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;
use similar::TextDiff;

use crate::connect::Connection;
use crate::error::{Error, Result};
use crate::lane::Lane;

/// Suffix of a test script; the golden file swaps it for `result`,
/// the reject file swaps `result` for `reject`.
pub const TEST_SUFFIX: &str = "test.cql";
const GOLDEN_SUFFIX: &str = "result";
const REJECT_SUFFIX: &str = "reject";

/// A diff longer than this many lines is truncated.
pub const DIFF_LINE_CAP: usize = 60;

/// Matches blank lines and `--` / `//` comment lines
static COMMENT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*((--|//).*)?$").expect("comment regex"));

/// Result of running one test file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Output matched the golden file
    Pass,
    /// No golden file existed; the output became one
    New,
    /// Output differed; a reject file was written
    Fail,
}

impl Outcome {
    pub fn name(self) -> &'static str {
        match self {
            Outcome::Pass => "pass",
            Outcome::New => "new",
            Outcome::Fail => "fail",
        }
    }
}

/// Replace a trailing file-name suffix, `x.test.cql` -> `x.result`.
fn swap_suffix(path: &Path, from: &str, to: &str) -> PathBuf {
    let name = path.file_name().unwrap_or_default().to_string_lossy();
    let renamed = match name.strip_suffix(from) {
        Some(stem) => format!("{stem}{to}"),
        None => format!("{name}.{to}"),
    };
    path.with_file_name(renamed)
}

/// Rename, falling back to copy-and-remove when source and target sit
/// on different filesystems (the lane dir often does).
fn move_file(from: &Path, to: &Path) -> Result<()> {
    if fs::rename(from, to).is_ok() {
        return Ok(());
    }
    fs::copy(from, to).map_err(|e| Error::Path {
        path: to.to_path_buf(),
        source: e,
    })?;
    fs::remove_file(from)?;
    Ok(())
}

/// One test script with its derived golden and reject paths. The
/// golden file, once created, is the source of truth; a reject file
/// only exists between a failing run and its resolution.
#[derive(Debug)]
pub struct TestFile {
    pub name: String,
    pub path: PathBuf,
    pub golden: PathBuf,
    pub reject: PathBuf,
}

impl TestFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path
            .file_name()
            .unwrap_or_default()
            .to_string_lossy()
            .into_owned();
        let golden = swap_suffix(&path, TEST_SUFFIX, GOLDEN_SUFFIX);
        let reject = swap_suffix(&golden, GOLDEN_SUFFIX, REJECT_SUFFIX);
        TestFile {
            name,
            path,
            golden,
            reject,
        }
    }

    /// Execute the script against `conn` and compare the produced
    /// output with the golden file.
    ///
    /// `Err` means a transport or driver-internal failure, not a
    /// content mismatch; the partial output is left in the lane
    /// directory for postmortem inspection.
    pub fn run(&self, conn: &mut dyn Connection, lane: &Lane) -> Result<Outcome> {
        let tmp = lane
            .dir()
            .join(self.golden.file_name().unwrap_or_default());

        let source = fs::read_to_string(&self.path).map_err(|e| Error::Path {
            path: self.path.clone(),
            source: e,
        })?;

        let mut out = String::new();
        let mut statement = String::new();
        for line in source.lines() {
            out.push_str(line);
            out.push('\n');
            if statement.is_empty() && COMMENT_RE.is_match(line) {
                continue;
            }
            if !statement.is_empty() {
                statement.push('\n');
            }
            statement.push_str(line);
            if line.trim_end().ends_with(';') {
                let assembled = std::mem::take(&mut statement);
                self.submit(&assembled, conn, &mut out, &tmp)?;
            }
        }
        // A trailing statement with no terminator is still submitted.
        if !statement.is_empty() {
            let assembled = std::mem::take(&mut statement);
            self.submit(&assembled, conn, &mut out, &tmp)?;
        }

        fs::write(&tmp, &out).map_err(|e| Error::Path {
            path: tmp.clone(),
            source: e,
        })?;

        match fs::read(&self.golden) {
            Ok(golden) => {
                if golden == out.as_bytes() {
                    fs::remove_file(&tmp)?;
                    Ok(Outcome::Pass)
                } else {
                    move_file(&tmp, &self.reject)?;
                    Ok(Outcome::Fail)
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // First run: the produced output becomes the golden file.
                move_file(&tmp, &self.golden)?;
                Ok(Outcome::New)
            }
            Err(e) => Err(Error::Path {
                path: self.golden.clone(),
                source: e,
            }),
        }
    }

    fn submit(
        &self,
        statement: &str,
        conn: &mut dyn Connection,
        out: &mut String,
        tmp: &Path,
    ) -> Result<()> {
        match conn.execute(statement) {
            Ok(response) => {
                out.push_str(&response);
                Ok(())
            }
            Err(e) => {
                // Keep what we produced so far next to the server logs.
                let _ = fs::write(tmp, &*out);
                Err(e)
            }
        }
    }

    /// Unified diff between the golden and reject files.
    pub fn diff(&self) -> Result<String> {
        let golden = fs::read_to_string(&self.golden).map_err(|e| Error::Path {
            path: self.golden.clone(),
            source: e,
        })?;
        let reject = fs::read_to_string(&self.reject).map_err(|e| Error::Path {
            path: self.reject.clone(),
            source: e,
        })?;
        Ok(unified_diff(
            &golden,
            &reject,
            &self.golden.display().to_string(),
            &self.reject.display().to_string(),
        ))
    }
}

/// Unified diff with three lines of context, capped at
/// [`DIFF_LINE_CAP`] lines.
pub fn unified_diff(golden: &str, reject: &str, golden_label: &str, reject_label: &str) -> String {
    let diff = TextDiff::from_lines(golden, reject);
    let text = diff
        .unified_diff()
        .context_radius(3)
        .header(golden_label, reject_label)
        .to_string();
    let lines: Vec<&str> = text.lines().collect();
    if lines.len() > DIFF_LINE_CAP {
        let mut capped = lines[..DIFF_LINE_CAP].join("\n");
        capped.push('\n');
        capped
    } else {
        text
    }
}
