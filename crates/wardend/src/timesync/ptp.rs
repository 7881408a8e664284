//! PTP probe: reads ptp4l state without speaking PTP.
//!
//! Two strategies, tried in order: the status artifact ptp4l drops on
//! disk, then a pmc management query. Both yield the same three fields;
//! the formats differ, so each gets its own parser.

use std::fs;
use std::path::PathBuf;
use std::process::Command;
use tracing::debug;

/// Well-known location of the ptp4l status artifact.
const STATUS_PATH: &str = "/run/ptp4l-status";

/// Normalized ptp4l synchronization state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PtpSample {
    /// Grandmaster identity, empty when unknown.
    pub master: String,
    /// Offset from master in nanoseconds.
    pub offset_ns: i64,
    /// Path delay in nanoseconds.
    pub path_delay_ns: i64,
    pub stratum: i32,
    /// Port state label, carried through opaquely.
    pub state: String,
}

/// Probe with the artifact-then-pmc fallback chain.
pub struct PtpProbe {
    status_path: PathBuf,
}

impl Default for PtpProbe {
    fn default() -> Self {
        Self {
            status_path: PathBuf::from(STATUS_PATH),
        }
    }
}

impl PtpProbe {
    /// Probe reading its status artifact from a non-default path.
    pub fn with_status_path(path: impl Into<PathBuf>) -> Self {
        Self {
            status_path: path.into(),
        }
    }

    /// Read the current PTP state. `None` means no PTP subsystem is
    /// reachable on this host, a normal outcome rather than an error.
    pub fn read(&self) -> Option<PtpSample> {
        match fs::read_to_string(&self.status_path) {
            Ok(raw) => Some(parse_status_artifact(&raw)),
            Err(_) => self.query_pmc(),
        }
    }

    fn query_pmc(&self) -> Option<PtpSample> {
        let output = Command::new("pmc")
            .args(["-u", "-b", "0", "GET CURRENT_DATA_SET"])
            .output()
            .ok()?;
        if !output.status.success() {
            debug!("pmc query exited nonzero, treating PTP as absent");
            return None;
        }
        Some(parse_pmc_output(&String::from_utf8_lossy(&output.stdout)))
    }
}

/// Parse the status artifact: whitespace-delimited key/value lines.
/// Unrecognized lines are ignored; malformed numbers fall back to zero.
pub fn parse_status_artifact(raw: &str) -> PtpSample {
    let mut sample = PtpSample::default();
    for line in raw.lines() {
        let mut fields = line.split_whitespace();
        match fields.next() {
            Some("master_offset") => {
                sample.offset_ns = fields.next().and_then(|v| v.parse().ok()).unwrap_or(0);
            }
            Some("path_delay") => {
                sample.path_delay_ns = fields.next().and_then(|v| v.parse().ok()).unwrap_or(0);
            }
            Some("gm_identity") => {
                sample.master = fields.next().unwrap_or("").to_string();
            }
            _ => {}
        }
    }
    sample
}

/// Parse pmc output. The key sits mid-line here, so match by token scan
/// instead of line prefix; the value is the token after the key.
pub fn parse_pmc_output(raw: &str) -> PtpSample {
    let mut sample = PtpSample::default();
    for line in raw.lines() {
        if line.contains("master_offset") {
            sample.offset_ns = value_after(line, "master_offset")
                .and_then(|v| v.parse().ok())
                .unwrap_or(0);
        } else if line.contains("path_delay") {
            sample.path_delay_ns = value_after(line, "path_delay")
                .and_then(|v| v.parse().ok())
                .unwrap_or(0);
        } else if line.contains("gmIdentity") {
            if let Some(value) = value_after(line, "gmIdentity") {
                sample.master = value.to_string();
            }
        }
    }
    sample
}

fn value_after<'a>(line: &'a str, key: &str) -> Option<&'a str> {
    let mut fields = line.split_whitespace();
    while let Some(field) = fields.next() {
        if field == key {
            return fields.next();
        }
    }
    None
}
