//! NTP probe: chronyc tracking with an ntpq fallback.
//!
//! The primary path asks chronyd for its tracking report; when chronyc is
//! not on the box the probe falls back to the legacy `ntpq -pn` peer
//! listing, which yields less detail (servers and stratum only).

use chrono::Utc;
use std::process::Command;
use tracing::debug;
use warden_common::SyncLogEntry;

/// Normalized NTP/chrony tracking state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NtpSample {
    /// Offset from the reference in milliseconds.
    pub offset_ms: f64,
    pub stratum: i32,
    pub servers: Vec<String>,
    pub current_server: String,
    /// Sync events observed in this probe call; at most one per call in
    /// practice since the tracking report carries a single offset.
    pub sync_log: Vec<SyncLogEntry>,
}

/// Probe with the chronyc-then-ntpq fallback chain.
#[derive(Debug, Default)]
pub struct ChronyProbe;

impl ChronyProbe {
    /// Read the current NTP state. `None` means neither tool is invocable
    /// on this host, a normal outcome rather than an error.
    pub fn read(&self) -> Option<NtpSample> {
        if let Some(raw) = run_tool("chronyc", &["tracking"]) {
            return Some(parse_tracking(&raw));
        }
        run_tool("ntpq", &["-pn"]).map(|raw| parse_peers(&raw))
    }
}

fn run_tool(program: &str, args: &[&str]) -> Option<String> {
    let output = Command::new(program).args(args).output().ok()?;
    if !output.status.success() {
        debug!("{program} exited nonzero, trying next strategy");
        return None;
    }
    Some(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Parse the `chronyc tracking` report. A malformed line never aborts the
/// rest of the scan; numeric parse failures default to zero.
pub fn parse_tracking(raw: &str) -> NtpSample {
    let mut sample = NtpSample::default();
    for line in raw.lines() {
        if line.starts_with("Reference ID") {
            if let Some((_, value)) = line.split_once(':') {
                let reference = value.trim().to_string();
                if !reference.is_empty() {
                    sample.current_server = reference.clone();
                    sample.servers.push(reference);
                }
            }
        } else if line.starts_with("Stratum") {
            sample.stratum = line
                .split_whitespace()
                .nth(1)
                .and_then(|v| v.parse().ok())
                .unwrap_or(0);
        } else if line.starts_with("Last offset") {
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() >= 4 {
                // Reported in seconds, carried in milliseconds.
                sample.offset_ms = fields[3].parse::<f64>().unwrap_or(0.0) * 1000.0;
                if !sample.current_server.is_empty() {
                    sample.sync_log.push(SyncLogEntry {
                        ts: Utc::now().timestamp_millis(),
                        offset_ms: sample.offset_ms,
                        source: sample.current_server.clone(),
                    });
                }
            }
        }
    }
    sample
}

/// Parse `ntpq -pn` output. Lines marked `*`, `+` or `-` are usable
/// peers; the second field names the peer, the third field of the first
/// such line carries the stratum.
pub fn parse_peers(raw: &str) -> NtpSample {
    let mut sample = NtpSample::default();
    let mut first_peer = true;
    for line in raw.lines() {
        if line.starts_with('*') || line.starts_with('+') || line.starts_with('-') {
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() >= 2 {
                sample.servers.push(fields[1].to_string());
            }
            if first_peer && fields.len() >= 3 {
                sample.stratum = fields[2].parse().unwrap_or(0);
                first_peer = false;
            }
        }
    }
    sample
}
