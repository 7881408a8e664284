//! Wire payloads published by the daemon.
//!
//! Field names are part of the contract with existing consumers; changing
//! them breaks the dashboards that subscribe to `ops.metric.*`.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Which subsystem currently drives the node clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClockSource {
    Ptp,
    Ntp,
    Unsynced,
}

impl fmt::Display for ClockSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ClockSource::Ptp => "ptp",
            ClockSource::Ntp => "ntp",
            ClockSource::Unsynced => "unsynced",
        };
        f.write_str(label)
    }
}

/// Coarse clock trustworthiness tier, derived from offset magnitude.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClockQuality {
    Locked,
    Tracking,
    Acquiring,
    Freerun,
}

impl fmt::Display for ClockQuality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ClockQuality::Locked => "locked",
            ClockQuality::Tracking => "tracking",
            ClockQuality::Acquiring => "acquiring",
            ClockQuality::Freerun => "freerun",
        };
        f.write_str(label)
    }
}

/// One observed NTP sync event. Rebuilt from tool output on every probe
/// call, never persisted across ticks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncLogEntry {
    pub ts: i64,
    pub offset_ms: f64,
    pub source: String,
}

/// Full clock telemetry for one tick, published on `ops.metric.time.<unit>`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeStatus {
    /// Epoch milliseconds at probe time.
    pub ts: i64,
    pub unit_id: String,
    #[serde(default, skip_serializing_if = "seq_is_zero")]
    pub seq: u64,

    pub ptp_enabled: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub ptp_master: String,
    pub ptp_offset_ns: i64,
    pub ptp_path_delay_ns: i64,
    pub ptp_stratum: i32,
    pub ptp_state: String,

    pub ntp_enabled: bool,
    pub ntp_offset_ms: f64,
    pub ntp_stratum: i32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ntp_servers: Vec<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub ntp_current_server: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ntp_sync_log: Vec<SyncLogEntry>,

    pub active_source: ClockSource,
    pub clock_quality: ClockQuality,
}

fn seq_is_zero(seq: &u64) -> bool {
    *seq == 0
}

impl TimeStatus {
    /// Fresh status with no subsystem data: everything zeroed, unsynced.
    pub fn new(unit_id: impl Into<String>, ts: i64) -> Self {
        Self {
            ts,
            unit_id: unit_id.into(),
            seq: 0,
            ptp_enabled: false,
            ptp_master: String::new(),
            ptp_offset_ns: 0,
            ptp_path_delay_ns: 0,
            ptp_stratum: 0,
            ptp_state: String::new(),
            ntp_enabled: false,
            ntp_offset_ms: 0.0,
            ntp_stratum: 0,
            ntp_servers: Vec::new(),
            ntp_current_server: String::new(),
            ntp_sync_log: Vec::new(),
            active_source: ClockSource::Unsynced,
            clock_quality: ClockQuality::Freerun,
        }
    }
}

/// Round-trip latency measurements, published on `ops.metric.rtt.<unit>`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RttMetrics {
    pub ts: i64,
    pub unit_id: String,
    pub seq: u64,
    /// Transport-layer RTT in microseconds.
    pub native_rtt_us: i64,
    /// Application-layer RTT in microseconds.
    pub app_rtt_us: i64,
}

/// Liveness signal, published on `ops.heartbeat.<unit>`. Kept minimal so
/// consumers that only care about liveness never parse the metric events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Heartbeat {
    pub status: String,
    pub sequence: u64,
    pub ts: i64,
}

/// Time-server hints for downstream clients, published once at startup on
/// `ops.time.config`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeConfig {
    pub mode: String,
    pub ntp_servers: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ptp_master: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ptp_domain: Option<String>,
}
