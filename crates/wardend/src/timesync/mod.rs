//! Clock-source arbitration.
//!
//! Probes the externally managed PTP and NTP/chrony daemons, classifies
//! each sample into a quality tier, and picks the authoritative source
//! for this tick. Everything is recomputed from scratch on every call;
//! caching probe results across ticks would defeat the monitoring
//! purpose.

pub mod chrony;
pub mod ptp;

pub use chrony::{ChronyProbe, NtpSample};
pub use ptp::{PtpProbe, PtpSample};

use anyhow::Result;
use chrono::Utc;
use std::fmt;
use warden_common::{ClockQuality, ClockSource, TimeStatus};

/// Arbitration mode, fixed at startup via TIME_SYNC_MODE.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    Ptp,
    Chrony,
    Ntp,
    Auto,
}

impl SyncMode {
    /// Parse the environment value. Empty means auto; an unrecognized
    /// value is `None` and left to the caller to report.
    pub fn parse(value: &str) -> Option<SyncMode> {
        match value {
            "" | "auto" => Some(SyncMode::Auto),
            "ptp" => Some(SyncMode::Ptp),
            "chrony" => Some(SyncMode::Chrony),
            "ntp" => Some(SyncMode::Ntp),
            _ => None,
        }
    }
}

impl fmt::Display for SyncMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SyncMode::Ptp => "ptp",
            SyncMode::Chrony => "chrony",
            SyncMode::Ntp => "ntp",
            SyncMode::Auto => "auto",
        };
        f.write_str(label)
    }
}

// Quality tier boundaries. Boundary values belong to the looser tier:
// the comparison is strict `<`.
const PTP_LOCKED_NS: i64 = 1_000;
const PTP_TRACKING_NS: i64 = 100_000;
const NTP_LOCKED_MS: f64 = 1.0;
const NTP_TRACKING_MS: f64 = 10.0;

/// Classify a PTP sample by offset magnitude.
pub fn ptp_quality(sample: &PtpSample) -> ClockQuality {
    let offset = sample.offset_ns.abs();
    if offset < PTP_LOCKED_NS {
        ClockQuality::Locked
    } else if offset < PTP_TRACKING_NS {
        ClockQuality::Tracking
    } else {
        ClockQuality::Acquiring
    }
}

/// Classify an NTP sample by offset magnitude.
pub fn ntp_quality(sample: &NtpSample) -> ClockQuality {
    let offset = sample.offset_ms.abs();
    if offset < NTP_LOCKED_MS {
        ClockQuality::Locked
    } else if offset < NTP_TRACKING_MS {
        ClockQuality::Tracking
    } else {
        ClockQuality::Acquiring
    }
}

/// Pick the authoritative clock source and its quality tier.
///
/// Explicit modes consider only the named subsystem. Auto prefers PTP,
/// but an imprecise PTP lock (`acquiring`) must not preempt a healthy
/// NTP fallback, so only `locked` and `tracking` PTP counts as available
/// there.
pub fn select_source(
    mode: SyncMode,
    ptp: Option<&PtpSample>,
    ntp: Option<&NtpSample>,
) -> (ClockSource, ClockQuality) {
    let unsynced = (ClockSource::Unsynced, ClockQuality::Freerun);
    match mode {
        SyncMode::Ptp => match ptp {
            Some(sample) if !sample.state.is_empty() => (ClockSource::Ptp, ptp_quality(sample)),
            _ => unsynced,
        },
        SyncMode::Chrony | SyncMode::Ntp => match ntp {
            Some(sample) if !sample.servers.is_empty() => (ClockSource::Ntp, ntp_quality(sample)),
            _ => unsynced,
        },
        SyncMode::Auto => {
            if let Some(sample) = ptp {
                if !sample.state.is_empty() {
                    let quality = ptp_quality(sample);
                    if matches!(quality, ClockQuality::Locked | ClockQuality::Tracking) {
                        return (ClockSource::Ptp, quality);
                    }
                }
            }
            if let Some(sample) = ntp {
                if !sample.servers.is_empty() {
                    return (ClockSource::Ntp, ntp_quality(sample));
                }
            }
            unsynced
        }
    }
}

/// Human-readable clock offset for log lines.
pub fn format_offset(offset_ns: i64) -> String {
    let magnitude = offset_ns.abs();
    if magnitude < 1_000 {
        format!("{offset_ns}ns")
    } else if magnitude < 1_000_000 {
        format!("{:.2}µs", offset_ns as f64 / 1_000.0)
    } else if magnitude < 1_000_000_000 {
        format!("{:.2}ms", offset_ns as f64 / 1_000_000.0)
    } else {
        format!("{:.2}s", offset_ns as f64 / 1_000_000_000.0)
    }
}

/// Reads the host's clock-sync state. The trait seam lets scheduler tests
/// run without chronyc or pmc on the box.
pub trait ClockMonitor: Send + Sync {
    fn status(&self) -> Result<TimeStatus>;
}

/// Production monitor backed by the host tools.
pub struct SystemClockMonitor {
    unit_id: String,
    mode: SyncMode,
    ptp: PtpProbe,
    chrony: ChronyProbe,
}

impl SystemClockMonitor {
    pub fn new(unit_id: impl Into<String>, mode: SyncMode) -> Self {
        Self {
            unit_id: unit_id.into(),
            mode,
            ptp: PtpProbe::default(),
            chrony: ChronyProbe,
        }
    }
}

impl ClockMonitor for SystemClockMonitor {
    fn status(&self) -> Result<TimeStatus> {
        let ptp = self.ptp.read();
        let ntp = self.chrony.read();

        let mut status = TimeStatus::new(&self.unit_id, Utc::now().timestamp_millis());
        let (source, quality) = select_source(self.mode, ptp.as_ref(), ntp.as_ref());
        status.active_source = source;
        status.clock_quality = quality;

        if let Some(sample) = ptp {
            status.ptp_enabled = true;
            status.ptp_master = sample.master;
            status.ptp_offset_ns = sample.offset_ns;
            status.ptp_path_delay_ns = sample.path_delay_ns;
            status.ptp_stratum = sample.stratum;
            status.ptp_state = sample.state;
        }
        if let Some(sample) = ntp {
            status.ntp_enabled = true;
            status.ntp_offset_ms = sample.offset_ms;
            status.ntp_stratum = sample.stratum;
            status.ntp_servers = sample.servers;
            status.ntp_current_server = sample.current_server;
            status.ntp_sync_log = sample.sync_log;
        }
        Ok(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ptp_sample(offset_ns: i64) -> PtpSample {
        PtpSample {
            master: "001122.fffe.334455".to_string(),
            offset_ns,
            path_delay_ns: 1000,
            stratum: 0,
            state: "s2".to_string(),
        }
    }

    fn ntp_sample(offset_ms: f64) -> NtpSample {
        NtpSample {
            offset_ms,
            stratum: 3,
            servers: vec!["ntp1.example.net".to_string()],
            current_server: "ntp1.example.net".to_string(),
            sync_log: Vec::new(),
        }
    }

    #[test]
    fn ptp_quality_boundaries() {
        assert_eq!(ptp_quality(&ptp_sample(999)), ClockQuality::Locked);
        assert_eq!(ptp_quality(&ptp_sample(1_000)), ClockQuality::Tracking);
        assert_eq!(ptp_quality(&ptp_sample(99_999)), ClockQuality::Tracking);
        assert_eq!(ptp_quality(&ptp_sample(100_000)), ClockQuality::Acquiring);
        // Sign never matters.
        assert_eq!(ptp_quality(&ptp_sample(-999)), ClockQuality::Locked);
        assert_eq!(ptp_quality(&ptp_sample(-100_000)), ClockQuality::Acquiring);
    }

    #[test]
    fn ntp_quality_boundaries() {
        assert_eq!(ntp_quality(&ntp_sample(0.99)), ClockQuality::Locked);
        assert_eq!(ntp_quality(&ntp_sample(1.0)), ClockQuality::Tracking);
        assert_eq!(ntp_quality(&ntp_sample(9.99)), ClockQuality::Tracking);
        assert_eq!(ntp_quality(&ntp_sample(10.0)), ClockQuality::Acquiring);
        assert_eq!(ntp_quality(&ntp_sample(-0.5)), ClockQuality::Locked);
    }

    #[test]
    fn auto_prefers_usable_ptp() {
        let ptp = ptp_sample(500);
        let ntp = ntp_sample(0.2);
        let (source, quality) = select_source(SyncMode::Auto, Some(&ptp), Some(&ntp));
        assert_eq!(source, ClockSource::Ptp);
        assert_eq!(quality, ClockQuality::Locked);
    }

    #[test]
    fn auto_skips_acquiring_ptp_for_healthy_ntp() {
        let ptp = ptp_sample(250_000);
        let ntp = ntp_sample(0.2);
        let (source, quality) = select_source(SyncMode::Auto, Some(&ptp), Some(&ntp));
        assert_eq!(source, ClockSource::Ntp);
        assert_eq!(quality, ClockQuality::Locked);
    }

    #[test]
    fn auto_ignores_ptp_without_state_label() {
        let mut ptp = ptp_sample(10);
        ptp.state.clear();
        let ntp = ntp_sample(4.0);
        let (source, quality) = select_source(SyncMode::Auto, Some(&ptp), Some(&ntp));
        assert_eq!(source, ClockSource::Ntp);
        assert_eq!(quality, ClockQuality::Tracking);
    }

    #[test]
    fn explicit_ptp_mode_never_falls_back() {
        let ntp = ntp_sample(0.1);
        let (source, quality) = select_source(SyncMode::Ptp, None, Some(&ntp));
        assert_eq!(source, ClockSource::Unsynced);
        assert_eq!(quality, ClockQuality::Freerun);
    }

    #[test]
    fn explicit_ntp_mode_requires_servers() {
        let mut ntp = ntp_sample(0.1);
        ntp.servers.clear();
        let (source, quality) = select_source(SyncMode::Ntp, None, Some(&ntp));
        assert_eq!(source, ClockSource::Unsynced);
        assert_eq!(quality, ClockQuality::Freerun);

        let ntp = ntp_sample(0.1);
        let (source, _) = select_source(SyncMode::Chrony, None, Some(&ntp));
        assert_eq!(source, ClockSource::Ntp);
    }

    #[test]
    fn both_absent_is_unsynced_in_every_mode() {
        for mode in [SyncMode::Ptp, SyncMode::Chrony, SyncMode::Ntp, SyncMode::Auto] {
            let (source, quality) = select_source(mode, None, None);
            assert_eq!(source, ClockSource::Unsynced, "mode {mode}");
            assert_eq!(quality, ClockQuality::Freerun, "mode {mode}");
        }
    }

    #[test]
    fn mode_parsing() {
        assert_eq!(SyncMode::parse(""), Some(SyncMode::Auto));
        assert_eq!(SyncMode::parse("auto"), Some(SyncMode::Auto));
        assert_eq!(SyncMode::parse("ptp"), Some(SyncMode::Ptp));
        assert_eq!(SyncMode::parse("chrony"), Some(SyncMode::Chrony));
        assert_eq!(SyncMode::parse("ntp"), Some(SyncMode::Ntp));
        assert_eq!(SyncMode::parse("gps"), None);
    }

    #[test]
    fn offset_formatting_scales_units() {
        assert_eq!(format_offset(742), "742ns");
        assert_eq!(format_offset(-742), "-742ns");
        assert_eq!(format_offset(1_500), "1.50µs");
        assert_eq!(format_offset(2_340_000), "2.34ms");
        assert_eq!(format_offset(1_200_000_000), "1.20s");
    }
}
