//! nodewarden daemon library.
//!
//! A per-node guardian that publishes clock-health and round-trip-latency
//! telemetry on a fixed cadence, gated by the unit's capability profile.
//! The clock pipeline only observes the externally running sync daemons
//! (ptp4l, chronyd, ntpd); it speaks no time protocol itself.

pub mod echo;
pub mod rtt;
pub mod scheduler;
pub mod settings;
pub mod timesync;
pub mod transport;
