//! Shared types for the nodewarden agent.
//!
//! Everything the daemon puts on the wire lives here, so that other
//! tooling (dashboards, a future ctl binary) can deserialize the same
//! payloads without depending on the daemon crate.

pub mod events;
pub mod profile;
pub mod subjects;

pub use events::{
    ClockQuality, ClockSource, Heartbeat, RttMetrics, SyncLogEntry, TimeConfig, TimeStatus,
};
pub use profile::{Authorize, Profile};
