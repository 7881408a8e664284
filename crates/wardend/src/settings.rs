//! Environment-derived daemon settings.
//!
//! Everything except broker credentials has a default; missing
//! credentials are a startup fatal.

use crate::timesync::SyncMode;
use anyhow::{bail, Result};
use std::env;
use std::time::Duration;
use tracing::warn;
use warden_common::TimeConfig;

const DEFAULT_PROFILE_PATH: &str = "connector-profile.yaml";
const DEFAULT_NTP_SERVERS: &str = "pool.ntp.org";
const DEFAULT_PTP_DOMAIN: &str = "0";
const DEFAULT_TICK_SECS: u64 = 5;

#[derive(Debug, Clone)]
pub struct Settings {
    pub broker_url: String,
    pub sys_user: String,
    pub sys_password: String,
    pub profile_path: String,
    pub mode: SyncMode,
    pub tick: Duration,
    pub ntp_servers: String,
    pub ptp_master: Option<String>,
    pub ptp_domain: String,
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        let sys_user = env::var("BROKER_SYS_USER").unwrap_or_default();
        let sys_password = env::var("BROKER_SYS_PASSWORD").unwrap_or_default();
        if sys_user.is_empty() || sys_password.is_empty() {
            bail!("BROKER_SYS_USER or BROKER_SYS_PASSWORD not set");
        }

        let raw_mode = env::var("TIME_SYNC_MODE").unwrap_or_default();
        let mode = SyncMode::parse(&raw_mode).unwrap_or_else(|| {
            warn!("unknown TIME_SYNC_MODE {raw_mode:?}, falling back to auto");
            SyncMode::Auto
        });

        let tick_secs = env::var("TICK_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_TICK_SECS);

        Ok(Self {
            broker_url: env::var("BROKER_URL").unwrap_or_default(),
            sys_user,
            sys_password,
            profile_path: env::var("WARDEN_PROFILE")
                .unwrap_or_else(|_| DEFAULT_PROFILE_PATH.to_string()),
            mode,
            tick: Duration::from_secs(tick_secs),
            ntp_servers: env::var("NTP_SERVERS")
                .ok()
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| DEFAULT_NTP_SERVERS.to_string()),
            ptp_master: env::var("PTP_MASTER_ADDRESS").ok().filter(|v| !v.is_empty()),
            ptp_domain: env::var("PTP_DOMAIN")
                .ok()
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| DEFAULT_PTP_DOMAIN.to_string()),
        })
    }

    /// Time-server hints published once at startup for downstream clients.
    /// The PTP domain only travels together with a configured master.
    pub fn time_config(&self) -> TimeConfig {
        TimeConfig {
            mode: self.mode.to_string(),
            ntp_servers: self.ntp_servers.clone(),
            ptp_master: self.ptp_master.clone(),
            ptp_domain: self
                .ptp_master
                .as_ref()
                .map(|_| self.ptp_domain.clone()),
        }
    }
}
