//! The telemetry tick loop.
//!
//! One periodic, single-threaded loop drives the whole measure →
//! classify → publish pipeline. A tick never overlaps the previous one;
//! sequence numbers and the three event kinds of a tick are totally
//! ordered and correlated by that number. All per-tick faults stay
//! inside the tick.

use crate::rtt;
use crate::timesync::{self, ClockMonitor};
use crate::transport::Transport;
use chrono::Utc;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{info, warn};
use warden_common::{subjects, Authorize, ClockQuality, ClockSource, Heartbeat, RttMetrics};

/// What a single tick did, for logging and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Events were assembled and publishes attempted.
    Published,
    /// Permission check failed; the whole tick was abandoned.
    Denied,
}

pub struct TelemetryScheduler<T: Transport> {
    transport: Arc<T>,
    authorizer: Arc<dyn Authorize>,
    monitor: Arc<dyn ClockMonitor>,
    unit_id: String,
    tick_period: Duration,
    sequence: u64,
    heartbeat_subject: String,
    echo_subject: String,
    rtt_subject: String,
    time_subject: String,
}

impl<T: Transport> TelemetryScheduler<T> {
    pub fn new(
        transport: Arc<T>,
        unit_id: impl Into<String>,
        authorizer: Arc<dyn Authorize>,
        monitor: Arc<dyn ClockMonitor>,
        tick_period: Duration,
    ) -> Self {
        let unit_id = unit_id.into();
        Self {
            transport,
            authorizer,
            monitor,
            heartbeat_subject: subjects::heartbeat(&unit_id),
            echo_subject: subjects::echo(&unit_id),
            rtt_subject: subjects::metric_rtt(&unit_id),
            time_subject: subjects::metric_time(&unit_id),
            unit_id,
            tick_period,
            sequence: 0,
        }
    }

    /// Sequence number of the most recent tick.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Run ticks on the fixed cadence until `shutdown` flips to true or
    /// its sender goes away.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = interval(self.tick_period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(
            "telemetry scheduler running: unit={} period={:?}",
            self.unit_id, self.tick_period
        );
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.tick().await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("telemetry scheduler stopped after seq={}", self.sequence);
                        break;
                    }
                }
            }
        }
    }

    /// One measure → classify → publish cycle.
    pub async fn tick(&mut self) -> TickOutcome {
        self.sequence += 1;
        let now_ms = Utc::now().timestamp_millis();

        if !self.authorizer.is_allowed(&self.heartbeat_subject, "pub") {
            warn!(
                "SECURITY ALERT: publish on {} denied, abandoning tick seq={}",
                self.heartbeat_subject, self.sequence
            );
            return TickOutcome::Denied;
        }

        let native = rtt::native_rtt(self.transport.as_ref()).await;
        let app = rtt::app_rtt(self.transport.as_ref(), &self.echo_subject).await;

        let status = match self.monitor.status() {
            Ok(mut status) => {
                status.seq = self.sequence;
                Some(status)
            }
            Err(e) => {
                warn!("time sync check failed: {e}");
                None
            }
        };
        let (source, quality) = status
            .as_ref()
            .map(|s| (s.active_source, s.clock_quality))
            .unwrap_or((ClockSource::Unsynced, ClockQuality::Freerun));

        let heartbeat = Heartbeat {
            status: "healthy".to_string(),
            sequence: self.sequence,
            ts: now_ms,
        };
        let mut headers = HashMap::new();
        headers.insert(subjects::HDR_UNIT_ID.to_string(), self.unit_id.clone());
        headers.insert(subjects::HDR_SEQUENCE.to_string(), self.sequence.to_string());
        headers.insert(subjects::HDR_NATIVE_RTT.to_string(), format!("{native:?}"));
        headers.insert(subjects::HDR_APP_RTT.to_string(), format!("{app:?}"));
        headers.insert(subjects::HDR_TIMESTAMP.to_string(), now_ms.to_string());
        headers.insert(subjects::HDR_CLOCK_SOURCE.to_string(), source.to_string());
        headers.insert(subjects::HDR_CLOCK_QUALITY.to_string(), quality.to_string());

        // Each publish is attempted even when an earlier one failed; a
        // rejected event degrades that tick only.
        if let Err(e) = self
            .transport
            .publish_with_headers(&self.heartbeat_subject, encode(&heartbeat), headers)
            .await
        {
            warn!("failed to publish heartbeat: {e}");
        }

        let metrics = RttMetrics {
            ts: now_ms,
            unit_id: self.unit_id.clone(),
            seq: self.sequence,
            native_rtt_us: native.as_micros() as i64,
            app_rtt_us: app.as_micros() as i64,
        };
        if let Err(e) = self
            .transport
            .publish(&self.rtt_subject, encode(&metrics))
            .await
        {
            warn!("failed to publish RTT metrics: {e}");
        }

        if let Some(status) = &status {
            if let Err(e) = self
                .transport
                .publish(&self.time_subject, encode(status))
                .await
            {
                warn!("failed to publish time metrics: {e}");
            }
        }

        if let Err(e) = self.transport.flush().await {
            warn!("flush failed: {e}");
        }

        match &status {
            Some(s) if s.active_source != ClockSource::Unsynced => {
                let offset = match s.active_source {
                    ClockSource::Ptp => timesync::format_offset(s.ptp_offset_ns),
                    _ => format!("{:.2}ms", s.ntp_offset_ms),
                };
                info!(
                    "[{}] seq={} native={native:?} app={app:?} clock={}/{} offset={offset}",
                    self.unit_id, self.sequence, s.active_source, s.clock_quality
                );
            }
            _ => {
                info!(
                    "[{}] seq={} native={native:?} app={app:?}",
                    self.unit_id, self.sequence
                );
            }
        }

        TickOutcome::Published
    }
}

fn encode<V: Serialize>(value: &V) -> Vec<u8> {
    serde_json::to_vec(value).unwrap_or_default()
}
