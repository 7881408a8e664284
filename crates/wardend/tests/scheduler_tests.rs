//! End-to-end tests for the telemetry tick loop.
//!
//! The scheduler runs against the in-process loopback transport and fake
//! clock monitors, so no broker and no host time tooling is needed.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use wardend::echo;
use wardend::rtt;
use wardend::scheduler::{TelemetryScheduler, TickOutcome};
use wardend::transport::{Handler, LoopbackTransport, Message, Transport, TransportError};
use warden_common::{
    subjects, Authorize, ClockQuality, ClockSource, Heartbeat, RttMetrics, TimeStatus,
};

const UNIT: &str = "edge-7";

struct AllowAll;

impl Authorize for AllowAll {
    fn is_allowed(&self, _subject: &str, _action: &str) -> bool {
        true
    }
}

struct DenyAll;

impl Authorize for DenyAll {
    fn is_allowed(&self, _subject: &str, _action: &str) -> bool {
        false
    }
}

/// Canned clock monitor: `Some` status or a simulated probe failure.
struct FakeClockMonitor {
    status: Option<TimeStatus>,
}

impl wardend::timesync::ClockMonitor for FakeClockMonitor {
    fn status(&self) -> anyhow::Result<TimeStatus> {
        match &self.status {
            Some(status) => Ok(status.clone()),
            None => anyhow::bail!("simulated probe failure"),
        }
    }
}

fn synced_ptp_status() -> TimeStatus {
    let mut status = TimeStatus::new(UNIT, 0);
    status.ptp_enabled = true;
    status.ptp_master = "001122.fffe.334455".to_string();
    status.ptp_offset_ns = 420;
    status.ptp_state = "s2".to_string();
    status.active_source = ClockSource::Ptp;
    status.clock_quality = ClockQuality::Locked;
    status
}

/// Loopback wrapper that rejects publishes on configured subjects.
struct FailingTransport {
    inner: LoopbackTransport,
    fail_subjects: HashSet<String>,
}

impl FailingTransport {
    fn new(fail_subjects: &[String]) -> Self {
        Self {
            inner: LoopbackTransport::new(),
            fail_subjects: fail_subjects.iter().cloned().collect(),
        }
    }

    fn check(&self, subject: &str) -> Result<(), TransportError> {
        if self.fail_subjects.contains(subject) {
            return Err(TransportError::Rejected {
                subject: subject.to_string(),
                reason: "injected".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl Transport for FailingTransport {
    async fn publish(&self, subject: &str, payload: Vec<u8>) -> Result<(), TransportError> {
        self.check(subject)?;
        self.inner.publish(subject, payload).await
    }

    async fn publish_with_headers(
        &self,
        subject: &str,
        payload: Vec<u8>,
        headers: HashMap<String, String>,
    ) -> Result<(), TransportError> {
        self.check(subject)?;
        self.inner.publish_with_headers(subject, payload, headers).await
    }

    async fn request(
        &self,
        subject: &str,
        payload: Vec<u8>,
        timeout: Duration,
    ) -> Result<Message, TransportError> {
        self.inner.request(subject, payload, timeout).await
    }

    async fn subscribe(&self, subject: &str, handler: Handler) -> Result<(), TransportError> {
        self.inner.subscribe(subject, handler).await
    }

    async fn rtt(&self) -> Result<Duration, TransportError> {
        self.inner.rtt().await
    }

    async fn flush(&self) -> Result<(), TransportError> {
        self.inner.flush().await
    }
}

fn scheduler_over<T: Transport>(
    transport: Arc<T>,
    authorizer: Arc<dyn Authorize>,
    status: Option<TimeStatus>,
) -> TelemetryScheduler<T> {
    TelemetryScheduler::new(
        transport,
        UNIT,
        authorizer,
        Arc::new(FakeClockMonitor { status }),
        Duration::from_millis(10),
    )
}

#[tokio::test]
async fn sequences_are_contiguous_across_ticks() {
    let transport = Arc::new(LoopbackTransport::new());
    echo::register(transport.as_ref(), UNIT).await.unwrap();
    let mut scheduler = scheduler_over(
        Arc::clone(&transport),
        Arc::new(AllowAll),
        Some(synced_ptp_status()),
    );

    for _ in 0..5 {
        assert_eq!(scheduler.tick().await, TickOutcome::Published);
    }

    let metrics: Vec<RttMetrics> = transport
        .published_on(&subjects::metric_rtt(UNIT))
        .iter()
        .map(|m| serde_json::from_slice(&m.payload).unwrap())
        .collect();
    let sequences: Vec<u64> = metrics.iter().map(|m| m.seq).collect();
    assert_eq!(sequences, vec![1, 2, 3, 4, 5]);

    let heartbeats = transport.published_on(&subjects::heartbeat(UNIT));
    let header_seqs: Vec<String> = heartbeats
        .iter()
        .map(|m| m.headers[subjects::HDR_SEQUENCE].clone())
        .collect();
    assert_eq!(header_seqs, vec!["1", "2", "3", "4", "5"]);
}

#[tokio::test]
async fn events_of_one_tick_share_sequence_and_timestamp() {
    let transport = Arc::new(LoopbackTransport::new());
    echo::register(transport.as_ref(), UNIT).await.unwrap();
    let mut scheduler = scheduler_over(
        Arc::clone(&transport),
        Arc::new(AllowAll),
        Some(synced_ptp_status()),
    );
    scheduler.tick().await;

    let heartbeat: Heartbeat = serde_json::from_slice(
        &transport.published_on(&subjects::heartbeat(UNIT))[0].payload,
    )
    .unwrap();
    let metrics: RttMetrics = serde_json::from_slice(
        &transport.published_on(&subjects::metric_rtt(UNIT))[0].payload,
    )
    .unwrap();
    let status: TimeStatus = serde_json::from_slice(
        &transport.published_on(&subjects::metric_time(UNIT))[0].payload,
    )
    .unwrap();

    assert_eq!(heartbeat.sequence, 1);
    assert_eq!(metrics.seq, 1);
    assert_eq!(status.seq, 1);
    assert_eq!(heartbeat.ts, metrics.ts);
    assert_eq!(heartbeat.status, "healthy");
}

#[tokio::test]
async fn heartbeat_headers_carry_clock_and_latency() {
    let transport = Arc::new(LoopbackTransport::new());
    echo::register(transport.as_ref(), UNIT).await.unwrap();
    let mut scheduler = scheduler_over(
        Arc::clone(&transport),
        Arc::new(AllowAll),
        Some(synced_ptp_status()),
    );
    scheduler.tick().await;

    let heartbeat = &transport.published_on(&subjects::heartbeat(UNIT))[0];
    assert_eq!(heartbeat.headers[subjects::HDR_UNIT_ID], UNIT);
    assert_eq!(heartbeat.headers[subjects::HDR_CLOCK_SOURCE], "ptp");
    assert_eq!(heartbeat.headers[subjects::HDR_CLOCK_QUALITY], "locked");
    assert!(heartbeat.headers.contains_key(subjects::HDR_NATIVE_RTT));
    assert!(heartbeat.headers.contains_key(subjects::HDR_APP_RTT));
    assert!(heartbeat.headers.contains_key(subjects::HDR_TIMESTAMP));
}

#[tokio::test]
async fn denied_tick_emits_no_events_but_consumes_a_sequence() {
    let transport = Arc::new(LoopbackTransport::new());
    echo::register(transport.as_ref(), UNIT).await.unwrap();
    let mut scheduler = scheduler_over(
        Arc::clone(&transport),
        Arc::new(DenyAll),
        Some(synced_ptp_status()),
    );

    assert_eq!(scheduler.tick().await, TickOutcome::Denied);
    assert_eq!(scheduler.tick().await, TickOutcome::Denied);

    // Nothing, not even the heartbeat, for a denied tick.
    assert!(transport.published().is_empty());
    assert_eq!(scheduler.sequence(), 2);
}

#[tokio::test]
async fn publish_failure_does_not_abort_remaining_publishes() {
    let transport = Arc::new(FailingTransport::new(&[subjects::metric_rtt(UNIT)]));
    echo::register(transport.as_ref(), UNIT).await.unwrap();
    let mut scheduler = scheduler_over(
        Arc::clone(&transport),
        Arc::new(AllowAll),
        Some(synced_ptp_status()),
    );

    for _ in 0..3 {
        assert_eq!(scheduler.tick().await, TickOutcome::Published);
    }

    assert!(transport.inner.published_on(&subjects::metric_rtt(UNIT)).is_empty());
    assert_eq!(transport.inner.published_on(&subjects::heartbeat(UNIT)).len(), 3);

    // Sequences stay gapless across the partially failed ticks.
    let statuses: Vec<TimeStatus> = transport
        .inner
        .published_on(&subjects::metric_time(UNIT))
        .iter()
        .map(|m| serde_json::from_slice(&m.payload).unwrap())
        .collect();
    let sequences: Vec<u64> = statuses.iter().map(|s| s.seq).collect();
    assert_eq!(sequences, vec![1, 2, 3]);
}

#[tokio::test]
async fn heartbeat_failure_still_publishes_metrics() {
    let transport = Arc::new(FailingTransport::new(&[subjects::heartbeat(UNIT)]));
    echo::register(transport.as_ref(), UNIT).await.unwrap();
    let mut scheduler = scheduler_over(
        Arc::clone(&transport),
        Arc::new(AllowAll),
        Some(synced_ptp_status()),
    );

    assert_eq!(scheduler.tick().await, TickOutcome::Published);
    assert!(transport.inner.published_on(&subjects::heartbeat(UNIT)).is_empty());
    assert_eq!(transport.inner.published_on(&subjects::metric_rtt(UNIT)).len(), 1);
    assert_eq!(transport.inner.published_on(&subjects::metric_time(UNIT)).len(), 1);
}

#[tokio::test]
async fn monitor_failure_skips_time_status_only() {
    let transport = Arc::new(LoopbackTransport::new());
    echo::register(transport.as_ref(), UNIT).await.unwrap();
    let mut scheduler =
        scheduler_over(Arc::clone(&transport), Arc::new(AllowAll), None);

    assert_eq!(scheduler.tick().await, TickOutcome::Published);

    assert!(transport.published_on(&subjects::metric_time(UNIT)).is_empty());
    assert_eq!(transport.published_on(&subjects::metric_rtt(UNIT)).len(), 1);

    // Headers degrade to the unsynced defaults.
    let heartbeat = &transport.published_on(&subjects::heartbeat(UNIT))[0];
    assert_eq!(heartbeat.headers[subjects::HDR_CLOCK_SOURCE], "unsynced");
    assert_eq!(heartbeat.headers[subjects::HDR_CLOCK_QUALITY], "freerun");
}

#[tokio::test]
async fn echo_reflects_payload_and_headers_with_receive_stamp() {
    let transport = LoopbackTransport::new();
    echo::register(&transport, UNIT).await.unwrap();

    let mut request = Message {
        subject: subjects::echo(UNIT),
        payload: b"ping".to_vec(),
        headers: HashMap::new(),
    };
    request
        .headers
        .insert("X-Probe".to_string(), "42".to_string());

    let reply = transport.request_message(request).await.unwrap();
    assert_eq!(reply.payload, b"ping");
    // Incoming headers come back unchanged, plus the receive stamp.
    assert_eq!(reply.headers["X-Probe"], "42");
    let stamp: i64 = reply.headers[subjects::HDR_SERVER_RECEIVED_AT]
        .parse()
        .unwrap();
    assert!(stamp > 0);
}

#[tokio::test]
async fn app_rtt_reports_zero_without_responder() {
    let transport = LoopbackTransport::new();
    let measured = rtt::app_rtt(&transport, &subjects::echo(UNIT)).await;
    assert_eq!(measured, Duration::ZERO);
}

#[tokio::test]
async fn app_rtt_is_positive_with_responder() {
    let transport = LoopbackTransport::new();
    echo::register(&transport, UNIT).await.unwrap();
    let measured = rtt::app_rtt(&transport, &subjects::echo(UNIT)).await;
    assert!(measured > Duration::ZERO);
}
