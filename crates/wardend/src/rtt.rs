//! Round-trip latency probes.
//!
//! Both measurements are best-effort telemetry: failures log (or stay
//! silent for the bounded echo) and report zero, never an error.

use crate::transport::Transport;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::warn;

/// Hard bound on the application-level echo round trip.
pub const APP_RTT_TIMEOUT: Duration = Duration::from_secs(2);

/// Transport-layer RTT as reported by the client's own keep-alive
/// measurement.
pub async fn native_rtt<T: Transport + ?Sized>(transport: &T) -> Duration {
    match transport.rtt().await {
        Ok(rtt) => rtt,
        Err(e) => {
            warn!("native RTT measurement failed: {e}");
            Duration::ZERO
        }
    }
}

/// Full application round trip through the unit's echo endpoint.
///
/// The request carries a fixed small payload and is double-bounded: the
/// transport gets the deadline, and the call itself is wrapped so a
/// misbehaving transport still cannot block past [`APP_RTT_TIMEOUT`].
pub async fn app_rtt<T: Transport + ?Sized>(transport: &T, echo_subject: &str) -> Duration {
    let start = Instant::now();
    match timeout(
        APP_RTT_TIMEOUT,
        transport.request(echo_subject, b"ping".to_vec(), APP_RTT_TIMEOUT),
    )
    .await
    {
        Ok(Ok(_reply)) => start.elapsed(),
        Ok(Err(_)) | Err(_) => Duration::ZERO,
    }
}
