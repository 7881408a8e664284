//! Subject (routing key) construction for the ops.* namespace.

/// One-shot time configuration for downstream clients, published at startup.
pub const TIME_CONFIG: &str = "ops.time.config";

/// Heartbeat header keys.
pub const HDR_UNIT_ID: &str = "X-Unit-ID";
pub const HDR_SEQUENCE: &str = "X-Sequence";
pub const HDR_NATIVE_RTT: &str = "X-Native-RTT";
pub const HDR_APP_RTT: &str = "X-App-RTT";
pub const HDR_TIMESTAMP: &str = "X-Timestamp";
pub const HDR_CLOCK_SOURCE: &str = "X-Clock-Source";
pub const HDR_CLOCK_QUALITY: &str = "X-Clock-Quality";

/// Stamped by the echo responder: server-side receive time, µs since epoch.
pub const HDR_SERVER_RECEIVED_AT: &str = "X-Server-Received-At";

/// Liveness signal for a unit.
pub fn heartbeat(unit_id: &str) -> String {
    format!("ops.heartbeat.{unit_id}")
}

/// Request-reply echo endpoint for application RTT measurement.
pub fn echo(unit_id: &str) -> String {
    format!("ops.echo.{unit_id}")
}

/// Round-trip latency metrics for a unit.
pub fn metric_rtt(unit_id: &str) -> String {
    format!("ops.metric.rtt.{unit_id}")
}

/// Clock synchronization status for a unit.
pub fn metric_time(unit_id: &str) -> String {
    format!("ops.metric.time.{unit_id}")
}
