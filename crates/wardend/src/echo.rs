//! Echo responder for application-level RTT measurement.

use crate::transport::{Message, Transport};
use anyhow::Result;
use chrono::Utc;
use std::sync::Arc;
use tracing::info;
use warden_common::subjects;

/// Register the request-reply echo endpoint for this unit.
///
/// The responder reflects the request payload and all incoming headers
/// unchanged and stamps the server-side receive time in microseconds, so
/// requesters can cross-check clock drift. It runs whenever a request
/// arrives, concurrently with the tick loop, and owns no mutable state.
pub async fn register<T: Transport + ?Sized>(transport: &T, unit_id: &str) -> Result<()> {
    let subject = subjects::echo(unit_id);
    transport
        .subscribe(
            &subject,
            Arc::new(|request: &Message| {
                let received_at = Utc::now().timestamp_micros();
                let mut headers = request.headers.clone();
                headers.insert(
                    subjects::HDR_SERVER_RECEIVED_AT.to_string(),
                    received_at.to_string(),
                );
                Some(Message {
                    subject: request.subject.clone(),
                    payload: request.payload.clone(),
                    headers,
                })
            }),
        )
        .await?;
    info!("echo responder active on {subject}");
    Ok(())
}
