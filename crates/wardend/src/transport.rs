//! Message transport seam.
//!
//! The daemon talks to its broker exclusively through the [`Transport`]
//! trait, so the scheduler can be driven in tests and in local bring-up
//! without a live broker. Production deployments wire in a real broker
//! client that implements the same trait; connection retry and backoff
//! belong to that client, never to this crate.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connection failed: {0}")]
    ConnectFailed(String),
    #[error("no responder on {0}")]
    NoResponder(String),
    #[error("request on {subject} timed out after {timeout:?}")]
    Timeout { subject: String, timeout: Duration },
    #[error("publish on {subject} rejected: {reason}")]
    Rejected { subject: String, reason: String },
}

/// A single message on the wire.
#[derive(Debug, Clone, Default)]
pub struct Message {
    pub subject: String,
    pub payload: Vec<u8>,
    pub headers: HashMap<String, String>,
}

/// Handler invoked for every message on a subscribed subject. A `Some`
/// return is delivered back to the requester as the reply.
pub type Handler = Arc<dyn Fn(&Message) -> Option<Message> + Send + Sync>;

#[async_trait]
pub trait Transport: Send + Sync {
    async fn publish(&self, subject: &str, payload: Vec<u8>) -> Result<(), TransportError>;

    async fn publish_with_headers(
        &self,
        subject: &str,
        payload: Vec<u8>,
        headers: HashMap<String, String>,
    ) -> Result<(), TransportError>;

    /// Request-reply with a hard deadline.
    async fn request(
        &self,
        subject: &str,
        payload: Vec<u8>,
        timeout: Duration,
    ) -> Result<Message, TransportError>;

    async fn subscribe(&self, subject: &str, handler: Handler) -> Result<(), TransportError>;

    /// Transport-level round-trip time as measured by the client itself.
    async fn rtt(&self) -> Result<Duration, TransportError>;

    async fn flush(&self) -> Result<(), TransportError>;
}

/// In-process transport: routes requests straight to registered handlers
/// and records every publish for inspection. Backs the dev binary and the
/// scheduler tests.
#[derive(Default)]
pub struct LoopbackTransport {
    subscriptions: Mutex<HashMap<String, Handler>>,
    published: Mutex<Vec<Message>>,
}

impl LoopbackTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Connect-shaped constructor used by the binary: validates credentials
    /// the way a real client would, then hands back a live loopback.
    pub fn connect(url: &str, user: &str, password: &str) -> Result<Self, TransportError> {
        if user.is_empty() || password.is_empty() {
            return Err(TransportError::ConnectFailed(format!(
                "missing credentials for {url}"
            )));
        }
        Ok(Self::new())
    }

    /// Messages published so far, oldest first.
    pub fn published(&self) -> Vec<Message> {
        self.published.lock().unwrap().clone()
    }

    /// Published messages on one subject, oldest first.
    pub fn published_on(&self, subject: &str) -> Vec<Message> {
        self.published
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.subject == subject)
            .cloned()
            .collect()
    }

    /// Route a fully formed request message, headers included, to its
    /// responder. The trait's `request` builds a headerless message; this
    /// entry point exists for callers that need header reflection.
    pub async fn request_message(&self, request: Message) -> Result<Message, TransportError> {
        let handler = {
            let subs = self.subscriptions.lock().unwrap();
            subs.get(&request.subject).cloned()
        };
        let handler =
            handler.ok_or_else(|| TransportError::NoResponder(request.subject.clone()))?;
        handler(&request).ok_or(TransportError::NoResponder(request.subject))
    }

    fn deliver(&self, message: Message) {
        let handler = {
            let subs = self.subscriptions.lock().unwrap();
            subs.get(&message.subject).cloned()
        };
        if let Some(handler) = handler {
            let _ = handler(&message);
        }
        self.published.lock().unwrap().push(message);
    }
}

#[async_trait]
impl Transport for LoopbackTransport {
    async fn publish(&self, subject: &str, payload: Vec<u8>) -> Result<(), TransportError> {
        self.deliver(Message {
            subject: subject.to_string(),
            payload,
            headers: HashMap::new(),
        });
        Ok(())
    }

    async fn publish_with_headers(
        &self,
        subject: &str,
        payload: Vec<u8>,
        headers: HashMap<String, String>,
    ) -> Result<(), TransportError> {
        self.deliver(Message {
            subject: subject.to_string(),
            payload,
            headers,
        });
        Ok(())
    }

    async fn request(
        &self,
        subject: &str,
        payload: Vec<u8>,
        _timeout: Duration,
    ) -> Result<Message, TransportError> {
        self.request_message(Message {
            subject: subject.to_string(),
            payload,
            headers: HashMap::new(),
        })
        .await
    }

    async fn subscribe(&self, subject: &str, handler: Handler) -> Result<(), TransportError> {
        self.subscriptions
            .lock()
            .unwrap()
            .insert(subject.to_string(), handler);
        Ok(())
    }

    async fn rtt(&self) -> Result<Duration, TransportError> {
        // Loopback RTT is the in-process dispatch cost.
        let start = Instant::now();
        drop(self.subscriptions.lock().unwrap());
        Ok(start.elapsed())
    }

    async fn flush(&self) -> Result<(), TransportError> {
        Ok(())
    }
}
