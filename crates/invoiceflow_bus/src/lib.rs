//! Thin, library-agnostic message-bus interface.
//!
//! The pipeline depends on four operations: ensure a stream, ensure a named
//! durable consumer, publish, and durably subscribe with explicit ack/nak.
//! [`JetStreamBus`] is the production implementation; tests wire an
//! in-memory double through the same [`EventBus`] handle.

mod jetstream;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

pub use jetstream::JetStreamBus;

/// Cooperative stop flag for delivery loops.
///
/// Loops check it between messages only, so whatever handler is in flight
/// finishes before the loop exits. Clones observe the same flag.
#[derive(Debug, Clone, Default)]
pub struct ShutdownToken {
    flag: Arc<AtomicBool>,
}

impl ShutdownToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.flag.store(true, Ordering::Release);
    }

    pub fn is_stopped(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}

#[derive(Debug, Error)]
pub enum BusError {
    #[error("bus connect failed: {0}")]
    Connect(String),
    #[error("stream setup failed: {0}")]
    Stream(String),
    #[error("consumer setup failed: {0}")]
    Consumer(String),
    #[error("publish to '{subject}' failed: {reason}")]
    Publish { subject: String, reason: String },
    #[error("subscription failed: {0}")]
    Subscribe(String),
}

pub type BusResult<T> = Result<T, BusError>;

/// What a handler tells the bus to do with the message it just saw.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerOutcome {
    /// Processed; remove from the consumer's pending set.
    Ack,
    /// Not processed; redeliver (bounded by the consumer's delivery cap).
    Nak,
}

/// Per-message callback for durable subscriptions. A message that is never
/// acknowledged (handler death included) redelivers after the ack wait.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, subject: &str, payload: &[u8]) -> HandlerOutcome;
}

/// The four bus operations the pipeline relies on.
#[async_trait]
pub trait EventBus: Send + Sync {
    /// Create the stream if it does not exist. Retention is size/age
    /// bounded, never delivery-bounded.
    async fn ensure_stream(
        &self,
        name: &str,
        subjects: &[&str],
        max_age: Duration,
    ) -> BusResult<()>;

    /// Create the named durable consumer if it does not exist.
    async fn ensure_consumer(
        &self,
        stream: &str,
        consumer: &str,
        filter_subject: &str,
    ) -> BusResult<()>;

    async fn publish(&self, subject: &str, payload: Vec<u8>) -> BusResult<()>;

    /// Consume messages one at a time until `shutdown` fires. Each message
    /// is dispatched to `handler` exactly once per delivery; the handler's
    /// outcome drives ack/nak.
    async fn subscribe_durable(
        &self,
        stream: &str,
        consumer: &str,
        handler: Arc<dyn MessageHandler>,
        shutdown: ShutdownToken,
    ) -> BusResult<()>;
}
