//! JetStream-backed [`EventBus`] implementation.
//!
//! Streams use limits-based retention; consumers are durable, explicit-ack,
//! with a bounded delivery count. The receive loop polls with a short
//! timeout so a shutdown request is observed between messages, never by
//! aborting a handler in flight.

use std::sync::Arc;
use std::time::Duration;

use async_nats::jetstream::{self, consumer::PullConsumer};
use async_trait::async_trait;
use futures::StreamExt;
use tracing::{debug, error, info, warn};

use crate::{BusError, BusResult, EventBus, HandlerOutcome, MessageHandler, ShutdownToken};

/// How long one poll of the consumer stream waits before checking shutdown.
const RECV_POLL_TIMEOUT: Duration = Duration::from_millis(500);

pub struct JetStreamBus {
    jetstream: jetstream::Context,
    max_deliver: i64,
}

impl JetStreamBus {
    /// Connect to one or more servers (comma-separated URLs).
    pub async fn connect(servers: &str, max_deliver: i64) -> BusResult<Self> {
        let client = async_nats::connect(servers)
            .await
            .map_err(|e| BusError::Connect(e.to_string()))?;
        info!(servers, "connected to message bus");
        Ok(Self {
            jetstream: jetstream::new(client),
            max_deliver,
        })
    }
}

#[async_trait]
impl EventBus for JetStreamBus {
    async fn ensure_stream(
        &self,
        name: &str,
        subjects: &[&str],
        max_age: Duration,
    ) -> BusResult<()> {
        self.jetstream
            .get_or_create_stream(jetstream::stream::Config {
                name: name.to_string(),
                subjects: subjects.iter().map(|s| s.to_string()).collect(),
                max_age,
                retention: jetstream::stream::RetentionPolicy::Limits,
                ..Default::default()
            })
            .await
            .map_err(|e| BusError::Stream(e.to_string()))?;
        debug!(stream = name, "stream ensured");
        Ok(())
    }

    async fn ensure_consumer(
        &self,
        stream: &str,
        consumer: &str,
        filter_subject: &str,
    ) -> BusResult<()> {
        let stream_handle = self
            .jetstream
            .get_stream(stream)
            .await
            .map_err(|e| BusError::Stream(e.to_string()))?;
        stream_handle
            .get_or_create_consumer(
                consumer,
                jetstream::consumer::pull::Config {
                    durable_name: Some(consumer.to_string()),
                    filter_subject: filter_subject.to_string(),
                    ack_policy: jetstream::consumer::AckPolicy::Explicit,
                    max_deliver: self.max_deliver,
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| BusError::Consumer(e.to_string()))?;
        debug!(stream, consumer, filter_subject, "consumer ensured");
        Ok(())
    }

    async fn publish(&self, subject: &str, payload: Vec<u8>) -> BusResult<()> {
        let ack = self
            .jetstream
            .publish(subject.to_string(), payload.into())
            .await
            .map_err(|e| BusError::Publish {
                subject: subject.to_string(),
                reason: e.to_string(),
            })?;
        // Wait for the stream to confirm persistence.
        ack.await.map_err(|e| BusError::Publish {
            subject: subject.to_string(),
            reason: e.to_string(),
        })?;
        debug!(subject, "published");
        Ok(())
    }

    async fn subscribe_durable(
        &self,
        stream: &str,
        consumer: &str,
        handler: Arc<dyn MessageHandler>,
        shutdown: ShutdownToken,
    ) -> BusResult<()> {
        let stream_handle = self
            .jetstream
            .get_stream(stream)
            .await
            .map_err(|e| BusError::Stream(e.to_string()))?;
        let consumer_handle: PullConsumer = stream_handle
            .get_consumer(consumer)
            .await
            .map_err(|e| BusError::Consumer(e.to_string()))?;
        let mut messages = consumer_handle
            .messages()
            .await
            .map_err(|e| BusError::Subscribe(e.to_string()))?;

        info!(stream, consumer, "durable subscription started");

        while !shutdown.is_stopped() {
            let next = match tokio::time::timeout(RECV_POLL_TIMEOUT, messages.next()).await {
                Ok(Some(next)) => next,
                Ok(None) => break,
                Err(_) => continue, // poll timeout, re-check shutdown
            };

            let message = match next {
                Ok(message) => message,
                Err(e) => {
                    warn!(stream, consumer, error = %e, "message receive error");
                    continue;
                }
            };

            let subject = message.subject.to_string();
            let outcome = handler.handle(&subject, &message.payload).await;
            let ack_result = match outcome {
                HandlerOutcome::Ack => message.ack().await,
                HandlerOutcome::Nak => {
                    message
                        .ack_with(jetstream::AckKind::Nak(None))
                        .await
                }
            };
            if let Err(e) = ack_result {
                error!(subject, error = %e, "failed to acknowledge message");
            }
        }

        info!(stream, consumer, "durable subscription stopped");
        Ok(())
    }
}
