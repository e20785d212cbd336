//! Recording in-memory bus.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;

use invoiceflow_bus::{BusResult, EventBus, MessageHandler, ShutdownToken};

/// Records every publish; stream/consumer setup is a no-op. Tests drive the
/// coordinator's handler directly instead of going through a delivery loop.
#[derive(Default)]
pub struct MemoryBus {
    published: Mutex<Vec<(String, Vec<u8>)>>,
}

impl MemoryBus {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn published_subjects(&self) -> Vec<String> {
        self.published
            .lock()
            .unwrap()
            .iter()
            .map(|(subject, _)| subject.clone())
            .collect()
    }

    /// Decode every payload published to `subject`.
    pub fn published_on<T: DeserializeOwned>(&self, subject: &str) -> Vec<T> {
        self.published
            .lock()
            .unwrap()
            .iter()
            .filter(|(s, _)| s == subject)
            .map(|(_, payload)| serde_json::from_slice(payload).expect("payload decodes"))
            .collect()
    }

    pub fn publish_count(&self) -> usize {
        self.published.lock().unwrap().len()
    }
}

#[async_trait]
impl EventBus for MemoryBus {
    async fn ensure_stream(
        &self,
        _name: &str,
        _subjects: &[&str],
        _max_age: Duration,
    ) -> BusResult<()> {
        Ok(())
    }

    async fn ensure_consumer(
        &self,
        _stream: &str,
        _consumer: &str,
        _filter_subject: &str,
    ) -> BusResult<()> {
        Ok(())
    }

    async fn publish(&self, subject: &str, payload: Vec<u8>) -> BusResult<()> {
        self.published
            .lock()
            .unwrap()
            .push((subject.to_string(), payload));
        Ok(())
    }

    async fn subscribe_durable(
        &self,
        _stream: &str,
        _consumer: &str,
        _handler: Arc<dyn MessageHandler>,
        _shutdown: ShutdownToken,
    ) -> BusResult<()> {
        Ok(())
    }
}
