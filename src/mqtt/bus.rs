use crate::error::{with_timeout, SyncError};
use async_trait::async_trait;
use rumqttc::{AsyncClient, QoS};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Publishing side of the message bus.
///
/// `Ok` means the message was accepted for delivery; callers only record a
/// value as published after that.
#[async_trait]
pub trait MessageBus: Send + Sync {
    async fn publish(&self, topic: &str, payload: Vec<u8>, retain: bool) -> Result<(), SyncError>;
}

/// `MessageBus` over a rumqttc client (QoS 1).
#[derive(Clone)]
pub struct MqttBus {
    client: AsyncClient,
    timeout: Duration,
    /// Shared with the event pump, set once a disconnect was requested
    closing: Arc<AtomicBool>,
}

impl MqttBus {
    pub fn new(client: AsyncClient, timeout: Duration) -> Self {
        Self {
            client,
            timeout,
            closing: Arc::new(AtomicBool::new(false)),
        }
    }

    pub(crate) fn with_closing_flag(mut self, closing: Arc<AtomicBool>) -> Self {
        self.closing = closing;
        self
    }

    /// Queue a DISCONNECT behind everything already published. The event
    /// pump flushes the queue, sends it and stops.
    pub async fn disconnect(&self) -> Result<(), SyncError> {
        info!("Disconnecting from MQTT broker");
        self.closing.store(true, Ordering::SeqCst);

        with_timeout("mqtt disconnect", self.timeout, async {
            self.client.disconnect().await.map_err(SyncError::from)
        })
        .await
    }
}

#[async_trait]
impl MessageBus for MqttBus {
    async fn publish(&self, topic: &str, payload: Vec<u8>, retain: bool) -> Result<(), SyncError> {
        debug!(topic = %topic, bytes = payload.len(), retain, "Publishing");

        with_timeout("mqtt publish", self.timeout, async {
            self.client
                .publish(topic, QoS::AtLeastOnce, retain, payload)
                .await
                .map_err(SyncError::from)
        })
        .await
    }
}
