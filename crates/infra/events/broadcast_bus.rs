use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::debug;

use crate::domain::{
    repositories::event_publisher::EventPublisher,
    value_objects::lifecycle_events::LifecycleEvent,
};

/// In-process fan-out of lifecycle events. Having no subscriber is not an error.
#[derive(Clone)]
pub struct BroadcastEventBus {
    sender: broadcast::Sender<LifecycleEvent>,
}

impl BroadcastEventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.sender.subscribe()
    }
}

#[async_trait]
impl EventPublisher for BroadcastEventBus {
    async fn publish(&self, event: LifecycleEvent) -> Result<()> {
        let action = event.action();
        match self.sender.send(event) {
            Ok(receivers) => debug!(action, receivers, "event_bus: published"),
            Err(_) => debug!(action, "event_bus: no subscribers; event dropped"),
        }
        Ok(())
    }
}
