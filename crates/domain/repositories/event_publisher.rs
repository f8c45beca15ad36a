use anyhow::Result;
use async_trait::async_trait;
use mockall::automock;

use crate::domain::value_objects::lifecycle_events::LifecycleEvent;

#[async_trait]
#[automock]
pub trait EventPublisher {
    async fn publish(&self, event: LifecycleEvent) -> Result<()>;
}
