use anyhow::Result;
use async_trait::async_trait;
use mockall::automock;

/// Asks the notification source to stop sending events for a channel.
#[async_trait]
#[automock]
pub trait SubscriptionGateway {
    async fn request_unsubscribe(
        &self,
        channel_id: String,
        channel_login: String,
        reason: String,
    ) -> Result<()>;
}
