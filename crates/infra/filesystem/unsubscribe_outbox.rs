use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::info;

use crate::domain::repositories::subscription_gateway::SubscriptionGateway;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UnsubscribeIntent {
    pub channel_id: String,
    pub channel_login: String,
    pub reason: String,
    pub requested_at: DateTime<Utc>,
}

/// Hands unsubscribe requests to whoever owns the notification subscriptions,
/// one `{channel_id}.json` per channel. Repeated requests overwrite each other.
pub struct UnsubscribeOutbox {
    dir: PathBuf,
}

impl UnsubscribeOutbox {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }
}

#[async_trait]
impl SubscriptionGateway for UnsubscribeOutbox {
    async fn request_unsubscribe(
        &self,
        channel_id: String,
        channel_login: String,
        reason: String,
    ) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("failed to create {}", self.dir.display()))?;

        let file_name: String = channel_id
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .collect();
        let path = self.dir.join(format!("{}.json", file_name));

        let intent = UnsubscribeIntent {
            channel_id,
            channel_login,
            reason,
            requested_at: Utc::now(),
        };
        tokio::fs::write(&path, serde_json::to_vec_pretty(&intent)?)
            .await
            .with_context(|| format!("failed to write {}", path.display()))?;

        info!(
            channel_id = %intent.channel_id,
            channel_login = %intent.channel_login,
            "unsubscribe_outbox: unsubscribe requested"
        );
        Ok(())
    }
}
