use anyhow::Result;
use crates::domain::{
    repositories::{event_publisher::EventPublisher, recordings::RecordingRepository},
    value_objects::{
        channel_config::{ChannelConfig, RetentionSettings},
        lifecycle_events::LifecycleEvent,
        retention::{RetentionVerdict, select_eviction_candidate},
    },
};
use std::sync::Arc;
use tracing::{error, info, warn};

pub struct RetentionCleanupUseCase {
    recordings: Arc<dyn RecordingRepository + Send + Sync>,
    events: Arc<dyn EventPublisher + Send + Sync>,
    settings: RetentionSettings,
}

impl RetentionCleanupUseCase {
    pub fn new(
        recordings: Arc<dyn RecordingRepository + Send + Sync>,
        events: Arc<dyn EventPublisher + Send + Sync>,
        settings: RetentionSettings,
    ) -> Self {
        Self {
            recordings,
            events,
            settings,
        }
    }

    /// Evicts at most one recording of the channel. `None` when the channel opts out.
    pub async fn run_for_channel(&self, channel: &ChannelConfig) -> Result<Option<RetentionVerdict>> {
        if channel.no_cleanup {
            info!(channel_login = %channel.login, "retention: cleanup disabled for channel");
            return Ok(None);
        }

        let settings = channel.retention_for(&self.settings);
        let recordings = self.recordings.list_by_channel(channel.login.clone()).await?;
        let capturing = self
            .recordings
            .find_capturing(channel.login.clone())
            .await?
            .map(|recording| recording.basename);

        let verdict = select_eviction_candidate(&recordings, &settings, capturing.as_deref());
        match &verdict {
            RetentionVerdict::WithinQuota { count, total_size } => {
                info!(
                    channel_login = %channel.login,
                    count,
                    total_size,
                    vods_to_keep = settings.vods_to_keep,
                    quota_bytes = settings.storage_quota_bytes(),
                    "retention: within quota"
                );
            }
            RetentionVerdict::Refused { basename } => {
                error!(
                    channel_login = %channel.login,
                    basename = %basename,
                    "retention: oldest recording is still capturing; refusing to delete"
                );
            }
            RetentionVerdict::Evict { basename, reason } => {
                warn!(
                    channel_login = %channel.login,
                    basename = %basename,
                    reason = ?reason,
                    "retention: evicting recording"
                );
                self.recordings.delete(basename.clone()).await?;

                let event = LifecycleEvent::VodRemoved {
                    basename: basename.clone(),
                    channel_login: channel.login.clone(),
                };
                if let Err(err) = self.events.publish(event).await {
                    warn!(basename = %basename, error = ?err, "retention: failed to publish vod_removed");
                }
            }
        }

        Ok(Some(verdict))
    }
}
