use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::entities::recordings::ChapterEntity;

/// Named lifecycle actions published to the external event bus.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum LifecycleEvent {
    StartDownload {
        basename: String,
        channel_login: String,
    },
    EndCapture {
        basename: String,
        channel_login: String,
        success: bool,
    },
    EndConvert {
        basename: String,
        channel_login: String,
        success: bool,
    },
    EndDownload {
        basename: String,
        channel_login: String,
    },
    ChapterUpdate {
        basename: String,
        channel_login: String,
        chapter: ChapterEntity,
    },
    VodRemoved {
        basename: String,
        channel_login: String,
    },
    ChannelUpdated {
        channel_login: String,
        category_name: Option<String>,
        title: Option<String>,
        updated_at: DateTime<Utc>,
    },
}

impl LifecycleEvent {
    pub fn action(&self) -> &'static str {
        match self {
            LifecycleEvent::StartDownload { .. } => "start_download",
            LifecycleEvent::EndCapture { .. } => "end_capture",
            LifecycleEvent::EndConvert { .. } => "end_convert",
            LifecycleEvent::EndDownload { .. } => "end_download",
            LifecycleEvent::ChapterUpdate { .. } => "chapter_update",
            LifecycleEvent::VodRemoved { .. } => "vod_removed",
            LifecycleEvent::ChannelUpdated { .. } => "channel_updated",
        }
    }

    pub fn channel_login(&self) -> &str {
        match self {
            LifecycleEvent::StartDownload { channel_login, .. }
            | LifecycleEvent::EndCapture { channel_login, .. }
            | LifecycleEvent::EndConvert { channel_login, .. }
            | LifecycleEvent::EndDownload { channel_login, .. }
            | LifecycleEvent::ChapterUpdate { channel_login, .. }
            | LifecycleEvent::VodRemoved { channel_login, .. }
            | LifecycleEvent::ChannelUpdated { channel_login, .. } => channel_login,
        }
    }
}
