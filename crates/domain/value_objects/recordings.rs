use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use uuid::Uuid;

use crate::domain::{
    entities::recordings::RecordingEntity,
    value_objects::{
        basename::recording_basename,
        enums::{mute_statuses::MuteStatus, platforms::Platform},
    },
};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InsertRecordingModel {
    pub platform: Platform,
    pub channel_id: String,
    pub channel_login: String,
    pub channel_name: String,
    pub session_id: String,
    pub started_at: DateTime<Utc>,
}

impl InsertRecordingModel {
    pub fn basename(&self) -> String {
        recording_basename(&self.channel_login, self.started_at, &self.session_id)
    }

    /// New recording under `{vod_root}/{login}`, not yet capturing.
    pub fn to_entity(&self, vod_root: &Path) -> RecordingEntity {
        RecordingEntity {
            capture_id: Uuid::new_v4(),
            session_id: Some(self.session_id.clone()),
            basename: self.basename(),
            directory: vod_root.join(&self.channel_login),
            platform: self.platform,
            channel_id: self.channel_id.clone(),
            channel_login: self.channel_login.clone(),
            channel_name: self.channel_name.clone(),
            stream_resolution: None,
            started_at: self.started_at,
            ended_at: None,
            saved_at: None,
            capture_started: None,
            conversion_started: None,
            is_capturing: false,
            is_converting: false,
            is_finalized: false,
            not_started: true,
            failed: false,
            prevent_deletion: false,
            duration: None,
            total_size: 0,
            segments: Vec::new(),
            chapters: Vec::new(),
            provider_vod_id: None,
            provider_vod_exists: None,
            mute_status: MuteStatus::Unknown,
        }
    }
}
