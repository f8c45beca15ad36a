use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::value_objects::enums::platforms::Platform;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Update,
    Online,
    Offline,
}

// Already verified upstream; nothing in here is trusted for authentication.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChannelNotification {
    pub kind: NotificationKind,
    #[serde(default)]
    pub platform: Platform,
    pub channel_id: String,
    pub channel_login: String,
    pub channel_name: String,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub category_id: Option<String>,
    #[serde(default)]
    pub category_name: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub is_mature: Option<bool>,
}

/// What handling a notification amounted to when it did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationOutcome {
    ChapterAdded { basename: String },
    ChapterCached,
    CaptureStarted { basename: String },
    CaptureSkipped { reason: String },
    Duplicate { basename: String },
    OfflineRecorded,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_online_notification() {
        let raw = r#"{
            "kind": "online",
            "platform": "twitch",
            "channel_id": "1234",
            "channel_login": "somechannel",
            "channel_name": "SomeChannel",
            "session_id": "40001",
            "started_at": "2024-03-01T18:00:00Z"
        }"#;

        let notification: ChannelNotification = serde_json::from_str(raw).unwrap();

        assert_eq!(notification.kind, NotificationKind::Online);
        assert_eq!(notification.session_id.as_deref(), Some("40001"));
        assert!(notification.category_name.is_none());
    }

    #[test]
    fn platform_defaults_to_twitch() {
        let raw = r#"{"kind":"offline","channel_id":"1","channel_login":"a","channel_name":"A"}"#;
        let notification: ChannelNotification = serde_json::from_str(raw).unwrap();

        assert_eq!(notification.platform, Platform::Twitch);
    }
}
