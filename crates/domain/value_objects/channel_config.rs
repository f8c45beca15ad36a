use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::domain::value_objects::enums::platforms::Platform;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChannelConfig {
    #[serde(default)]
    pub platform: Platform,
    pub login: String,
    pub internal_id: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub quality: Vec<String>,
    #[serde(default)]
    pub no_capture: bool,
    #[serde(default)]
    pub live_chat: bool,
    #[serde(default)]
    pub no_cleanup: bool,
    /// Overrides the global `vods_to_keep` when > 0.
    #[serde(default)]
    pub max_vods: u32,
    /// Overrides the global storage quota (GiB) when > 0.
    #[serde(default)]
    pub max_storage_gb: u64,
    #[serde(default, rename = "match")]
    pub match_keywords: Vec<String>,
}

impl ChannelConfig {
    /// Quality list for the capture tool, falling back to `best`.
    pub fn quality_arg(&self) -> String {
        let quality: Vec<&str> = self
            .quality
            .iter()
            .map(|q| q.trim())
            .filter(|q| !q.is_empty())
            .collect();

        if quality.is_empty() {
            "best".to_string()
        } else {
            quality.join(",")
        }
    }

    /// A channel without keywords matches every title.
    pub fn title_matches(&self, title: Option<&str>) -> bool {
        if self.match_keywords.is_empty() {
            return true;
        }
        let Some(title) = title else {
            return false;
        };
        let title = title.to_lowercase();
        self.match_keywords
            .iter()
            .any(|keyword| title.contains(&keyword.to_lowercase()))
    }

    pub fn retention_for(&self, global: &RetentionSettings) -> RetentionSettings {
        let mut settings = global.clone();
        if self.max_vods > 0 {
            settings.vods_to_keep = self.max_vods;
        }
        if self.max_storage_gb > 0 {
            settings.storage_per_streamer_gb = self.max_storage_gb;
        }
        settings
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetentionSettings {
    pub vods_to_keep: u32,
    pub storage_per_streamer_gb: u64,
    pub keep_deleted_vods: bool,
    pub keep_favourite_vods: bool,
    pub keep_muted_vods: bool,
    pub favourite_categories: Vec<String>,
}

impl Default for RetentionSettings {
    fn default() -> Self {
        Self {
            vods_to_keep: 5,
            storage_per_streamer_gb: 100,
            keep_deleted_vods: false,
            keep_favourite_vods: false,
            keep_muted_vods: false,
            favourite_categories: Vec::new(),
        }
    }
}

impl RetentionSettings {
    pub fn storage_quota_bytes(&self) -> u64 {
        self.storage_per_streamer_gb.saturating_mul(1024 * 1024 * 1024)
    }
}

/// Active channel configuration keyed by the provider's channel id.
#[derive(Debug, Clone, Default)]
pub struct ChannelDirectory {
    channels: HashMap<String, ChannelConfig>,
}

impl ChannelDirectory {
    pub fn new(channels: Vec<ChannelConfig>) -> Self {
        let channels = channels
            .into_iter()
            .map(|channel| (channel.internal_id.clone(), channel))
            .collect();
        Self { channels }
    }

    pub fn find(&self, channel_id: &str) -> Option<&ChannelConfig> {
        self.channels.get(channel_id)
    }

    pub fn find_by_login(&self, login: &str) -> Option<&ChannelConfig> {
        self.channels
            .values()
            .find(|channel| channel.login.eq_ignore_ascii_case(login))
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_channel() -> ChannelConfig {
        ChannelConfig {
            platform: Platform::Twitch,
            login: "somechannel".to_string(),
            internal_id: "1234".to_string(),
            display_name: None,
            quality: vec![],
            no_capture: false,
            live_chat: false,
            no_cleanup: false,
            max_vods: 0,
            max_storage_gb: 0,
            match_keywords: vec![],
        }
    }

    #[test]
    fn quality_defaults_to_best() {
        let mut channel = sample_channel();
        assert_eq!(channel.quality_arg(), "best");

        channel.quality = vec!["1080p60".to_string(), " 720p60 ".to_string()];
        assert_eq!(channel.quality_arg(), "1080p60,720p60");
    }

    #[test]
    fn keyword_match_is_case_insensitive() {
        let mut channel = sample_channel();
        assert!(channel.title_matches(None));

        channel.match_keywords = vec!["Speedrun".to_string()];
        assert!(channel.title_matches(Some("any% speedrun attempts")));
        assert!(!channel.title_matches(Some("just chatting")));
        assert!(!channel.title_matches(None));
    }

    #[test]
    fn channel_overrides_retention() {
        let mut channel = sample_channel();
        channel.max_vods = 2;

        let settings = channel.retention_for(&RetentionSettings::default());
        assert_eq!(settings.vods_to_keep, 2);
        assert_eq!(settings.storage_per_streamer_gb, 100);
    }

    #[test]
    fn reads_channels_file_shape() {
        let raw = r#"[{"platform":"kick","login":"abc","internal_id":"9","match":["irl"]}]"#;
        let channels: Vec<ChannelConfig> = serde_json::from_str(raw).unwrap();
        let directory = ChannelDirectory::new(channels);

        let channel = directory.find("9").unwrap();
        assert_eq!(channel.platform, Platform::Kick);
        assert_eq!(channel.match_keywords, vec!["irl".to_string()]);
        assert!(directory.find_by_login("ABC").is_some());
    }
}
