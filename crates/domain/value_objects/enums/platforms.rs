use serde::{Deserialize, Serialize};
use std::{fmt::Display, str::FromStr};

#[derive(Debug, Default, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    #[default]
    Twitch,
    Kick,
    YouTube,
}

impl Platform {
    /// URL handed to the stream capture tool for a live channel.
    pub fn stream_url(&self, channel_login: &str, channel_id: &str) -> String {
        match self {
            Platform::Twitch => format!("https://twitch.tv/{}", channel_login),
            Platform::Kick => format!("https://kick.com/{}", channel_login),
            Platform::YouTube => format!("https://www.youtube.com/channel/{}/live", channel_id),
        }
    }
}

impl Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let platform = match self {
            Platform::Twitch => "twitch",
            Platform::Kick => "kick",
            Platform::YouTube => "youtube",
        };
        write!(f, "{}", platform)
    }
}

impl FromStr for Platform {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_lowercase().as_str() {
            "twitch" => Ok(Platform::Twitch),
            "kick" => Ok(Platform::Kick),
            "youtube" => Ok(Platform::YouTube),
            other => Err(format!("Unsupported platform: {}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_case_insensitively() {
        assert_eq!(Platform::from_str("Twitch").unwrap(), Platform::Twitch);
        assert_eq!(Platform::from_str("YOUTUBE").unwrap(), Platform::YouTube);
        assert!(Platform::from_str("tiktok").is_err());
    }

    #[test]
    fn builds_stream_urls() {
        assert_eq!(
            Platform::Twitch.stream_url("somechannel", "123"),
            "https://twitch.tv/somechannel"
        );
        assert_eq!(
            Platform::YouTube.stream_url("somechannel", "UCabc"),
            "https://www.youtube.com/channel/UCabc/live"
        );
    }
}
