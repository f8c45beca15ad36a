use crates::domain::value_objects::channel_config::RetentionSettings;
use std::{path::PathBuf, time::Duration};

use super::stage::Stage;

#[derive(Debug, Clone)]
pub struct DotEnvyConfig {
    pub stage: Stage,
    pub paths: DataPaths,
    pub binaries: Binaries,
    pub capture: CaptureSettings,
    pub retention: RetentionSettings,
    pub inbox: InboxSettings,
}

#[derive(Debug, Clone)]
pub struct DataPaths {
    pub data_dir: PathBuf,
    pub channels_config: PathBuf,
    pub vods: PathBuf,
    pub pids: PathBuf,
    pub logs: PathBuf,
    pub outbox: PathBuf,
}

impl DataPaths {
    pub fn from_data_dir(data_dir: PathBuf, channels_config: Option<PathBuf>) -> Self {
        Self {
            channels_config: channels_config.unwrap_or_else(|| data_dir.join("channels.json")),
            vods: data_dir.join("vods"),
            pids: data_dir.join("pids"),
            logs: data_dir.join("logs"),
            outbox: data_dir.join("outbox"),
            data_dir,
        }
    }

    pub fn events_journal(&self) -> PathBuf {
        self.outbox.join("events.jsonl")
    }

    pub fn unsubscribe_outbox(&self) -> PathBuf {
        self.outbox.join("unsubscribe")
    }
}

/// Explicit tool paths. `None` means look the default name up on `PATH`.
#[derive(Debug, Clone, Default)]
pub struct Binaries {
    pub streamlink: Option<String>,
    pub ffmpeg: Option<String>,
    pub chat_dumper: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CaptureSettings {
    pub hls_timeout: u32,
    pub download_retries: u32,
    pub retry_delay: Duration,
    pub vod_container: String,
    pub convert_enabled: bool,
    pub min_chapter_duration: i64,
    /// How often a capture adopted after a restart is checked for exit.
    pub job_poll_interval: Duration,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            hls_timeout: 200,
            download_retries: 5,
            retry_delay: Duration::from_secs(15),
            vod_container: "mp4".to_string(),
            convert_enabled: true,
            min_chapter_duration: 0,
            job_poll_interval: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone)]
pub struct InboxSettings {
    pub dir: PathBuf,
    pub poll_interval: Duration,
}
