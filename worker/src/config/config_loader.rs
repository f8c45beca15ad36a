use crate::config::stage::Stage;

use super::config_model::{Binaries, CaptureSettings, DataPaths, DotEnvyConfig, InboxSettings};
use anyhow::{Context, Result};
use crates::domain::value_objects::channel_config::{
    ChannelConfig, ChannelDirectory, RetentionSettings,
};
use std::{path::Path, path::PathBuf, str::FromStr, time::Duration};

pub fn load() -> Result<DotEnvyConfig> {
    dotenvy::dotenv().ok();

    load_from(|key| std::env::var(key).ok())
}

pub fn load_from<F>(lookup: F) -> Result<DotEnvyConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let var = |key: &str| {
        lookup(key)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    };

    let stage = Stage::try_from(&var("STAGE").unwrap_or_default()).unwrap_or_default();

    let data_dir = PathBuf::from(var("DATA_DIR").unwrap_or_else(|| "./data".to_string()));
    let paths = DataPaths::from_data_dir(data_dir, var("CHANNELS_CONFIG_PATH").map(PathBuf::from));

    let binaries = Binaries {
        streamlink: var("STREAMLINK_PATH"),
        ffmpeg: var("FFMPEG_PATH"),
        chat_dumper: var("CHAT_DUMPER_PATH"),
    };

    let defaults = CaptureSettings::default();
    let capture = CaptureSettings {
        hls_timeout: parse_or(var("HLS_TIMEOUT"), defaults.hls_timeout)
            .context("HLS_TIMEOUT is invalid")?,
        download_retries: parse_or(var("DOWNLOAD_RETRIES"), defaults.download_retries)
            .context("DOWNLOAD_RETRIES is invalid")?,
        retry_delay: Duration::from_secs(
            parse_or(var("CAPTURE_RETRY_DELAY_SECS"), defaults.retry_delay.as_secs())
                .context("CAPTURE_RETRY_DELAY_SECS is invalid")?,
        ),
        vod_container: var("VOD_CONTAINER")
            .map(|container| container.trim_start_matches('.').to_ascii_lowercase())
            .unwrap_or(defaults.vod_container),
        convert_enabled: parse_or(var("CONVERT_ENABLED"), defaults.convert_enabled)
            .context("CONVERT_ENABLED is invalid")?,
        min_chapter_duration: parse_or(var("MIN_CHAPTER_DURATION"), defaults.min_chapter_duration)
            .context("MIN_CHAPTER_DURATION is invalid")?,
        job_poll_interval: Duration::from_secs(
            parse_or(var("JOB_POLL_INTERVAL_SECS"), defaults.job_poll_interval.as_secs())
                .context("JOB_POLL_INTERVAL_SECS is invalid")?,
        ),
    };

    let retention_defaults = RetentionSettings::default();
    let retention = RetentionSettings {
        vods_to_keep: parse_or(var("VODS_TO_KEEP"), retention_defaults.vods_to_keep)
            .context("VODS_TO_KEEP is invalid")?,
        storage_per_streamer_gb: parse_or(
            var("STORAGE_PER_STREAMER_GB"),
            retention_defaults.storage_per_streamer_gb,
        )
        .context("STORAGE_PER_STREAMER_GB is invalid")?,
        keep_deleted_vods: parse_or(var("KEEP_DELETED_VODS"), false)
            .context("KEEP_DELETED_VODS is invalid")?,
        keep_favourite_vods: parse_or(var("KEEP_FAVOURITE_VODS"), false)
            .context("KEEP_FAVOURITE_VODS is invalid")?,
        keep_muted_vods: parse_or(var("KEEP_MUTED_VODS"), false)
            .context("KEEP_MUTED_VODS is invalid")?,
        favourite_categories: var("FAVOURITE_CATEGORIES")
            .map(|value| {
                value
                    .split(',')
                    .map(str::trim)
                    .filter(|category| !category.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default(),
    };

    let inbox = InboxSettings {
        dir: paths.data_dir.join("inbox"),
        poll_interval: Duration::from_secs(
            parse_or(var("INBOX_POLL_INTERVAL_SECS"), 5_u64)
                .context("INBOX_POLL_INTERVAL_SECS is invalid")?
                .max(1),
        ),
    };

    Ok(DotEnvyConfig {
        stage,
        paths,
        binaries,
        capture,
        retention,
        inbox,
    })
}

/// Reads the JSON array of channel configurations.
pub fn load_channels(path: &Path) -> Result<ChannelDirectory> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read channel config {}", path.display()))?;
    let channels: Vec<ChannelConfig> = serde_json::from_str(&raw)
        .with_context(|| format!("channel config {} is invalid", path.display()))?;

    Ok(ChannelDirectory::new(channels))
}

fn parse_or<T>(value: Option<String>, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match value {
        Some(value) => Ok(value.parse::<T>()?),
        None => Ok(default),
    }
}
