use anyhow::{Context, Result, bail};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::domain::{
    entities::recordings::{ChapterEntity, RecordingEntity, SegmentEntity},
    value_objects::enums::{mute_statuses::MuteStatus, platforms::Platform},
};

pub const CURRENT_VERSION: u64 = 2;

/// On-disk shape of a recording (schema version 2).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecordingDocument {
    pub version: u64,
    pub capture_id: Uuid,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub platform: Platform,
    pub streamer_name: String,
    pub streamer_id: String,
    pub streamer_login: String,
    #[serde(default)]
    pub stream_resolution: Option<String>,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub capture_started: Option<DateTime<Utc>>,
    #[serde(default)]
    pub conversion_started: Option<DateTime<Utc>>,
    #[serde(default)]
    pub saved_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub is_capturing: bool,
    #[serde(default)]
    pub is_converting: bool,
    #[serde(default)]
    pub is_finalized: bool,
    #[serde(default)]
    pub duration: Option<i64>,
    #[serde(default)]
    pub segments: Vec<String>,
    #[serde(default)]
    pub chapters: Vec<ChapterEntity>,
    #[serde(default)]
    pub provider_vod_id: Option<String>,
    #[serde(default)]
    pub provider_vod_exists: Option<bool>,
    #[serde(default)]
    pub provider_vod_muted: MuteStatus,
    #[serde(default)]
    pub not_started: bool,
    #[serde(default)]
    pub failed: bool,
    #[serde(default)]
    pub prevent_deletion: bool,
}

impl From<&RecordingEntity> for RecordingDocument {
    fn from(recording: &RecordingEntity) -> Self {
        Self {
            version: CURRENT_VERSION,
            capture_id: recording.capture_id,
            session_id: recording.session_id.clone(),
            platform: recording.platform,
            streamer_name: recording.channel_name.clone(),
            streamer_id: recording.channel_id.clone(),
            streamer_login: recording.channel_login.clone(),
            stream_resolution: recording.stream_resolution.clone(),
            started_at: recording.started_at,
            ended_at: recording.ended_at,
            capture_started: recording.capture_started,
            conversion_started: recording.conversion_started,
            saved_at: recording.saved_at,
            is_capturing: recording.is_capturing,
            is_converting: recording.is_converting,
            is_finalized: recording.is_finalized,
            duration: recording.duration,
            segments: recording
                .segments
                .iter()
                .map(|segment| segment.filename.clone())
                .collect(),
            chapters: recording.chapters.clone(),
            provider_vod_id: recording.provider_vod_id.clone(),
            provider_vod_exists: recording.provider_vod_exists,
            provider_vod_muted: recording.mute_status,
            not_started: recording.not_started,
            failed: recording.failed,
            prevent_deletion: recording.prevent_deletion,
        }
    }
}

impl RecordingDocument {
    /// Sizes and deleted flags are filled in later from the filesystem.
    pub fn into_entity(self, basename: String, directory: PathBuf) -> RecordingEntity {
        let mut recording = RecordingEntity {
            capture_id: self.capture_id,
            session_id: self.session_id,
            basename,
            directory,
            platform: self.platform,
            channel_id: self.streamer_id,
            channel_login: self.streamer_login,
            channel_name: self.streamer_name,
            stream_resolution: self.stream_resolution,
            started_at: self.started_at,
            ended_at: self.ended_at,
            saved_at: self.saved_at,
            capture_started: self.capture_started,
            conversion_started: self.conversion_started,
            is_capturing: self.is_capturing,
            is_converting: self.is_converting,
            is_finalized: self.is_finalized,
            not_started: self.not_started,
            failed: self.failed,
            prevent_deletion: self.prevent_deletion,
            duration: self.duration,
            total_size: 0,
            segments: self.segments.into_iter().map(SegmentEntity::new).collect(),
            chapters: Vec::new(),
            provider_vod_id: self.provider_vod_id,
            provider_vod_exists: self.provider_vod_exists,
            mute_status: self.provider_vod_muted,
        };
        for chapter in self.chapters {
            recording.add_chapter(chapter);
        }
        recording
    }
}

/// `load_raw -> migrate -> typed`.
pub fn parse_recording_document(raw: &str) -> Result<RecordingDocument> {
    if raw.trim().is_empty() {
        bail!("recording document is empty");
    }
    let value: Value = serde_json::from_str(raw).context("recording document is not valid JSON")?;
    let value = migrate(value)?;
    serde_json::from_value(value).context("recording document does not match schema version 2")
}

pub fn migrate(value: Value) -> Result<Value> {
    let version = value.get("version").and_then(Value::as_u64).unwrap_or(1);
    match version {
        1 => migrate_v1_to_v2(value),
        CURRENT_VERSION => Ok(value),
        other => bail!("unsupported recording document version {}", other),
    }
}

fn migrate_v1_to_v2(value: Value) -> Result<Value> {
    let Value::Object(v1) = value else {
        bail!("version 1 recording document is not an object");
    };

    let started_at = timestamp_field(&v1, &["started_at", "dt_started_at"])
        .context("version 1 recording document has no start time")?;

    let raw_capture_id = v1.get("capture_id").and_then(Value::as_str);
    let capture_id = raw_capture_id
        .and_then(|raw| Uuid::parse_str(raw).ok())
        .unwrap_or_else(Uuid::new_v4);
    // Version 1 stored the provider session id in `capture_id`.
    let session_id = raw_capture_id.filter(|raw| !raw.is_empty() && Uuid::parse_str(raw).is_err());

    let mute_status = match v1.get("twitch_vod_muted") {
        Some(Value::Bool(true)) => MuteStatus::Muted,
        Some(Value::Bool(false)) => MuteStatus::Unmuted,
        Some(Value::Number(n)) => match n.as_u64() {
            Some(1) => MuteStatus::Unmuted,
            Some(2) => MuteStatus::Muted,
            _ => MuteStatus::Unknown,
        },
        _ => MuteStatus::Unknown,
    };

    let chapters: Vec<Value> = v1
        .get("chapters")
        .and_then(Value::as_array)
        .map(|chapters| chapters.iter().filter_map(migrate_v1_chapter).collect())
        .unwrap_or_default();

    Ok(json!({
        "version": CURRENT_VERSION,
        "capture_id": capture_id,
        "session_id": session_id,
        "platform": v1.get("platform").cloned().unwrap_or_else(|| json!("twitch")),
        "streamer_name": v1.get("streamer_name").cloned().unwrap_or(Value::Null),
        "streamer_id": string_field(&v1, "streamer_id"),
        "streamer_login": v1.get("streamer_login").cloned().unwrap_or(Value::Null),
        "stream_resolution": v1.get("stream_resolution").cloned().unwrap_or(Value::Null),
        "started_at": started_at,
        "ended_at": timestamp_field(&v1, &["ended_at", "dt_ended_at"]),
        "capture_started": timestamp_field(&v1, &["capture_started", "dt_capture_started"]),
        "conversion_started": timestamp_field(&v1, &["conversion_started", "dt_conversion_started"]),
        "saved_at": timestamp_field(&v1, &["saved_at", "dt_saved_at"]),
        "is_capturing": bool_field(&v1, "is_capturing"),
        "is_converting": bool_field(&v1, "is_converting"),
        "is_finalized": bool_field(&v1, "is_finalized"),
        "duration": v1.get("duration_seconds").or(v1.get("duration")).and_then(Value::as_f64).map(|d| d.round() as i64),
        "segments": v1_segments(&v1),
        "chapters": chapters,
        "provider_vod_id": v1.get("twitch_vod_id").cloned().unwrap_or(Value::Null),
        "provider_vod_exists": v1.get("twitch_vod_exists").and_then(Value::as_bool),
        "provider_vod_muted": mute_status,
        "not_started": false,
        "failed": false,
        "prevent_deletion": bool_field(&v1, "prevent_deletion"),
    }))
}

fn migrate_v1_chapter(chapter: &Value) -> Option<Value> {
    let Value::Object(chapter) = chapter else {
        return None;
    };
    let started_at = timestamp_field(chapter, &["started_at", "time", "dt_started_at"])?;

    Some(json!({
        "title": chapter.get("title").and_then(Value::as_str).unwrap_or_default(),
        "category_id": chapter.get("category_id").or(chapter.get("game_id")).map(value_to_string),
        "category_name": chapter.get("category_name").or(chapter.get("game_name")).and_then(Value::as_str),
        "started_at": started_at,
        "is_mature": bool_field(chapter, "is_mature"),
        "online": chapter.get("online").and_then(Value::as_bool).unwrap_or(true),
    }))
}

/// Segment lists were either `segments_raw: [path]` or `segments: [path | {basename}]`.
fn v1_segments(v1: &Map<String, Value>) -> Vec<String> {
    let entries = v1
        .get("segments_raw")
        .or(v1.get("segments"))
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    entries
        .iter()
        .filter_map(|entry| match entry {
            Value::String(path) => Some(path.clone()),
            Value::Object(segment) => segment
                .get("basename")
                .or(segment.get("filename"))
                .and_then(Value::as_str)
                .map(str::to_string),
            _ => None,
        })
        .filter_map(|path| {
            Path::new(&path)
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
        })
        .collect()
}

fn timestamp_field(object: &Map<String, Value>, keys: &[&str]) -> Option<DateTime<Utc>> {
    keys.iter()
        .filter_map(|key| object.get(*key))
        .find_map(parse_v1_timestamp)
}

// Either an RFC 3339 string or a PHP DateTime dump: `{"date": "2021-01-01 12:00:00.000000", ...}`.
fn parse_v1_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    let raw = match value {
        Value::String(raw) => raw.as_str(),
        Value::Object(php) => php.get("date")?.as_str()?,
        _ => return None,
    };

    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

fn bool_field(object: &Map<String, Value>, key: &str) -> bool {
    object.get(key).and_then(Value::as_bool).unwrap_or(false)
}

fn string_field(object: &Map<String, Value>, key: &str) -> String {
    object.get(key).map(value_to_string).unwrap_or_default()
}

fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
