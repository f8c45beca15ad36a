use anyhow::{Result, bail};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

use crate::domain::value_objects::{
    chapters,
    enums::{mute_statuses::MuteStatus, platforms::Platform, recording_statuses::RecordingStatus},
};

/// Streams longer than this are about to hit the provider's 24 hour cut-off.
pub const DAY_LIMIT_WARNING_SECS: i64 = 86_400 - 1_200;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChapterEntity {
    pub title: String,
    #[serde(default)]
    pub category_id: Option<String>,
    #[serde(default)]
    pub category_name: Option<String>,
    pub started_at: DateTime<Utc>,
    /// Seconds from the start of the recording.
    #[serde(default)]
    pub offset: Option<i64>,
    #[serde(default)]
    pub duration: Option<i64>,
    #[serde(default)]
    pub is_mature: bool,
    #[serde(default)]
    pub online: bool,
}

impl ChapterEntity {
    /// `category (title)`, used by edit lists.
    pub fn label(&self) -> String {
        let category = self
            .category_name
            .as_deref()
            .or(self.category_id.as_deref())
            .unwrap_or_default();
        format!("{} ({})", category, self.title)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentEntity {
    pub filename: String,
    pub size: u64,
    pub deleted: bool,
}

impl SegmentEntity {
    pub fn new(filename: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            size: 0,
            deleted: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordingEntity {
    pub capture_id: Uuid,
    /// Provider id of the live session; absent on documents older than this field.
    pub session_id: Option<String>,
    pub basename: String,
    /// Derived from where the document lives; never persisted.
    pub directory: PathBuf,
    pub platform: Platform,
    pub channel_id: String,
    pub channel_login: String,
    pub channel_name: String,
    pub stream_resolution: Option<String>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub saved_at: Option<DateTime<Utc>>,
    pub capture_started: Option<DateTime<Utc>>,
    pub conversion_started: Option<DateTime<Utc>>,
    pub is_capturing: bool,
    pub is_converting: bool,
    pub is_finalized: bool,
    pub not_started: bool,
    pub failed: bool,
    pub prevent_deletion: bool,
    pub duration: Option<i64>,
    pub total_size: u64,
    pub segments: Vec<SegmentEntity>,
    pub chapters: Vec<ChapterEntity>,
    pub provider_vod_id: Option<String>,
    pub provider_vod_exists: Option<bool>,
    pub mute_status: MuteStatus,
}

impl RecordingEntity {
    pub fn is_session(&self, session_id: &str) -> bool {
        self.session_id.as_deref() == Some(session_id)
    }

    pub fn status(&self) -> RecordingStatus {
        if self.is_finalized {
            RecordingStatus::Finalized
        } else if self.is_capturing {
            RecordingStatus::Capturing
        } else if self.is_converting {
            RecordingStatus::Converting
        } else if self.failed {
            RecordingStatus::Failed
        } else if self.not_started {
            RecordingStatus::NotStarted
        } else {
            RecordingStatus::Waiting
        }
    }

    pub fn json_path(&self) -> PathBuf {
        self.directory.join(format!("{}.json", self.basename))
    }

    pub fn broken_path(&self) -> PathBuf {
        self.directory.join(format!("{}.json.broken", self.basename))
    }

    pub fn capture_path(&self) -> PathBuf {
        self.directory.join(format!("{}.ts", self.basename))
    }

    pub fn converted_path(&self, container: &str) -> PathBuf {
        self.directory.join(format!("{}.{}", self.basename, container))
    }

    pub fn chat_dump_path(&self) -> PathBuf {
        self.directory.join(format!("{}.chatdump", self.basename))
    }

    pub fn edit_list_path(&self) -> PathBuf {
        self.directory.join(format!("{}-llc-edl.csv", self.basename))
    }

    pub fn segment_path(&self, segment: &SegmentEntity) -> PathBuf {
        self.directory.join(&segment.filename)
    }

    /// Every file that belongs to this recording, whether or not it exists.
    pub fn associated_files(&self) -> Vec<PathBuf> {
        let mut files = vec![
            self.json_path(),
            self.capture_path(),
            self.chat_dump_path(),
            self.edit_list_path(),
        ];
        files.extend(self.segments.iter().map(|s| self.segment_path(s)));
        files
    }

    /// Inserts keeping chapters sorted by `started_at`.
    pub fn add_chapter(&mut self, chapter: ChapterEntity) {
        let index = self
            .chapters
            .partition_point(|existing| existing.started_at <= chapter.started_at);
        self.chapters.insert(index, chapter);
    }

    pub fn calculate_chapters(&mut self) {
        chapters::compute_chapter_geometry(self.started_at, self.ended_at, &mut self.chapters);
    }

    pub fn remove_short_chapters(&mut self, min_duration_secs: i64) -> usize {
        let removed = chapters::remove_short_chapters(&mut self.chapters, min_duration_secs);
        if removed > 0 {
            self.calculate_chapters();
        }
        removed
    }

    pub fn add_segment(&mut self, filename: impl Into<String>) {
        self.segments.push(SegmentEntity::new(filename));
    }

    pub fn recompute_total_size(&mut self) {
        self.total_size = self
            .segments
            .iter()
            .filter(|segment| !segment.deleted)
            .map(|segment| segment.size)
            .sum();
    }

    pub fn duration_from_timestamps(&self) -> Option<i64> {
        self.ended_at
            .map(|ended_at| (ended_at - self.started_at).num_seconds())
    }

    pub fn is_near_day_limit(&self) -> bool {
        self.duration_from_timestamps()
            .map(|duration| duration > DAY_LIMIT_WARNING_SECS)
            .unwrap_or(false)
    }

    pub fn has_favourite_category(&self, favourites: &[String]) -> bool {
        self.chapters.iter().any(|chapter| {
            [chapter.category_id.as_ref(), chapter.category_name.as_ref()]
                .into_iter()
                .flatten()
                .any(|category| favourites.iter().any(|f| f.eq_ignore_ascii_case(category)))
        })
    }

    pub fn is_muted(&self) -> bool {
        self.mute_status == MuteStatus::Muted
    }

    /// The provider deleted its own copy.
    pub fn is_deleted_upstream(&self) -> bool {
        self.provider_vod_exists == Some(false)
    }

    pub fn lossless_cut_csv(&self) -> Option<String> {
        chapters::lossless_cut_edit_list(&self.chapters)
    }

    pub fn finalize(&mut self) -> Result<()> {
        if self.is_capturing || self.is_converting {
            bail!(
                "recording {} cannot be finalized while capturing={} converting={}",
                self.basename,
                self.is_capturing,
                self.is_converting
            );
        }
        self.is_finalized = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::value_objects::recordings::InsertRecordingModel;
    use chrono::{Duration, TimeZone};
    use std::path::Path;

    fn sample_recording() -> RecordingEntity {
        InsertRecordingModel {
            platform: Platform::Twitch,
            channel_id: "1234".to_string(),
            channel_login: "somechannel".to_string(),
            channel_name: "SomeChannel".to_string(),
            session_id: "40001".to_string(),
            started_at: Utc.with_ymd_and_hms(2024, 3, 1, 18, 0, 0).unwrap(),
        }
        .to_entity(Path::new("/vods"))
    }

    fn sample_chapter(started_at: DateTime<Utc>, title: &str) -> ChapterEntity {
        ChapterEntity {
            title: title.to_string(),
            category_id: Some("509658".to_string()),
            category_name: Some("Just Chatting".to_string()),
            started_at,
            offset: None,
            duration: None,
            is_mature: false,
            online: true,
        }
    }

    #[test]
    fn add_chapter_keeps_order() {
        let mut recording = sample_recording();
        let t0 = recording.started_at;

        recording.add_chapter(sample_chapter(t0 + Duration::seconds(30), "c"));
        recording.add_chapter(sample_chapter(t0, "a"));
        recording.add_chapter(sample_chapter(t0 + Duration::seconds(10), "b"));

        let titles: Vec<&str> = recording.chapters.iter().map(|c| c.title.as_str()).collect();
        assert_eq!(titles, vec!["a", "b", "c"]);
    }

    #[test]
    fn finalize_refuses_while_capturing() {
        let mut recording = sample_recording();
        recording.is_capturing = true;

        assert!(recording.finalize().is_err());
        assert!(!recording.is_finalized);

        recording.is_capturing = false;
        recording.finalize().unwrap();
        assert_eq!(recording.status(), RecordingStatus::Finalized);
    }

    #[test]
    fn total_size_ignores_deleted_segments() {
        let mut recording = sample_recording();
        recording.segments = vec![
            SegmentEntity {
                filename: "a.mp4".to_string(),
                size: 100,
                deleted: false,
            },
            SegmentEntity {
                filename: "b.mp4".to_string(),
                size: 50,
                deleted: true,
            },
        ];

        recording.recompute_total_size();

        assert_eq!(recording.total_size, 100);
    }

    #[test]
    fn paths_follow_basename() {
        let recording = sample_recording();

        assert_eq!(
            recording.json_path(),
            Path::new("/vods/somechannel/somechannel_2024-03-01T18_00_00Z_40001.json")
        );
        assert!(
            recording
                .edit_list_path()
                .to_string_lossy()
                .ends_with("_40001-llc-edl.csv")
        );
    }

    #[test]
    fn favourite_matches_category_name_or_id() {
        let mut recording = sample_recording();
        recording.add_chapter(sample_chapter(recording.started_at, "a"));

        assert!(recording.has_favourite_category(&["just chatting".to_string()]));
        assert!(recording.has_favourite_category(&["509658".to_string()]));
        assert!(!recording.has_favourite_category(&["Minecraft".to_string()]));
    }

    #[test]
    fn warns_near_day_limit() {
        let mut recording = sample_recording();
        recording.ended_at = Some(recording.started_at + Duration::hours(23));
        assert!(!recording.is_near_day_limit());

        recording.ended_at = Some(recording.started_at + Duration::seconds(86_000));
        assert!(recording.is_near_day_limit());
    }
}
