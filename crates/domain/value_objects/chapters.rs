use chrono::{DateTime, Utc};
use tracing::warn;

use crate::domain::entities::recordings::ChapterEntity;

/// Derives `offset` and `duration` (seconds) of every chapter.
///
/// A chapter ends where the next one starts, the last one ends at `ended_at`.
/// Chapters that predate the recording are clamped to offset 0 and only count
/// the time that was actually captured. Without an end the duration stays unset.
pub fn compute_chapter_geometry(
    started_at: DateTime<Utc>,
    ended_at: Option<DateTime<Utc>>,
    chapters: &mut [ChapterEntity],
) {
    let next_starts: Vec<Option<DateTime<Utc>>> = (0..chapters.len())
        .map(|i| chapters.get(i + 1).map(|next| next.started_at))
        .collect();

    for (chapter, next_start) in chapters.iter_mut().zip(next_starts) {
        let chapter_end = next_start.or(ended_at);

        let (offset, begin) = if started_at > chapter.started_at {
            (0, started_at)
        } else {
            ((chapter.started_at - started_at).num_seconds(), chapter.started_at)
        };

        chapter.offset = Some(offset);
        chapter.duration = match chapter_end {
            Some(end) => Some((end - begin).num_seconds().max(0)),
            None => {
                warn!(
                    title = %chapter.title,
                    "chapters: no next chapter and no end time; duration unknown"
                );
                None
            }
        };
    }
}

/// Drops chapters shorter than `min_duration_secs`; 0 disables the filter.
/// Chapters with unknown duration are kept. Returns how many were removed.
pub fn remove_short_chapters(chapters: &mut Vec<ChapterEntity>, min_duration_secs: i64) -> usize {
    if min_duration_secs <= 0 {
        return 0;
    }
    let before = chapters.len();
    chapters.retain(|chapter| {
        chapter
            .duration
            .map(|duration| duration >= min_duration_secs)
            .unwrap_or(true)
    });
    before - chapters.len()
}

/// LosslessCut edit list: `start,end,"label"` per chapter, relative to the first chapter.
/// The last chapter has an open end. `None` when there is nothing to cut.
pub fn lossless_cut_edit_list(chapters: &[ChapterEntity]) -> Option<String> {
    if chapters.is_empty() {
        return None;
    }
    let first_offset = chapters[0].offset.unwrap_or(0);
    let last = chapters.len() - 1;

    let mut data = String::new();
    for (i, chapter) in chapters.iter().enumerate() {
        let Some(offset) = chapter.offset else {
            continue;
        };
        let start = offset - first_offset;

        data.push_str(&format!("{},", start));
        if i < last {
            data.push_str(&format!("{},", start + chapter.duration.unwrap_or(0)));
        } else {
            data.push(',');
        }

        let label = chapter.label().replace('"', "\\\"");
        data.push_str(&format!("\"{}\"\n", label));
    }
    Some(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 18, 0, 0).unwrap()
    }

    fn sample_chapter(started_at: DateTime<Utc>, title: &str) -> ChapterEntity {
        ChapterEntity {
            title: title.to_string(),
            category_id: None,
            category_name: Some("Game".to_string()),
            started_at,
            offset: None,
            duration: None,
            is_mature: false,
            online: true,
        }
    }

    #[test]
    fn computes_offsets_and_durations() {
        let mut chapters = vec![
            sample_chapter(t0(), "a"),
            sample_chapter(t0() + Duration::seconds(10), "b"),
            sample_chapter(t0() + Duration::seconds(30), "c"),
        ];

        compute_chapter_geometry(t0(), Some(t0() + Duration::seconds(60)), &mut chapters);

        let offsets: Vec<i64> = chapters.iter().map(|c| c.offset.unwrap()).collect();
        let durations: Vec<i64> = chapters.iter().map(|c| c.duration.unwrap()).collect();
        assert_eq!(offsets, vec![0, 10, 30]);
        assert_eq!(durations, vec![10, 20, 30]);
    }

    #[test]
    fn chapter_before_start_gets_zero_offset() {
        let mut chapters = vec![
            sample_chapter(t0() - Duration::seconds(300), "pre"),
            sample_chapter(t0() + Duration::seconds(20), "b"),
        ];

        compute_chapter_geometry(t0(), Some(t0() + Duration::seconds(50)), &mut chapters);

        assert_eq!(chapters[0].offset, Some(0));
        assert_eq!(chapters[0].duration, Some(20));
        assert_eq!(chapters[1].offset, Some(20));
        assert_eq!(chapters[1].duration, Some(30));
    }

    #[test]
    fn open_ended_last_chapter_has_no_duration() {
        let mut chapters = vec![
            sample_chapter(t0(), "a"),
            sample_chapter(t0() + Duration::seconds(10), "b"),
        ];

        compute_chapter_geometry(t0(), None, &mut chapters);

        assert_eq!(chapters[0].duration, Some(10));
        assert_eq!(chapters[1].duration, None);
    }

    #[test]
    fn removes_only_short_chapters() {
        let mut chapters = vec![
            sample_chapter(t0(), "a"),
            sample_chapter(t0() + Duration::seconds(5), "b"),
            sample_chapter(t0() + Duration::seconds(15), "c"),
        ];
        compute_chapter_geometry(t0(), None, &mut chapters);

        assert_eq!(remove_short_chapters(&mut chapters, 0), 0);
        assert_eq!(remove_short_chapters(&mut chapters, 60), 2);
        assert_eq!(chapters.len(), 1);
        assert_eq!(chapters[0].title, "c");
    }

    #[test]
    fn writes_edit_list() {
        let mut chapters = vec![
            sample_chapter(t0(), "first \"run\""),
            sample_chapter(t0() + Duration::seconds(10), "second"),
        ];
        compute_chapter_geometry(t0(), Some(t0() + Duration::seconds(25)), &mut chapters);

        let csv = lossless_cut_edit_list(&chapters).unwrap();

        assert_eq!(
            csv,
            "0,10,\"Game (first \\\"run\\\")\"\n10,,\"Game (second)\"\n"
        );
        assert!(lossless_cut_edit_list(&[]).is_none());
    }
}
