use std::fmt::Display;

use crate::domain::{
    entities::recordings::RecordingEntity, value_objects::channel_config::RetentionSettings,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exemption {
    DeletedUpstream,
    FavouriteCategory,
    Muted,
    PreventDeletion,
}

impl Display for Exemption {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let exemption = match self {
            Exemption::DeletedUpstream => "deleted_upstream",
            Exemption::FavouriteCategory => "favourite_category",
            Exemption::Muted => "muted",
            Exemption::PreventDeletion => "prevent_deletion",
        };
        write!(f, "{}", exemption)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvictionReason {
    CountExceeded,
    StorageExceeded,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetentionVerdict {
    WithinQuota { count: usize, total_size: u64 },
    Evict { basename: String, reason: EvictionReason },
    /// The chosen candidate is the one being captured; nothing is deleted.
    Refused { basename: String },
}

pub fn exemption(recording: &RecordingEntity, settings: &RetentionSettings) -> Option<Exemption> {
    if recording.prevent_deletion {
        return Some(Exemption::PreventDeletion);
    }
    if settings.keep_deleted_vods && recording.is_deleted_upstream() {
        return Some(Exemption::DeletedUpstream);
    }
    if settings.keep_favourite_vods && recording.has_favourite_category(&settings.favourite_categories) {
        return Some(Exemption::FavouriteCategory);
    }
    if settings.keep_muted_vods && recording.is_muted() {
        return Some(Exemption::Muted);
    }
    None
}

/// Picks at most one recording of a channel to evict.
///
/// Only finalized, non-exempt recordings count. When there are more than
/// `vods_to_keep + 1` of them, or they take more than the storage quota,
/// the oldest one is chosen.
pub fn select_eviction_candidate(
    recordings: &[RecordingEntity],
    settings: &RetentionSettings,
    capturing_basename: Option<&str>,
) -> RetentionVerdict {
    let mut candidates: Vec<&RecordingEntity> = recordings
        .iter()
        .filter(|recording| recording.is_finalized)
        .filter(|recording| exemption(recording, settings).is_none())
        .collect();
    candidates.sort_by_key(|recording| recording.started_at);

    let count = candidates.len();
    let total_size: u64 = candidates.iter().map(|recording| recording.total_size).sum();

    let reason = if count > settings.vods_to_keep as usize + 1 {
        EvictionReason::CountExceeded
    } else if total_size > settings.storage_quota_bytes() {
        EvictionReason::StorageExceeded
    } else {
        return RetentionVerdict::WithinQuota { count, total_size };
    };

    let Some(oldest) = candidates.first() else {
        return RetentionVerdict::WithinQuota { count, total_size };
    };

    if oldest.is_capturing || capturing_basename == Some(oldest.basename.as_str()) {
        return RetentionVerdict::Refused {
            basename: oldest.basename.clone(),
        };
    }

    RetentionVerdict::Evict {
        basename: oldest.basename.clone(),
        reason,
    }
}
