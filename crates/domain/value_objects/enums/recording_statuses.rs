use serde::{Deserialize, Serialize};
use std::fmt::Display;

/// Coarse status derived from a recording's state flags.
#[derive(Default, Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum RecordingStatus {
    #[default]
    NotStarted,
    Capturing,
    Converting,
    Waiting,
    Finalized,
    Failed,
}

impl Display for RecordingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let status = match self {
            RecordingStatus::NotStarted => "not_started",
            RecordingStatus::Capturing => "capturing",
            RecordingStatus::Converting => "converting",
            RecordingStatus::Waiting => "waiting",
            RecordingStatus::Finalized => "finalized",
            RecordingStatus::Failed => "failed",
        };
        write!(f, "{}", status)
    }
}
