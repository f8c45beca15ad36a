use serde::{Deserialize, Serialize};
use std::fmt::Display;

/// Whether the provider's copy of a recording had audio muted.
#[derive(Default, Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MuteStatus {
    #[default]
    Unknown,
    Muted,
    Unmuted,
}

impl Display for MuteStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let status = match self {
            MuteStatus::Unknown => "unknown",
            MuteStatus::Muted => "muted",
            MuteStatus::Unmuted => "unmuted",
        };
        write!(f, "{}", status)
    }
}
