use serde::{Deserialize, Serialize};
use std::fmt::Display;

/// States of the download pipeline, in the order a healthy run visits them.
#[derive(Default, Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum PipelineState {
    #[default]
    NotStarted,
    Capturing,
    CaptureOk,
    CaptureFailed,
    Converting,
    Converted,
    ConvertFailed,
    Finalized,
}

impl PipelineState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PipelineState::CaptureFailed | PipelineState::ConvertFailed | PipelineState::Finalized
        )
    }
}

impl Display for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match self {
            PipelineState::NotStarted => "NOT_STARTED",
            PipelineState::Capturing => "CAPTURING",
            PipelineState::CaptureOk => "CAPTURE_OK",
            PipelineState::CaptureFailed => "CAPTURE_FAILED",
            PipelineState::Converting => "CONVERTING",
            PipelineState::Converted => "CONVERTED",
            PipelineState::ConvertFailed => "CONVERT_FAILED",
            PipelineState::Finalized => "FINALIZED",
        };
        write!(f, "{}", state)
    }
}
