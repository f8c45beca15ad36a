use std::path::PathBuf;
use thiserror::Error;

/// Failures of the capture pipeline that callers need to tell apart.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("capture of {basename} produced no output (attempt {attempt})")]
    TransientProcessFailure { basename: String, attempt: u32 },

    #[error("recording {basename} exhausted {attempts} capture attempts and was poisoned")]
    PoisonedRecording { basename: String, attempts: u32 },

    #[error("conversion of {basename} failed: {reason}")]
    ConversionFailure { basename: String, reason: String },

    #[error("fatal configuration error: {0}")]
    FatalConfig(String),

    #[error("channel {channel_login} ({channel_id}) is not configured")]
    UnknownChannel {
        channel_id: String,
        channel_login: String,
    },

    #[error("metadata lookup for {path} failed: {reason}")]
    MetadataFailure { path: PathBuf, reason: String },
}

/// Reasons a persisted job descriptor could not be loaded.
#[derive(Debug, Error)]
pub enum JobLoadError {
    #[error("no job file for {0}")]
    NoFile(String),

    #[error("job file for {0} is empty")]
    NoData(String),

    #[error("job file for {name} is corrupt: {reason}")]
    Corrupt { name: String, reason: String },
}
