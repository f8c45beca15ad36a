use serde::{Deserialize, Serialize};
use std::fmt::Display;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum JobStatus {
    Running,
    Stopped,
}

impl JobStatus {
    pub fn is_running(&self) -> bool {
        *self == JobStatus::Running
    }
}

impl Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let status = match self {
            JobStatus::Running => "running",
            JobStatus::Stopped => "stopped",
        };
        write!(f, "{}", status)
    }
}
