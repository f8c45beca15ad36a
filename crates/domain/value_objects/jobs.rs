use serde_json::Value;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq)]
pub struct SpawnJobModel {
    pub name: String,
    pub bin: PathBuf,
    pub args: Vec<String>,
    pub metadata: Value,
}

/// How a supervised process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobExit {
    pub code: Option<i32>,
    pub killed: bool,
}

impl JobExit {
    pub fn success(&self) -> bool {
        !self.killed && self.code == Some(0)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub scanned: usize,
    pub cleared: Vec<String>,
    pub running: Vec<String>,
    pub unreadable: Vec<String>,
}
