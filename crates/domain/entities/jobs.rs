use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Persisted reference to one external process, `{pids_dir}/{name}.json`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobEntity {
    pub name: String,
    pub pid: u32,
    #[serde(default)]
    pub metadata: Value,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub bin: Option<String>,
    #[serde(default)]
    pub args: Vec<String>,
}
