use anyhow::Result;
use async_trait::async_trait;
use mockall::automock;
use std::path::PathBuf;

#[async_trait]
#[automock]
pub trait MediaProbe {
    /// `None` when the file does not exist.
    async fn file_size(&self, path: PathBuf) -> Result<Option<u64>>;

    async fn read_duration_seconds(&self, path: PathBuf) -> Result<i64>;
}
