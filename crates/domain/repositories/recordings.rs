use anyhow::Result;
use async_trait::async_trait;
use mockall::automock;
use std::path::PathBuf;

use crate::domain::entities::recordings::RecordingEntity;

#[async_trait]
#[automock]
pub trait RecordingRepository {
    /// Scans the vod root and fills the registry. Returns how many recordings were loaded.
    async fn load_all(&self) -> Result<usize>;

    async fn document_exists(&self, channel_login: String, basename: String) -> Result<bool>;

    async fn find(&self, basename: String) -> Result<Option<RecordingEntity>>;

    async fn find_capturing(&self, channel_login: String) -> Result<Option<RecordingEntity>>;

    async fn list_by_channel(&self, channel_login: String) -> Result<Vec<RecordingEntity>>;

    async fn list_all(&self) -> Result<Vec<RecordingEntity>>;

    /// Refreshes segment sizes, stamps `saved_at` and rewrites the whole document.
    async fn save(&self, recording: RecordingEntity) -> Result<RecordingEntity>;

    /// Renames the document to `.json.broken` and drops it from the registry.
    async fn mark_broken(&self, basename: String) -> Result<PathBuf>;

    /// Removes the document and every associated media file.
    async fn delete(&self, basename: String) -> Result<()>;

    async fn remove_capture_file(&self, basename: String) -> Result<()>;

    async fn write_edit_list(&self, basename: String, contents: String) -> Result<PathBuf>;
}
