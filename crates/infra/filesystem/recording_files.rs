use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use chrono::Utc;
use sha2::{Digest, Sha256};
use std::{
    collections::HashMap,
    io::ErrorKind,
    path::{Path, PathBuf},
};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::domain::{
    entities::recordings::RecordingEntity,
    repositories::recordings::RecordingRepository,
    value_objects::recording_document::{RecordingDocument, parse_recording_document},
};

struct RegistryEntry {
    recording: RecordingEntity,
    /// SHA-256 of the document as we last read or wrote it.
    content_hash: String,
}

/// Recordings stored as `{vod_root}/{login}/{basename}.json`, with an in-memory
/// registry keyed by basename.
pub struct RecordingFileRepository {
    vod_root: PathBuf,
    registry: RwLock<HashMap<String, RegistryEntry>>,
}

impl RecordingFileRepository {
    pub fn new(vod_root: PathBuf) -> Self {
        Self {
            vod_root,
            registry: RwLock::new(HashMap::new()),
        }
    }

    fn document_path(&self, channel_login: &str, basename: &str) -> PathBuf {
        self.vod_root
            .join(channel_login)
            .join(format!("{}.json", basename))
    }

    async fn read_document(path: &Path) -> Result<(RecordingEntity, String)> {
        let raw = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read {}", path.display()))?;
        let content_hash = content_hash(raw.as_bytes());

        let basename = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .ok_or_else(|| anyhow!("invalid recording path {}", path.display()))?;
        let directory = path
            .parent()
            .map(Path::to_path_buf)
            .ok_or_else(|| anyhow!("recording path {} has no parent", path.display()))?;

        let document = parse_recording_document(&raw)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        let mut recording = document.into_entity(basename, directory);
        refresh_segment_sizes(&mut recording).await;

        Ok((recording, content_hash))
    }

    async fn registered(&self, basename: &str) -> Result<RecordingEntity> {
        self.registry
            .read()
            .await
            .get(basename)
            .map(|entry| entry.recording.clone())
            .ok_or_else(|| anyhow!("recording {} is not loaded", basename))
    }

    /// Picks up edits made to the document by someone else since we last touched it.
    async fn reload_if_changed(&self, basename: &str) -> Result<Option<RecordingEntity>> {
        let (path, known_hash) = {
            let registry = self.registry.read().await;
            let Some(entry) = registry.get(basename) else {
                return Ok(None);
            };
            (entry.recording.json_path(), entry.content_hash.clone())
        };

        let raw = match tokio::fs::read(&path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                warn!(basename, path = %path.display(), "recording_files: document vanished from disk");
                return Ok(None);
            }
            Err(err) => return Err(err).context("failed to read recording document"),
        };

        if content_hash(&raw) == known_hash {
            return Ok(None);
        }

        let (recording, content_hash) = Self::read_document(&path).await?;
        info!(basename, "recording_files: document changed on disk; reloaded");
        self.registry.write().await.insert(
            basename.to_string(),
            RegistryEntry {
                recording: recording.clone(),
                content_hash,
            },
        );
        Ok(Some(recording))
    }
}

#[async_trait]
impl RecordingRepository for RecordingFileRepository {
    async fn load_all(&self) -> Result<usize> {
        let mut loaded = HashMap::new();

        let mut channels = match tokio::fs::read_dir(&self.vod_root).await {
            Ok(channels) => channels,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(vod_root = %self.vod_root.display(), "recording_files: vod root does not exist yet");
                return Ok(0);
            }
            Err(err) => return Err(err).context("failed to list vod root"),
        };

        while let Some(channel_dir) = channels.next_entry().await? {
            if !channel_dir.file_type().await?.is_dir() {
                continue;
            }
            let mut files = tokio::fs::read_dir(channel_dir.path()).await?;
            while let Some(file) = files.next_entry().await? {
                let path = file.path();
                if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                    continue;
                }
                match Self::read_document(&path).await {
                    Ok((recording, content_hash)) => {
                        if !recording.is_finalized && !recording.not_started {
                            warn!(basename = %recording.basename, "recording_files: loaded recording is not finalized");
                        }
                        loaded.insert(
                            recording.basename.clone(),
                            RegistryEntry {
                                recording,
                                content_hash,
                            },
                        );
                    }
                    Err(err) => {
                        warn!(path = %path.display(), error = ?err, "recording_files: skipping unreadable document");
                    }
                }
            }
        }

        let count = loaded.len();
        *self.registry.write().await = loaded;
        info!(count, "recording_files: recordings loaded");
        Ok(count)
    }

    async fn document_exists(&self, channel_login: String, basename: String) -> Result<bool> {
        let path = self.document_path(&channel_login, &basename);
        tokio::fs::try_exists(&path)
            .await
            .with_context(|| format!("failed to check {}", path.display()))
    }

    async fn find(&self, basename: String) -> Result<Option<RecordingEntity>> {
        if let Some(reloaded) = self.reload_if_changed(&basename).await? {
            return Ok(Some(reloaded));
        }
        Ok(self
            .registry
            .read()
            .await
            .get(&basename)
            .map(|entry| entry.recording.clone()))
    }

    async fn find_capturing(&self, channel_login: String) -> Result<Option<RecordingEntity>> {
        Ok(self
            .registry
            .read()
            .await
            .values()
            .map(|entry| &entry.recording)
            .find(|recording| recording.channel_login == channel_login && recording.is_capturing)
            .cloned())
    }

    async fn list_by_channel(&self, channel_login: String) -> Result<Vec<RecordingEntity>> {
        let mut recordings: Vec<RecordingEntity> = self
            .registry
            .read()
            .await
            .values()
            .filter(|entry| entry.recording.channel_login == channel_login)
            .map(|entry| entry.recording.clone())
            .collect();
        recordings.sort_by_key(|recording| recording.started_at);
        Ok(recordings)
    }

    async fn list_all(&self) -> Result<Vec<RecordingEntity>> {
        let mut recordings: Vec<RecordingEntity> = self
            .registry
            .read()
            .await
            .values()
            .map(|entry| entry.recording.clone())
            .collect();
        recordings.sort_by_key(|recording| recording.started_at);
        Ok(recordings)
    }

    async fn save(&self, mut recording: RecordingEntity) -> Result<RecordingEntity> {
        tokio::fs::create_dir_all(&recording.directory)
            .await
            .with_context(|| format!("failed to create {}", recording.directory.display()))?;

        recording.saved_at = Some(Utc::now());
        refresh_segment_sizes(&mut recording).await;

        let document = RecordingDocument::from(&recording);
        let raw = serde_json::to_string_pretty(&document)?;

        // Written beside the target and renamed so readers never see half a document.
        let path = recording.json_path();
        let tmp_path = path.with_extension("json.tmp");
        tokio::fs::write(&tmp_path, raw.as_bytes())
            .await
            .with_context(|| format!("failed to write {}", tmp_path.display()))?;
        tokio::fs::rename(&tmp_path, &path)
            .await
            .with_context(|| format!("failed to move {} into place", path.display()))?;

        debug!(basename = %recording.basename, "recording_files: saved");
        self.registry.write().await.insert(
            recording.basename.clone(),
            RegistryEntry {
                recording: recording.clone(),
                content_hash: content_hash(raw.as_bytes()),
            },
        );
        Ok(recording)
    }

    async fn mark_broken(&self, basename: String) -> Result<PathBuf> {
        let recording = self.registered(&basename).await?;
        let broken_path = recording.broken_path();

        tokio::fs::rename(recording.json_path(), &broken_path)
            .await
            .with_context(|| format!("failed to rename {} to .broken", basename))?;
        self.registry.write().await.remove(&basename);

        warn!(basename = %basename, path = %broken_path.display(), "recording_files: recording marked broken");
        Ok(broken_path)
    }

    async fn delete(&self, basename: String) -> Result<()> {
        let recording = self.registered(&basename).await?;

        for path in recording.associated_files() {
            match tokio::fs::remove_file(&path).await {
                Ok(()) => debug!(path = %path.display(), "recording_files: removed file"),
                Err(err) if err.kind() == ErrorKind::NotFound => {}
                Err(err) => {
                    return Err(err).with_context(|| format!("failed to remove {}", path.display()));
                }
            }
        }

        self.registry.write().await.remove(&basename);
        info!(basename = %basename, "recording_files: recording deleted");
        Ok(())
    }

    async fn remove_capture_file(&self, basename: String) -> Result<()> {
        let recording = self.registered(&basename).await?;
        let path = recording.capture_path();
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err).with_context(|| format!("failed to remove {}", path.display())),
        }
    }

    async fn write_edit_list(&self, basename: String, contents: String) -> Result<PathBuf> {
        let recording = self.registered(&basename).await?;
        let path = recording.edit_list_path();
        tokio::fs::write(&path, contents)
            .await
            .with_context(|| format!("failed to write {}", path.display()))?;
        Ok(path)
    }
}

fn content_hash(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

async fn refresh_segment_sizes(recording: &mut RecordingEntity) {
    for segment in recording.segments.iter_mut() {
        let path = recording.directory.join(&segment.filename);
        match tokio::fs::metadata(&path).await {
            Ok(metadata) => {
                segment.size = metadata.len();
                segment.deleted = false;
            }
            Err(_) => {
                segment.size = 0;
                segment.deleted = true;
            }
        }
    }
    recording.recompute_total_size();
}
