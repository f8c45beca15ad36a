use anyhow::{Context, Result};
use crates::domain::{errors::CaptureError, value_objects::notifications::ChannelNotification};
use std::{
    path::{Path, PathBuf},
    sync::Arc,
};
use tracing::{debug, error, info, warn};

use crate::{
    config::config_model::InboxSettings,
    usecases::channel_notifications::ChannelNotificationsUseCase,
};

const REJECTED_DIR: &str = "rejected";

pub async fn run(
    usecase: Arc<ChannelNotificationsUseCase>,
    inbox: InboxSettings,
) -> Result<()> {
    tokio::fs::create_dir_all(inbox.dir.join(REJECTED_DIR))
        .await
        .with_context(|| format!("failed to create inbox {}", inbox.dir.display()))?;
    info!(
        dir = %inbox.dir.display(),
        poll_interval_secs = inbox.poll_interval.as_secs(),
        "notification_inbox: starting worker loop"
    );

    loop {
        match drain_once(&usecase, &inbox.dir).await {
            Ok(0) => {}
            Ok(processed) => info!(processed, "notification_inbox: batch handled"),
            Err(e) => error!(error = ?e, "notification_inbox: failed to read inbox"),
        }
        tokio::time::sleep(inbox.poll_interval).await;
    }
}

/// Handles every pending notification in name order and returns how many were
/// consumed. A notification that failed for any reason other than an unknown
/// channel stays in the inbox and is tried again on the next pass.
pub async fn drain_once(usecase: &ChannelNotificationsUseCase, dir: &Path) -> Result<usize> {
    let mut processed = 0;

    for path in pending_files(dir).await? {
        let raw = match tokio::fs::read(&path).await {
            Ok(raw) => raw,
            Err(err) => {
                warn!(path = %path.display(), error = %err, "notification_inbox: failed to read notification");
                continue;
            }
        };

        let notification: ChannelNotification = match serde_json::from_slice(&raw) {
            Ok(notification) => notification,
            Err(err) => {
                warn!(path = %path.display(), error = %err, "notification_inbox: unparsable notification");
                reject(dir, &path).await;
                continue;
            }
        };

        let channel_login = notification.channel_login.clone();
        let kind = notification.kind;
        match usecase.handle(notification).await {
            Ok(outcome) => {
                debug!(channel_login = %channel_login, kind = ?kind, outcome = ?outcome, "notification_inbox: handled")
            }
            Err(err) if matches!(err.downcast_ref::<CaptureError>(), Some(CaptureError::UnknownChannel { .. })) => {
                warn!(channel_login = %channel_login, kind = ?kind, error = %err, "notification_inbox: dropping notification")
            }
            Err(err) => {
                error!(
                    channel_login = %channel_login,
                    kind = ?kind,
                    path = %path.display(),
                    error = ?err,
                    "notification_inbox: notification failed; keeping it for the next pass"
                );
                continue;
            }
        }
        if let Err(err) = tokio::fs::remove_file(&path).await {
            warn!(path = %path.display(), error = %err, "notification_inbox: failed to remove handled notification");
        }
        processed += 1;
    }

    Ok(processed)
}

async fn pending_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .with_context(|| format!("failed to list {}", dir.display()))?;

    let mut files = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let is_json = path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("json"))
            .unwrap_or(false);
        if is_json && entry.file_type().await?.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

async fn reject(dir: &Path, path: &Path) {
    let Some(file_name) = path.file_name() else {
        return;
    };
    let rejected = dir.join(REJECTED_DIR);
    if let Err(err) = tokio::fs::create_dir_all(&rejected).await {
        error!(dir = %rejected.display(), error = %err, "notification_inbox: failed to create rejected dir");
        return;
    }
    if let Err(err) = tokio::fs::rename(path, rejected.join(file_name)).await {
        error!(path = %path.display(), error = %err, "notification_inbox: failed to move rejected notification");
    }
}
