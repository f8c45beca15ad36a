use anyhow::{Context, Result};
use crates::domain::value_objects::lifecycle_events::LifecycleEvent;
use std::path::{Path, PathBuf};
use tokio::{
    fs::{File, OpenOptions},
    io::AsyncWriteExt,
    sync::broadcast::{Receiver, error::RecvError},
};
use tracing::{debug, error, info, warn};

/// Appends every lifecycle event to a JSON-lines file until the bus closes.
/// A failed append is logged and the event is skipped.
pub async fn run(mut events: Receiver<LifecycleEvent>, path: PathBuf) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let mut journal = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .await
        .with_context(|| format!("failed to open {}", path.display()))?;
    info!(path = %path.display(), "event_journal: started");

    loop {
        match events.recv().await {
            Ok(event) => match append(&mut journal, &path, &event).await {
                Ok(()) => {
                    debug!(action = event.action(), channel_login = %event.channel_login(), "event_journal: appended")
                }
                Err(err) => {
                    error!(action = event.action(), error = ?err, "event_journal: failed to append event")
                }
            },
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "event_journal: fell behind; events were dropped");
            }
            Err(RecvError::Closed) => {
                info!("event_journal: event bus closed");
                return Ok(());
            }
        }
    }
}

async fn append(journal: &mut File, path: &Path, event: &LifecycleEvent) -> Result<()> {
    let mut line = serde_json::to_vec(event)?;
    line.push(b'\n');
    journal
        .write_all(&line)
        .await
        .with_context(|| format!("failed to append to {}", path.display()))?;
    journal
        .flush()
        .await
        .with_context(|| format!("failed to flush {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crates::{
        domain::repositories::event_publisher::EventPublisher,
        infra::events::broadcast_bus::BroadcastEventBus,
    };

    #[tokio::test]
    async fn appends_one_json_line_per_event() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("outbox/events.jsonl");
        let bus = BroadcastEventBus::new(16);
        let journal = tokio::spawn(run(bus.subscribe(), path.clone()));

        bus.publish(LifecycleEvent::StartDownload {
            basename: "somechannel_2024-03-01T18_04_05Z_40001".to_string(),
            channel_login: "somechannel".to_string(),
        })
        .await
        .unwrap();
        bus.publish(LifecycleEvent::VodRemoved {
            basename: "somechannel_2024-02-01T18_04_05Z_30001".to_string(),
            channel_login: "somechannel".to_string(),
        })
        .await
        .unwrap();
        drop(bus);

        journal.await.unwrap().unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<serde_json::Value> = contents
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["action"], "start_download");
        assert_eq!(lines[1]["action"], "vod_removed");
        assert_eq!(lines[1]["channel_login"], "somechannel");
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn write_failures_do_not_stop_the_journal() {
        let bus = BroadcastEventBus::new(16);
        let journal = tokio::spawn(run(bus.subscribe(), PathBuf::from("/dev/full")));

        for session in ["40001", "40002"] {
            bus.publish(LifecycleEvent::StartDownload {
                basename: format!("somechannel_2024-03-01T18_04_05Z_{}", session),
                channel_login: "somechannel".to_string(),
            })
            .await
            .unwrap();
        }
        drop(bus);

        assert!(journal.await.unwrap().is_ok());
    }
}
