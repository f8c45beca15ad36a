use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use crates::{
    domain::{
        entities::recordings::{ChapterEntity, RecordingEntity},
        errors::CaptureError,
        repositories::{
            event_publisher::EventPublisher, recordings::RecordingRepository,
            subscription_gateway::SubscriptionGateway,
        },
        value_objects::{
            channel_config::{ChannelConfig, ChannelDirectory},
            lifecycle_events::LifecycleEvent,
            notifications::{ChannelNotification, NotificationKind, NotificationOutcome},
            recordings::InsertRecordingModel,
        },
    },
    infra::events::debouncer::KeyedDebouncer,
};
use std::{
    collections::HashMap,
    path::PathBuf,
    sync::{Arc, Mutex},
};
use tracing::{error, info, warn};

use crate::usecases::capture_pipeline::CapturePipelineUseCase;

#[derive(Debug, Clone, Default)]
struct ChannelRuntime {
    /// Category seen while no capture was running; becomes the first chapter.
    pending_chapter: Option<ChapterEntity>,
    last_online: Option<DateTime<Utc>>,
    last_offline: Option<DateTime<Utc>>,
}

pub struct ChannelNotificationsUseCase {
    channels: Arc<ChannelDirectory>,
    recordings: Arc<dyn RecordingRepository + Send + Sync>,
    subscriptions: Arc<dyn SubscriptionGateway + Send + Sync>,
    events: Arc<dyn EventPublisher + Send + Sync>,
    pipeline: Arc<CapturePipelineUseCase>,
    debouncer: KeyedDebouncer,
    vod_root: PathBuf,
    runtime: Mutex<HashMap<String, ChannelRuntime>>,
    /// Pipelines launched by this instance, basename -> channel login.
    in_flight: Arc<Mutex<HashMap<String, String>>>,
}

impl ChannelNotificationsUseCase {
    pub fn new(
        channels: Arc<ChannelDirectory>,
        recordings: Arc<dyn RecordingRepository + Send + Sync>,
        subscriptions: Arc<dyn SubscriptionGateway + Send + Sync>,
        events: Arc<dyn EventPublisher + Send + Sync>,
        pipeline: Arc<CapturePipelineUseCase>,
        debouncer: KeyedDebouncer,
        vod_root: PathBuf,
    ) -> Self {
        Self {
            channels,
            recordings,
            subscriptions,
            events,
            pipeline,
            debouncer,
            vod_root,
            runtime: Mutex::new(HashMap::new()),
            in_flight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub async fn handle(&self, notification: ChannelNotification) -> Result<NotificationOutcome> {
        let Some(channel) = self.channels.find(&notification.channel_id).cloned() else {
            return Err(self.reject_unknown_channel(&notification).await.into());
        };

        match notification.kind {
            NotificationKind::Update => self.handle_update(notification, &channel).await,
            NotificationKind::Online => self.handle_online(notification, &channel).await,
            NotificationKind::Offline => self.handle_offline(notification, &channel).await,
        }
    }

    async fn reject_unknown_channel(&self, notification: &ChannelNotification) -> CaptureError {
        warn!(
            channel_id = %notification.channel_id,
            channel_login = %notification.channel_login,
            kind = ?notification.kind,
            "channel_notifications: notification for unknown channel"
        );
        if let Err(err) = self
            .subscriptions
            .request_unsubscribe(
                notification.channel_id.clone(),
                notification.channel_login.clone(),
                "channel is not configured".to_string(),
            )
            .await
        {
            error!(
                channel_id = %notification.channel_id,
                error = ?err,
                "channel_notifications: failed to request unsubscribe"
            );
        }

        CaptureError::UnknownChannel {
            channel_id: notification.channel_id.clone(),
            channel_login: notification.channel_login.clone(),
        }
    }

    async fn handle_update(
        &self,
        notification: ChannelNotification,
        channel: &ChannelConfig,
    ) -> Result<NotificationOutcome> {
        let now = Utc::now();
        let chapter = ChapterEntity {
            title: notification.title.clone().unwrap_or_default(),
            category_id: notification.category_id.clone(),
            category_name: notification.category_name.clone(),
            started_at: now,
            offset: None,
            duration: None,
            is_mature: notification.is_mature.unwrap_or(false),
            online: false,
        };

        self.schedule_channel_updated(channel, &notification, now);

        let Some(mut recording) = self.recordings.find_capturing(channel.login.clone()).await?
        else {
            info!(
                channel_login = %channel.login,
                chapter = %chapter.label(),
                "channel_notifications: not capturing; keeping chapter for the next stream"
            );
            self.with_runtime(&channel.login, |runtime| {
                runtime.pending_chapter = Some(chapter);
            });
            return Ok(NotificationOutcome::ChapterCached);
        };

        let chapter = ChapterEntity {
            online: true,
            ..chapter
        };
        recording.add_chapter(chapter.clone());
        let recording = self.recordings.save(recording).await?;
        info!(
            basename = %recording.basename,
            chapter = %chapter.label(),
            chapters = recording.chapters.len(),
            "channel_notifications: chapter added"
        );

        let event = LifecycleEvent::ChapterUpdate {
            basename: recording.basename.clone(),
            channel_login: channel.login.clone(),
            chapter,
        };
        if let Err(err) = self.events.publish(event).await {
            warn!(basename = %recording.basename, error = ?err, "channel_notifications: failed to publish chapter_update");
        }

        Ok(NotificationOutcome::ChapterAdded {
            basename: recording.basename,
        })
    }

    async fn handle_online(
        &self,
        notification: ChannelNotification,
        channel: &ChannelConfig,
    ) -> Result<NotificationOutcome> {
        let now = Utc::now();
        let (pending_chapter, offline_since) = self.with_runtime(&channel.login, |runtime| {
            runtime.last_online = Some(now);
            (runtime.pending_chapter.clone(), runtime.last_offline.take())
        });
        if let Some(offline_since) = offline_since {
            info!(
                channel_login = %channel.login,
                offline_secs = (now - offline_since).num_seconds(),
                "channel_notifications: channel back online"
            );
        }

        if channel.no_capture {
            info!(channel_login = %channel.login, "channel_notifications: capture disabled for channel");
            return Ok(NotificationOutcome::CaptureSkipped {
                reason: "no_capture".to_string(),
            });
        }

        let title = pending_chapter
            .as_ref()
            .map(|chapter| chapter.title.as_str())
            .or(notification.title.as_deref());
        if !channel.title_matches(title) {
            info!(
                channel_login = %channel.login,
                title = ?title,
                keywords = ?channel.match_keywords,
                "channel_notifications: title does not match keywords; skipping"
            );
            return Ok(NotificationOutcome::CaptureSkipped {
                reason: "title does not match keywords".to_string(),
            });
        }

        let session_id = notification
            .session_id
            .clone()
            .filter(|session_id| !session_id.trim().is_empty())
            .context("stream-started notification has no session id")?;
        let model = InsertRecordingModel {
            platform: channel.platform,
            channel_id: notification.channel_id.clone(),
            channel_login: channel.login.clone(),
            channel_name: channel
                .display_name
                .clone()
                .unwrap_or_else(|| notification.channel_name.clone()),
            session_id: session_id.clone(),
            started_at: notification.started_at.unwrap_or(now),
        };
        let basename = model.basename();

        if let Some(existing) = self
            .find_duplicate(&channel.login, &basename, &session_id)
            .await?
        {
            info!(
                basename = %existing,
                incoming = %basename,
                "channel_notifications: duplicate stream-started notification; ignoring"
            );
            return Ok(NotificationOutcome::Duplicate { basename: existing });
        }

        if let Err(err) = self.pipeline.check_binaries() {
            error!(
                channel_login = %channel.login,
                error = %err,
                "channel_notifications: cannot capture; required tool is missing"
            );
            return Err(err);
        }

        let mut recording = model.to_entity(&self.vod_root);
        match self.with_runtime(&channel.login, |runtime| runtime.pending_chapter.take()) {
            Some(chapter) => recording.add_chapter(ChapterEntity {
                online: true,
                ..chapter
            }),
            None if notification.category_name.is_some() || notification.title.is_some() => {
                recording.add_chapter(ChapterEntity {
                    title: notification.title.clone().unwrap_or_default(),
                    category_id: notification.category_id.clone(),
                    category_name: notification.category_name.clone(),
                    started_at: recording.started_at,
                    offset: None,
                    duration: None,
                    is_mature: notification.is_mature.unwrap_or(false),
                    online: true,
                })
            }
            None => {}
        }

        info!(
            basename = %basename,
            channel_login = %channel.login,
            chapters = recording.chapters.len(),
            "channel_notifications: stream started; launching download pipeline"
        );
        self.launch_pipeline(recording, channel.clone());

        Ok(NotificationOutcome::CaptureStarted { basename })
    }

    async fn handle_offline(
        &self,
        _notification: ChannelNotification,
        channel: &ChannelConfig,
    ) -> Result<NotificationOutcome> {
        let now = Utc::now();
        let online_since = self.with_runtime(&channel.login, |runtime| {
            runtime.last_offline = Some(now);
            runtime.last_online
        });
        let online_secs = online_since.map(|since| (now - since).num_seconds());

        match self.recordings.find_capturing(channel.login.clone()).await? {
            Some(recording) => info!(
                basename = %recording.basename,
                online_secs = ?online_secs,
                "channel_notifications: stream ended; capture finishes when the capture tool exits"
            ),
            None => info!(
                channel_login = %channel.login,
                online_secs = ?online_secs,
                "channel_notifications: stream ended"
            ),
        }

        Ok(NotificationOutcome::OfflineRecorded)
    }

    /// Basename of the recording that already covers this stream, if any.
    async fn find_duplicate(
        &self,
        channel_login: &str,
        basename: &str,
        session_id: &str,
    ) -> Result<Option<String>> {
        let launched: Vec<String> = self
            .in_flight
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|(_, login)| login.as_str() == channel_login)
            .map(|(basename, _)| basename.clone())
            .collect();

        if launched.iter().any(|launched| launched == basename)
            || self
                .recordings
                .document_exists(channel_login.to_string(), basename.to_string())
                .await?
        {
            return Ok(Some(basename.to_string()));
        }

        if let Some(capturing) = self
            .recordings
            .find_capturing(channel_login.to_string())
            .await?
        {
            return Ok(Some(capturing.basename));
        }

        // A launched pipeline counts until its recording is past the capture step.
        for launched in launched {
            match self.recordings.find(launched.clone()).await? {
                Some(recording) if !recording.not_started && !recording.is_capturing => {}
                _ => return Ok(Some(launched)),
            }
        }

        let same_session = self
            .recordings
            .list_by_channel(channel_login.to_string())
            .await?
            .into_iter()
            .find(|recording| recording.is_session(session_id));
        Ok(same_session.map(|recording| recording.basename))
    }

    fn launch_pipeline(&self, recording: RecordingEntity, channel: ChannelConfig) {
        let basename = recording.basename.clone();
        self.in_flight
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(basename.clone(), channel.login.clone());

        let pipeline = Arc::clone(&self.pipeline);
        let in_flight = Arc::clone(&self.in_flight);
        tokio::spawn(async move {
            match pipeline.run(recording, channel).await {
                Ok(state) => info!(basename = %basename, state = %state, "channel_notifications: pipeline finished"),
                Err(err) => error!(basename = %basename, error = ?err, "channel_notifications: pipeline aborted"),
            }
            in_flight
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .remove(&basename);
        });
    }

    fn schedule_channel_updated(
        &self,
        channel: &ChannelConfig,
        notification: &ChannelNotification,
        updated_at: DateTime<Utc>,
    ) {
        let events = Arc::clone(&self.events);
        let event = LifecycleEvent::ChannelUpdated {
            channel_login: channel.login.clone(),
            category_name: notification.category_name.clone(),
            title: notification.title.clone(),
            updated_at,
        };
        self.debouncer.schedule(&channel.login, async move {
            if let Err(err) = events.publish(event).await {
                warn!(error = ?err, "channel_notifications: failed to publish channel_updated");
            }
        });
    }

    fn with_runtime<T>(&self, channel_login: &str, f: impl FnOnce(&mut ChannelRuntime) -> T) -> T {
        let mut runtime = self.runtime.lock().unwrap_or_else(|e| e.into_inner());
        f(runtime.entry(channel_login.to_string()).or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::config_model::{Binaries, CaptureSettings},
        usecases::retention_cleanup::RetentionCleanupUseCase,
    };
    use chrono::TimeZone;
    use crates::domain::{
        entities::jobs::JobEntity,
        errors::JobLoadError,
        repositories::{
            event_publisher::MockEventPublisher, job_supervisor::MockJobSupervisor,
            media_probe::MockMediaProbe, recordings::MockRecordingRepository,
            subscription_gateway::MockSubscriptionGateway,
        },
        value_objects::{
            basename::capture_job_name, channel_config::RetentionSettings,
            enums::platforms::Platform,
            jobs::{JobExit, SpawnJobModel},
        },
    };
    use mockall::predicate::eq;
    use std::{path::Path, time::Duration};
    use tokio::sync::oneshot;

    fn sample_channel() -> ChannelConfig {
        ChannelConfig {
            platform: Platform::Twitch,
            login: "somechannel".to_string(),
            internal_id: "1234".to_string(),
            display_name: Some("SomeChannel".to_string()),
            quality: vec!["1080p60".to_string()],
            no_capture: false,
            live_chat: false,
            no_cleanup: false,
            max_vods: 0,
            max_storage_gb: 0,
            match_keywords: Vec::new(),
        }
    }

    fn sample_notification(kind: NotificationKind) -> ChannelNotification {
        ChannelNotification {
            kind,
            platform: Platform::Twitch,
            channel_id: "1234".to_string(),
            channel_login: "somechannel".to_string(),
            channel_name: "SomeChannel".to_string(),
            session_id: Some("40001".to_string()),
            started_at: Some(Utc.with_ymd_and_hms(2024, 3, 1, 18, 4, 5).unwrap()),
            category_id: None,
            category_name: None,
            title: None,
            is_mature: None,
        }
    }

    fn sample_update(category: &str, title: &str) -> ChannelNotification {
        ChannelNotification {
            session_id: None,
            started_at: None,
            category_id: Some("509658".to_string()),
            category_name: Some(category.to_string()),
            title: Some(title.to_string()),
            ..sample_notification(NotificationKind::Update)
        }
    }

    fn fake_binaries(dir: &Path) -> Binaries {
        let streamlink = dir.join("streamlink");
        let ffmpeg = dir.join("ffmpeg");
        std::fs::write(&streamlink, b"#!/bin/sh\n").unwrap();
        std::fs::write(&ffmpeg, b"#!/bin/sh\n").unwrap();
        Binaries {
            streamlink: Some(streamlink.to_string_lossy().into_owned()),
            ffmpeg: Some(ffmpeg.to_string_lossy().into_owned()),
            chat_dumper: None,
        }
    }

    struct Harness {
        recordings: Arc<MockRecordingRepository>,
        jobs: MockJobSupervisor,
        events: MockEventPublisher,
        subscriptions: MockSubscriptionGateway,
        channels: Vec<ChannelConfig>,
        binaries: Binaries,
    }

    impl Harness {
        fn new(recordings: MockRecordingRepository, binaries: Binaries) -> Self {
            Self {
                recordings: Arc::new(recordings),
                jobs: MockJobSupervisor::new(),
                events: MockEventPublisher::new(),
                subscriptions: MockSubscriptionGateway::new(),
                channels: vec![sample_channel()],
                binaries,
            }
        }

        fn build(self) -> ChannelNotificationsUseCase {
            let recordings: Arc<dyn RecordingRepository + Send + Sync> = self.recordings;
            let events: Arc<dyn EventPublisher + Send + Sync> = Arc::new(self.events);
            let retention = Arc::new(RetentionCleanupUseCase::new(
                Arc::clone(&recordings),
                Arc::clone(&events),
                RetentionSettings::default(),
            ));
            let pipeline = Arc::new(CapturePipelineUseCase::new(
                Arc::clone(&recordings),
                Arc::new(self.jobs),
                Arc::new(MockMediaProbe::new()),
                Arc::clone(&events),
                retention,
                CaptureSettings::default(),
                self.binaries,
            ));

            ChannelNotificationsUseCase::new(
                Arc::new(ChannelDirectory::new(self.channels)),
                recordings,
                Arc::new(self.subscriptions),
                events,
                pipeline,
                KeyedDebouncer::new(Duration::from_secs(60)),
                PathBuf::from("/vods"),
            )
        }
    }

    #[tokio::test]
    async fn unknown_channel_requests_unsubscribe_and_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mut harness = Harness::new(MockRecordingRepository::new(), fake_binaries(dir.path()));
        harness
            .subscriptions
            .expect_request_unsubscribe()
            .with(
                eq("9999".to_string()),
                eq("stranger".to_string()),
                eq("channel is not configured".to_string()),
            )
            .times(1)
            .returning(|_, _, _| Box::pin(async move { Ok(()) }));
        let usecase = harness.build();

        let notification = ChannelNotification {
            channel_id: "9999".to_string(),
            channel_login: "stranger".to_string(),
            ..sample_notification(NotificationKind::Online)
        };
        let err = usecase.handle(notification).await.unwrap_err();

        assert!(matches!(
            err.downcast_ref::<CaptureError>(),
            Some(CaptureError::UnknownChannel { .. })
        ));
    }

    #[tokio::test]
    async fn duplicate_online_notification_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let basename = "somechannel_2024-03-01T18_04_05Z_40001".to_string();
        let mut existing = InsertRecordingModel {
            platform: Platform::Twitch,
            channel_id: "1234".to_string(),
            channel_login: "somechannel".to_string(),
            channel_name: "SomeChannel".to_string(),
            session_id: "40001".to_string(),
            started_at: Utc.with_ymd_and_hms(2024, 3, 1, 18, 4, 5).unwrap(),
        }
        .to_entity(Path::new("/vods"));
        existing.is_finalized = true;

        let mut recordings = MockRecordingRepository::new();
        recordings
            .expect_document_exists()
            .with(eq("somechannel".to_string()), eq(basename.clone()))
            .returning(|_, _| Box::pin(async move { Ok(true) }));
        recordings.expect_find().returning(move |_| {
            let existing = existing.clone();
            Box::pin(async move { Ok(Some(existing)) })
        });
        recordings.expect_save().times(0);
        let mut harness = Harness::new(recordings, fake_binaries(dir.path()));
        harness.jobs.expect_spawn().times(0);
        let usecase = harness.build();

        let outcome = usecase
            .handle(sample_notification(NotificationKind::Online))
            .await
            .unwrap();

        assert_eq!(outcome, NotificationOutcome::Duplicate { basename });
    }

    #[tokio::test]
    async fn online_creates_one_capturing_recording_and_one_capture_job() {
        let dir = tempfile::tempdir().unwrap();
        let basename = "somechannel_2024-03-01T18_04_05Z_40001".to_string();
        let saved: Arc<Mutex<Vec<RecordingEntity>>> = Arc::new(Mutex::new(Vec::new()));

        let mut recordings = MockRecordingRepository::new();
        recordings
            .expect_find_capturing()
            .returning(|_| Box::pin(async move { Ok(None) }));
        recordings
            .expect_document_exists()
            .returning(|_, _| Box::pin(async move { Ok(false) }));
        recordings
            .expect_list_by_channel()
            .returning(|_| Box::pin(async move { Ok(Vec::new()) }));
        let saved_by_mock = Arc::clone(&saved);
        recordings.expect_save().returning(move |recording| {
            saved_by_mock.lock().unwrap().push(recording.clone());
            Box::pin(async move { Ok(recording) })
        });

        let mut harness = Harness::new(recordings, fake_binaries(dir.path()));
        harness
            .jobs
            .expect_load()
            .with(eq(capture_job_name(&basename)))
            .returning(|name| Box::pin(async move { Err(JobLoadError::NoFile(name)) }));
        let (spawned_tx, spawned_rx) = oneshot::channel::<SpawnJobModel>();
        let spawned_tx = Mutex::new(Some(spawned_tx));
        harness
            .jobs
            .expect_spawn()
            .times(1)
            .returning(move |request: SpawnJobModel| {
                if let Some(tx) = spawned_tx.lock().unwrap().take() {
                    let _ = tx.send(request.clone());
                }
                let job = JobEntity {
                    name: request.name,
                    pid: 4242,
                    metadata: request.metadata,
                    started_at: Utc::now(),
                    bin: Some(request.bin.to_string_lossy().into_owned()),
                    args: request.args,
                };
                Box::pin(async move { Ok(job) })
            });
        harness
            .jobs
            .expect_wait()
            .returning(|_| Box::pin(std::future::pending::<anyhow::Result<JobExit>>()));
        harness
            .events
            .expect_publish()
            .returning(|_| Box::pin(async move { Ok(()) }));
        let usecase = harness.build();

        let cached = usecase
            .handle(sample_update("Speedrunning", "any% attempts"))
            .await
            .unwrap();
        assert_eq!(cached, NotificationOutcome::ChapterCached);

        let outcome = usecase
            .handle(sample_notification(NotificationKind::Online))
            .await
            .unwrap();
        assert_eq!(
            outcome,
            NotificationOutcome::CaptureStarted {
                basename: basename.clone()
            }
        );

        let request = tokio::time::timeout(Duration::from_secs(5), spawned_rx)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(request.name, format!("capture_{}", basename));
        assert!(request.args.contains(&"https://twitch.tv/somechannel".to_string()));
        assert!(request.args.contains(&"1080p60".to_string()));

        let saved = saved.lock().unwrap();
        assert_eq!(saved.len(), 1);
        assert!(saved[0].is_capturing);
        assert!(!saved[0].not_started);
        assert_eq!(saved[0].basename, basename);
        assert_eq!(saved[0].chapters.len(), 1);
        assert_eq!(saved[0].chapters[0].title, "any% attempts");
        assert!(saved[0].chapters[0].online);
    }

    #[tokio::test]
    async fn retried_notification_without_start_time_starts_one_capture() {
        let dir = tempfile::tempdir().unwrap();
        let saved: Arc<Mutex<Vec<RecordingEntity>>> = Arc::new(Mutex::new(Vec::new()));

        let mut recordings = MockRecordingRepository::new();
        let capturing = Arc::clone(&saved);
        recordings.expect_find_capturing().returning(move |_| {
            let current = capturing
                .lock()
                .unwrap()
                .iter()
                .rev()
                .find(|recording| recording.is_capturing)
                .cloned();
            Box::pin(async move { Ok(current) })
        });
        recordings
            .expect_document_exists()
            .returning(|_, _| Box::pin(async move { Ok(false) }));
        recordings
            .expect_list_by_channel()
            .returning(|_| Box::pin(async move { Ok(Vec::new()) }));
        let saved_by_mock = Arc::clone(&saved);
        recordings.expect_save().returning(move |recording| {
            saved_by_mock.lock().unwrap().push(recording.clone());
            Box::pin(async move { Ok(recording) })
        });

        let mut harness = Harness::new(recordings, fake_binaries(dir.path()));
        harness
            .jobs
            .expect_load()
            .returning(|name| Box::pin(async move { Err(JobLoadError::NoFile(name)) }));
        let (spawned_tx, spawned_rx) = oneshot::channel::<()>();
        let spawned_tx = Mutex::new(Some(spawned_tx));
        harness
            .jobs
            .expect_spawn()
            .times(1)
            .returning(move |request: SpawnJobModel| {
                if let Some(tx) = spawned_tx.lock().unwrap().take() {
                    let _ = tx.send(());
                }
                let job = JobEntity {
                    name: request.name,
                    pid: 4242,
                    metadata: request.metadata,
                    started_at: Utc::now(),
                    bin: Some(request.bin.to_string_lossy().into_owned()),
                    args: request.args,
                };
                Box::pin(async move { Ok(job) })
            });
        harness
            .jobs
            .expect_wait()
            .returning(|_| Box::pin(std::future::pending::<anyhow::Result<JobExit>>()));
        harness
            .events
            .expect_publish()
            .returning(|_| Box::pin(async move { Ok(()) }));
        let usecase = harness.build();

        let notification = ChannelNotification {
            started_at: None,
            ..sample_notification(NotificationKind::Online)
        };

        let first = usecase.handle(notification.clone()).await.unwrap();
        let NotificationOutcome::CaptureStarted { basename } = first else {
            panic!("expected a capture to start, got {:?}", first);
        };
        tokio::time::timeout(Duration::from_secs(5), spawned_rx)
            .await
            .unwrap()
            .unwrap();

        // The retry lands in a later second, so it would get a different basename.
        tokio::time::sleep(Duration::from_millis(1100)).await;
        let second = usecase.handle(notification).await.unwrap();

        assert_eq!(second, NotificationOutcome::Duplicate { basename });
        assert_eq!(saved.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn same_session_with_new_start_time_is_a_duplicate() {
        let dir = tempfile::tempdir().unwrap();
        let mut earlier = InsertRecordingModel {
            platform: Platform::Twitch,
            channel_id: "1234".to_string(),
            channel_login: "somechannel".to_string(),
            channel_name: "SomeChannel".to_string(),
            session_id: "40001".to_string(),
            started_at: Utc.with_ymd_and_hms(2024, 3, 1, 18, 0, 0).unwrap(),
        }
        .to_entity(Path::new("/vods"));
        earlier.is_finalized = true;
        let earlier_basename = earlier.basename.clone();

        let mut recordings = MockRecordingRepository::new();
        recordings
            .expect_document_exists()
            .returning(|_, _| Box::pin(async move { Ok(false) }));
        recordings
            .expect_find_capturing()
            .returning(|_| Box::pin(async move { Ok(None) }));
        recordings
            .expect_list_by_channel()
            .with(eq("somechannel".to_string()))
            .returning(move |_| {
                let earlier = earlier.clone();
                Box::pin(async move { Ok(vec![earlier]) })
            });
        recordings.expect_save().times(0);
        let mut harness = Harness::new(recordings, fake_binaries(dir.path()));
        harness.jobs.expect_spawn().times(0);
        let usecase = harness.build();

        let outcome = usecase
            .handle(sample_notification(NotificationKind::Online))
            .await
            .unwrap();

        assert_eq!(
            outcome,
            NotificationOutcome::Duplicate {
                basename: earlier_basename
            }
        );
    }

    #[tokio::test]
    async fn missing_capture_tool_fails_the_notification() {
        let dir = tempfile::tempdir().unwrap();
        let mut binaries = fake_binaries(dir.path());
        binaries.streamlink = Some(dir.path().join("missing/streamlink").to_string_lossy().into_owned());

        let mut recordings = MockRecordingRepository::new();
        recordings
            .expect_document_exists()
            .returning(|_, _| Box::pin(async move { Ok(false) }));
        recordings
            .expect_find_capturing()
            .returning(|_| Box::pin(async move { Ok(None) }));
        recordings
            .expect_list_by_channel()
            .returning(|_| Box::pin(async move { Ok(Vec::new()) }));
        recordings.expect_save().times(0);
        let mut harness = Harness::new(recordings, binaries);
        harness.jobs.expect_spawn().times(0);
        let usecase = harness.build();

        let err = usecase
            .handle(sample_notification(NotificationKind::Online))
            .await
            .unwrap_err();

        assert!(matches!(
            err.downcast_ref::<CaptureError>(),
            Some(CaptureError::FatalConfig(_))
        ));
    }

    #[tokio::test]
    async fn update_while_capturing_appends_chapter() {
        let dir = tempfile::tempdir().unwrap();
        let mut capturing = InsertRecordingModel {
            platform: Platform::Twitch,
            channel_id: "1234".to_string(),
            channel_login: "somechannel".to_string(),
            channel_name: "SomeChannel".to_string(),
            session_id: "40001".to_string(),
            started_at: Utc::now() - chrono::Duration::minutes(10),
        }
        .to_entity(Path::new("/vods"));
        capturing.is_capturing = true;
        let basename = capturing.basename.clone();

        let mut recordings = MockRecordingRepository::new();
        recordings.expect_find_capturing().returning(move |_| {
            let capturing = capturing.clone();
            Box::pin(async move { Ok(Some(capturing)) })
        });
        recordings
            .expect_save()
            .withf(|recording| recording.chapters.len() == 1)
            .times(1)
            .returning(|recording| Box::pin(async move { Ok(recording) }));
        let mut harness = Harness::new(recordings, fake_binaries(dir.path()));
        harness
            .events
            .expect_publish()
            .withf(|event| event.action() == "chapter_update")
            .times(1)
            .returning(|_| Box::pin(async move { Ok(()) }));
        let usecase = harness.build();

        let outcome = usecase
            .handle(sample_update("Just Chatting", "hello"))
            .await
            .unwrap();

        assert_eq!(outcome, NotificationOutcome::ChapterAdded { basename });
    }

    #[tokio::test]
    async fn no_capture_and_keyword_mismatch_skip_the_stream() {
        let dir = tempfile::tempdir().unwrap();
        let mut recordings = MockRecordingRepository::new();
        recordings.expect_save().times(0);
        recordings.expect_document_exists().times(0);
        let mut harness = Harness::new(recordings, fake_binaries(dir.path()));
        let mut muted = sample_channel();
        muted.no_capture = true;
        let mut picky = sample_channel();
        picky.internal_id = "5678".to_string();
        picky.login = "pickychannel".to_string();
        picky.match_keywords = vec!["speedrun".to_string()];
        harness.channels = vec![muted, picky];
        let usecase = harness.build();

        let skipped = usecase
            .handle(sample_notification(NotificationKind::Online))
            .await
            .unwrap();
        assert_eq!(
            skipped,
            NotificationOutcome::CaptureSkipped {
                reason: "no_capture".to_string()
            }
        );

        let notification = ChannelNotification {
            channel_id: "5678".to_string(),
            channel_login: "pickychannel".to_string(),
            title: Some("cooking stream".to_string()),
            ..sample_notification(NotificationKind::Online)
        };
        let skipped = usecase.handle(notification).await.unwrap();
        assert!(matches!(skipped, NotificationOutcome::CaptureSkipped { .. }));
    }
}
