use anyhow::Result;
use crates::domain::repositories::{
    event_publisher::EventPublisher, job_supervisor::JobSupervisor, media_probe::MediaProbe,
    recordings::RecordingRepository, subscription_gateway::SubscriptionGateway,
};
use crates::infra::{
    events::{broadcast_bus::BroadcastEventBus, debouncer::KeyedDebouncer},
    filesystem::{recording_files::RecordingFileRepository, unsubscribe_outbox::UnsubscribeOutbox},
    media::mp4_probe::Mp4MediaProbe,
    process::job_supervisor::ProcessJobSupervisor,
};
use std::{sync::Arc, time::Duration};
use tracing::error;
use tracing::info;
use worker::{
    config, services,
    usecases::{
        capture_pipeline::CapturePipelineUseCase,
        channel_notifications::ChannelNotificationsUseCase,
        retention_cleanup::RetentionCleanupUseCase, startup_repair::StartupRepairUseCase,
    },
};

const EVENT_BUS_CAPACITY: usize = 256;
const CHANNEL_UPDATED_DEBOUNCE: Duration = Duration::from_secs(60);

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    if let Err(error) = run().await {
        error!("Worker exited with error: {:?}", error);
        std::process::exit(1);
    }
    Ok(())
}

async fn run() -> Result<()> {
    dotenvy::dotenv().ok();
    crates::observability::init_observability("capture_worker")?;

    let dotenvy_env = Arc::new(config::config_loader::load()?);
    info!(stage = %dotenvy_env.stage, data_dir = %dotenvy_env.paths.data_dir.display(), "ENV has been loaded");

    let channels = Arc::new(config::config_loader::load_channels(
        &dotenvy_env.paths.channels_config,
    )?);
    info!(channels = channels.len(), "Channel configuration has been loaded");

    let recording_repository: Arc<dyn RecordingRepository + Send + Sync> =
        Arc::new(RecordingFileRepository::new(dotenvy_env.paths.vods.clone()));

    let job_supervisor: Arc<dyn JobSupervisor + Send + Sync> = Arc::new(ProcessJobSupervisor::new(
        dotenvy_env.paths.pids.clone(),
        dotenvy_env.paths.logs.clone(),
    ));

    let media_probe: Arc<dyn MediaProbe + Send + Sync> = Arc::new(Mp4MediaProbe);

    let event_bus = BroadcastEventBus::new(EVENT_BUS_CAPACITY);
    let event_publisher: Arc<dyn EventPublisher + Send + Sync> = Arc::new(event_bus.clone());

    let subscription_gateway: Arc<dyn SubscriptionGateway + Send + Sync> = Arc::new(
        UnsubscribeOutbox::new(dotenvy_env.paths.unsubscribe_outbox()),
    );

    // Subscribe before anything can publish. The journal stopping never stops capture.
    let journal_events = event_bus.subscribe();
    let journal_path = dotenvy_env.paths.events_journal();
    tokio::spawn(async move {
        if let Err(err) = services::event_journal::run(journal_events, journal_path).await {
            error!(error = ?err, "event_journal: stopped");
        }
    });

    let retention_usecase = Arc::new(RetentionCleanupUseCase::new(
        Arc::clone(&recording_repository),
        Arc::clone(&event_publisher),
        dotenvy_env.retention.clone(),
    ));

    let capture_pipeline_usecase = Arc::new(CapturePipelineUseCase::new(
        Arc::clone(&recording_repository),
        Arc::clone(&job_supervisor),
        Arc::clone(&media_probe),
        Arc::clone(&event_publisher),
        retention_usecase,
        dotenvy_env.capture.clone(),
        dotenvy_env.binaries.clone(),
    ));

    let startup_repair_usecase = StartupRepairUseCase::new(
        Arc::clone(&recording_repository),
        Arc::clone(&job_supervisor),
        Arc::clone(&media_probe),
        Arc::clone(&capture_pipeline_usecase),
        Arc::clone(&channels),
    );
    startup_repair_usecase.run().await?;

    let channel_notifications_usecase = Arc::new(ChannelNotificationsUseCase::new(
        channels,
        recording_repository,
        subscription_gateway,
        event_publisher,
        capture_pipeline_usecase,
        KeyedDebouncer::new(CHANNEL_UPDATED_DEBOUNCE),
        dotenvy_env.paths.vods.clone(),
    ));

    // Spawn background loop
    let notification_inbox_loop = tokio::spawn(services::notification_inbox::run(
        channel_notifications_usecase,
        dotenvy_env.inbox.clone(),
    ));

    tokio::select! {
        result = notification_inbox_loop => result??,
        _ = services::shutdown::shutdown_signal() => info!("Worker shutting down"),
    };
    Ok(())
}
