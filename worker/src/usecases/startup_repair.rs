use anyhow::Result;
use chrono::Utc;
use crates::domain::{
    repositories::{
        job_supervisor::JobSupervisor, media_probe::MediaProbe, recordings::RecordingRepository,
    },
    value_objects::{basename::capture_job_name, channel_config::ChannelDirectory},
};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::usecases::capture_pipeline::CapturePipelineUseCase;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StartupRepairResult {
    pub loaded: usize,
    pub jobs_cleared: usize,
    pub crashed_captures: Vec<String>,
    pub adopted_captures: Vec<String>,
    pub resumed_conversions: Vec<String>,
    pub finalized: Vec<String>,
}

/// Brings jobs and recordings back in line after an unclean shutdown.
pub struct StartupRepairUseCase {
    recordings: Arc<dyn RecordingRepository + Send + Sync>,
    jobs: Arc<dyn JobSupervisor + Send + Sync>,
    media: Arc<dyn MediaProbe + Send + Sync>,
    pipeline: Arc<CapturePipelineUseCase>,
    channels: Arc<ChannelDirectory>,
}

impl StartupRepairUseCase {
    pub fn new(
        recordings: Arc<dyn RecordingRepository + Send + Sync>,
        jobs: Arc<dyn JobSupervisor + Send + Sync>,
        media: Arc<dyn MediaProbe + Send + Sync>,
        pipeline: Arc<CapturePipelineUseCase>,
        channels: Arc<ChannelDirectory>,
    ) -> Self {
        Self {
            recordings,
            jobs,
            media,
            pipeline,
            channels,
        }
    }

    /// Conversions are resumed on their own tasks; everything else is done before returning.
    pub async fn run(&self) -> Result<StartupRepairResult> {
        let report = self.jobs.reconcile_on_startup().await?;
        let loaded = self.recordings.load_all().await?;

        let mut result = StartupRepairResult {
            loaded,
            jobs_cleared: report.cleared.len(),
            ..Default::default()
        };

        for mut recording in self.recordings.list_all().await? {
            if recording.is_finalized || recording.not_started {
                continue;
            }
            let basename = recording.basename.clone();

            if recording.is_capturing {
                let job_name = capture_job_name(&basename);
                let running = match self.jobs.status(job_name.clone()).await {
                    Ok(status) => status.is_running(),
                    Err(err) => {
                        warn!(job = %job_name, error = ?err, "startup_repair: unreadable capture job; treating it as stopped");
                        if let Err(err) = self.jobs.clear(job_name.clone()).await {
                            warn!(job = %job_name, error = ?err, "startup_repair: failed to clear unreadable job");
                        }
                        false
                    }
                };
                if running {
                    info!(basename = %basename, "startup_repair: capture still running; following it");
                    let channel = self
                        .channels
                        .find_by_login(&recording.channel_login)
                        .cloned();
                    let pipeline = Arc::clone(&self.pipeline);
                    let adopted = basename.clone();
                    tokio::spawn(async move {
                        match pipeline.adopt(recording, channel).await {
                            Ok(state) => info!(basename = %adopted, state = %state, "startup_repair: adopted pipeline finished"),
                            Err(err) => error!(basename = %adopted, error = ?err, "startup_repair: adopted pipeline aborted"),
                        }
                    });
                    result.adopted_captures.push(basename);
                    continue;
                }
                warn!(basename = %basename, "startup_repair: capture was interrupted");
                recording.is_capturing = false;
                recording.failed = true;
                recording.ended_at = recording.ended_at.or(recording.saved_at).or(Some(Utc::now()));
                recording = self.recordings.save(recording).await?;
                result.crashed_captures.push(basename.clone());
            }

            if recording.is_converting {
                warn!(basename = %basename, "startup_repair: conversion was interrupted");
                recording.is_converting = false;
            }

            let raw_size = self
                .media
                .file_size(recording.capture_path())
                .await
                .unwrap_or_else(|err| {
                    warn!(basename = %basename, error = ?err, "startup_repair: failed to stat raw capture");
                    None
                });

            if raw_size.unwrap_or(0) > 0 {
                info!(basename = %basename, "startup_repair: resuming conversion");
                let channel = self
                    .channels
                    .find_by_login(&recording.channel_login)
                    .cloned();
                let pipeline = Arc::clone(&self.pipeline);
                let resumed = basename.clone();
                tokio::spawn(async move {
                    match pipeline.resume(recording, channel).await {
                        Ok(state) => info!(basename = %resumed, state = %state, "startup_repair: resumed pipeline finished"),
                        Err(err) => error!(basename = %resumed, error = ?err, "startup_repair: resumed pipeline aborted"),
                    }
                });
                result.resumed_conversions.push(basename);
            } else if !recording.segments.is_empty() {
                info!(basename = %basename, "startup_repair: finalizing leftover recording");
                self.pipeline.finalize(recording).await?;
                result.finalized.push(basename);
            } else if result.crashed_captures.contains(&basename) {
                info!(basename = %basename, "startup_repair: interrupted capture left nothing to convert");
            }
        }

        info!(
            loaded = result.loaded,
            jobs_cleared = result.jobs_cleared,
            crashed_captures = result.crashed_captures.len(),
            adopted_captures = result.adopted_captures.len(),
            resumed_conversions = result.resumed_conversions.len(),
            finalized = result.finalized.len(),
            "startup_repair: completed"
        );
        Ok(result)
    }
}
