use anyhow::Result;
use chrono::Utc;
use crates::{
    domain::{
        entities::recordings::RecordingEntity,
        errors::{CaptureError, JobLoadError},
        repositories::{
            event_publisher::EventPublisher, job_supervisor::JobSupervisor,
            media_probe::MediaProbe, recordings::RecordingRepository,
        },
        value_objects::{
            basename::{capture_job_name, chat_dump_job_name, remux_job_name},
            channel_config::ChannelConfig,
            enums::pipeline_states::PipelineState,
            jobs::{JobExit, SpawnJobModel},
            lifecycle_events::LifecycleEvent,
        },
    },
    infra::process::binaries::resolve_binary,
};
use serde_json::json;
use std::{
    path::{Path, PathBuf},
    sync::Arc,
};
use tracing::{error, info, warn};

use crate::{
    config::config_model::{Binaries, CaptureSettings},
    usecases::retention_cleanup::RetentionCleanupUseCase,
};

/// Runs one recording through capture, conversion, retention and finalization.
pub struct CapturePipelineUseCase {
    recordings: Arc<dyn RecordingRepository + Send + Sync>,
    jobs: Arc<dyn JobSupervisor + Send + Sync>,
    media: Arc<dyn MediaProbe + Send + Sync>,
    events: Arc<dyn EventPublisher + Send + Sync>,
    retention: Arc<RetentionCleanupUseCase>,
    settings: CaptureSettings,
    binaries: Binaries,
}

impl CapturePipelineUseCase {
    pub fn new(
        recordings: Arc<dyn RecordingRepository + Send + Sync>,
        jobs: Arc<dyn JobSupervisor + Send + Sync>,
        media: Arc<dyn MediaProbe + Send + Sync>,
        events: Arc<dyn EventPublisher + Send + Sync>,
        retention: Arc<RetentionCleanupUseCase>,
        settings: CaptureSettings,
        binaries: Binaries,
    ) -> Self {
        Self {
            recordings,
            jobs,
            media,
            events,
            retention,
            settings,
            binaries,
        }
    }

    /// Configuration and persistence problems are returned as errors. Process
    /// failures are handled here and reported through the final state.
    pub async fn run(
        &self,
        mut recording: RecordingEntity,
        channel: ChannelConfig,
    ) -> Result<PipelineState> {
        let basename = recording.basename.clone();

        if self.capture_job_alive(&basename).await {
            warn!(
                basename = %basename,
                "capture_pipeline: capture job already running; not starting another"
            );
            return Ok(PipelineState::NotStarted);
        }

        let streamlink = resolve_binary(self.binaries.streamlink.as_deref(), "streamlink")?;
        let ffmpeg = self.resolve_ffmpeg()?;

        self.publish(LifecycleEvent::StartDownload {
            basename: basename.clone(),
            channel_login: recording.channel_login.clone(),
        })
        .await;

        let mut attempt: u32 = 0;
        loop {
            recording.not_started = false;
            recording.failed = false;
            recording.is_capturing = true;
            recording.capture_started = Some(Utc::now());
            recording = self.recordings.save(recording).await?;
            log_transition(&basename, PipelineState::Capturing);

            let chat_job = self.start_chat_capture(&recording, &channel).await;
            let exit = self.capture(&recording, &channel, &streamlink).await;
            if let Some(chat_job) = chat_job {
                if let Err(err) = self.jobs.kill(chat_job.clone()).await {
                    warn!(job = %chat_job, error = ?err, "capture_pipeline: failed to stop chat capture");
                }
            }

            let captured = self.has_content(recording.capture_path()).await;
            self.publish(LifecycleEvent::EndCapture {
                basename: basename.clone(),
                channel_login: recording.channel_login.clone(),
                success: captured,
            })
            .await;

            if captured {
                break;
            }

            let failure = CaptureError::TransientProcessFailure {
                basename: basename.clone(),
                attempt: attempt + 1,
            };
            if attempt < self.settings.download_retries {
                attempt += 1;
                warn!(
                    basename = %basename,
                    exit_code = ?exit.as_ref().and_then(|exit| exit.code),
                    retry_in_secs = self.settings.retry_delay.as_secs(),
                    "capture_pipeline: {}; retrying",
                    failure
                );
                tokio::time::sleep(self.settings.retry_delay).await;
                continue;
            }

            let poisoned = CaptureError::PoisonedRecording {
                basename: basename.clone(),
                attempts: attempt + 1,
            };
            error!(basename = %basename, "capture_pipeline: {}", poisoned);
            log_transition(&basename, PipelineState::CaptureFailed);
            recording.is_capturing = false;
            recording.failed = true;
            if let Err(err) = self.recordings.save(recording).await {
                error!(basename = %basename, error = ?err, "capture_pipeline: failed to save failed recording");
            }
            match self.recordings.mark_broken(basename.clone()).await {
                Ok(path) => {
                    warn!(basename = %basename, path = %path.display(), "capture_pipeline: recording set aside")
                }
                Err(err) => {
                    error!(basename = %basename, error = ?err, "capture_pipeline: failed to set recording aside")
                }
            }
            return Ok(PipelineState::CaptureFailed);
        }

        self.complete_capture(recording, Some(&channel), ffmpeg).await
    }

    /// Fails with `FatalConfig` when a tool the pipeline needs is missing.
    pub fn check_binaries(&self) -> Result<()> {
        resolve_binary(self.binaries.streamlink.as_deref(), "streamlink")?;
        self.resolve_ffmpeg()?;
        Ok(())
    }

    /// Follows a capture started by a previous run until its process exits,
    /// then continues from the capture result.
    pub async fn adopt(
        &self,
        mut recording: RecordingEntity,
        channel: Option<ChannelConfig>,
    ) -> Result<PipelineState> {
        let basename = recording.basename.clone();
        let name = capture_job_name(&basename);
        let ffmpeg = self.resolve_ffmpeg()?;
        info!(basename = %basename, "capture_pipeline: following capture from a previous run");

        loop {
            match self.jobs.status(name.clone()).await {
                Ok(status) if status.is_running() => {}
                Ok(_) => break,
                Err(err) => {
                    warn!(job = %name, error = ?err, "capture_pipeline: cannot poll adopted capture; treating it as stopped");
                    break;
                }
            }
            tokio::time::sleep(self.settings.job_poll_interval).await;
        }
        if let Err(err) = self.jobs.clear(name.clone()).await {
            warn!(job = %name, error = ?err, "capture_pipeline: failed to clear adopted capture job");
        }
        let chat_job = chat_dump_job_name(&basename);
        if let Err(err) = self.jobs.kill(chat_job.clone()).await {
            warn!(job = %chat_job, error = ?err, "capture_pipeline: failed to stop chat capture");
        }

        let captured = self.has_content(recording.capture_path()).await;
        self.publish(LifecycleEvent::EndCapture {
            basename: basename.clone(),
            channel_login: recording.channel_login.clone(),
            success: captured,
        })
        .await;

        if !captured {
            error!(basename = %basename, "capture_pipeline: adopted capture produced no output");
            log_transition(&basename, PipelineState::CaptureFailed);
            recording.is_capturing = false;
            recording.failed = true;
            self.recordings.save(recording).await?;
            return Ok(PipelineState::CaptureFailed);
        }

        self.complete_capture(recording, channel.as_ref(), ffmpeg).await
    }

    async fn complete_capture(
        &self,
        mut recording: RecordingEntity,
        channel: Option<&ChannelConfig>,
        ffmpeg: Option<PathBuf>,
    ) -> Result<PipelineState> {
        let basename = recording.basename.clone();
        recording.is_capturing = false;
        recording.ended_at = Some(Utc::now());
        recording.calculate_chapters();
        let removed = recording.remove_short_chapters(self.settings.min_chapter_duration);
        if removed > 0 {
            info!(basename = %basename, removed, "capture_pipeline: dropped short chapters");
        }
        if recording.is_near_day_limit() {
            warn!(
                basename = %basename,
                duration = ?recording.duration_from_timestamps(),
                "capture_pipeline: stream is close to 24 hours; the provider may split it"
            );
        }
        recording = self.recordings.save(recording).await?;
        log_transition(&basename, PipelineState::CaptureOk);

        self.convert_and_finalize(recording, channel, ffmpeg).await
    }

    /// Picks a recording up at the convert step after a restart.
    pub async fn resume(
        &self,
        recording: RecordingEntity,
        channel: Option<ChannelConfig>,
    ) -> Result<PipelineState> {
        let ffmpeg = self.resolve_ffmpeg()?;
        self.convert_and_finalize(recording, channel.as_ref(), ffmpeg)
            .await
    }

    async fn convert_and_finalize(
        &self,
        mut recording: RecordingEntity,
        channel: Option<&ChannelConfig>,
        ffmpeg: Option<PathBuf>,
    ) -> Result<PipelineState> {
        let basename = recording.basename.clone();

        match ffmpeg {
            Some(ffmpeg) => {
                recording.is_converting = true;
                recording.conversion_started = Some(Utc::now());
                recording = self.recordings.save(recording).await?;
                log_transition(&basename, PipelineState::Converting);

                let output = recording.converted_path(&self.settings.vod_container);
                let converted = self.remux(&recording, &ffmpeg, &output).await
                    && self.has_content(output.clone()).await;

                recording.is_converting = false;
                self.publish(LifecycleEvent::EndConvert {
                    basename: basename.clone(),
                    channel_login: recording.channel_login.clone(),
                    success: converted,
                })
                .await;

                if !converted {
                    let failure = CaptureError::ConversionFailure {
                        basename: basename.clone(),
                        reason: format!("{} is missing or empty", output.display()),
                    };
                    error!(basename = %basename, "capture_pipeline: {}", failure);
                    self.recordings.save(recording).await?;
                    log_transition(&basename, PipelineState::ConvertFailed);
                    return Ok(PipelineState::ConvertFailed);
                }

                if let Err(err) = self.recordings.remove_capture_file(basename.clone()).await {
                    warn!(basename = %basename, error = ?err, "capture_pipeline: failed to remove raw capture");
                }
                recording.add_segment(file_name(&output));
            }
            None => {
                recording.add_segment(file_name(&recording.capture_path()));
            }
        }
        recording = self.recordings.save(recording).await?;
        log_transition(&basename, PipelineState::Converted);

        if let Some(channel) = channel {
            if let Err(err) = self.retention.run_for_channel(channel).await {
                error!(basename = %basename, error = ?err, "capture_pipeline: retention failed");
            }
        }

        self.finalize(recording).await
    }

    /// Fills in the duration and edit list, then marks the recording finalized.
    pub async fn finalize(&self, mut recording: RecordingEntity) -> Result<PipelineState> {
        let basename = recording.basename.clone();

        if recording.duration.is_none() {
            recording.duration = self.probe_duration(&recording).await;
        }
        recording.calculate_chapters();

        if let Some(edit_list) = recording.lossless_cut_csv() {
            if let Err(err) = self
                .recordings
                .write_edit_list(basename.clone(), edit_list)
                .await
            {
                warn!(basename = %basename, error = ?err, "capture_pipeline: failed to write edit list");
            }
        }

        recording.finalize()?;
        let recording = self.recordings.save(recording).await?;
        log_transition(&basename, PipelineState::Finalized);

        self.publish(LifecycleEvent::EndDownload {
            basename: basename.clone(),
            channel_login: recording.channel_login.clone(),
        })
        .await;

        info!(
            basename = %basename,
            duration = ?recording.duration,
            total_size = recording.total_size,
            chapters = recording.chapters.len(),
            "capture_pipeline: recording finalized"
        );
        Ok(PipelineState::Finalized)
    }

    async fn capture_job_alive(&self, basename: &str) -> bool {
        let name = capture_job_name(basename);
        match self.jobs.load(name.clone()).await {
            Ok(_) => match self.jobs.status(name.clone()).await {
                Ok(status) => status.is_running(),
                Err(err) => {
                    warn!(job = %name, error = ?err, "capture_pipeline: failed to poll job status");
                    false
                }
            },
            Err(JobLoadError::NoFile(_)) => false,
            Err(err) => {
                warn!(job = %name, error = %err, "capture_pipeline: unreadable job file; ignoring");
                false
            }
        }
    }

    fn resolve_ffmpeg(&self) -> Result<Option<PathBuf>> {
        if !self.settings.convert_enabled {
            return Ok(None);
        }
        Ok(Some(resolve_binary(self.binaries.ffmpeg.as_deref(), "ffmpeg")?))
    }

    async fn start_chat_capture(
        &self,
        recording: &RecordingEntity,
        channel: &ChannelConfig,
    ) -> Option<String> {
        if !channel.live_chat {
            return None;
        }
        let bin = match resolve_binary(self.binaries.chat_dumper.as_deref(), "chat_dumper") {
            Ok(bin) => bin,
            Err(err) => {
                warn!(basename = %recording.basename, error = %err, "capture_pipeline: chat capture unavailable");
                return None;
            }
        };

        let name = chat_dump_job_name(&recording.basename);
        let request = SpawnJobModel {
            name: name.clone(),
            bin,
            args: vec![
                "--channel".to_string(),
                recording.channel_login.clone(),
                "--userid".to_string(),
                recording.channel_id.clone(),
                "--date".to_string(),
                recording.started_at.to_rfc3339(),
                "--output".to_string(),
                recording.chat_dump_path().to_string_lossy().into_owned(),
            ],
            metadata: json!({
                "basename": recording.basename,
                "channel_login": recording.channel_login,
            }),
        };

        match self.jobs.spawn(request).await {
            Ok(job) => {
                info!(basename = %recording.basename, pid = job.pid, "capture_pipeline: chat capture started");
                Some(name)
            }
            Err(err) => {
                warn!(basename = %recording.basename, error = ?err, "capture_pipeline: failed to start chat capture");
                None
            }
        }
    }

    /// `None` when the capture process could not be started or awaited.
    async fn capture(
        &self,
        recording: &RecordingEntity,
        channel: &ChannelConfig,
        streamlink: &Path,
    ) -> Option<JobExit> {
        let name = capture_job_name(&recording.basename);
        let request = SpawnJobModel {
            name: name.clone(),
            bin: streamlink.to_path_buf(),
            args: capture_args(&self.settings, recording, channel),
            metadata: json!({
                "basename": recording.basename,
                "channel_login": recording.channel_login,
                "capture_id": recording.capture_id,
            }),
        };

        let job = match self.jobs.spawn(request).await {
            Ok(job) => job,
            Err(err) => {
                error!(basename = %recording.basename, error = ?err, "capture_pipeline: failed to start capture");
                return None;
            }
        };
        info!(basename = %recording.basename, pid = job.pid, "capture_pipeline: capture started");

        match self.jobs.wait(name).await {
            Ok(exit) => {
                info!(
                    basename = %recording.basename,
                    code = ?exit.code,
                    killed = exit.killed,
                    "capture_pipeline: capture process exited"
                );
                Some(exit)
            }
            Err(err) => {
                error!(basename = %recording.basename, error = ?err, "capture_pipeline: lost track of capture");
                None
            }
        }
    }

    async fn remux(&self, recording: &RecordingEntity, ffmpeg: &Path, output: &Path) -> bool {
        let name = remux_job_name(&recording.basename);
        let request = SpawnJobModel {
            name: name.clone(),
            bin: ffmpeg.to_path_buf(),
            args: remux_args(&recording.capture_path(), output, &self.settings.vod_container),
            metadata: json!({ "basename": recording.basename }),
        };

        if let Err(err) = self.jobs.spawn(request).await {
            error!(basename = %recording.basename, error = ?err, "capture_pipeline: failed to start remux");
            return false;
        }
        match self.jobs.wait(name).await {
            Ok(exit) if exit.success() => true,
            Ok(exit) if exit.killed => {
                warn!(basename = %recording.basename, "capture_pipeline: remux was killed; output is incomplete");
                false
            }
            Ok(exit) => {
                warn!(basename = %recording.basename, code = ?exit.code, "capture_pipeline: remux exited abnormally");
                true
            }
            Err(err) => {
                error!(basename = %recording.basename, error = ?err, "capture_pipeline: lost track of remux");
                false
            }
        }
    }

    async fn has_content(&self, path: PathBuf) -> bool {
        match self.media.file_size(path.clone()).await {
            Ok(Some(size)) => size > 0,
            Ok(None) => false,
            Err(err) => {
                warn!(path = %path.display(), error = ?err, "capture_pipeline: failed to stat file");
                false
            }
        }
    }

    async fn probe_duration(&self, recording: &RecordingEntity) -> Option<i64> {
        if let Some(segment) = recording.segments.first() {
            let path = recording.segment_path(segment);
            match self.media.read_duration_seconds(path.clone()).await {
                Ok(duration) => return Some(duration),
                Err(err) => {
                    let failure = CaptureError::MetadataFailure {
                        path,
                        reason: err.to_string(),
                    };
                    warn!(basename = %recording.basename, "capture_pipeline: {}; using timestamps", failure);
                }
            }
        }
        recording.duration_from_timestamps()
    }

    async fn publish(&self, event: LifecycleEvent) {
        let action = event.action();
        if let Err(err) = self.events.publish(event).await {
            warn!(action, error = ?err, "capture_pipeline: failed to publish event");
        }
    }
}

pub fn capture_args(
    settings: &CaptureSettings,
    recording: &RecordingEntity,
    channel: &ChannelConfig,
) -> Vec<String> {
    let hls_timeout = settings.hls_timeout.to_string();
    vec![
        "--hls-live-restart".to_string(),
        "--hls-live-edge".to_string(),
        "99999".to_string(),
        "--hls-timeout".to_string(),
        hls_timeout.clone(),
        "--hls-segment-timeout".to_string(),
        hls_timeout,
        "--hls-segment-threads".to_string(),
        "5".to_string(),
        "--ffmpeg-fout".to_string(),
        "mpegts".to_string(),
        "--retry-streams".to_string(),
        "10".to_string(),
        "--retry-max".to_string(),
        "5".to_string(),
        "-o".to_string(),
        recording.capture_path().to_string_lossy().into_owned(),
        "--url".to_string(),
        recording
            .platform
            .stream_url(&recording.channel_login, &recording.channel_id),
        "--default-stream".to_string(),
        channel.quality_arg(),
    ]
}

pub fn remux_args(input: &Path, output: &Path, container: &str) -> Vec<String> {
    let mut args = vec![
        "-i".to_string(),
        input.to_string_lossy().into_owned(),
        "-c".to_string(),
        "copy".to_string(),
        "-bsf:a".to_string(),
        "aac_adtstoasc".to_string(),
    ];
    if container.eq_ignore_ascii_case("mp4") {
        args.push("-movflags".to_string());
        args.push("faststart".to_string());
    }
    args.push("-y".to_string());
    args.push(output.to_string_lossy().into_owned());
    args
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn log_transition(basename: &str, state: PipelineState) {
    info!(basename = %basename, state = %state, "capture_pipeline: state changed");
}
