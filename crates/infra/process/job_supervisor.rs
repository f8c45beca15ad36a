use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use chrono::Utc;
use std::{
    collections::HashMap,
    io::ErrorKind,
    path::{Path, PathBuf},
    process::Stdio,
};
use tokio::{
    io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader},
    process::Command,
    sync::Mutex,
};
use tracing::{debug, error, info, warn};

use crate::{
    domain::{
        entities::jobs::JobEntity,
        errors::JobLoadError,
        repositories::job_supervisor::JobSupervisor,
        value_objects::{
            enums::job_statuses::JobStatus,
            jobs::{JobExit, ReconcileReport, SpawnJobModel},
        },
    },
    infra::process::job_process::{ExternalPid, JobProcess, LiveProcess},
};

struct TrackedJob {
    entity: JobEntity,
    process: JobProcess,
}

/// Supervises external processes and persists one `{name}.json` per job so
/// they can be found again after a restart.
pub struct ProcessJobSupervisor {
    pids_dir: PathBuf,
    logs_dir: PathBuf,
    jobs: Mutex<HashMap<String, TrackedJob>>,
}

impl ProcessJobSupervisor {
    pub fn new(pids_dir: PathBuf, logs_dir: PathBuf) -> Self {
        Self {
            pids_dir,
            logs_dir,
            jobs: Mutex::new(HashMap::new()),
        }
    }

    fn job_path(&self, name: &str) -> PathBuf {
        self.pids_dir.join(format!("{}.json", name))
    }

    async fn persist(&self, job: &JobEntity) -> Result<()> {
        tokio::fs::create_dir_all(&self.pids_dir)
            .await
            .with_context(|| format!("failed to create {}", self.pids_dir.display()))?;
        let path = self.job_path(&job.name);
        let tmp_path = path.with_extension("json.tmp");
        tokio::fs::write(&tmp_path, serde_json::to_vec_pretty(job)?)
            .await
            .with_context(|| format!("failed to write {}", tmp_path.display()))?;
        tokio::fs::rename(&tmp_path, &path)
            .await
            .with_context(|| format!("failed to move {} into place", path.display()))
    }

    async fn read_job_file(&self, name: &str) -> std::result::Result<JobEntity, JobLoadError> {
        let raw = match tokio::fs::read_to_string(self.job_path(name)).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Err(JobLoadError::NoFile(name.to_string()));
            }
            Err(err) => {
                return Err(JobLoadError::Corrupt {
                    name: name.to_string(),
                    reason: err.to_string(),
                });
            }
        };

        if raw.trim().is_empty() {
            return Err(JobLoadError::NoData(name.to_string()));
        }

        serde_json::from_str(&raw).map_err(|err| JobLoadError::Corrupt {
            name: name.to_string(),
            reason: err.to_string(),
        })
    }

    async fn process(&self, name: &str) -> std::result::Result<JobProcess, JobLoadError> {
        if let Some(tracked) = self.jobs.lock().await.get(name) {
            return Ok(tracked.process.clone());
        }
        let entity = self.load(name.to_string()).await?;
        Ok(JobProcess::External(ExternalPid {
            pid: entity.pid,
            bin: entity.bin,
        }))
    }

    fn spawn_output_forwarder<R>(&self, name: &str, stream: &'static str, reader: R)
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let name = name.to_string();
        let log_path = self.logs_dir.join(format!("{}_{}.log", name, stream));
        let logs_dir = self.logs_dir.clone();

        tokio::spawn(async move {
            let mut log_file = match open_log(&logs_dir, &log_path).await {
                Ok(file) => Some(file),
                Err(err) => {
                    warn!(job = %name, error = ?err, "job_supervisor: output will not be written to a log file");
                    None
                }
            };

            let mut lines = BufReader::new(reader).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        debug!(job = %name, stream, "{}", line);
                        if let Some(file) = log_file.as_mut() {
                            let written = file.write_all(format!("{}\n", line).as_bytes()).await;
                            if written.is_err() {
                                log_file = None;
                            }
                        }
                    }
                    Ok(None) => break,
                    Err(err) => {
                        debug!(job = %name, stream, error = %err, "job_supervisor: output stream closed");
                        break;
                    }
                }
            }
        });
    }
}

async fn open_log(logs_dir: &Path, log_path: &Path) -> Result<tokio::fs::File> {
    tokio::fs::create_dir_all(logs_dir).await?;
    let file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)
        .await?;
    Ok(file)
}

#[async_trait]
impl JobSupervisor for ProcessJobSupervisor {
    async fn spawn(&self, request: SpawnJobModel) -> Result<JobEntity> {
        let existing = self
            .jobs
            .lock()
            .await
            .get(&request.name)
            .map(|tracked| tracked.process.clone());
        if let Some(existing) = existing {
            if existing.status().await.is_running() {
                bail!("job {} is already running with pid {}", request.name, existing.pid());
            }
        }

        let mut child = Command::new(&request.bin)
            .args(&request.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("failed to spawn {}", request.bin.display()))?;

        let Some(pid) = child.id() else {
            let _ = child.start_kill();
            bail!("spawned {} but no pid was obtained", request.name);
        };

        if let Some(stdout) = child.stdout.take() {
            self.spawn_output_forwarder(&request.name, "stdout", stdout);
        }
        if let Some(stderr) = child.stderr.take() {
            self.spawn_output_forwarder(&request.name, "stderr", stderr);
        }

        let entity = JobEntity {
            name: request.name.clone(),
            pid,
            metadata: request.metadata,
            started_at: Utc::now(),
            bin: Some(request.bin.to_string_lossy().into_owned()),
            args: request.args,
        };

        if let Err(err) = self.persist(&entity).await {
            error!(job = %entity.name, pid, error = ?err, "job_supervisor: failed to persist job; killing process");
            let _ = child.start_kill();
            return Err(err);
        }

        info!(job = %entity.name, pid, "job_supervisor: job spawned");
        self.jobs.lock().await.insert(
            entity.name.clone(),
            TrackedJob {
                entity: entity.clone(),
                process: JobProcess::Live(LiveProcess::attach(pid, child)),
            },
        );
        Ok(entity)
    }

    async fn wait(&self, name: String) -> Result<JobExit> {
        let process = self
            .jobs
            .lock()
            .await
            .get(&name)
            .map(|tracked| tracked.process.clone())
            .ok_or_else(|| anyhow!("job {} is not tracked", name))?;

        let JobProcess::Live(live) = process else {
            bail!("job {} was not spawned by this process and cannot be awaited", name);
        };

        let exit = live.wait().await?;
        info!(job = %name, code = ?exit.code, killed = exit.killed, "job_supervisor: job exited");
        self.clear(name).await?;
        Ok(exit)
    }

    async fn load(&self, name: String) -> std::result::Result<JobEntity, JobLoadError> {
        if let Some(tracked) = self.jobs.lock().await.get(&name) {
            return Ok(tracked.entity.clone());
        }

        let entity = self.read_job_file(&name).await?;
        debug!(job = %name, pid = entity.pid, "job_supervisor: job loaded from disk");
        self.jobs.lock().await.entry(name).or_insert_with(|| TrackedJob {
            entity: entity.clone(),
            process: JobProcess::External(ExternalPid {
                pid: entity.pid,
                bin: entity.bin.clone(),
            }),
        });
        Ok(entity)
    }

    async fn status(&self, name: String) -> Result<JobStatus> {
        match self.process(&name).await {
            Ok(process) => Ok(process.status().await),
            Err(JobLoadError::NoFile(_)) => Ok(JobStatus::Stopped),
            Err(err) => Err(err.into()),
        }
    }

    async fn kill(&self, name: String) -> Result<()> {
        let process = match self.process(&name).await {
            Ok(process) => process,
            Err(JobLoadError::NoFile(_)) => {
                debug!(job = %name, "job_supervisor: nothing to kill");
                return Ok(());
            }
            Err(err) => return Err(err.into()),
        };

        info!(job = %name, pid = process.pid(), "job_supervisor: killing job");
        process.kill().await?;
        self.clear(name).await
    }

    async fn clear(&self, name: String) -> Result<()> {
        self.jobs.lock().await.remove(&name);
        match tokio::fs::remove_file(self.job_path(&name)).await {
            Ok(()) => {
                debug!(job = %name, "job_supervisor: job cleared");
                Ok(())
            }
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err).with_context(|| format!("failed to remove job file for {}", name)),
        }
    }

    async fn reconcile_on_startup(&self) -> Result<ReconcileReport> {
        let mut report = ReconcileReport::default();

        let mut entries = match tokio::fs::read_dir(&self.pids_dir).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(report),
            Err(err) => return Err(err).context("failed to list pid directory"),
        };

        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            if let Some(stem) = path.file_stem() {
                names.push(stem.to_string_lossy().into_owned());
            }
        }
        names.sort();

        for name in names {
            report.scanned += 1;
            match self.load(name.clone()).await {
                Ok(_) => {}
                Err(err) => {
                    warn!(job = %name, error = %err, "job_supervisor: unreadable job file left in place");
                    report.unreadable.push(name);
                    continue;
                }
            }

            if self.status(name.clone()).await?.is_running() {
                info!(job = %name, "job_supervisor: job still running");
                report.running.push(name);
            } else {
                info!(job = %name, "job_supervisor: clearing stale job");
                self.clear(name.clone()).await?;
                report.cleared.push(name);
            }
        }

        info!(
            scanned = report.scanned,
            cleared = report.cleared.len(),
            running = report.running.len(),
            unreadable = report.unreadable.len(),
            "job_supervisor: reconcile completed"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn supervisor(root: &Path) -> ProcessJobSupervisor {
        ProcessJobSupervisor::new(root.join("pids"), root.join("logs"))
    }

    fn sample_job(name: &str, pid: u32) -> JobEntity {
        JobEntity {
            name: name.to_string(),
            pid,
            metadata: json!({ "basename": "somechannel_2024-03-01T18_00_00Z_40001" }),
            started_at: Utc::now(),
            bin: Some("streamlink".to_string()),
            args: vec![],
        }
    }

    #[tokio::test]
    async fn reconcile_clears_dead_jobs_once() {
        let dir = tempfile::tempdir().unwrap();
        let supervisor = supervisor(dir.path());
        let job = sample_job("capture_dead", 2_147_483_000);
        supervisor.persist(&job).await.unwrap();

        let first = supervisor.reconcile_on_startup().await.unwrap();
        assert_eq!(first.cleared, vec!["capture_dead".to_string()]);
        assert!(!supervisor.job_path("capture_dead").exists());

        let second = supervisor.reconcile_on_startup().await.unwrap();
        assert_eq!(second, ReconcileReport::default());
    }

    #[tokio::test]
    async fn persist_leaves_no_temporary_file_behind() {
        let dir = tempfile::tempdir().unwrap();
        let supervisor = supervisor(dir.path());
        let job = sample_job("capture_atomic", 2_147_483_000);

        supervisor.persist(&job).await.unwrap();

        assert!(supervisor.job_path("capture_atomic").exists());
        assert!(!dir.path().join("pids/capture_atomic.json.tmp").exists());
        assert_eq!(supervisor.load("capture_atomic".to_string()).await.unwrap(), job);
    }

    #[tokio::test]
    async fn load_distinguishes_missing_and_empty_files() {
        let dir = tempfile::tempdir().unwrap();
        let supervisor = supervisor(dir.path());
        tokio::fs::create_dir_all(dir.path().join("pids")).await.unwrap();

        assert!(matches!(
            supervisor.load("nothing".to_string()).await,
            Err(JobLoadError::NoFile(_))
        ));

        tokio::fs::write(supervisor.job_path("empty"), b"").await.unwrap();
        assert!(matches!(
            supervisor.load("empty".to_string()).await,
            Err(JobLoadError::NoData(_))
        ));

        tokio::fs::write(supervisor.job_path("garbage"), b"{oops").await.unwrap();
        assert!(matches!(
            supervisor.load("garbage".to_string()).await,
            Err(JobLoadError::Corrupt { .. })
        ));
    }

    #[tokio::test]
    async fn failed_spawn_writes_no_file() {
        let dir = tempfile::tempdir().unwrap();
        let supervisor = supervisor(dir.path());

        let result = supervisor
            .spawn(SpawnJobModel {
                name: "capture_nope".to_string(),
                bin: dir.path().join("missing-binary"),
                args: vec![],
                metadata: json!({}),
            })
            .await;

        assert!(result.is_err());
        assert!(!supervisor.job_path("capture_nope").exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn spawned_job_is_persisted_then_cleared_on_exit() {
        let dir = tempfile::tempdir().unwrap();
        let supervisor = supervisor(dir.path());

        let job = supervisor
            .spawn(SpawnJobModel {
                name: "remux_test".to_string(),
                bin: PathBuf::from("sh"),
                args: vec!["-c".to_string(), "echo hello; exit 0".to_string()],
                metadata: json!({ "basename": "test" }),
            })
            .await
            .unwrap();
        assert!(supervisor.job_path("remux_test").exists());
        assert_eq!(supervisor.load("remux_test".to_string()).await.unwrap().pid, job.pid);

        let exit = supervisor.wait("remux_test".to_string()).await.unwrap();

        assert!(exit.success());
        assert!(!supervisor.job_path("remux_test").exists());
        assert_eq!(
            supervisor.status("remux_test".to_string()).await.unwrap(),
            JobStatus::Stopped
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn kill_terminates_live_job_and_clears_file() {
        let dir = tempfile::tempdir().unwrap();
        let supervisor = supervisor(dir.path());
        supervisor
            .spawn(SpawnJobModel {
                name: "chatdump_test".to_string(),
                bin: PathBuf::from("sleep"),
                args: vec!["30".to_string()],
                metadata: json!({}),
            })
            .await
            .unwrap();
        assert!(
            supervisor
                .status("chatdump_test".to_string())
                .await
                .unwrap()
                .is_running()
        );

        supervisor.kill("chatdump_test".to_string()).await.unwrap();

        assert!(!supervisor.job_path("chatdump_test").exists());
        assert_eq!(
            supervisor.status("chatdump_test".to_string()).await.unwrap(),
            JobStatus::Stopped
        );
    }
}
