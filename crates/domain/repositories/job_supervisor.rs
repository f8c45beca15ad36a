use anyhow::Result;
use async_trait::async_trait;
use mockall::automock;

use crate::domain::{
    entities::jobs::JobEntity,
    errors::JobLoadError,
    value_objects::{
        enums::job_statuses::JobStatus,
        jobs::{JobExit, ReconcileReport, SpawnJobModel},
    },
};

#[async_trait]
#[automock]
pub trait JobSupervisor {
    /// Starts the process and persists its job file. No file is written when spawning fails.
    async fn spawn(&self, request: SpawnJobModel) -> Result<JobEntity>;

    /// Suspends until a job spawned by this instance exits, then clears it.
    async fn wait(&self, name: String) -> Result<JobExit>;

    async fn load(&self, name: String) -> std::result::Result<JobEntity, JobLoadError>;

    /// Polls the OS process table; any failure to ask counts as stopped.
    async fn status(&self, name: String) -> Result<JobStatus>;

    async fn kill(&self, name: String) -> Result<()>;

    async fn clear(&self, name: String) -> Result<()>;

    async fn reconcile_on_startup(&self) -> Result<ReconcileReport>;
}
