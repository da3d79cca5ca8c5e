//! stemscribe-worker library interface
//!
//! Asynchronous audio job pipeline: separation → per-stem transcription →
//! notation export → packaging, with a persistent job store for polling
//! clients and a bounded scheduler.

pub mod artifacts;
pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod models;
pub mod orchestrator;
pub mod packager;
pub mod progress;
pub mod retrieval;
pub mod runners;
pub mod scheduler;
pub mod store;
pub mod submission;
pub mod utils;

pub use crate::error::{RetrievalError, SubmitError, ValidationError};

use std::path::{Path, PathBuf};
use std::sync::Arc;
use stemscribe_common::events::{EventBus, PipelineEvent};
use stemscribe_common::JobStatusView;
use tokio::io::AsyncRead;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::artifacts::ArtifactStore;
use crate::config::WorkerConfig;
use crate::orchestrator::PipelineOrchestrator;
use crate::runners::StageRunners;
use crate::scheduler::JobScheduler;
use crate::store::{SharedJobStore, SqliteJobStore};

/// Wired-up worker: one store, one artifact root, one scheduler
#[derive(Clone)]
pub struct Worker {
    store: SharedJobStore,
    artifacts: ArtifactStore,
    scheduler: JobScheduler,
    event_bus: EventBus,
}

impl Worker {
    /// Assemble a worker from explicit parts
    pub fn new(
        store: SharedJobStore,
        artifacts: ArtifactStore,
        runners: StageRunners,
        event_bus: EventBus,
        config: &WorkerConfig,
    ) -> Self {
        let orchestrator = PipelineOrchestrator::new(
            Arc::clone(&store),
            artifacts.clone(),
            runners,
            event_bus.clone(),
            config.pipeline.clone(),
        );
        let scheduler = JobScheduler::new(Arc::clone(&store), orchestrator, &config.scheduler);

        Self {
            store,
            artifacts,
            scheduler,
            event_bus,
        }
    }

    /// Production wiring: SQLite store at `database_path`, subprocess engines
    pub async fn open(root: &Path, database_path: &Path, config: &WorkerConfig) -> anyhow::Result<Self> {
        let artifacts = ArtifactStore::new(root);
        artifacts.init().await?;

        let pool = db::init_database_pool(database_path).await?;
        let store: SharedJobStore = Arc::new(
            SqliteJobStore::new(pool).with_max_lock_wait(config.database.max_lock_wait_ms),
        );

        Ok(Self::new(
            store,
            artifacts,
            StageRunners::from_config(&config.engines),
            EventBus::default(),
            config,
        ))
    }

    pub fn store(&self) -> &SharedJobStore {
        &self.store
    }

    pub fn artifacts(&self) -> &ArtifactStore {
        &self.artifacts
    }

    pub fn scheduler(&self) -> &JobScheduler {
        &self.scheduler
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.event_bus.subscribe()
    }

    pub async fn submit_file(&self, source: &Path) -> Result<Uuid, SubmitError> {
        submission::submit_file(&self.scheduler, &self.artifacts, source).await
    }

    pub async fn submit_upload<R>(&self, filename: &str, reader: R) -> Result<Uuid, SubmitError>
    where
        R: AsyncRead + Unpin,
    {
        submission::submit_upload(&self.scheduler, &self.artifacts, filename, reader).await
    }

    pub async fn status(&self, id: Uuid) -> Result<JobStatusView, RetrievalError> {
        retrieval::job_status(self.store.as_ref(), id).await
    }

    pub async fn fetch(&self, id: Uuid) -> Result<PathBuf, RetrievalError> {
        retrieval::deliverable_path(self.store.as_ref(), id).await
    }

    /// Block until every submitted job is terminal
    pub async fn wait_idle(&self) {
        self.scheduler.wait_idle().await;
    }
}
