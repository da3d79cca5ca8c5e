//! Test Helper Utilities
//!
//! Shared utilities for stemscribe-worker integration tests

#![allow(dead_code)]

pub mod audio_generator;
pub mod fake_runners;

pub use audio_generator::{generate_mono_wav, generate_test_wav, AudioConfig};
pub use fake_runners::{runners, succeeding_runners, ConcurrencyProbe, FakeRunner};

use std::sync::Arc;
use std::time::Duration;
use stemscribe_common::events::{EventBus, PipelineEvent};
use stemscribe_common::JobStatusView;
use stemscribe_worker::artifacts::ArtifactStore;
use stemscribe_worker::config::WorkerConfig;
use stemscribe_worker::runners::StageRunners;
use stemscribe_worker::store::{InMemoryJobStore, SharedJobStore};
use stemscribe_worker::Worker;
use tempfile::TempDir;
use tokio::sync::broadcast;
use uuid::Uuid;

/// Worker over a temporary root folder
///
/// `dir` must stay alive for the duration of the test.
pub struct TestEnv {
    pub dir: TempDir,
    pub worker: Worker,
}

impl TestEnv {
    /// In-memory store, default configuration
    pub async fn new(runners: StageRunners) -> Self {
        Self::with_config(runners, WorkerConfig::default()).await
    }

    pub async fn with_config(runners: StageRunners, config: WorkerConfig) -> Self {
        let dir = TempDir::new().expect("create temp root");
        let store: SharedJobStore = Arc::new(InMemoryJobStore::new());
        Self::with_store(dir, store, runners, config).await
    }

    pub async fn with_store(
        dir: TempDir,
        store: SharedJobStore,
        runners: StageRunners,
        config: WorkerConfig,
    ) -> Self {
        let artifacts = ArtifactStore::new(dir.path().join("root"));
        artifacts.init().await.expect("init artifact store");
        let worker = Worker::new(store, artifacts, runners, EventBus::new(4096), &config);
        Self { dir, worker }
    }

    /// 3-second mono WAV named `name` in the temp dir (outside the artifact root)
    pub fn input_wav(&self, name: &str) -> std::path::PathBuf {
        let inputs = self.dir.path().join("inputs");
        std::fs::create_dir_all(&inputs).expect("create inputs dir");
        generate_mono_wav(&inputs, name)
    }
}

/// Poll until the job is terminal, returning every view observed
///
/// Panics if the job is still running after `timeout`.
pub async fn poll_until_terminal(worker: &Worker, id: Uuid, timeout: Duration) -> Vec<JobStatusView> {
    let deadline = tokio::time::Instant::now() + timeout;
    let mut observed = Vec::new();
    loop {
        let view = worker.status(id).await.expect("job status");
        let terminal = view.status.is_terminal();
        observed.push(view);
        if terminal {
            return observed;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "job {} not terminal after {:?}",
            id,
            timeout
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Drain every event already delivered to `rx` for `job_id`
pub fn drain_events(rx: &mut broadcast::Receiver<PipelineEvent>, job_id: Uuid) -> Vec<PipelineEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        if event.job_id() == job_id {
            events.push(event);
        }
    }
    events
}

/// Sorted entry names of a zip archive
pub fn archive_entries(path: &std::path::Path) -> Vec<String> {
    let file = std::fs::File::open(path).expect("open archive");
    let archive = zip::ZipArchive::new(file).expect("read archive");
    let mut names: Vec<String> = archive.file_names().map(|s| s.to_string()).collect();
    names.sort();
    names
}
