//! Pipeline orchestrator
//!
//! Drives one job through its stages and is the only writer of that job's
//! record once it is processing.
//!
//! # Stage Progression
//! SEPARATION (0-10) → TRANSCRIPTION (10-60) → NOTATION (60-90) → PACKAGING (90-100)
//!
//! Each stage lives in its own `phase_*` module. Separation and packaging
//! failures are fatal; per-stem transcription and notation failures are
//! absorbed according to [`StemFailurePolicy`](crate::config::StemFailurePolicy).
//!
//! [`PipelineOrchestrator::run`] never returns an error: every fatal failure
//! ends as `status=failed` on the job record.

use chrono::Utc;
use std::path::PathBuf;
use stemscribe_common::events::{EventBus, PipelineEvent};
use stemscribe_common::{JobStatus, JobUpdate};
use thiserror::Error;
use uuid::Uuid;

use crate::artifacts::ArtifactStore;
use crate::config::PipelineConfig;
use crate::packager::PackagingError;
use crate::progress::{ProgressTracker, Stage};
use crate::runners::{StageError, StageRunners};
use crate::store::SharedJobStore;

mod phase_packaging;
mod phase_separation;
mod phase_stems;

/// Fatal pipeline failures (recorded on the job, never raised to the scheduler)
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Separation failed: {0}")]
    Separation(StageError),

    #[error("Separation produced no stems")]
    NoStems,

    #[error("All {total} stems failed {stage}")]
    AllStemsFailed { stage: Stage, total: usize },

    #[error("Stem {stem} failed {stage}: {error}")]
    StemFailed {
        stem: String,
        stage: Stage,
        error: StageError,
    },

    #[error("Packaging failed: {0}")]
    Packaging(#[from] PackagingError),

    #[error("Job store error: {0}")]
    Store(#[from] stemscribe_common::Error),
}

/// Everything one execution needs to know about its job
#[derive(Debug, Clone)]
pub struct JobContext {
    pub job_id: Uuid,
    /// Original file name as submitted (names the archive)
    pub filename: String,
    /// Raw upload in the artifact store
    pub input_path: PathBuf,
}

/// Stage sequencing for a single job
#[derive(Clone)]
pub struct PipelineOrchestrator {
    store: SharedJobStore,
    artifacts: ArtifactStore,
    runners: StageRunners,
    event_bus: EventBus,
    config: PipelineConfig,
}

impl PipelineOrchestrator {
    pub fn new(
        store: SharedJobStore,
        artifacts: ArtifactStore,
        runners: StageRunners,
        event_bus: EventBus,
        config: PipelineConfig,
    ) -> Self {
        Self {
            store,
            artifacts,
            runners,
            event_bus,
            config,
        }
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    /// Execute the full pipeline for one job
    ///
    /// Returns the terminal status written to the record.
    pub async fn run(&self, ctx: JobContext) -> JobStatus {
        let start_time = std::time::Instant::now();
        let mut tracker = ProgressTracker::new();

        tracing::info!(
            job_id = %ctx.job_id,
            filename = %ctx.filename,
            "Starting pipeline"
        );

        match self.execute(&ctx, &mut tracker).await {
            Ok(archive) => {
                tracing::info!(
                    job_id = %ctx.job_id,
                    archive = %archive.display(),
                    duration_ms = start_time.elapsed().as_millis() as u64,
                    "Pipeline completed"
                );
                JobStatus::Completed
            }
            Err(e) => {
                tracing::error!(
                    job_id = %ctx.job_id,
                    progress = tracker.current(),
                    duration_ms = start_time.elapsed().as_millis() as u64,
                    error = %e,
                    "Pipeline failed"
                );
                self.mark_failed(ctx.job_id, &e).await;
                JobStatus::Failed
            }
        }
    }

    async fn execute(
        &self,
        ctx: &JobContext,
        tracker: &mut ProgressTracker,
    ) -> Result<PathBuf, PipelineError> {
        self.store
            .update(
                ctx.job_id,
                &JobUpdate::processing(tracker.current(), "Separating audio into stems"),
            )
            .await?;
        self.emit_progress(ctx.job_id, JobStatus::Processing, tracker.current(), "Separating audio into stems");

        // Phase 1: SEPARATION
        let mut stems = self.phase_separation(ctx, tracker).await?;

        // Phase 2: TRANSCRIPTION
        self.phase_stems(ctx, Stage::Transcription, &mut stems, tracker)
            .await?;

        // Phase 3: NOTATION
        self.phase_stems(ctx, Stage::Notation, &mut stems, tracker)
            .await?;

        // Phase 4: PACKAGING
        self.phase_packaging(ctx, &stems, tracker).await
    }

    /// Write a progress tick to the store, then mirror it on the event bus
    ///
    /// The tracker clamps the value so a poller never sees a regression.
    pub(super) async fn record_progress(
        &self,
        job_id: Uuid,
        tracker: &mut ProgressTracker,
        candidate: u8,
        message: String,
    ) -> Result<(), PipelineError> {
        let progress = tracker.advance(candidate);
        self.store
            .update(job_id, &JobUpdate::progress(progress, message.clone()))
            .await?;
        self.emit_progress(job_id, JobStatus::Processing, progress, &message);
        Ok(())
    }

    fn emit_progress(&self, job_id: Uuid, status: JobStatus, progress: u8, message: &str) {
        self.event_bus.emit_lossy(PipelineEvent::JobProgress {
            job_id,
            status,
            progress,
            message: message.to_string(),
            timestamp: Utc::now(),
        });
    }

    /// Terminal failure write; progress keeps its last value
    async fn mark_failed(&self, job_id: Uuid, error: &PipelineError) {
        let error = error.to_string();
        if let Err(e) = self.store.update(job_id, &JobUpdate::failed(error.clone())).await {
            // Record stays `processing`; a reconciliation pass can fail it later
            tracing::error!(job_id = %job_id, error = %e, "Failed to record job failure");
        }
        self.event_bus.emit_lossy(PipelineEvent::JobFailed {
            job_id,
            error,
            timestamp: Utc::now(),
        });
    }
}
