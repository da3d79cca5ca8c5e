//! Job Scheduler
//!
//! Accepts jobs and runs each one's orchestrator as an independent tokio task.
//!
//! - At most `max_concurrent_jobs` pipelines run at once (semaphore permits)
//! - Jobs beyond that wait for a permit, up to `max_queued_jobs` waiting
//! - Past that ceiling `submit` is rejected before any record is created
//!
//! A panicking pipeline is caught and recorded as a failed job; it never
//! takes the scheduler or other jobs down.

use chrono::Utc;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use stemscribe_common::events::PipelineEvent;
use stemscribe_common::{Job, JobUpdate};
use tokio::sync::Semaphore;
use tokio_util::task::TaskTracker;
use uuid::Uuid;

use crate::config::SchedulerConfig;
use crate::error::SubmitError;
use crate::orchestrator::{JobContext, PipelineOrchestrator};
use crate::store::SharedJobStore;

/// Releases a job's queue reservation when its task ends, however it ends
struct Reservation(Arc<AtomicUsize>);

impl Drop for Reservation {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

#[derive(Clone)]
pub struct JobScheduler {
    store: SharedJobStore,
    orchestrator: PipelineOrchestrator,
    permits: Arc<Semaphore>,
    /// Submitted jobs not yet terminal (running + waiting)
    outstanding: Arc<AtomicUsize>,
    max_concurrent_jobs: usize,
    max_queued_jobs: usize,
    tasks: TaskTracker,
}

impl JobScheduler {
    pub fn new(store: SharedJobStore, orchestrator: PipelineOrchestrator, config: &SchedulerConfig) -> Self {
        let max_concurrent_jobs = config.max_concurrent_jobs.max(1);
        Self {
            store,
            orchestrator,
            permits: Arc::new(Semaphore::new(max_concurrent_jobs)),
            outstanding: Arc::new(AtomicUsize::new(0)),
            max_concurrent_jobs,
            max_queued_jobs: config.max_queued_jobs,
            tasks: TaskTracker::new(),
        }
    }

    pub fn max_concurrent_jobs(&self) -> usize {
        self.max_concurrent_jobs
    }

    /// Jobs submitted and not yet finished
    pub fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::Acquire)
    }

    fn capacity(&self) -> usize {
        self.max_concurrent_jobs + self.max_queued_jobs
    }

    /// Create the job record and launch its pipeline without waiting for it
    ///
    /// `job` must be a fresh pending record; `input_path` is its upload in the
    /// artifact store.
    pub async fn submit(&self, job: Job, input_path: PathBuf) -> Result<Uuid, SubmitError> {
        let limit = self.capacity();
        if self
            .outstanding
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| (n < limit).then_some(n + 1))
            .is_err()
        {
            tracing::warn!(filename = %job.filename, limit, "Submission rejected, queue full");
            return Err(SubmitError::QueueFull { limit });
        }
        let reservation = Reservation(Arc::clone(&self.outstanding));

        self.store.create(&job).await?;

        let job_id = job.id;
        self.orchestrator
            .event_bus()
            .emit_lossy(PipelineEvent::JobSubmitted {
                job_id,
                filename: job.filename.clone(),
                timestamp: Utc::now(),
            });

        tracing::info!(
            job_id = %job_id,
            filename = %job.filename,
            outstanding = self.outstanding(),
            "Job submitted"
        );

        let ctx = JobContext {
            job_id,
            filename: job.filename,
            input_path,
        };
        let permits = Arc::clone(&self.permits);
        let orchestrator = self.orchestrator.clone();
        let store = Arc::clone(&self.store);

        self.tasks.spawn(async move {
            let _reservation = reservation;

            let _permit = match permits.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    record_abandoned(&store, &orchestrator, job_id, "Scheduler closed before the job started").await;
                    return;
                }
            };

            tracing::debug!(job_id = %job_id, "Acquired pipeline slot");

            let outcome = AssertUnwindSafe(orchestrator.run(ctx)).catch_unwind().await;
            if outcome.is_err() {
                record_abandoned(&store, &orchestrator, job_id, "Internal error: pipeline task panicked").await;
            }
        });

        Ok(job_id)
    }

    /// Wait until every submitted job has reached a terminal state
    ///
    /// New submissions are still accepted afterwards.
    pub async fn wait_idle(&self) {
        self.tasks.close();
        self.tasks.wait().await;
        self.tasks.reopen();
    }
}

/// Mark a job failed when its pipeline never produced a terminal state itself
async fn record_abandoned(
    store: &SharedJobStore,
    orchestrator: &PipelineOrchestrator,
    job_id: Uuid,
    reason: &str,
) {
    tracing::error!(job_id = %job_id, reason, "Job abandoned");
    if let Err(e) = store.update(job_id, &JobUpdate::failed(reason)).await {
        tracing::error!(job_id = %job_id, error = %e, "Failed to record job failure");
    }
    orchestrator.event_bus().emit_lossy(PipelineEvent::JobFailed {
        job_id,
        error: reason.to_string(),
        timestamp: Utc::now(),
    });
}
