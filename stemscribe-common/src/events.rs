//! Event system for StemScribe
//!
//! Pipeline events mirror every job-record write so in-process consumers
//! (the CLI progress display, tests) can follow a job without polling the store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::JobStatus;

/// Pipeline event types
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PipelineEvent {
    /// Job record created and handed to the scheduler
    JobSubmitted {
        job_id: Uuid,
        filename: String,
        timestamp: DateTime<Utc>,
    },

    /// Job record updated with new progress/message
    JobProgress {
        job_id: Uuid,
        status: JobStatus,
        progress: u8,
        message: String,
        timestamp: DateTime<Utc>,
    },

    /// A single stem failed a non-fatal stage
    StemFailed {
        job_id: Uuid,
        stem: String,
        /// Stage name ("transcription" or "notation")
        stage: String,
        error: String,
        timestamp: DateTime<Utc>,
    },

    /// Job reached `completed`
    JobCompleted {
        job_id: Uuid,
        output_path: String,
        timestamp: DateTime<Utc>,
    },

    /// Job reached `failed`
    JobFailed {
        job_id: Uuid,
        error: String,
        timestamp: DateTime<Utc>,
    },
}

impl PipelineEvent {
    /// Job this event belongs to
    pub fn job_id(&self) -> Uuid {
        match self {
            PipelineEvent::JobSubmitted { job_id, .. }
            | PipelineEvent::JobProgress { job_id, .. }
            | PipelineEvent::StemFailed { job_id, .. }
            | PipelineEvent::JobCompleted { job_id, .. }
            | PipelineEvent::JobFailed { job_id, .. } => *job_id,
        }
    }

    /// True for the last event a job ever emits
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PipelineEvent::JobCompleted { .. } | PipelineEvent::JobFailed { .. }
        )
    }
}

/// Central event distribution bus
///
/// Uses tokio::broadcast internally:
/// - Non-blocking publish (slow subscribers don't block the pipeline)
/// - Multiple concurrent subscribers
/// - Lagged message detection for slow subscribers
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<PipelineEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with the given channel capacity
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: PipelineEvent,
    ) -> Result<usize, broadcast::error::SendError<PipelineEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: PipelineEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1000)
    }
}
