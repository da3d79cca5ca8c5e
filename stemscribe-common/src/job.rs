//! Job data model
//!
//! A job is one end-to-end processing request for a single uploaded audio file.
//! Lifecycle: `pending → processing → {completed, failed}`. Terminal jobs are
//! never mutated again by the pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::Error;

/// Message written on a freshly submitted job
pub const PENDING_MESSAGE: &str = "File uploaded, waiting to process...";

/// Job status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Record created, waiting for a scheduler slot
    Pending,
    /// Owned by a running orchestrator
    Processing,
    /// Archive packaged and recorded on the job
    Completed,
    /// Fatal failure; `error` holds the cause
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    /// Completed and failed jobs are immutable
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// Allowed edges of the job state machine
    ///
    /// `pending → failed` is allowed so a job whose execution could not start
    /// (or a stale record found by a reconciliation pass) can be closed out.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, next),
            (Pending, Processing)
                | (Pending, Failed)
                | (Processing, Processing)
                | (Processing, Completed)
                | (Processing, Failed)
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "processing" => Ok(JobStatus::Processing),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            other => Err(Error::Internal(format!("Unknown job status: {}", other))),
        }
    }
}

/// Persistent job record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    /// Original submitted file name
    pub filename: String,
    pub status: JobStatus,
    /// 0-100, non-decreasing while processing
    pub progress: u8,
    pub message: String,
    /// Packaged archive, set only when completed
    pub output_path: Option<String>,
    /// Failure cause, set only when failed
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// Create a pending job with a fresh identifier
    pub fn new(filename: impl Into<String>) -> Self {
        Self::with_id(Uuid::new_v4(), filename)
    }

    /// Create a pending job for an identifier allocated elsewhere
    /// (the submission path names the upload after the id before the record exists)
    pub fn with_id(id: Uuid, filename: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id,
            filename: filename.into(),
            status: JobStatus::Pending,
            progress: 0,
            message: PENDING_MESSAGE.to_string(),
            output_path: None,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Merge a partial update into this record and bump `updated_at`
    pub fn apply(&mut self, update: &JobUpdate) {
        if let Some(status) = update.status {
            self.status = status;
        }
        if let Some(progress) = update.progress {
            self.progress = progress.min(100);
        }
        if let Some(message) = &update.message {
            self.message = message.clone();
        }
        if let Some(output_path) = &update.output_path {
            self.output_path = Some(output_path.clone());
        }
        if let Some(error) = &update.error {
            self.error = Some(error.clone());
        }
        self.updated_at = Utc::now();
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// Partial update merged atomically by the job store
///
/// `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobUpdate {
    pub status: Option<JobStatus>,
    pub progress: Option<u8>,
    pub message: Option<String>,
    pub output_path: Option<String>,
    pub error: Option<String>,
}

impl JobUpdate {
    /// Progress tick within the current stage
    pub fn progress(progress: u8, message: impl Into<String>) -> Self {
        Self {
            progress: Some(progress),
            message: Some(message.into()),
            ..Default::default()
        }
    }

    /// `pending → processing`
    pub fn processing(progress: u8, message: impl Into<String>) -> Self {
        Self {
            status: Some(JobStatus::Processing),
            ..Self::progress(progress, message)
        }
    }

    /// Terminal success: progress pinned to 100 together with the archive path
    pub fn completed(output_path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status: Some(JobStatus::Completed),
            progress: Some(100),
            message: Some(message.into()),
            output_path: Some(output_path.into()),
            error: None,
        }
    }

    /// Terminal failure: progress is deliberately left untouched
    pub fn failed(error: impl Into<String>) -> Self {
        let error = error.into();
        Self {
            status: Some(JobStatus::Failed),
            progress: None,
            message: Some(format!("Processing failed: {}", error)),
            output_path: None,
            error: Some(error),
        }
    }
}

/// Polling view returned to clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobStatusView {
    pub id: Uuid,
    pub filename: String,
    pub status: JobStatus,
    pub progress: u8,
    pub message: String,
    /// Archive file name (not the server-side path)
    pub output_file: Option<String>,
    pub error: Option<String>,
}

impl From<&Job> for JobStatusView {
    fn from(job: &Job) -> Self {
        let output_file = job.output_path.as_ref().map(|path| {
            std::path::Path::new(path)
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.clone())
        });

        Self {
            id: job.id,
            filename: job.filename.clone(),
            status: job.status,
            progress: job.progress,
            message: job.message.clone(),
            output_file,
            error: job.error.clone(),
        }
    }
}
