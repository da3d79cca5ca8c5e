//! Error types for the submission, polling and retrieval boundary

use std::path::PathBuf;
use stemscribe_common::JobStatus;
use thiserror::Error;
use uuid::Uuid;

/// Bad input rejected before a job exists
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("No file name given")]
    EmptyFilename,

    #[error("File {filename} has no extension")]
    MissingExtension { filename: String },

    /// Extension outside the allow-list
    #[error("Unsupported file type {extension} for {filename} (allowed: .mp3 .wav .flac .ogg .m4a)")]
    UnsupportedExtension { filename: String, extension: String },
}

/// Submission failures; none of them leave a job record behind
#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("Invalid submission: {0}")]
    Validation(#[from] ValidationError),

    /// Hard queue ceiling reached
    #[error("Job queue is full ({limit} jobs outstanding), try again later")]
    QueueFull { limit: usize },

    #[error("Could not store submission: {0}")]
    Store(#[from] stemscribe_common::Error),
}

/// Retrieval refusals
#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("Job {0} not found")]
    NotFound(Uuid),

    /// Still pending or processing
    #[error("Job {id} is not finished yet (status: {status})")]
    NotReady { id: Uuid, status: JobStatus },

    #[error("Job {id} failed: {error}")]
    Failed { id: Uuid, error: String },

    /// Record says completed but the archive is gone
    #[error("Archive for job {id} is missing at {}", path.display())]
    ArchiveMissing { id: Uuid, path: PathBuf },

    #[error("Job store error: {0}")]
    Store(stemscribe_common::Error),
}

impl RetrievalError {
    pub(crate) fn from_store(id: Uuid, err: stemscribe_common::Error) -> Self {
        match err {
            stemscribe_common::Error::NotFound(_) => RetrievalError::NotFound(id),
            other => RetrievalError::Store(other),
        }
    }
}
