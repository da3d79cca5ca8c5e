//! Polling and retrieval
//!
//! Read-only views over the job store. Retrieval hands out the archive only
//! for a completed job whose archive is still on disk.

use std::path::PathBuf;
use stemscribe_common::{JobStatus, JobStatusView};
use uuid::Uuid;

use crate::error::RetrievalError;
use crate::store::JobStore;

/// Current status of a job, as shown to polling clients
pub async fn job_status(store: &dyn JobStore, id: Uuid) -> Result<JobStatusView, RetrievalError> {
    let job = store
        .get(id)
        .await
        .map_err(|e| RetrievalError::from_store(id, e))?;
    Ok(JobStatusView::from(&job))
}

/// Path of the finished archive
pub async fn deliverable_path(store: &dyn JobStore, id: Uuid) -> Result<PathBuf, RetrievalError> {
    let job = store
        .get(id)
        .await
        .map_err(|e| RetrievalError::from_store(id, e))?;

    match job.status {
        JobStatus::Completed => {}
        JobStatus::Failed => {
            return Err(RetrievalError::Failed {
                id,
                error: job.error.unwrap_or_else(|| "unknown error".to_string()),
            })
        }
        status => return Err(RetrievalError::NotReady { id, status }),
    }

    let path = match job.output_path {
        Some(path) => PathBuf::from(path),
        None => {
            return Err(RetrievalError::ArchiveMissing {
                id,
                path: PathBuf::new(),
            })
        }
    };

    match tokio::fs::metadata(&path).await {
        Ok(meta) if meta.is_file() => Ok(path),
        _ => {
            tracing::warn!(job_id = %id, path = %path.display(), "Completed job archive missing");
            Err(RetrievalError::ArchiveMissing { id, path })
        }
    }
}
