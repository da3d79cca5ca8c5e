//! Submission
//!
//! Entry point for new work: validate the file type, persist the raw upload
//! under a fresh job id, build the pending record and hand it to the scheduler.
//! A rejected submission leaves no record and no upload behind.

use std::path::{Path, PathBuf};
use stemscribe_common::Job;
use tokio::io::AsyncRead;
use uuid::Uuid;

use crate::artifacts::ArtifactStore;
use crate::config::ALLOWED_EXTENSIONS;
use crate::error::{SubmitError, ValidationError};
use crate::scheduler::JobScheduler;

/// Check `filename` against the allow-list
///
/// Returns the lowercased extension including the dot.
pub fn validate_extension(filename: &str) -> Result<String, ValidationError> {
    let name = Path::new(filename)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    if name.trim().is_empty() {
        return Err(ValidationError::EmptyFilename);
    }

    let extension = match Path::new(&name).extension().and_then(|e| e.to_str()) {
        Some(ext) if !ext.is_empty() => format!(".{}", ext.to_ascii_lowercase()),
        _ => {
            return Err(ValidationError::MissingExtension {
                filename: filename.to_string(),
            })
        }
    };

    if ALLOWED_EXTENSIONS.contains(&extension.as_str()) {
        Ok(extension)
    } else {
        Err(ValidationError::UnsupportedExtension {
            filename: filename.to_string(),
            extension,
        })
    }
}

/// Submit an upload stream named `filename`
pub async fn submit_upload<R>(
    scheduler: &JobScheduler,
    artifacts: &ArtifactStore,
    filename: &str,
    reader: R,
) -> Result<Uuid, SubmitError>
where
    R: AsyncRead + Unpin,
{
    let extension = validate_extension(filename)?;
    let job_id = Uuid::new_v4();

    let input_path = artifacts.persist_upload(job_id, &extension, reader).await?;
    enqueue(scheduler, artifacts, job_id, filename, input_path).await
}

/// Submit a file already on the local filesystem
pub async fn submit_file(
    scheduler: &JobScheduler,
    artifacts: &ArtifactStore,
    source: &Path,
) -> Result<Uuid, SubmitError> {
    let filename = source
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let extension = validate_extension(&filename)?;
    let job_id = Uuid::new_v4();

    let input_path = artifacts.import_file(job_id, &extension, source).await?;
    enqueue(scheduler, artifacts, job_id, &filename, input_path).await
}

async fn enqueue(
    scheduler: &JobScheduler,
    artifacts: &ArtifactStore,
    job_id: Uuid,
    filename: &str,
    input_path: PathBuf,
) -> Result<Uuid, SubmitError> {
    let outcome = match artifacts.create_job_dir(job_id).await {
        Ok(_) => {
            scheduler
                .submit(Job::with_id(job_id, filename), input_path.clone())
                .await
        }
        Err(e) => Err(e.into()),
    };

    if outcome.is_err() {
        discard(artifacts, job_id, &input_path).await;
    }
    outcome
}

async fn discard(artifacts: &ArtifactStore, job_id: Uuid, input_path: &Path) {
    if let Err(e) = tokio::fs::remove_file(input_path).await {
        tracing::warn!(job_id = %job_id, error = %e, "Failed to remove rejected upload");
    }
    let _ = tokio::fs::remove_dir(artifacts.job_dir(job_id)).await;
}
