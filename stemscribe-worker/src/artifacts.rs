//! Artifact Store
//!
//! Filesystem layout under the root folder:
//!
//! ```text
//! <root>/uploads/<job_id><ext>                  raw upload
//! <root>/processed/<job_id>/separated/          separation engine output
//! <root>/processed/<job_id>/transcription/<stem>/
//! <root>/processed/<job_id>/notation/<stem>/
//! <root>/processed/<job_id>/<name>_processed.zip
//! ```
//!
//! A job's `processed/<job_id>` directory is written only by that job's
//! orchestrator. Nothing here deletes per-job data; retention is external.

use std::path::{Path, PathBuf};
use stemscribe_common::Result;
use tokio::io::{AsyncRead, AsyncWriteExt};
use uuid::Uuid;

use crate::progress::Stage;

#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Create the top-level `uploads/` and `processed/` directories
    pub async fn init(&self) -> Result<()> {
        tokio::fs::create_dir_all(self.uploads_dir()).await?;
        tokio::fs::create_dir_all(self.processed_dir()).await?;
        Ok(())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn uploads_dir(&self) -> PathBuf {
        self.root.join("uploads")
    }

    pub fn processed_dir(&self) -> PathBuf {
        self.root.join("processed")
    }

    /// Where the raw upload for `job_id` is kept; `extension` includes the dot
    pub fn upload_path(&self, job_id: Uuid, extension: &str) -> PathBuf {
        self.uploads_dir().join(format!("{}{}", job_id, extension))
    }

    pub fn job_dir(&self, job_id: Uuid) -> PathBuf {
        self.processed_dir().join(job_id.to_string())
    }

    /// Working directory for one stage of one job
    ///
    /// Per-stem stages get a directory per stem so output discovery never
    /// sees another stem's files.
    pub fn stage_dir(&self, job_id: Uuid, stage: Stage, stem: Option<&str>) -> PathBuf {
        let dir = match stage {
            Stage::Separation => self.job_dir(job_id).join("separated"),
            Stage::Transcription => self.job_dir(job_id).join("transcription"),
            Stage::Notation => self.job_dir(job_id).join("notation"),
            Stage::Packaging => self.job_dir(job_id),
        };
        match stem {
            Some(stem) => dir.join(stem),
            None => dir,
        }
    }

    /// Create the per-job directory (done at submission)
    pub async fn create_job_dir(&self, job_id: Uuid) -> Result<PathBuf> {
        let dir = self.job_dir(job_id);
        tokio::fs::create_dir_all(&dir).await?;
        Ok(dir)
    }

    /// Stream an upload into the store
    pub async fn persist_upload<R>(&self, job_id: Uuid, extension: &str, mut reader: R) -> Result<PathBuf>
    where
        R: AsyncRead + Unpin,
    {
        tokio::fs::create_dir_all(self.uploads_dir()).await?;
        let path = self.upload_path(job_id, extension);
        let mut file = tokio::fs::File::create(&path).await?;
        let bytes = tokio::io::copy(&mut reader, &mut file).await?;
        file.flush().await?;

        tracing::debug!(job_id = %job_id, path = %path.display(), bytes, "Upload persisted");
        Ok(path)
    }

    /// Copy a local file into the store as the upload for `job_id`
    pub async fn import_file(&self, job_id: Uuid, extension: &str, source: &Path) -> Result<PathBuf> {
        let file = tokio::fs::File::open(source).await?;
        self.persist_upload(job_id, extension, file).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_layout() {
        let store = ArtifactStore::new("/data");
        let id = Uuid::nil();
        assert_eq!(
            store.upload_path(id, ".wav"),
            PathBuf::from("/data/uploads/00000000-0000-0000-0000-000000000000.wav")
        );
        assert_eq!(
            store.stage_dir(id, Stage::Transcription, Some("bass")),
            PathBuf::from("/data/processed/00000000-0000-0000-0000-000000000000/transcription/bass")
        );
        assert_eq!(store.stage_dir(id, Stage::Packaging, None), store.job_dir(id));
    }

    #[tokio::test]
    async fn test_persist_upload_writes_bytes() {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(dir.path());
        store.init().await.unwrap();

        let id = Uuid::new_v4();
        let path = store
            .persist_upload(id, ".mp3", &b"ID3 fake audio"[..])
            .await
            .unwrap();

        assert_eq!(path, store.upload_path(id, ".mp3"));
        assert_eq!(std::fs::read(&path).unwrap(), b"ID3 fake audio");
    }
}
