//! In-process job store for ephemeral runs and tests

use async_trait::async_trait;
use std::collections::HashMap;
use stemscribe_common::{Error, Job, JobUpdate, Result};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::JobStore;

/// Job store backed by a `RwLock<HashMap>`; contents are lost on restart
#[derive(Default)]
pub struct InMemoryJobStore {
    jobs: RwLock<HashMap<Uuid, Job>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records held
    pub async fn len(&self) -> usize {
        self.jobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.jobs.read().await.is_empty()
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn create(&self, job: &Job) -> Result<()> {
        let mut jobs = self.jobs.write().await;
        if jobs.contains_key(&job.id) {
            return Err(Error::DuplicateId(job.id.to_string()));
        }
        jobs.insert(job.id, job.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Job> {
        self.jobs
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("Job not found: {}", id)))
    }

    async fn update(&self, id: Uuid, update: &JobUpdate) -> Result<()> {
        let mut jobs = self.jobs.write().await;
        let job = jobs
            .get_mut(&id)
            .ok_or_else(|| Error::NotFound(format!("Job not found: {}", id)))?;
        job.apply(update);
        Ok(())
    }
}
