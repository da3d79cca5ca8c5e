//! Job Record Store
//!
//! Source of truth for polling clients. Every implementation provides:
//! - `create`: fails with `Error::DuplicateId` if the id exists
//! - `get`: fails with `Error::NotFound` if absent
//! - `update`: atomic merge of the given fields plus `updated_at`,
//!   fails with `Error::NotFound` if absent
//!
//! Monotonic progress is not enforced here. The orchestrator is the only
//! writer for a job while it runs.

mod memory;

pub use crate::db::jobs::SqliteJobStore;
pub use memory::InMemoryJobStore;

use async_trait::async_trait;
use std::sync::Arc;
use stemscribe_common::{Job, JobUpdate, Result};
use uuid::Uuid;

/// Persistent key-value store of job state
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert a new job record
    async fn create(&self, job: &Job) -> Result<()>;

    /// Point lookup by id
    async fn get(&self, id: Uuid) -> Result<Job>;

    /// Merge a partial update into an existing record
    async fn update(&self, id: Uuid, update: &JobUpdate) -> Result<()>;
}

/// Store handle constructed once at startup and passed explicitly
pub type SharedJobStore = Arc<dyn JobStore>;
