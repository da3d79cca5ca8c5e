//! # StemScribe Common Library
//!
//! Shared code for the StemScribe crates including:
//! - Job data model (status, partial updates, polling view)
//! - Event types (PipelineEvent) and the EventBus
//! - Configuration loading and root folder resolution
//! - Common error type

pub mod config;
pub mod error;
pub mod events;
pub mod job;

pub use error::{Error, Result};
pub use job::{Job, JobStatus, JobStatusView, JobUpdate};
