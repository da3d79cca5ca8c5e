//! Data models for stemscribe-worker

pub mod stem;

pub use stem::{StemFailure, StemResult};
