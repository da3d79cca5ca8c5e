//! Stage Runners
//!
//! One adapter per external engine (separation, transcription, notation
//! export). Each takes input path(s) plus an output directory and returns the
//! produced files or a typed [`StageError`].
//!
//! Runners:
//! - write only into the output directory they are given
//! - are safe to call concurrently for different stems or jobs
//! - never retry; a failed unit is reported once

mod command;
mod process;

pub use command::CommandRunner;
pub use process::run_engine;

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

use crate::config::EnginesConfig;
use crate::progress::Stage;

/// Stage runner failures
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StageError {
    /// Engine binary missing or could not be started
    #[error("{engine} is unavailable: {reason}")]
    EngineUnavailable { engine: String, reason: String },

    /// Input missing, unreadable or of a kind the engine cannot take
    #[error("Unsupported input {}: {reason}", path.display())]
    UnsupportedInput { path: PathBuf, reason: String },

    /// Engine exceeded its time limit and was killed
    #[error("{engine} timed out after {timeout_secs}s")]
    Timeout { engine: String, timeout_secs: u64 },

    /// Engine exited non-zero, or exited zero without the expected output
    #[error("{engine} failed (exit code {code:?}): {detail}")]
    NonZeroExit {
        engine: String,
        code: Option<i32>,
        detail: String,
    },
}

/// Shared contract over the three external engines
#[async_trait]
pub trait StageRunner: Send + Sync {
    /// Stage this runner serves
    fn stage(&self) -> Stage;

    /// Engine name for logs and error messages
    fn engine_name(&self) -> &str;

    /// Invoke the engine on `inputs`, writing into `output_dir`
    ///
    /// Returns the produced files, sorted by path. An empty result is never
    /// returned as success.
    async fn run(&self, inputs: &[PathBuf], output_dir: &Path) -> Result<Vec<PathBuf>, StageError>;
}

/// The three runners an orchestrator drives
#[derive(Clone)]
pub struct StageRunners {
    pub separation: Arc<dyn StageRunner>,
    pub transcription: Arc<dyn StageRunner>,
    pub notation: Arc<dyn StageRunner>,
}

impl StageRunners {
    pub fn new(
        separation: Arc<dyn StageRunner>,
        transcription: Arc<dyn StageRunner>,
        notation: Arc<dyn StageRunner>,
    ) -> Self {
        let runners = Self {
            separation,
            transcription,
            notation,
        };
        for (slot, runner) in runners.misassigned() {
            tracing::warn!(
                slot = %slot,
                engine = %runner.engine_name(),
                serves = %runner.stage(),
                "Runner installed for a stage it does not serve"
            );
        }
        runners
    }

    /// Runner for a per-stem or separation stage; packaging has none
    pub fn for_stage(&self, stage: Stage) -> Option<&Arc<dyn StageRunner>> {
        match stage {
            Stage::Separation => Some(&self.separation),
            Stage::Transcription => Some(&self.transcription),
            Stage::Notation => Some(&self.notation),
            Stage::Packaging => None,
        }
    }

    /// Slots holding a runner that reports a different stage
    pub fn misassigned(&self) -> Vec<(Stage, &Arc<dyn StageRunner>)> {
        [Stage::Separation, Stage::Transcription, Stage::Notation]
            .into_iter()
            .filter_map(|slot| {
                self.for_stage(slot)
                    .filter(|runner| runner.stage() != slot)
                    .map(|runner| (slot, runner))
            })
            .collect()
    }

    /// Subprocess runners built from the engine configuration
    pub fn from_config(engines: &EnginesConfig) -> Self {
        Self {
            separation: Arc::new(CommandRunner::new(
                Stage::Separation,
                engines.separation.clone(),
            )),
            transcription: Arc::new(CommandRunner::new(
                Stage::Transcription,
                engines.transcription.clone(),
            )),
            notation: Arc::new(CommandRunner::new(Stage::Notation, engines.notation.clone())),
        }
    }
}
