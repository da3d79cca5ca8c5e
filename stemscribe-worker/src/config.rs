//! Configuration for stemscribe-worker
//!
//! Resolution order for every setting: CLI flag → environment → TOML → default.
//! The TOML file lives at `~/.config/stemscribe/stemscribe-worker.toml` unless
//! `--config` or `STEMSCRIBE_CONFIG` points elsewhere.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use stemscribe_common::config::{load_toml_config, write_toml_config, LoggingConfig};
use stemscribe_common::{Error, Result};
use tracing::{info, warn};

/// Module name used for the default config file name
pub const MODULE_NAME: &str = "stemscribe-worker";

/// Upload extensions accepted by the submission path
pub const ALLOWED_EXTENSIONS: &[&str] = &[".mp3", ".wav", ".flac", ".ogg", ".m4a"];

/// Inline notation exporter run with `python3 -c`: reads a MIDI file, writes MusicXML
const MUSIC21_EXPORT_SCRIPT: &str = "import sys, pathlib\n\
from music21 import converter\n\
src = pathlib.Path(sys.argv[1])\n\
out = pathlib.Path(sys.argv[2])\n\
out.mkdir(parents=True, exist_ok=True)\n\
converter.parse(str(src)).write('musicxml', fp=str(out / (src.stem + '.musicxml')))\n";

/// Complete worker configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Artifact + database root; resolved through `RootFolderResolver`
    pub root_folder: Option<PathBuf>,
    pub logging: LoggingConfig,
    pub scheduler: SchedulerConfig,
    pub pipeline: PipelineConfig,
    pub database: DatabaseConfig,
    pub engines: EnginesConfig,
}

/// Job scheduler bounds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Orchestrator executions allowed to run at once
    pub max_concurrent_jobs: usize,
    /// Jobs allowed to wait for a slot before submissions are rejected
    pub max_queued_jobs: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 2,
            max_queued_jobs: 32,
        }
    }
}

/// What a per-stem transcription/notation failure does to the job
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StemFailurePolicy {
    /// Record the failure on the stem and keep going
    #[default]
    Continue,
    /// Treat any per-stem failure as fatal
    FailJob,
}

/// Per-job pipeline behaviour
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Stems processed in parallel within one job (1 = sequential)
    pub stem_concurrency: usize,
    pub stem_failure_policy: StemFailurePolicy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            stem_concurrency: 1,
            stem_failure_policy: StemFailurePolicy::Continue,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Total time a write may spend retrying on SQLite lock contention
    pub max_lock_wait_ms: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            max_lock_wait_ms: crate::db::jobs::DEFAULT_MAX_LOCK_WAIT_MS,
        }
    }
}

/// External engine invocation
///
/// `args` may contain `{input}` (first input path), `{inputs}` (expands to all
/// input paths) and `{output_dir}` placeholders.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    pub program: String,
    pub args: Vec<String>,
    /// Extension (without dot) of the files the engine is expected to produce
    pub output_extension: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnginesConfig {
    pub separation: EngineConfig,
    pub transcription: EngineConfig,
    pub notation: EngineConfig,
}

impl Default for EnginesConfig {
    fn default() -> Self {
        Self {
            // 6-stem model: drums, bass, other, vocals, guitar, piano
            separation: EngineConfig {
                program: "demucs".to_string(),
                args: vec![
                    "-n".to_string(),
                    "htdemucs_6s".to_string(),
                    "-o".to_string(),
                    "{output_dir}".to_string(),
                    "{input}".to_string(),
                ],
                output_extension: "wav".to_string(),
                timeout_secs: 1800,
            },
            transcription: EngineConfig {
                program: "basic-pitch".to_string(),
                args: vec!["{output_dir}".to_string(), "{input}".to_string()],
                output_extension: "mid".to_string(),
                timeout_secs: 600,
            },
            notation: EngineConfig {
                program: "python3".to_string(),
                args: vec![
                    "-c".to_string(),
                    MUSIC21_EXPORT_SCRIPT.to_string(),
                    "{input}".to_string(),
                    "{output_dir}".to_string(),
                ],
                output_extension: "musicxml".to_string(),
                timeout_secs: 300,
            },
        }
    }
}

impl WorkerConfig {
    /// Load from TOML (missing file → defaults), then apply environment overrides
    pub fn load(path: &Path) -> Result<Self> {
        let mut config: WorkerConfig = load_toml_config(path)?;
        config.apply_env_overrides();
        config.validate()?;
        info!(
            path = %path.display(),
            max_concurrent_jobs = config.scheduler.max_concurrent_jobs,
            stem_concurrency = config.pipeline.stem_concurrency,
            "Worker configuration loaded"
        );
        Ok(config)
    }

    /// Write this configuration to `path`, creating parent directories
    pub fn save(&self, path: &Path) -> Result<()> {
        self.validate()?;
        write_toml_config(self, path)?;
        info!(path = %path.display(), "Worker configuration written");
        Ok(())
    }

    /// `STEMSCRIBE_*` environment overrides for scalar settings
    pub fn apply_env_overrides(&mut self) {
        if let Some(value) = env_usize("STEMSCRIBE_MAX_CONCURRENT_JOBS") {
            self.scheduler.max_concurrent_jobs = value;
        }
        if let Some(value) = env_usize("STEMSCRIBE_MAX_QUEUED_JOBS") {
            self.scheduler.max_queued_jobs = value;
        }
        if let Some(value) = env_usize("STEMSCRIBE_STEM_CONCURRENCY") {
            self.pipeline.stem_concurrency = value;
        }
        if let Ok(value) = std::env::var("STEMSCRIBE_STEM_FAILURE_POLICY") {
            match value.trim() {
                "continue" => self.pipeline.stem_failure_policy = StemFailurePolicy::Continue,
                "fail_job" => self.pipeline.stem_failure_policy = StemFailurePolicy::FailJob,
                other => warn!(value = other, "Ignoring unknown STEMSCRIBE_STEM_FAILURE_POLICY"),
            }
        }
    }

    /// Reject settings that would stall or misconfigure the pipeline
    pub fn validate(&self) -> Result<()> {
        if self.scheduler.max_concurrent_jobs == 0 {
            return Err(Error::Config(
                "scheduler.max_concurrent_jobs must be at least 1".to_string(),
            ));
        }
        if self.pipeline.stem_concurrency == 0 {
            return Err(Error::Config(
                "pipeline.stem_concurrency must be at least 1".to_string(),
            ));
        }
        for (name, engine) in [
            ("separation", &self.engines.separation),
            ("transcription", &self.engines.transcription),
            ("notation", &self.engines.notation),
        ] {
            if engine.program.trim().is_empty() {
                return Err(Error::Config(format!("engines.{}.program is empty", name)));
            }
            if engine.output_extension.trim().is_empty() {
                return Err(Error::Config(format!(
                    "engines.{}.output_extension is empty",
                    name
                )));
            }
            if engine.timeout_secs == 0 {
                return Err(Error::Config(format!(
                    "engines.{}.timeout_secs must be positive",
                    name
                )));
            }
        }
        Ok(())
    }
}

fn env_usize(name: &str) -> Option<usize> {
    let raw = std::env::var(name).ok()?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(variable = name, value = %raw, "Ignoring non-numeric environment override");
            None
        }
    }
}
