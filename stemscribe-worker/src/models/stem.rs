//! Per-stem results (ephemeral, live only while a job runs)

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::progress::Stage;
use crate::runners::StageError;

/// Failure recorded against a single stem
#[derive(Debug, Clone, PartialEq)]
pub struct StemFailure {
    pub stage: Stage,
    pub error: StageError,
}

/// One separated instrument channel and what later stages produced for it
#[derive(Debug, Clone, PartialEq)]
pub struct StemResult {
    /// Instrument name (file stem of the separated audio, unique within a job)
    pub name: String,
    pub audio_path: PathBuf,
    pub transcription_path: Option<PathBuf>,
    pub notation_path: Option<PathBuf>,
    pub failure: Option<StemFailure>,
}

impl StemResult {
    pub fn new(name: impl Into<String>, audio_path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            audio_path: audio_path.into(),
            transcription_path: None,
            notation_path: None,
            failure: None,
        }
    }

    /// Build the ordered stem set from separation output files
    ///
    /// Names come from the file stem; a repeated name gets a numeric suffix so
    /// archive entries never collide.
    pub fn from_separation_outputs(paths: &[PathBuf]) -> Vec<StemResult> {
        let mut seen = HashSet::new();
        paths
            .iter()
            .map(|path| {
                let base = stem_name(path);
                let mut name = base.clone();
                let mut suffix = 2;
                while !seen.insert(name.clone()) {
                    name = format!("{}_{}", base, suffix);
                    suffix += 1;
                }
                StemResult::new(name, path.clone())
            })
            .collect()
    }

    pub fn is_failed(&self) -> bool {
        self.failure.is_some()
    }

    /// Still eligible for the next per-stem stage
    pub fn is_viable(&self) -> bool {
        self.failure.is_none()
    }

    pub fn record_failure(&mut self, stage: Stage, error: StageError) {
        self.failure = Some(StemFailure { stage, error });
    }
}

/// Stem names become directory and archive entry names, so anything that
/// could step outside the job directory is replaced
fn stem_name(path: &Path) -> String {
    let raw = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let cleaned: String = raw
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '-' | '_' | '.' | ' ') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim();
    if cleaned.chars().all(|c| c == '.') {
        "stem".to_string()
    } else {
        cleaned.to_string()
    }
}
