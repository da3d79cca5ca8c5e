//! Subprocess-backed stage runner
//!
//! Success is judged the same way for every engine: exit status zero AND at
//! least one file with the configured extension under the output directory.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;
use walkdir::WalkDir;

use super::{process::run_engine, StageError, StageRunner};
use crate::config::EngineConfig;
use crate::progress::Stage;

/// Runs one configured external engine
pub struct CommandRunner {
    stage: Stage,
    engine: EngineConfig,
}

impl CommandRunner {
    pub fn new(stage: Stage, engine: EngineConfig) -> Self {
        Self { stage, engine }
    }

    /// Substitute `{input}`, `{inputs}` and `{output_dir}` in the argument template
    fn render_args(&self, inputs: &[PathBuf], output_dir: &Path) -> Vec<String> {
        let first = inputs
            .first()
            .map(|p| p.display().to_string())
            .unwrap_or_default();
        let output_dir = output_dir.display().to_string();

        let mut rendered = Vec::with_capacity(self.engine.args.len() + inputs.len());
        for arg in &self.engine.args {
            if arg == "{inputs}" {
                rendered.extend(inputs.iter().map(|p| p.display().to_string()));
            } else {
                rendered.push(
                    arg.replace("{input}", &first)
                        .replace("{output_dir}", &output_dir),
                );
            }
        }
        rendered
    }
}

#[async_trait]
impl StageRunner for CommandRunner {
    fn stage(&self) -> Stage {
        self.stage
    }

    fn engine_name(&self) -> &str {
        &self.engine.program
    }

    async fn run(&self, inputs: &[PathBuf], output_dir: &Path) -> Result<Vec<PathBuf>, StageError> {
        validate_inputs(inputs)?;

        tokio::fs::create_dir_all(output_dir)
            .await
            .map_err(|e| StageError::NonZeroExit {
                engine: self.engine.program.clone(),
                code: None,
                detail: format!("cannot create {}: {}", output_dir.display(), e),
            })?;

        let args = self.render_args(inputs, output_dir);
        let started = std::time::Instant::now();

        run_engine(
            &self.engine.program,
            &self.engine.program,
            &args,
            Duration::from_secs(self.engine.timeout_secs),
        )
        .await?;

        let outputs = collect_outputs(output_dir, &self.engine.output_extension);
        if outputs.is_empty() {
            return Err(StageError::NonZeroExit {
                engine: self.engine.program.clone(),
                code: Some(0),
                detail: format!(
                    "no .{} output produced in {}",
                    self.engine.output_extension,
                    output_dir.display()
                ),
            });
        }

        tracing::debug!(
            stage = %self.stage,
            engine = %self.engine.program,
            outputs = outputs.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Engine run finished"
        );

        Ok(outputs)
    }
}

fn validate_inputs(inputs: &[PathBuf]) -> Result<(), StageError> {
    if inputs.is_empty() {
        return Err(StageError::UnsupportedInput {
            path: PathBuf::new(),
            reason: "no input files given".to_string(),
        });
    }
    for input in inputs {
        if !input.is_file() {
            return Err(StageError::UnsupportedInput {
                path: input.clone(),
                reason: "file does not exist".to_string(),
            });
        }
    }
    Ok(())
}

/// Files under `dir` (recursively) with the given extension, sorted by path
pub(crate) fn collect_outputs(dir: &Path, extension: &str) -> Vec<PathBuf> {
    let mut outputs: Vec<PathBuf> = WalkDir::new(dir)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| {
            path.extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| ext.eq_ignore_ascii_case(extension))
                .unwrap_or(false)
        })
        .collect();
    outputs.sort();
    outputs
}
