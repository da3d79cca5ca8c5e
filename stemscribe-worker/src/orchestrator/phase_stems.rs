//! Phases 2 and 3: TRANSCRIPTION and NOTATION
//!
//! Both stages walk the surviving stems, invoke one runner per stem and
//! advance progress after every stem. Up to `stem_concurrency` invocations
//! run at once; results are consumed one at a time, so store writes stay
//! ordered.

use chrono::Utc;
use futures::stream::{self, StreamExt};
use std::path::PathBuf;
use std::sync::Arc;
use stemscribe_common::events::PipelineEvent;

use super::{JobContext, PipelineError, PipelineOrchestrator};
use crate::config::StemFailurePolicy;
use crate::models::StemResult;
use crate::progress::{
    compute_progress, notation_message, stem_failure_message, transcription_message,
    ProgressTracker, Stage,
};
use crate::runners::{StageError, StageRunner};

/// One stem's unit of work, detached from the `stems` slice
struct StemWork {
    index: usize,
    input: PathBuf,
    output_dir: PathBuf,
}

impl PipelineOrchestrator {
    pub(super) async fn phase_stems(
        &self,
        ctx: &JobContext,
        stage: Stage,
        stems: &mut [StemResult],
        tracker: &mut ProgressTracker,
    ) -> Result<(), PipelineError> {
        let runner: Option<Arc<dyn StageRunner>> = match stage {
            Stage::Transcription | Stage::Notation => self.runners.for_stage(stage).map(Arc::clone),
            Stage::Separation | Stage::Packaging => None,
        };
        let Some(runner) = runner else {
            return Ok(());
        };

        let work: Vec<StemWork> = stems
            .iter()
            .enumerate()
            .filter(|(_, stem)| stem.is_viable())
            .filter_map(|(index, stem)| {
                let input = match stage {
                    Stage::Notation => stem.transcription_path.clone()?,
                    _ => stem.audio_path.clone(),
                };
                Some(StemWork {
                    index,
                    input,
                    output_dir: self.artifacts.stage_dir(ctx.job_id, stage, Some(&stem.name)),
                })
            })
            .collect();

        let total = work.len();
        if total == 0 {
            return Ok(());
        }

        tracing::info!(
            job_id = %ctx.job_id,
            stage = %stage,
            engine = %runner.engine_name(),
            stems = total,
            concurrency = self.config.stem_concurrency.max(1),
            "Starting per-stem stage"
        );

        let mut results = stream::iter(work.into_iter().map(|unit| {
            let runner = Arc::clone(&runner);
            async move {
                let result = runner
                    .run(std::slice::from_ref(&unit.input), &unit.output_dir)
                    .await;
                (unit.index, result)
            }
        }))
        .buffer_unordered(self.config.stem_concurrency.max(1));

        let mut done = 0;
        let mut failed = 0;

        while let Some((index, result)) = results.next().await {
            done += 1;
            let stem = &mut stems[index];

            let output = result.and_then(|outputs| {
                outputs.into_iter().next().ok_or_else(|| StageError::NonZeroExit {
                    engine: runner.engine_name().to_string(),
                    code: Some(0),
                    detail: "no output produced".to_string(),
                })
            });

            let message = match output {
                Ok(path) => {
                    tracing::debug!(
                        job_id = %ctx.job_id,
                        stage = %stage,
                        stem = %stem.name,
                        output = %path.display(),
                        "Stem finished"
                    );
                    match stage {
                        Stage::Notation => {
                            stem.notation_path = Some(path);
                            notation_message(done, total, &stem.name)
                        }
                        _ => {
                            stem.transcription_path = Some(path);
                            transcription_message(done, total, &stem.name)
                        }
                    }
                }
                Err(error) => {
                    if self.config.stem_failure_policy == StemFailurePolicy::FailJob {
                        return Err(PipelineError::StemFailed {
                            stem: stem.name.clone(),
                            stage,
                            error,
                        });
                    }

                    failed += 1;
                    tracing::warn!(
                        job_id = %ctx.job_id,
                        stage = %stage,
                        stem = %stem.name,
                        error = %error,
                        "Stem failed, continuing"
                    );
                    self.event_bus.emit_lossy(PipelineEvent::StemFailed {
                        job_id: ctx.job_id,
                        stem: stem.name.clone(),
                        stage: stage.as_str().to_string(),
                        error: error.to_string(),
                        timestamp: Utc::now(),
                    });
                    stem.record_failure(stage, error);
                    stem_failure_message(stage, done, total, &stem.name)
                }
            };

            self.record_progress(
                ctx.job_id,
                tracker,
                compute_progress(stage, total, done),
                message,
            )
            .await?;
        }

        if failed == total && stage == Stage::Transcription {
            return Err(PipelineError::AllStemsFailed { stage, total });
        }

        if failed > 0 {
            tracing::warn!(
                job_id = %ctx.job_id,
                stage = %stage,
                failed,
                total,
                "Stage finished with stem failures"
            );
        }

        Ok(())
    }
}
