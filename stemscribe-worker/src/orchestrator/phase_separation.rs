//! Phase 1: SEPARATION
//!
//! Splits the input into instrument stems. Any failure here is fatal.

use super::{JobContext, PipelineError, PipelineOrchestrator};
use crate::models::StemResult;
use crate::progress::{compute_progress, ProgressTracker, Stage};

impl PipelineOrchestrator {
    pub(super) async fn phase_separation(
        &self,
        ctx: &JobContext,
        tracker: &mut ProgressTracker,
    ) -> Result<Vec<StemResult>, PipelineError> {
        let output_dir = self
            .artifacts
            .stage_dir(ctx.job_id, Stage::Separation, None);

        tracing::info!(
            job_id = %ctx.job_id,
            stage = %Stage::Separation,
            engine = %self.runners.separation.engine_name(),
            "Phase 1: SEPARATION"
        );

        let outputs = self
            .runners
            .separation
            .run(std::slice::from_ref(&ctx.input_path), &output_dir)
            .await
            .map_err(PipelineError::Separation)?;

        let stems = StemResult::from_separation_outputs(&outputs);
        if stems.is_empty() {
            return Err(PipelineError::NoStems);
        }

        tracing::info!(
            job_id = %ctx.job_id,
            stems = stems.len(),
            names = ?stems.iter().map(|s| s.name.as_str()).collect::<Vec<_>>(),
            "Separation finished"
        );

        self.record_progress(
            ctx.job_id,
            tracker,
            compute_progress(Stage::Separation, 1, 1),
            format!("Separated audio into {} stems", stems.len()),
        )
        .await?;

        Ok(stems)
    }
}
