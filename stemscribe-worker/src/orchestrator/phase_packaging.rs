//! Phase 4: PACKAGING
//!
//! Builds the archive and writes the terminal `completed` state. 100% is only
//! ever written here, together with the archive path.

use chrono::Utc;
use std::path::PathBuf;
use stemscribe_common::events::PipelineEvent;
use stemscribe_common::JobUpdate;

use super::{JobContext, PipelineError, PipelineOrchestrator};
use crate::models::StemResult;
use crate::packager;
use crate::progress::{compute_progress, ProgressTracker, Stage};

impl PipelineOrchestrator {
    pub(super) async fn phase_packaging(
        &self,
        ctx: &JobContext,
        stems: &[StemResult],
        tracker: &mut ProgressTracker,
    ) -> Result<PathBuf, PipelineError> {
        tracing::info!(job_id = %ctx.job_id, stage = %Stage::Packaging, "Phase 4: PACKAGING");

        self.record_progress(
            ctx.job_id,
            tracker,
            compute_progress(Stage::Packaging, 1, 0),
            "Packaging results".to_string(),
        )
        .await?;

        let output_dir = self.artifacts.stage_dir(ctx.job_id, Stage::Packaging, None);
        let archive = packager::package(&ctx.filename, stems, &output_dir).await?;
        let output_path = archive.to_string_lossy().into_owned();

        let succeeded = stems.iter().filter(|s| s.is_viable()).count();
        let message = if succeeded == stems.len() {
            format!("Processing complete ({} stems)", stems.len())
        } else {
            format!(
                "Processing complete ({} of {} stems fully processed)",
                succeeded,
                stems.len()
            )
        };

        self.store
            .update(ctx.job_id, &JobUpdate::completed(output_path.clone(), message))
            .await?;
        tracker.advance(100);

        self.event_bus.emit_lossy(PipelineEvent::JobCompleted {
            job_id: ctx.job_id,
            output_path,
            timestamp: Utc::now(),
        });

        Ok(archive)
    }
}
