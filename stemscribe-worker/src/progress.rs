//! Progress model
//!
//! Pure mapping from (stage, units total, units done) to a job percentage.
//! Each stage owns a fixed band; work inside a stage is interpolated linearly
//! across however many stems that stage actually processes.
//!
//! | Stage         | Band     |
//! |---------------|----------|
//! | Separation    | 0 – 10   |
//! | Transcription | 10 – 60  |
//! | Notation      | 60 – 90  |
//! | Packaging     | 90 – 100 |
//!
//! 100 is only reachable as the end of the packaging band, which the
//! orchestrator writes together with `status=completed`.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Pipeline stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Separation,
    Transcription,
    Notation,
    Packaging,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Separation => "separation",
            Stage::Transcription => "transcription",
            Stage::Notation => "notation",
            Stage::Packaging => "packaging",
        }
    }

    /// (start, end) percentage band
    pub fn band(&self) -> (u8, u8) {
        match self {
            Stage::Separation => (0, 10),
            Stage::Transcription => (10, 60),
            Stage::Notation => (60, 90),
            Stage::Packaging => (90, 100),
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Job percentage after `done` of `total` units of `stage` have finished
///
/// `done` is clamped to `total`; a stage with no units sits at its band start.
pub fn compute_progress(stage: Stage, total: usize, done: usize) -> u8 {
    let (start, end) = stage.band();
    if total == 0 {
        return start;
    }
    let done = done.min(total);
    let span = usize::from(end - start);
    // Floor keeps intermediate values strictly below the band end until done == total
    let offset = span * done / total;
    start + offset as u8
}

/// Monotonic guard over computed progress values
///
/// The orchestrator is the single writer for a job; the tracker makes sure
/// that whatever it writes never goes below what it already wrote, even when
/// stems finish out of order under per-job parallelism.
#[derive(Debug, Clone, Default)]
pub struct ProgressTracker {
    last: u8,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a candidate value and return the value to publish
    pub fn advance(&mut self, candidate: u8) -> u8 {
        self.last = self.last.max(candidate.min(100));
        self.last
    }

    /// Last published value
    pub fn current(&self) -> u8 {
        self.last
    }
}

/// Message written after a stem's transcription succeeded
pub fn transcription_message(done: usize, total: usize, stem: &str) -> String {
    format!("Converted stem {} of {} to note data ({})", done, total, stem)
}

/// Message written after a stem's notation export succeeded
pub fn notation_message(done: usize, total: usize, stem: &str) -> String {
    format!("Exported notation for stem {} of {} ({})", done, total, stem)
}

/// Message written after a stem failed a non-fatal stage
pub fn stem_failure_message(stage: Stage, done: usize, total: usize, stem: &str) -> String {
    format!(
        "Stem {} of {} ({}) failed {}, continuing with remaining stems",
        done, total, stem, stage
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_band_edges() {
        assert_eq!(compute_progress(Stage::Separation, 1, 0), 0);
        assert_eq!(compute_progress(Stage::Separation, 1, 1), 10);
        assert_eq!(compute_progress(Stage::Transcription, 6, 0), 10);
        assert_eq!(compute_progress(Stage::Transcription, 6, 6), 60);
        assert_eq!(compute_progress(Stage::Notation, 4, 4), 90);
        assert_eq!(compute_progress(Stage::Packaging, 1, 0), 90);
        assert_eq!(compute_progress(Stage::Packaging, 1, 1), 100);
    }

    #[test]
    fn test_transcription_split_evenly_across_stems() {
        let values: Vec<u8> = (0..=6)
            .map(|done| compute_progress(Stage::Transcription, 6, done))
            .collect();
        assert_eq!(values, vec![10, 18, 26, 35, 43, 51, 60]);
    }

    #[test]
    fn test_notation_uses_surviving_stem_count() {
        // 5 of 6 stems survived transcription
        assert_eq!(compute_progress(Stage::Notation, 5, 1), 66);
        assert_eq!(compute_progress(Stage::Notation, 5, 5), 90);
    }

    #[test]
    fn test_progress_never_decreases_across_whole_pipeline() {
        for stems in 1..=12 {
            let mut sequence = vec![compute_progress(Stage::Separation, 1, 1)];
            for done in 1..=stems {
                sequence.push(compute_progress(Stage::Transcription, stems, done));
            }
            for done in 1..=stems {
                sequence.push(compute_progress(Stage::Notation, stems, done));
            }
            sequence.push(compute_progress(Stage::Packaging, 1, 0));
            sequence.push(compute_progress(Stage::Packaging, 1, 1));

            assert!(sequence.windows(2).all(|w| w[0] <= w[1]), "{:?}", sequence);
            assert_eq!(sequence.iter().filter(|&&p| p == 100).count(), 1);
        }
    }

    #[test]
    fn test_zero_units_and_overshoot() {
        assert_eq!(compute_progress(Stage::Notation, 0, 0), 60);
        assert_eq!(compute_progress(Stage::Transcription, 3, 9), 60);
    }

    #[test]
    fn test_tracker_refuses_to_regress() {
        let mut tracker = ProgressTracker::new();
        assert_eq!(tracker.advance(18), 18);
        assert_eq!(tracker.advance(10), 18);
        assert_eq!(tracker.advance(26), 26);
        assert_eq!(tracker.advance(250), 100);
        assert_eq!(tracker.current(), 100);
    }

    #[test]
    fn test_messages_name_the_unit() {
        assert_eq!(
            transcription_message(3, 6, "bass"),
            "Converted stem 3 of 6 to note data (bass)"
        );
        assert!(stem_failure_message(Stage::Notation, 2, 4, "piano").contains("failed notation"));
    }
}
