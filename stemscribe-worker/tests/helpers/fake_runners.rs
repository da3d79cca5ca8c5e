//! Scripted stage runners
//!
//! Stand-ins for the external engines. They write real files into the output
//! directory they are given, so the packager sees the same layout a real run
//! produces.

use async_trait::async_trait;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use stemscribe_worker::progress::Stage;
use stemscribe_worker::runners::{StageError, StageRunner, StageRunners};

/// Counts invocations in flight and remembers the peak
#[derive(Debug, Clone, Default)]
pub struct ConcurrencyProbe {
    active: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
    calls: Arc<AtomicUsize>,
}

impl ConcurrencyProbe {
    pub fn new() -> Self {
        Self::default()
    }

    fn enter(&self) {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        self.calls.fetch_add(1, Ordering::SeqCst);
    }

    fn exit(&self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

pub struct FakeRunner {
    stage: Stage,
    /// Separation only: stem names to emit
    stems: Vec<String>,
    extension: String,
    failing: HashSet<String>,
    fail_always: Option<StageError>,
    delay: Duration,
    probe: ConcurrencyProbe,
    /// Report output paths without writing them
    phantom_outputs: bool,
}

impl FakeRunner {
    fn new(stage: Stage, extension: &str) -> Self {
        Self {
            stage,
            stems: Vec::new(),
            extension: extension.to_string(),
            failing: HashSet::new(),
            fail_always: None,
            delay: Duration::ZERO,
            probe: ConcurrencyProbe::new(),
            phantom_outputs: false,
        }
    }

    /// Separation producing one `<name>.wav` per stem name
    pub fn separation(stems: &[&str]) -> Self {
        let mut runner = Self::new(Stage::Separation, "wav");
        runner.stems = stems.iter().map(|s| s.to_string()).collect();
        runner
    }

    pub fn transcription() -> Self {
        Self::new(Stage::Transcription, "mid")
    }

    pub fn notation() -> Self {
        Self::new(Stage::Notation, "musicxml")
    }

    /// Fail the invocation whose input file stem is `stem`
    pub fn failing_for(mut self, stem: &str) -> Self {
        self.failing.insert(stem.to_string());
        self
    }

    pub fn failing_always(mut self, error: StageError) -> Self {
        self.fail_always = Some(error);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_probe(mut self, probe: ConcurrencyProbe) -> Self {
        self.probe = probe;
        self
    }

    /// Succeed but leave the reported output files missing on disk
    pub fn with_phantom_outputs(mut self) -> Self {
        self.phantom_outputs = true;
        self
    }

    fn engine(&self) -> &'static str {
        match self.stage {
            Stage::Separation => "fake-separator",
            Stage::Transcription => "fake-transcriber",
            _ => "fake-notation",
        }
    }

    async fn produce(&self, inputs: &[PathBuf], output_dir: &Path) -> Result<Vec<PathBuf>, StageError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if let Some(error) = &self.fail_always {
            return Err(error.clone());
        }

        let input = inputs.first().ok_or_else(|| StageError::UnsupportedInput {
            path: PathBuf::new(),
            reason: "no input".to_string(),
        })?;
        let input_stem = input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();

        if self.failing.contains(&input_stem) {
            return Err(StageError::NonZeroExit {
                engine: self.engine().to_string(),
                code: Some(1),
                detail: format!("scripted failure for {}", input_stem),
            });
        }

        let io_err = |e: std::io::Error| StageError::NonZeroExit {
            engine: self.engine().to_string(),
            code: None,
            detail: e.to_string(),
        };

        let mut outputs = Vec::new();
        if self.stage == Stage::Separation {
            // Mirror demucs: <out>/<model>/<track>/<stem>.wav
            let dir = output_dir.join("htdemucs_6s").join(&input_stem);
            tokio::fs::create_dir_all(&dir).await.map_err(io_err)?;
            for stem in &self.stems {
                let path = dir.join(format!("{}.{}", stem, self.extension));
                if !self.phantom_outputs {
                    tokio::fs::copy(input, &path).await.map_err(io_err)?;
                }
                outputs.push(path);
            }
        } else {
            tokio::fs::create_dir_all(output_dir).await.map_err(io_err)?;
            let path = output_dir.join(format!("{}.{}", input_stem, self.extension));
            tokio::fs::write(&path, format!("{} of {}", self.extension, input_stem))
                .await
                .map_err(io_err)?;
            outputs.push(path);
        }

        outputs.sort();
        Ok(outputs)
    }
}

#[async_trait]
impl StageRunner for FakeRunner {
    fn stage(&self) -> Stage {
        self.stage
    }

    fn engine_name(&self) -> &str {
        self.engine()
    }

    async fn run(&self, inputs: &[PathBuf], output_dir: &Path) -> Result<Vec<PathBuf>, StageError> {
        self.probe.enter();
        let result = self.produce(inputs, output_dir).await;
        self.probe.exit();
        result
    }
}

/// Runners that succeed for every stem
pub fn succeeding_runners(stems: &[&str]) -> StageRunners {
    runners(
        FakeRunner::separation(stems),
        FakeRunner::transcription(),
        FakeRunner::notation(),
    )
}

pub fn runners(separation: FakeRunner, transcription: FakeRunner, notation: FakeRunner) -> StageRunners {
    StageRunners::new(Arc::new(separation), Arc::new(transcription), Arc::new(notation))
}
