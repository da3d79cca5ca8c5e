//! Scheduler tests: concurrency bound, queue ceiling, failure isolation

mod helpers;

use async_trait::async_trait;
use helpers::{drain_events, runners, ConcurrencyProbe, FakeRunner, TestEnv};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use stemscribe_common::events::PipelineEvent;
use stemscribe_common::JobStatus;
use stemscribe_worker::config::WorkerConfig;
use stemscribe_worker::progress::Stage;
use stemscribe_worker::runners::{StageError, StageRunner, StageRunners};
use stemscribe_worker::SubmitError;

fn config(max_concurrent_jobs: usize, max_queued_jobs: usize) -> WorkerConfig {
    let mut config = WorkerConfig::default();
    config.scheduler.max_concurrent_jobs = max_concurrent_jobs;
    config.scheduler.max_queued_jobs = max_queued_jobs;
    config
}

#[tokio::test]
async fn test_more_jobs_than_slots_all_finish_within_bound() {
    let probe = ConcurrencyProbe::new();
    let delay = Duration::from_millis(20);
    let env = TestEnv::with_config(
        runners(
            FakeRunner::separation(&["bass", "vocals"])
                .with_delay(delay)
                .with_probe(probe.clone()),
            FakeRunner::transcription()
                .with_delay(delay)
                .with_probe(probe.clone()),
            FakeRunner::notation().with_delay(delay).with_probe(probe.clone()),
        ),
        config(2, 16),
    )
    .await;

    let inputs: Vec<_> = (0..6).map(|i| env.input_wav(&format!("song{}.wav", i))).collect();
    let mut ids = Vec::new();
    for input in &inputs {
        ids.push(env.worker.submit_file(input).await.unwrap());
    }

    env.worker.wait_idle().await;

    for id in &ids {
        let view = env.worker.status(*id).await.unwrap();
        assert_eq!(view.status, JobStatus::Completed, "job {}", id);
        assert_eq!(view.progress, 100);
    }
    // One runner call in flight per job (stems run sequentially)
    assert_eq!(probe.peak(), 2);
    assert_eq!(probe.calls(), 6 * (1 + 2 + 2));
    assert_eq!(env.worker.scheduler().outstanding(), 0);
}

#[tokio::test]
async fn test_submission_past_ceiling_is_rejected_without_record() {
    let env = TestEnv::with_config(
        runners(
            FakeRunner::separation(&["bass"]).with_delay(Duration::from_millis(300)),
            FakeRunner::transcription(),
            FakeRunner::notation(),
        ),
        config(1, 1),
    )
    .await;

    let inputs: Vec<_> = ["a.wav", "b.wav", "c.wav"]
        .iter()
        .map(|name| env.input_wav(name))
        .collect();

    let first = env.worker.submit_file(&inputs[0]).await.unwrap();
    let second = env.worker.submit_file(&inputs[1]).await.unwrap();

    match env.worker.submit_file(&inputs[2]).await {
        Err(SubmitError::QueueFull { limit }) => assert_eq!(limit, 2),
        other => panic!("expected QueueFull, got {:?}", other),
    }

    // Only the accepted jobs left an upload and a job directory behind
    let uploads: Vec<_> = std::fs::read_dir(env.worker.artifacts().uploads_dir())
        .unwrap()
        .collect();
    assert_eq!(uploads.len(), 2);
    let processed: Vec<_> = std::fs::read_dir(env.worker.artifacts().processed_dir())
        .unwrap()
        .collect();
    assert_eq!(processed.len(), 2);

    env.worker.wait_idle().await;
    for id in [first, second] {
        assert_eq!(env.worker.status(id).await.unwrap().status, JobStatus::Completed);
    }

    // Capacity is released once jobs finish
    let late = env.worker.submit_file(&env.input_wav("d.wav")).await.unwrap();
    env.worker.wait_idle().await;
    assert_eq!(env.worker.status(late).await.unwrap().status, JobStatus::Completed);
}

#[tokio::test]
async fn test_invalid_extension_rejected_before_record() {
    let env = TestEnv::new(runners(
        FakeRunner::separation(&["bass"]),
        FakeRunner::transcription(),
        FakeRunner::notation(),
    ))
    .await;
    let notes = env.dir.path().join("notes.txt");
    std::fs::write(&notes, b"not audio").unwrap();

    let err = env.worker.submit_file(&notes).await.unwrap_err();
    assert!(matches!(err, SubmitError::Validation(_)), "{:?}", err);
    assert_eq!(env.worker.scheduler().outstanding(), 0);
    assert_eq!(
        std::fs::read_dir(env.worker.artifacts().uploads_dir()).unwrap().count(),
        0
    );
}

/// Separation that panics on its first invocation only
struct PanicOnce {
    fired: AtomicBool,
    inner: FakeRunner,
}

#[async_trait]
impl StageRunner for PanicOnce {
    fn stage(&self) -> Stage {
        Stage::Separation
    }

    fn engine_name(&self) -> &str {
        "panic-once"
    }

    async fn run(&self, inputs: &[PathBuf], output_dir: &Path) -> Result<Vec<PathBuf>, StageError> {
        if !self.fired.swap(true, Ordering::SeqCst) {
            panic!("separator crashed");
        }
        self.inner.run(inputs, output_dir).await
    }
}

#[tokio::test]
async fn test_one_job_crashing_does_not_affect_others() {
    let separation = PanicOnce {
        fired: AtomicBool::new(false),
        inner: FakeRunner::separation(&["bass", "vocals"]).with_delay(Duration::from_millis(10)),
    };
    let stage_runners = StageRunners::new(
        Arc::new(separation),
        Arc::new(FakeRunner::transcription()),
        Arc::new(FakeRunner::notation()),
    );
    let env = TestEnv::with_config(stage_runners, config(2, 8)).await;
    let mut events = env.worker.subscribe();

    let mut ids = Vec::new();
    for i in 0..3 {
        ids.push(
            env.worker
                .submit_file(&env.input_wav(&format!("mix{}.wav", i)))
                .await
                .unwrap(),
        );
    }
    env.worker.wait_idle().await;

    let mut failed = 0;
    let mut completed = 0;
    for id in &ids {
        let view = env.worker.status(*id).await.unwrap();
        match view.status {
            JobStatus::Failed => {
                failed += 1;
                assert!(view.error.unwrap().contains("panicked"));
                assert!(view.output_file.is_none());
                let job_events = drain_events(&mut events, *id);
                assert!(matches!(
                    job_events.last(),
                    Some(PipelineEvent::JobFailed { error, .. }) if error.contains("panicked")
                ));
            }
            JobStatus::Completed => completed += 1,
            other => panic!("job {} left in {}", id, other),
        }
    }
    assert_eq!((failed, completed), (1, 2));
    assert_eq!(env.worker.scheduler().outstanding(), 0);
}
