//! Worker configuration: TOML file, environment overrides, validation
//!
//! Environment-mutating tests are `#[serial]`.

use serial_test::serial;
use std::env;
use std::path::PathBuf;
use stemscribe_worker::config::{StemFailurePolicy, WorkerConfig};
use tempfile::TempDir;

const OVERRIDES: [&str; 4] = [
    "STEMSCRIBE_MAX_CONCURRENT_JOBS",
    "STEMSCRIBE_MAX_QUEUED_JOBS",
    "STEMSCRIBE_STEM_CONCURRENCY",
    "STEMSCRIBE_STEM_FAILURE_POLICY",
];

fn clear_overrides() {
    for name in OVERRIDES {
        env::remove_var(name);
    }
}

#[test]
#[serial]
fn test_missing_file_loads_defaults() {
    clear_overrides();
    let dir = TempDir::new().unwrap();

    let config = WorkerConfig::load(&dir.path().join("stemscribe-worker.toml")).unwrap();
    assert_eq!(config, WorkerConfig::default());
}

#[test]
#[serial]
fn test_file_values_then_env_overrides() {
    clear_overrides();
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("stemscribe-worker.toml");
    std::fs::write(
        &path,
        r#"
        root_folder = "/srv/stemscribe"

        [scheduler]
        max_concurrent_jobs = 3

        [pipeline]
        stem_concurrency = 2

        [engines.transcription]
        program = "/opt/basic-pitch/bin/basic-pitch"
        args = ["--save-midi", "{output_dir}", "{input}"]
        output_extension = "mid"
        timeout_secs = 120
        "#,
    )
    .unwrap();

    let config = WorkerConfig::load(&path).unwrap();
    assert_eq!(config.root_folder, Some(PathBuf::from("/srv/stemscribe")));
    assert_eq!(config.scheduler.max_concurrent_jobs, 3);
    assert_eq!(config.pipeline.stem_concurrency, 2);
    assert_eq!(config.engines.transcription.timeout_secs, 120);
    assert_eq!(config.engines.separation.program, "demucs");

    env::set_var("STEMSCRIBE_MAX_CONCURRENT_JOBS", "5");
    env::set_var("STEMSCRIBE_STEM_FAILURE_POLICY", "fail_job");
    env::set_var("STEMSCRIBE_MAX_QUEUED_JOBS", "lots");
    let config = WorkerConfig::load(&path).unwrap();
    clear_overrides();

    assert_eq!(config.scheduler.max_concurrent_jobs, 5);
    assert_eq!(config.pipeline.stem_failure_policy, StemFailurePolicy::FailJob);
    // Unparseable override is ignored
    assert_eq!(config.scheduler.max_queued_jobs, 32);
}

#[test]
#[serial]
fn test_invalid_file_values_rejected() {
    clear_overrides();
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("stemscribe-worker.toml");
    std::fs::write(&path, "[pipeline]\nstem_concurrency = 0\n").unwrap();

    let err = WorkerConfig::load(&path).unwrap_err();
    assert!(err.to_string().contains("stem_concurrency"));
}

#[test]
#[serial]
fn test_written_config_reloads_identically() {
    clear_overrides();
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("stemscribe-worker.toml");

    let mut config = WorkerConfig::default();
    config.pipeline.stem_failure_policy = StemFailurePolicy::FailJob;
    config.logging.level = "stemscribe_worker=debug".to_string();
    config.save(&path).unwrap();

    assert_eq!(WorkerConfig::load(&path).unwrap(), config);
}

#[test]
#[serial]
fn test_save_refuses_invalid_config() {
    clear_overrides();
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("stemscribe-worker.toml");

    let mut config = WorkerConfig::default();
    config.scheduler.max_concurrent_jobs = 0;
    assert!(config.save(&path).is_err());
    assert!(!path.exists());
}
