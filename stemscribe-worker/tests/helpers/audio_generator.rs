//! Audio Test Fixture Generator
//!
//! Writes short sine-tone WAV files to feed the pipeline

use std::path::{Path, PathBuf};

/// Configuration for generated audio
#[derive(Debug, Clone)]
pub struct AudioConfig {
    pub duration_seconds: f64,
    pub sample_rate: u32,
    pub channels: u16,
    pub frequency: f32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            duration_seconds: 3.0,
            sample_rate: 44100,
            channels: 1,
            frequency: 440.0,
        }
    }
}

/// Generate a 16-bit PCM WAV file
pub fn generate_test_wav(path: &Path, config: &AudioConfig) -> anyhow::Result<PathBuf> {
    let spec = hound::WavSpec {
        channels: config.channels,
        sample_rate: config.sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut writer = hound::WavWriter::create(path, spec)?;
    let total_samples = (config.duration_seconds * config.sample_rate as f64) as usize;

    for i in 0..total_samples {
        // 30% amplitude tone
        let t = i as f32 / config.sample_rate as f32;
        let sample =
            (0.3 * (2.0 * std::f32::consts::PI * config.frequency * t).sin() * i16::MAX as f32) as i16;
        for _ in 0..config.channels {
            writer.write_sample(sample)?;
        }
    }

    writer.finalize()?;
    Ok(path.to_path_buf())
}

/// 3-second mono tone at `dir/<name>`
pub fn generate_mono_wav(dir: &Path, name: &str) -> PathBuf {
    generate_test_wav(&dir.join(name), &AudioConfig::default()).expect("write test wav")
}
