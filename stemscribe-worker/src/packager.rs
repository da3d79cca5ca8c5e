//! Packager
//!
//! Builds the single downloadable archive for a job:
//!
//! ```text
//! stems/<stem>.wav
//! midi/<stem>.mid
//! musicxml/<stem>.musicxml
//! manifest.json
//! ```
//!
//! Files are grouped by stem name. A stem that failed transcription or
//! notation still contributes whatever it has. The archive is written under a
//! temporary name and renamed into place, so the final path never holds a
//! partial file.

use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::models::StemResult;

/// Top-level archive folders
pub const STEMS_DIR: &str = "stems";
pub const MIDI_DIR: &str = "midi";
pub const MUSICXML_DIR: &str = "musicxml";
pub const MANIFEST_NAME: &str = "manifest.json";

#[derive(Debug, Error)]
pub enum PackagingError {
    /// Reading a stage output or writing the archive failed
    #[error("Packaging I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Archive write failed: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("Manifest serialization failed: {0}")]
    Manifest(#[from] serde_json::Error),

    #[error("No stems to package")]
    NoStems,

    #[error("Packaging task aborted: {0}")]
    Aborted(String),
}

/// Per-stem line of `manifest.json`
#[derive(Debug, Serialize)]
struct ManifestStem<'a> {
    name: &'a str,
    stem: Option<String>,
    midi: Option<String>,
    musicxml: Option<String>,
    failed_stage: Option<&'a str>,
    error: Option<String>,
}

#[derive(Debug, Serialize)]
struct Manifest<'a> {
    source: &'a str,
    stems: Vec<ManifestStem<'a>>,
}

/// `<input file stem>_processed.zip`, with unsafe characters replaced
pub fn archive_name(input_filename: &str) -> String {
    let stem = Path::new(input_filename)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let cleaned: String = stem
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
    if cleaned.is_empty() {
        "audio_processed.zip".to_string()
    } else {
        format!("{}_processed.zip", cleaned)
    }
}

/// Package every stem's outputs into `<output_dir>/<archive_name>`
///
/// Runs the blocking zip work on the blocking pool.
pub async fn package(
    input_filename: &str,
    stems: &[StemResult],
    output_dir: &Path,
) -> Result<PathBuf, PackagingError> {
    if stems.is_empty() {
        return Err(PackagingError::NoStems);
    }

    let input_filename = input_filename.to_string();
    let stems = stems.to_vec();
    let output_dir = output_dir.to_path_buf();

    tokio::task::spawn_blocking(move || write_archive(&input_filename, &stems, &output_dir))
        .await
        .map_err(|e| PackagingError::Aborted(e.to_string()))?
}

fn write_archive(
    input_filename: &str,
    stems: &[StemResult],
    output_dir: &Path,
) -> Result<PathBuf, PackagingError> {
    std::fs::create_dir_all(output_dir)?;

    let final_path = output_dir.join(archive_name(input_filename));
    let partial_path = final_path.with_extension("zip.partial");

    let result = (|| -> Result<(), PackagingError> {
        let file = File::create(&partial_path)?;
        let mut zip = ZipWriter::new(BufWriter::new(file));
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

        let mut manifest = Manifest {
            source: input_filename,
            stems: Vec::with_capacity(stems.len()),
        };

        for stem in stems {
            let audio = add_entry(&mut zip, options, STEMS_DIR, &stem.name, Some(&stem.audio_path))?;
            let midi = add_entry(
                &mut zip,
                options,
                MIDI_DIR,
                &stem.name,
                stem.transcription_path.as_deref(),
            )?;
            let musicxml = add_entry(
                &mut zip,
                options,
                MUSICXML_DIR,
                &stem.name,
                stem.notation_path.as_deref(),
            )?;

            manifest.stems.push(ManifestStem {
                name: &stem.name,
                stem: audio,
                midi,
                musicxml,
                failed_stage: stem.failure.as_ref().map(|f| f.stage.as_str()),
                error: stem.failure.as_ref().map(|f| f.error.to_string()),
            });
        }

        zip.start_file(MANIFEST_NAME, options)?;
        zip.write_all(&serde_json::to_vec_pretty(&manifest)?)?;

        let mut writer = zip.finish()?;
        writer.flush()?;
        Ok(())
    })();

    if let Err(e) = result {
        let _ = std::fs::remove_file(&partial_path);
        return Err(e);
    }

    std::fs::rename(&partial_path, &final_path)?;
    Ok(final_path)
}

/// Copy `source` into `<folder>/<stem>.<ext>`; returns the entry name
fn add_entry<W: Write + std::io::Seek>(
    zip: &mut ZipWriter<W>,
    options: SimpleFileOptions,
    folder: &str,
    stem_name: &str,
    source: Option<&Path>,
) -> Result<Option<String>, PackagingError> {
    let Some(source) = source else {
        return Ok(None);
    };

    let entry = match source.extension().and_then(|e| e.to_str()) {
        Some(ext) => format!("{}/{}.{}", folder, stem_name, ext.to_ascii_lowercase()),
        None => format!("{}/{}", folder, stem_name),
    };

    let mut file = File::open(source)?;
    zip.start_file(entry.as_str(), options)?;
    std::io::copy(&mut file, zip)?;
    Ok(Some(entry))
}
