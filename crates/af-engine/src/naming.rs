//! Collision-free artifact names.
//!
//! Names take the form `<utc-micros>-<seq>-<random>.<ext>`. The sequence
//! number is process-wide, so two jobs created within the same microsecond
//! still differ; the random suffix keeps separate processes sharing a
//! directory apart.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;

use af_core::AudioFormat;

static SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Longest extension carried over from an uploaded file name.
const MAX_EXTENSION_LEN: usize = 8;

/// Extension used for staged inputs whose original extension is unknown.
const FALLBACK_EXTENSION: &str = "bin";

/// Generates output and staging paths under the configured directories.
#[derive(Debug, Clone)]
pub struct ArtifactNamer {
    staging_dir: PathBuf,
    output_dir: PathBuf,
}

impl ArtifactNamer {
    pub fn new(staging_dir: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            staging_dir: staging_dir.into(),
            output_dir: output_dir.into(),
        }
    }

    pub fn staging_dir(&self) -> &Path {
        &self.staging_dir
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// A fresh output path for `format`.
    pub fn output_path(&self, format: AudioFormat) -> PathBuf {
        self.output_dir
            .join(format!("{}.{}", unique_stem(), format.extension()))
    }

    /// A fresh staging path, keeping the extension of `original_name` when it
    /// is a plausible one.
    pub fn staging_path(&self, original_name: Option<&str>) -> PathBuf {
        let ext = original_name
            .and_then(sanitized_extension)
            .unwrap_or_else(|| FALLBACK_EXTENSION.to_string());
        self.staging_dir.join(format!("{}.{ext}", unique_stem()))
    }
}

fn unique_stem() -> String {
    let seq = SEQUENCE.fetch_add(1, Ordering::Relaxed);
    let salt: u32 = rand::random();
    format!("{}-{seq}-{salt:08x}", Utc::now().timestamp_micros())
}

/// Lowercased ASCII-alphanumeric extension of `name`, if it has one.
fn sanitized_extension(name: &str) -> Option<String> {
    let ext = Path::new(name).extension()?.to_str()?;
    if ext.is_empty()
        || ext.len() > MAX_EXTENSION_LEN
        || !ext.chars().all(|c| c.is_ascii_alphanumeric())
    {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}
