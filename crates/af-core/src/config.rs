//! Application configuration types.
//!
//! The top-level [`Config`] struct is deserialized from JSON and carries the
//! server, storage, tool, conversion and remote-fetch sections. Every section
//! defaults sensibly so a completely empty `{}` file is valid.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::Result;
use crate::Error;

// ---------------------------------------------------------------------------
// Top-level Config
// ---------------------------------------------------------------------------

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub tools: ToolsConfig,
    pub conversion: ConversionConfig,
    pub remote: RemoteConfig,
}

impl Config {
    /// Deserialize a `Config` from a JSON string.
    pub fn from_json(json_str: &str) -> Result<Self> {
        serde_json::from_str(json_str)
            .map_err(|e| Error::InvalidInput(format!("config parse error: {e}")))
    }

    /// Load configuration from a file path, falling back to defaults if the
    /// path is `None` or the file does not exist.
    pub fn load_or_default(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            return Self::default();
        };

        match std::fs::read_to_string(path) {
            Ok(contents) => Self::from_json(&contents).unwrap_or_else(|e| {
                tracing::warn!("Failed to parse config file {}: {e}", path.display());
                Self::default()
            }),
            Err(e) => {
                tracing::debug!("Config file {} not readable ({e}); using defaults", path.display());
                Self::default()
            }
        }
    }

    /// Return a list of validation warnings (non-fatal issues).
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.server.port == 0 {
            warnings.push("server.port is 0; a random port will be assigned".into());
        }

        if self.storage.staging_dir == self.storage.output_dir {
            warnings.push(
                "storage.staging_dir and storage.output_dir are the same directory".into(),
            );
        }

        if self.conversion.max_concurrent_jobs == 0 {
            warnings.push("conversion.max_concurrent_jobs is 0; using 1".into());
        }

        if self.conversion.job_timeout_secs == 0 {
            warnings.push("conversion.job_timeout_secs is 0; every job will time out".into());
        }

        if let Some(ref bitrate) = self.conversion.audio_bitrate {
            let digits = bitrate.trim_end_matches(['k', 'K', 'm', 'M']);
            if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
                warnings.push(format!(
                    "conversion.audio_bitrate '{bitrate}' is not a bitrate like '192k'"
                ));
            }
        }

        for (i, host) in self.remote.allowed_hosts.iter().enumerate() {
            if host.trim().is_empty() || host.contains('/') {
                warnings.push(format!("remote.allowed_hosts[{i}] '{host}' is not a host name"));
            }
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Sub-configs
// ---------------------------------------------------------------------------

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Optional directory of static assets (the upload form) served at `/`.
    pub static_dir: Option<PathBuf>,
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 3000,
            static_dir: None,
            max_upload_bytes: 512 * 1024 * 1024,
        }
    }
}

/// Filesystem layout for transient inputs and produced outputs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Transient inputs; each entry is removed when its job terminates.
    pub staging_dir: PathBuf,
    /// Produced audio files; retention is an external concern.
    pub output_dir: PathBuf,
    /// Public URL prefix under which `output_dir` is served.
    pub download_prefix: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            staging_dir: PathBuf::from("uploads"),
            output_dir: PathBuf::from("output"),
            download_prefix: String::new(),
        }
    }
}

/// Paths to external CLI tools.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub ffmpeg_path: Option<PathBuf>,
    pub ytdlp_path: Option<PathBuf>,
}

/// Job execution limits and encoder defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversionConfig {
    #[serde(default = "default_max_concurrent_jobs")]
    pub max_concurrent_jobs: usize,
    #[serde(default = "default_job_timeout")]
    pub job_timeout_secs: u64,
    /// Target bitrate for lossy encoders (e.g. "192k"); encoder default when unset.
    #[serde(default)]
    pub audio_bitrate: Option<String>,
}

fn default_max_concurrent_jobs() -> usize {
    num_cpus::get().max(1)
}

fn default_job_timeout() -> u64 {
    600
}

impl ConversionConfig {
    /// Effective concurrency bound (never zero).
    pub fn worker_slots(&self) -> usize {
        self.max_concurrent_jobs.max(1)
    }

    pub fn job_timeout(&self) -> Duration {
        Duration::from_secs(self.job_timeout_secs)
    }
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: default_max_concurrent_jobs(),
            job_timeout_secs: default_job_timeout(),
            audio_bitrate: None,
        }
    }
}

/// Remote pull settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// Hosts accepted for remote pulls; empty accepts any host. Subdomains of
    /// a listed host are accepted too.
    pub allowed_hosts: Vec<String>,
    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_secs: u64,
}

fn default_fetch_timeout() -> u64 {
    300
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            allowed_hosts: Vec::new(),
            fetch_timeout_secs: default_fetch_timeout(),
        }
    }
}
