//! # af-av
//!
//! External tool management for the audioforge engine.
//!
//! This crate provides:
//!
//! - **Tool discovery** ([`ToolRegistry`]) -- find and cache paths to ffmpeg
//!   and yt-dlp.
//! - **Command execution** ([`ToolCommand`]) -- async builder with timeout and
//!   cancellation support for running external processes.
//! - **Transcoding** ([`Transcoder`], [`FfmpegTranscoder`]) -- audio-only
//!   encode of a staged input into one of the supported formats.
//! - **Remote extraction** ([`RemoteExtractor`], [`YtDlpExtractor`]) --
//!   resolve a URL into a [`ByteStream`].

pub mod command;
pub mod extract;
pub mod tools;
pub mod transcode;

// ---- Re-exports for convenience ----

pub use command::{ToolCommand, ToolOutput};
pub use extract::{ByteStream, RemoteExtractor, YtDlpExtractor};
pub use tools::{ToolConfig, ToolInfo, ToolRegistry};
pub use transcode::{FfmpegTranscoder, TranscodeReport, Transcoder};
