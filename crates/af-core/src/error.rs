//! Unified error type for audioforge.
//!
//! Every crate funnels its failures into [`Error`]. The caller-facing
//! classification is [`ErrorKind`], derived via [`Error::kind`]; HTTP handlers
//! additionally map errors to a status code via [`Error::http_status`].

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Unified error type covering all failure modes in audioforge.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The request was malformed (missing source, bad URL syntax, ...).
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The remote extraction provider could not produce a stream.
    #[error("Source fetch failed: {0}")]
    SourceFetch(String),

    /// An external tool (ffmpeg, yt-dlp) failed or produced unusable output.
    #[error("Tool error [{tool}]: {message}")]
    Tool {
        /// Name of the tool that failed.
        tool: String,
        /// Human-readable error description, usually captured stderr.
        message: String,
    },

    /// The operation exceeded its time budget.
    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    /// The operation was cancelled before it completed.
    #[error("Cancelled")]
    Cancelled,

    /// Removing a transient artifact failed.
    #[error("Cleanup failed for {}: {source}", path.display())]
    Cleanup {
        /// The artifact that could not be removed.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// An I/O operation failed.
    #[error("IO error: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Catch-all for unexpected internal errors.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Caller-visible error classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidInput,
    SourceFetchFailed,
    TranscodeFailed,
    Timeout,
    /// Logged only; never the terminal error of a job.
    CleanupFailed,
}

impl ErrorKind {
    /// Stable snake_case identifier, identical to the serialized form.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidInput => "invalid_input",
            ErrorKind::SourceFetchFailed => "source_fetch_failed",
            ErrorKind::TranscodeFailed => "transcode_failed",
            ErrorKind::Timeout => "timeout",
            ErrorKind::CleanupFailed => "cleanup_failed",
        }
    }

    /// Short summary suitable for end users.
    pub fn summary(&self) -> &'static str {
        match self {
            ErrorKind::InvalidInput => "Invalid request",
            ErrorKind::SourceFetchFailed => "Could not fetch the remote media",
            ErrorKind::TranscodeFailed => "Conversion failed",
            ErrorKind::Timeout => "Conversion took too long",
            ErrorKind::CleanupFailed => "Cleanup failed",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Error {
    /// Classify this error for callers.
    ///
    /// Tool, I/O and internal failures all surface as
    /// [`ErrorKind::TranscodeFailed`]; cancellation is only ever triggered by
    /// the job deadline, so it reads as [`ErrorKind::Timeout`].
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidInput(_) => ErrorKind::InvalidInput,
            Error::SourceFetch(_) => ErrorKind::SourceFetchFailed,
            Error::Timeout(_) | Error::Cancelled => ErrorKind::Timeout,
            Error::Cleanup { .. } => ErrorKind::CleanupFailed,
            Error::Tool { .. } | Error::Io { .. } | Error::Internal(_) => {
                ErrorKind::TranscodeFailed
            }
        }
    }

    /// Map this error to an appropriate HTTP status code.
    pub fn http_status(&self) -> u16 {
        match self.kind() {
            ErrorKind::InvalidInput => 400,
            ErrorKind::SourceFetchFailed => 502,
            ErrorKind::Timeout => 504,
            ErrorKind::TranscodeFailed | ErrorKind::CleanupFailed => 500,
        }
    }

    /// Convenience constructor for [`Error::InvalidInput`].
    pub fn invalid(message: impl Into<String>) -> Self {
        Error::InvalidInput(message.into())
    }

    /// Convenience constructor for [`Error::SourceFetch`].
    pub fn source_fetch(message: impl Into<String>) -> Self {
        Error::SourceFetch(message.into())
    }

    /// Convenience constructor for [`Error::Tool`].
    pub fn tool(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Tool {
            tool: tool.into(),
            message: message.into(),
        }
    }

    /// Convenience constructor for [`Error::Cleanup`].
    pub fn cleanup(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Cleanup {
            path: path.into(),
            source,
        }
    }

    /// The detail text without the variant prefix added by `Display`.
    pub fn detail(&self) -> String {
        match self {
            Error::InvalidInput(m) | Error::SourceFetch(m) | Error::Internal(m) => m.clone(),
            Error::Tool { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}

/// Result alias using the crate-level [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_input_display() {
        let err = Error::invalid("either a file or a url is required");
        assert_eq!(
            err.to_string(),
            "Invalid input: either a file or a url is required"
        );
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
        assert_eq!(err.http_status(), 400);
    }

    #[test]
    fn source_fetch_kind() {
        let err = Error::source_fetch("provider exited with status 1");
        assert_eq!(err.kind(), ErrorKind::SourceFetchFailed);
        assert_eq!(err.http_status(), 502);
    }

    #[test]
    fn tool_display() {
        let err = Error::tool("ffmpeg", "exit code 1");
        assert_eq!(err.to_string(), "Tool error [ffmpeg]: exit code 1");
        assert_eq!(err.kind(), ErrorKind::TranscodeFailed);
        assert_eq!(err.http_status(), 500);
        assert_eq!(err.detail(), "exit code 1");
    }

    #[test]
    fn timeout_and_cancel_are_timeouts() {
        assert_eq!(
            Error::Timeout(Duration::from_secs(3)).kind(),
            ErrorKind::Timeout
        );
        assert_eq!(Error::Cancelled.kind(), ErrorKind::Timeout);
        assert_eq!(Error::Cancelled.http_status(), 504);
    }

    #[test]
    fn io_from_std() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file missing");
        let err = Error::from(io_err);
        assert!(matches!(err, Error::Io { .. }));
        assert_eq!(err.kind(), ErrorKind::TranscodeFailed);
    }

    #[test]
    fn cleanup_kind() {
        let err = Error::cleanup(
            "/tmp/x",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        assert_eq!(err.kind(), ErrorKind::CleanupFailed);
        assert!(err.to_string().contains("/tmp/x"));
    }

    #[test]
    fn kind_serializes_snake_case() {
        let json = serde_json::to_string(&ErrorKind::SourceFetchFailed).unwrap();
        assert_eq!(json, "\"source_fetch_failed\"");
        assert_eq!(ErrorKind::SourceFetchFailed.as_str(), "source_fetch_failed");
    }
}
