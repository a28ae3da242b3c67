//! What a caller gets back for a conversion request.

use serde::{Deserialize, Serialize};

use af_core::{Error, ErrorKind, JobId};

/// Final result of a conversion request: a download reference or an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    Succeeded {
        job_id: JobId,
        /// Public reference to the produced file, e.g. `/1700000000-3-9f2c1a7b.mp3`.
        download: String,
        /// Display label of the produced format, e.g. `"MP3"`.
        format: String,
    },
    Failed {
        /// Absent when the request was rejected before a job existed.
        job_id: Option<JobId>,
        error_kind: ErrorKind,
        message: String,
    },
}

impl Outcome {
    /// Outcome for a request rejected during validation.
    pub fn rejected(err: &Error) -> Self {
        Outcome::Failed {
            job_id: None,
            error_kind: err.kind(),
            message: format!("{}: {}", err.kind().summary(), err.detail()),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Succeeded { .. })
    }

    pub fn job_id(&self) -> Option<JobId> {
        match self {
            Outcome::Succeeded { job_id, .. } => Some(*job_id),
            Outcome::Failed { job_id, .. } => *job_id,
        }
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            Outcome::Succeeded { .. } => None,
            Outcome::Failed { error_kind, .. } => Some(*error_kind),
        }
    }

    /// HTTP status matching this outcome.
    pub fn http_status(&self) -> u16 {
        match self.error_kind() {
            None => 200,
            Some(ErrorKind::InvalidInput) => 400,
            Some(ErrorKind::SourceFetchFailed) => 502,
            Some(ErrorKind::Timeout) => 504,
            Some(ErrorKind::TranscodeFailed | ErrorKind::CleanupFailed) => 500,
        }
    }
}

/// Build the public download reference for an output file name.
pub fn download_ref(prefix: &str, file_name: &str) -> String {
    format!("{}/{}", prefix.trim_end_matches('/'), file_name)
}
