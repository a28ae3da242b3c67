//! The conversion job and its state machine.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use af_core::{AudioFormat, Error, ErrorKind, JobId, Result};

use crate::source::InputSource;

/// Job status. Transitions only move forward:
/// `Created -> Running -> Succeeded | Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Created,
    Running,
    Succeeded,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Succeeded | JobStatus::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Created => "created",
            JobStatus::Running => "running",
            JobStatus::Succeeded => "succeeded",
            JobStatus::Failed => "failed",
        }
    }
}

/// Terminal error recorded on a failed job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobFailure {
    pub kind: ErrorKind,
    /// Caller-safe description.
    pub message: String,
}

/// One conversion request, from validation to outcome.
#[derive(Debug)]
pub struct Job {
    id: JobId,
    source: InputSource,
    format: AudioFormat,
    codec: &'static str,
    status: JobStatus,
    output_path: Option<PathBuf>,
    error: Option<JobFailure>,
    temp_input_path: Option<PathBuf>,
    created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
}

impl Job {
    /// Build a job for a validated source. An uploaded file becomes the job's
    /// temporary input immediately.
    pub fn new(source: InputSource, format: AudioFormat) -> Self {
        let temp_input_path = match &source {
            InputSource::LocalFile { path } => Some(path.clone()),
            InputSource::RemotePull { .. } => None,
        };

        Self {
            id: JobId::new(),
            source,
            format,
            codec: format.codec(),
            status: JobStatus::Created,
            output_path: None,
            error: None,
            temp_input_path,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
        }
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn source(&self) -> &InputSource {
        &self.source
    }

    pub fn format(&self) -> AudioFormat {
        self.format
    }

    pub fn codec(&self) -> &'static str {
        self.codec
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }

    pub fn output_path(&self) -> Option<&Path> {
        self.output_path.as_deref()
    }

    pub fn error(&self) -> Option<&JobFailure> {
        self.error.as_ref()
    }

    pub fn temp_input_path(&self) -> Option<&Path> {
        self.temp_input_path.as_deref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.finished_at
    }

    /// `Created -> Running`.
    pub fn start(&mut self) -> Result<()> {
        self.expect_status(JobStatus::Created, JobStatus::Running)?;
        self.status = JobStatus::Running;
        self.started_at = Some(Utc::now());
        Ok(())
    }

    /// `Running -> Succeeded`, recording the output.
    pub fn succeed(&mut self, output: PathBuf) -> Result<()> {
        self.expect_status(JobStatus::Running, JobStatus::Succeeded)?;
        self.status = JobStatus::Succeeded;
        self.output_path = Some(output);
        self.finished_at = Some(Utc::now());
        Ok(())
    }

    /// `Running -> Failed`, recording the error.
    pub fn fail(&mut self, kind: ErrorKind, message: impl Into<String>) -> Result<()> {
        self.expect_status(JobStatus::Running, JobStatus::Failed)?;
        self.status = JobStatus::Failed;
        self.error = Some(JobFailure {
            kind,
            message: message.into(),
        });
        self.finished_at = Some(Utc::now());
        Ok(())
    }

    /// Record the staging file a remote pull is written to.
    pub(crate) fn set_temp_input(&mut self, path: PathBuf) {
        self.temp_input_path = Some(path);
    }

    /// Hand over the temporary input for deletion. Returns `None` once taken.
    pub(crate) fn take_temp_input(&mut self) -> Option<PathBuf> {
        self.temp_input_path.take()
    }

    pub fn summary(&self) -> JobSummary {
        JobSummary {
            job_id: self.id,
            source: self.source.kind(),
            format: self.format,
            status: self.status,
            created_at: self.created_at,
            started_at: self.started_at,
        }
    }

    fn expect_status(&self, from: JobStatus, to: JobStatus) -> Result<()> {
        if self.status == from {
            Ok(())
        } else {
            Err(Error::Internal(format!(
                "job {} cannot move from {} to {}",
                self.id,
                self.status.as_str(),
                to.as_str()
            )))
        }
    }
}

/// Snapshot of a live job, reported by the service.
#[derive(Debug, Clone, Serialize)]
pub struct JobSummary {
    pub job_id: JobId,
    pub source: &'static str,
    pub format: AudioFormat,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn local_job() -> Job {
        Job::new(
            InputSource::LocalFile {
                path: PathBuf::from("uploads/clip.mov"),
            },
            AudioFormat::Wav,
        )
    }

    #[test]
    fn new_job_is_created_with_codec_fixed() {
        let job = local_job();
        assert_eq!(job.status(), JobStatus::Created);
        assert_eq!(job.codec(), "pcm_s16le");
        assert_eq!(job.temp_input_path(), Some(Path::new("uploads/clip.mov")));
        assert!(job.output_path().is_none());
        assert!(job.error().is_none());
    }

    #[test]
    fn remote_job_has_no_temp_input_until_staged() {
        let url = url::Url::parse("https://video.example/a").unwrap();
        let mut job = Job::new(InputSource::RemotePull { url }, AudioFormat::Mp3);
        assert!(job.temp_input_path().is_none());
        job.set_temp_input(PathBuf::from("uploads/x.bin"));
        assert_eq!(job.take_temp_input(), Some(PathBuf::from("uploads/x.bin")));
        assert_eq!(job.take_temp_input(), None);
    }

    #[test]
    fn success_path_sets_output_only() {
        let mut job = local_job();
        job.start().unwrap();
        job.succeed(PathBuf::from("output/a.wav")).unwrap();
        assert_eq!(job.status(), JobStatus::Succeeded);
        assert!(job.output_path().is_some());
        assert!(job.error().is_none());
        assert!(job.finished_at().is_some());
    }

    #[test]
    fn failure_path_sets_error_only() {
        let mut job = local_job();
        job.start().unwrap();
        job.fail(ErrorKind::TranscodeFailed, "boom").unwrap();
        assert_eq!(job.status(), JobStatus::Failed);
        assert!(job.output_path().is_none());
        assert_eq!(job.error().unwrap().kind, ErrorKind::TranscodeFailed);
    }

    #[test]
    fn cannot_skip_running() {
        let mut job = local_job();
        assert_matches!(job.succeed(PathBuf::from("x")), Err(Error::Internal(_)));
        assert_matches!(job.fail(ErrorKind::Timeout, "late"), Err(Error::Internal(_)));
        assert_eq!(job.status(), JobStatus::Created);
    }

    #[test]
    fn terminal_states_are_final() {
        let mut job = local_job();
        job.start().unwrap();
        job.fail(ErrorKind::TranscodeFailed, "boom").unwrap();

        assert!(job.start().is_err());
        assert!(job.succeed(PathBuf::from("x")).is_err());
        assert!(job.fail(ErrorKind::Timeout, "again").is_err());
        assert_eq!(job.status(), JobStatus::Failed);
        assert!(job.status().is_terminal());
    }

    #[test]
    fn summary_serializes() {
        let job = local_job();
        let json = serde_json::to_value(job.summary()).unwrap();
        assert_eq!(json["source"], "local_file");
        assert_eq!(json["format"], "wav");
        assert_eq!(json["status"], "created");
    }
}
