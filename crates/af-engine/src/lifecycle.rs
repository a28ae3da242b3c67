//! Drives a single job from `Created` to a terminal state.
//!
//! The runner acquires the input (staging remote pulls to disk), invokes the
//! transcoder once, enforces the job deadline, removes the temporary input on
//! every path and turns the terminal job into an [`Outcome`].

use std::path::{Path, PathBuf, MAIN_SEPARATOR};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use af_av::{RemoteExtractor, TranscodeReport, Transcoder};
use af_core::config::Config;
use af_core::{Error, ErrorKind, Result};

use crate::job::{Job, JobStatus};
use crate::naming::ArtifactNamer;
use crate::outcome::{download_ref, Outcome};
use crate::source::{stage_remote, InputSource};

/// How long a job may keep running after its deadline cancelled it before
/// the runner abandons it outright.
const CANCEL_GRACE: Duration = Duration::from_secs(2);

/// Executes jobs against a transcoder and a remote extractor.
pub struct JobRunner {
    transcoder: Arc<dyn Transcoder>,
    extractor: Arc<dyn RemoteExtractor>,
    namer: ArtifactNamer,
    download_prefix: String,
    job_timeout: Duration,
    fetch_timeout: Duration,
}

impl JobRunner {
    pub fn new(
        config: &Config,
        transcoder: Arc<dyn Transcoder>,
        extractor: Arc<dyn RemoteExtractor>,
    ) -> Self {
        Self {
            transcoder,
            extractor,
            namer: ArtifactNamer::new(&config.storage.staging_dir, &config.storage.output_dir),
            download_prefix: config.storage.download_prefix.clone(),
            job_timeout: config.conversion.job_timeout(),
            fetch_timeout: Duration::from_secs(config.remote.fetch_timeout_secs),
        }
    }

    /// Override the per-job deadline.
    pub fn with_job_timeout(mut self, timeout: Duration) -> Self {
        self.job_timeout = timeout;
        self
    }

    /// Override the deadline for staging a remote pull.
    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    pub fn namer(&self) -> &ArtifactNamer {
        &self.namer
    }

    pub fn job_timeout(&self) -> Duration {
        self.job_timeout
    }

    /// Run `job` to completion and publish its outcome.
    ///
    /// Consumes the job, so each job is transcoded at most once. A job that is
    /// not `Created` is refused without touching the transcoder.
    pub async fn run(&self, job: Job) -> Outcome {
        let span = tracing::info_span!("job", job_id = %job.id(), format = %job.format());
        self.run_inner(job).instrument(span).await
    }

    async fn run_inner(&self, mut job: Job) -> Outcome {
        if let Err(e) = job.start() {
            tracing::error!("refusing to run job: {e}");
            return Outcome::Failed {
                job_id: Some(job.id()),
                error_kind: e.kind(),
                message: format!("{}: job was already started", e.kind().summary()),
            };
        }

        tracing::info!(source = %job.source(), codec = job.codec(), "job running");

        if let InputSource::RemotePull { url } = job.source() {
            let dest = self
                .namer
                .staging_path(url.path_segments().and_then(|s| s.last()));
            job.set_temp_input(dest);
        }

        let output = self.namer.output_path(job.format());
        let mut guard = ArtifactGuard::new(job.temp_input_path(), &output);
        let cancel = CancellationToken::new();

        let deadline = async {
            tokio::time::sleep(self.job_timeout).await;
            tracing::warn!(timeout = ?self.job_timeout, "job deadline reached; cancelling");
            cancel.cancel();
            tokio::time::sleep(CANCEL_GRACE).await;
        };

        let result = tokio::select! {
            r = self.execute(&job, &output, &cancel) => r,
            _ = deadline => Err(Error::Cancelled),
        };

        let result = match result {
            Err(_) if cancel.is_cancelled() => Err(Error::Timeout(self.job_timeout)),
            other => other,
        };

        let outcome = self.finish(job, &output, result).await;
        guard.disarm();
        outcome
    }

    /// Acquire the input, then transcode it into `output`.
    async fn execute(
        &self,
        job: &Job,
        output: &Path,
        cancel: &CancellationToken,
    ) -> Result<TranscodeReport> {
        let input = match job.source() {
            InputSource::LocalFile { path } => path.as_path(),
            InputSource::RemotePull { url } => {
                let dest = job
                    .temp_input_path()
                    .ok_or_else(|| Error::Internal("remote job has no staging path".into()))?;

                let bytes = tokio::select! {
                    r = stage_remote(self.extractor.as_ref(), url, dest, self.fetch_timeout) => r?,
                    _ = cancel.cancelled() => return Err(Error::Cancelled),
                };
                tracing::debug!(bytes, "remote input staged");
                dest
            }
        };

        self.transcoder
            .transcode(input, job.format(), output, cancel)
            .await
    }

    /// Clean up, move the job to its terminal state and build the outcome.
    async fn finish(&self, mut job: Job, output: &Path, result: Result<TranscodeReport>) -> Outcome {
        let redactor = Redactor::for_job(&job, output, &self.namer);

        if let Some(temp) = job.take_temp_input() {
            remove_artifact(&temp, "temporary input").await;
        }

        let transition = match result {
            Ok(report) => {
                tracing::debug!(
                    bytes = report.bytes,
                    transcode_ms = report.elapsed.as_millis() as u64,
                    "transcode finished"
                );
                job.succeed(report.output)
            }
            Err(e) => {
                remove_artifact(output, "partial output").await;
                let kind = e.kind();
                tracing::warn!(error_kind = %kind, "job failed: {e}");
                job.fail(kind, format!("{}: {}", kind.summary(), redactor.apply(&e.detail())))
            }
        };
        if let Err(e) = transition {
            tracing::error!("{e}");
        }

        let elapsed_ms = job
            .started_at()
            .map(|t| (Utc::now() - t).num_milliseconds())
            .unwrap_or_default();
        tracing::info!(
            source = job.source().kind(),
            status = job.status().as_str(),
            elapsed_ms,
            "job finished"
        );

        self.outcome_of(&job)
    }

    fn outcome_of(&self, job: &Job) -> Outcome {
        match (job.status(), job.output_path(), job.error()) {
            (JobStatus::Succeeded, Some(path), _) => {
                let file_name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                Outcome::Succeeded {
                    job_id: job.id(),
                    download: download_ref(&self.download_prefix, &file_name),
                    format: job.format().label().to_string(),
                }
            }
            (_, _, Some(failure)) => Outcome::Failed {
                job_id: Some(job.id()),
                error_kind: failure.kind,
                message: failure.message.clone(),
            },
            _ => Outcome::Failed {
                job_id: Some(job.id()),
                error_kind: ErrorKind::TranscodeFailed,
                message: format!("{}: job ended unexpectedly", ErrorKind::TranscodeFailed.summary()),
            },
        }
    }
}

/// Delete a file the job generated. Failures are logged as `cleanup_failed`
/// and otherwise ignored.
async fn remove_artifact(path: &Path, what: &str) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => tracing::debug!("removed {what} {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => {
            let err = Error::cleanup(path, e);
            tracing::warn!(error_kind = %err.kind(), "{err}");
        }
    }
}

/// Removes a job's artifacts if its task is dropped before `finish` ran,
/// e.g. when the runtime shuts down mid-job.
struct ArtifactGuard {
    paths: Vec<PathBuf>,
    armed: bool,
}

impl ArtifactGuard {
    fn new(temp_input: Option<&Path>, output: &Path) -> Self {
        let mut paths: Vec<PathBuf> = temp_input.map(Path::to_path_buf).into_iter().collect();
        paths.push(output.to_path_buf());
        Self { paths, armed: true }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for ArtifactGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        tracing::warn!("job abandoned before completion; removing its artifacts");
        for path in &self.paths {
            if let Err(e) = std::fs::remove_file(path) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    let err = Error::cleanup(path, e);
                    tracing::warn!(error_kind = %err.kind(), "{err}");
                }
            }
        }
    }
}

/// Strips job paths and storage directories from caller-facing text.
struct Redactor {
    replacements: Vec<(String, &'static str)>,
}

impl Redactor {
    fn for_job(job: &Job, output: &Path, namer: &ArtifactNamer) -> Self {
        let mut replacements = Vec::new();
        if let Some(input) = job.temp_input_path() {
            replacements.push((input.display().to_string(), "<input>"));
        }
        replacements.push((output.display().to_string(), "<output>"));

        for dir in [namer.staging_dir(), namer.output_dir()] {
            let canonical = std::fs::canonicalize(dir).ok();
            for form in [Some(dir.to_path_buf()), canonical].into_iter().flatten() {
                replacements.push((dir_prefix(&form), "<storage>/"));
            }
        }

        replacements.retain(|(from, _)| from.len() > 1);
        // Longest first so a full path wins over its directory.
        replacements.sort_by(|a, b| b.0.len().cmp(&a.0.len()));
        Self { replacements }
    }

    fn apply(&self, text: &str) -> String {
        self.replacements
            .iter()
            .fold(text.to_string(), |acc, (from, to)| acc.replace(from.as_str(), to))
    }
}

fn dir_prefix(dir: &Path) -> String {
    let mut s = dir.display().to_string();
    if !s.ends_with(MAIN_SEPARATOR) {
        s.push(MAIN_SEPARATOR);
    }
    s
}
