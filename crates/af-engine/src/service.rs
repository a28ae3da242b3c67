//! Request validation and bounded job execution.
//!
//! [`ConversionService`] is the engine's entry point. It validates a
//! [`ConversionRequest`], builds a [`Job`], and runs it on its own task once
//! one of `max_concurrent_jobs` slots is free. Callers get the [`Outcome`]
//! through a [`JobHandle`] or directly from [`ConversionService::submit`].

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::{oneshot, Semaphore};

use af_av::{FfmpegTranscoder, ToolRegistry, YtDlpExtractor};
use af_core::config::Config;
use af_core::{AudioFormat, Error, ErrorKind, JobId, Result};

use crate::job::{Job, JobStatus, JobSummary};
use crate::lifecycle::JobRunner;
use crate::outcome::Outcome;
use crate::source::{validate_local_file, validate_remote_url, InputSource};

const DRAIN_POLL: Duration = Duration::from_millis(50);

/// A caller's conversion request. Exactly one of `file` and `url` must be set.
#[derive(Debug, Clone, Default)]
pub struct ConversionRequest {
    /// An uploaded file inside the staging directory.
    pub file: Option<PathBuf>,
    /// A remote media URL.
    pub url: Option<String>,
    /// Requested output format token; unrecognized or missing means mp3.
    pub format: Option<String>,
}

impl ConversionRequest {
    pub fn local(file: impl Into<PathBuf>, format: Option<String>) -> Self {
        Self {
            file: Some(file.into()),
            url: None,
            format,
        }
    }

    pub fn remote(url: impl Into<String>, format: Option<String>) -> Self {
        Self {
            file: None,
            url: Some(url.into()),
            format,
        }
    }
}

/// Counters exposed by [`ConversionService::stats`].
#[derive(Debug, Clone, Serialize)]
pub struct ServiceStats {
    pub submitted: u64,
    pub rejected: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub waiting: usize,
    pub running: usize,
    pub worker_slots: usize,
}

#[derive(Debug, Default)]
struct Counters {
    submitted: AtomicU64,
    rejected: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
}

/// Pending outcome of an enqueued job.
#[derive(Debug)]
pub struct JobHandle {
    job_id: JobId,
    rx: oneshot::Receiver<Outcome>,
}

impl JobHandle {
    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    /// Wait for the job to finish.
    pub async fn wait(self) -> Outcome {
        let job_id = self.job_id;
        self.rx.await.unwrap_or_else(|_| Outcome::Failed {
            job_id: Some(job_id),
            error_kind: ErrorKind::TranscodeFailed,
            message: format!(
                "{}: the job ended without reporting an outcome",
                ErrorKind::TranscodeFailed.summary()
            ),
        })
    }
}

/// The conversion engine. Cheap to clone.
#[derive(Clone)]
pub struct ConversionService {
    inner: Arc<Inner>,
}

struct Inner {
    runner: JobRunner,
    slots: Semaphore,
    worker_slots: usize,
    live: DashMap<JobId, JobSummary>,
    counters: Counters,
    allowed_hosts: Vec<String>,
}

impl ConversionService {
    /// Build a service around `runner`, creating the storage directories.
    pub fn new(config: &Config, runner: JobRunner) -> Result<Self> {
        for dir in [&config.storage.staging_dir, &config.storage.output_dir] {
            std::fs::create_dir_all(dir)?;
        }

        let worker_slots = config.conversion.worker_slots();
        tracing::info!(
            worker_slots,
            job_timeout = ?runner.job_timeout(),
            "conversion service ready"
        );

        Ok(Self {
            inner: Arc::new(Inner {
                runner,
                slots: Semaphore::new(worker_slots),
                worker_slots,
                live: DashMap::new(),
                counters: Counters::default(),
                allowed_hosts: config.remote.allowed_hosts.clone(),
            }),
        })
    }

    /// Build a service backed by the discovered ffmpeg and yt-dlp.
    ///
    /// ffmpeg is required. A missing yt-dlp only makes remote pulls fail with
    /// a fetch error.
    pub fn from_tools(config: &Config, tools: &ToolRegistry) -> Result<Self> {
        let transcoder = FfmpegTranscoder::from_registry(tools, &config.conversion)?;
        let extractor = YtDlpExtractor::from_registry(tools).unwrap_or_else(|e| {
            tracing::warn!("{e}; remote pulls will fail");
            YtDlpExtractor::new(PathBuf::from(af_av::tools::YTDLP))
        });

        let runner = JobRunner::new(config, Arc::new(transcoder), Arc::new(extractor));
        Self::new(config, runner)
    }

    /// Directory the upload layer writes incoming files into.
    pub fn staging_dir(&self) -> &Path {
        self.inner.runner.namer().staging_dir()
    }

    /// Directory produced audio files are written to.
    pub fn output_dir(&self) -> &Path {
        self.inner.runner.namer().output_dir()
    }

    /// A fresh staging path for an upload named `original_name`.
    pub fn staging_path(&self, original_name: Option<&str>) -> PathBuf {
        self.inner.runner.namer().staging_path(original_name)
    }

    /// Check a request and resolve its source and format.
    ///
    /// Performs no writes. Every failure is [`Error::InvalidInput`].
    pub fn validate(&self, request: &ConversionRequest) -> Result<(InputSource, AudioFormat)> {
        let file = request
            .file
            .as_ref()
            .filter(|p| !p.as_os_str().is_empty());
        let url = request
            .url
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty());

        let source = match (file, url) {
            (Some(_), Some(_)) => {
                return Err(Error::invalid("provide either a file or a url, not both"))
            }
            (None, None) => return Err(Error::invalid("either a file or a url is required")),
            (Some(path), None) => InputSource::LocalFile {
                path: validate_local_file(path, self.staging_dir())?,
            },
            (None, Some(raw)) => InputSource::RemotePull {
                url: validate_remote_url(raw, &self.inner.allowed_hosts)?,
            },
        };

        Ok((source, AudioFormat::resolve(request.format.as_deref())))
    }

    /// Validate `request` and start its job.
    ///
    /// Must be called from within a tokio runtime. Invalid requests are
    /// rejected here and never become jobs.
    pub fn enqueue(&self, request: ConversionRequest) -> Result<JobHandle> {
        let (source, format) = self.validate(&request).inspect_err(|e| {
            self.inner.counters.rejected.fetch_add(1, Ordering::Relaxed);
            tracing::info!("rejected conversion request: {e}");
        })?;

        let job = Job::new(source, format);
        let job_id = job.id();
        self.inner.live.insert(job_id, job.summary());
        self.inner.counters.submitted.fetch_add(1, Ordering::Relaxed);
        tracing::info!(job_id = %job_id, source = %job.source(), format = %format, "job created");

        let (tx, rx) = oneshot::channel();
        let inner = self.inner.clone();
        tokio::spawn(async move {
            let outcome = inner.execute(job).await;
            let _ = tx.send(outcome);
        });

        Ok(JobHandle { job_id, rx })
    }

    /// Run a request to completion. Rejections come back as failed outcomes
    /// without a job id.
    pub async fn submit(&self, request: ConversionRequest) -> Outcome {
        match self.enqueue(request) {
            Ok(handle) => handle.wait().await,
            Err(e) => Outcome::rejected(&e),
        }
    }

    /// Jobs that are waiting for a slot or running.
    pub fn active_jobs(&self) -> Vec<JobSummary> {
        let mut jobs: Vec<JobSummary> = self
            .inner
            .live
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        jobs.sort_by_key(|j| j.created_at);
        jobs
    }

    /// Wait until no job is waiting or running, for at most `within`.
    ///
    /// Returns `true` if the service went idle in time.
    pub async fn drain(&self, within: Duration) -> bool {
        let idle = async {
            while !self.inner.live.is_empty() {
                tokio::time::sleep(DRAIN_POLL).await;
            }
        };
        tokio::time::timeout(within, idle).await.is_ok()
    }

    pub fn stats(&self) -> ServiceStats {
        let c = &self.inner.counters;
        let (mut waiting, mut running) = (0, 0);
        for entry in self.inner.live.iter() {
            match entry.status {
                JobStatus::Created => waiting += 1,
                JobStatus::Running => running += 1,
                _ => {}
            }
        }

        ServiceStats {
            submitted: c.submitted.load(Ordering::Relaxed),
            rejected: c.rejected.load(Ordering::Relaxed),
            succeeded: c.succeeded.load(Ordering::Relaxed),
            failed: c.failed.load(Ordering::Relaxed),
            waiting,
            running,
            worker_slots: self.inner.worker_slots,
        }
    }
}

impl Inner {
    async fn execute(&self, job: Job) -> Outcome {
        let job_id = job.id();
        let _live = LiveEntry {
            live: &self.live,
            job_id,
        };

        // The semaphore is never closed, so acquire only fails if that changes.
        let _permit = self.slots.acquire().await.ok();

        if let Some(mut summary) = self.live.get_mut(&job_id) {
            summary.status = JobStatus::Running;
            summary.started_at = Some(chrono::Utc::now());
        }

        let outcome = self.runner.run(job).await;

        let counter = if outcome.is_success() {
            &self.counters.succeeded
        } else {
            &self.counters.failed
        };
        counter.fetch_add(1, Ordering::Relaxed);

        outcome
    }
}

/// Removes a job from the live map when its task ends, however it ends.
struct LiveEntry<'a> {
    live: &'a DashMap<JobId, JobSummary>,
    job_id: JobId,
}

impl Drop for LiveEntry<'_> {
    fn drop(&mut self) {
        self.live.remove(&self.job_id);
    }
}
