//! Shared test harness for integration tests.
//!
//! Provides [`TestHarness`], which builds a [`ConversionService`] over
//! in-process fake tools, temporary staging and output directories, and a
//! full [`AppContext`]. [`TestHarness::with_server`] starts Axum on a random
//! port for HTTP-level testing.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use url::Url;

use af_av::{ByteStream, RemoteExtractor, ToolRegistry, TranscodeReport, Transcoder};
use af_core::config::Config;
use af_core::{AudioFormat, Error, Result};
use af_engine::{ConversionService, JobRunner};
use af_server::context::AppContext;
use af_server::router::build_router;

/// What the fake transcoder does with each job.
#[derive(Debug, Clone)]
pub enum TranscodeMode {
    /// Write these bytes to the output.
    Write(Vec<u8>),
    /// Write a partial file, then fail with ffmpeg-style `<output>: <stderr>`.
    Fail(String),
    /// Write a partial file, then wait until cancelled.
    Hang,
}

/// In-process [`Transcoder`] standing in for ffmpeg.
pub struct FakeTranscoder {
    mode: TranscodeMode,
    calls: AtomicUsize,
}

impl FakeTranscoder {
    pub fn new(mode: TranscodeMode) -> Arc<Self> {
        Arc::new(Self {
            mode,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transcoder for FakeTranscoder {
    async fn transcode(
        &self,
        input: &Path,
        _format: AudioFormat,
        output: &Path,
        cancel: &CancellationToken,
    ) -> Result<TranscodeReport> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !input.exists() {
            return Err(Error::tool("ffmpeg", "input vanished before transcode"));
        }

        match &self.mode {
            TranscodeMode::Write(bytes) => {
                tokio::fs::write(output, bytes).await?;
                Ok(TranscodeReport {
                    output: output.to_path_buf(),
                    bytes: bytes.len() as u64,
                    elapsed: Duration::from_millis(1),
                })
            }
            TranscodeMode::Fail(stderr) => {
                tokio::fs::write(output, b"partial").await?;
                Err(Error::tool(
                    "ffmpeg",
                    format!("{}: {stderr}", output.display()),
                ))
            }
            TranscodeMode::Hang => {
                tokio::fs::write(output, b"partial").await?;
                cancel.cancelled().await;
                Err(Error::Cancelled)
            }
        }
    }
}

/// What the fake provider returns for each URL.
#[derive(Debug, Clone)]
pub enum PullMode {
    Bytes(Vec<u8>),
    Fail(String),
}

/// In-process [`RemoteExtractor`] standing in for yt-dlp.
pub struct FakeExtractor {
    mode: PullMode,
    calls: AtomicUsize,
}

impl FakeExtractor {
    pub fn new(mode: PullMode) -> Arc<Self> {
        Arc::new(Self {
            mode,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RemoteExtractor for FakeExtractor {
    async fn resolve(&self, _url: &Url) -> Result<ByteStream> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.mode {
            PullMode::Bytes(bytes) => Ok(ByteStream::from_reader(std::io::Cursor::new(bytes.clone()))),
            PullMode::Fail(message) => {
                let message = message.clone();
                Ok(ByteStream::new(tokio::io::empty(), async move {
                    Err(Error::source_fetch(message))
                }))
            }
        }
    }
}

/// Test harness wrapping a fully-constructed [`AppContext`] backed by fake
/// tools and temporary directories.
pub struct TestHarness {
    pub ctx: AppContext,
    pub transcoder: Arc<FakeTranscoder>,
    pub extractor: Arc<FakeExtractor>,
    root: tempfile::TempDir,
}

impl TestHarness {
    /// Harness whose conversions succeed and whose remote pulls yield bytes.
    pub fn new() -> Self {
        Self::with_tools(
            TranscodeMode::Write(b"ID3 fake audio".to_vec()),
            PullMode::Bytes(b"remote media".to_vec()),
        )
    }

    pub fn with_tools(transcode: TranscodeMode, pull: PullMode) -> Self {
        Self::build(transcode, pull, |_| {}, None)
    }

    /// Harness with a config tweak and an optional job deadline override.
    pub fn build(
        transcode: TranscodeMode,
        pull: PullMode,
        tweak: impl FnOnce(&mut Config),
        job_timeout: Option<Duration>,
    ) -> Self {
        let root = tempfile::tempdir().expect("failed to create temp dir");

        let mut config = Config::default();
        config.server.host = "127.0.0.1".into();
        config.server.port = 0;
        config.storage.staging_dir = root.path().join("uploads");
        config.storage.output_dir = root.path().join("output");
        config.conversion.max_concurrent_jobs = 4;
        tweak(&mut config);

        let transcoder = FakeTranscoder::new(transcode);
        let extractor = FakeExtractor::new(pull);
        let mut runner = JobRunner::new(&config, transcoder.clone(), extractor.clone());
        if let Some(timeout) = job_timeout {
            runner = runner.with_job_timeout(timeout);
        }
        let conversions =
            ConversionService::new(&config, runner).expect("failed to build conversion service");

        let ctx = AppContext::new(config, Arc::new(ToolRegistry::default()), conversions);

        Self {
            ctx,
            transcoder,
            extractor,
            root,
        }
    }

    pub fn service(&self) -> &ConversionService {
        &self.ctx.conversions
    }

    pub fn staging_dir(&self) -> PathBuf {
        self.ctx.config.storage.staging_dir.clone()
    }

    pub fn output_dir(&self) -> PathBuf {
        self.ctx.config.storage.output_dir.clone()
    }

    pub fn root(&self) -> &Path {
        self.root.path()
    }

    /// Write an upload into the staging directory as the upload layer would.
    pub fn stage_upload(&self, name: &str, bytes: &[u8]) -> PathBuf {
        let path = self.service().staging_path(Some(name));
        std::fs::write(&path, bytes).expect("failed to stage upload");
        path
    }

    pub fn staging_entries(&self) -> usize {
        count_entries(&self.staging_dir())
    }

    pub fn output_entries(&self) -> usize {
        count_entries(&self.output_dir())
    }

    pub fn router(&self) -> axum::Router {
        build_router(self.ctx.clone())
    }

    /// Start an Axum server on a random port and return the harness together
    /// with the bound socket address.
    pub async fn with_server() -> (Self, SocketAddr) {
        Self::new().serve().await
    }

    pub async fn serve(self) -> (Self, SocketAddr) {
        let app = self.router();

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind random port");
        let addr = listener.local_addr().expect("failed to get local addr");

        tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });

        (self, addr)
    }
}

pub fn count_entries(dir: &Path) -> usize {
    std::fs::read_dir(dir).map(|d| d.count()).unwrap_or(0)
}
