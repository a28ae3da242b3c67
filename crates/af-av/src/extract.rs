//! Remote media extraction.
//!
//! A [`RemoteExtractor`] turns a URL into a [`ByteStream`]: an async reader
//! plus a completion future that reports whether the provider finished
//! cleanly. The default implementation pipes `yt-dlp -o -`.

use std::future::Future;
use std::path::PathBuf;

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use url::Url;

use crate::command::{stderr_tail, ToolCommand};
use crate::tools::{ToolRegistry, YTDLP};

/// Bytes pulled from a remote provider.
pub struct ByteStream {
    reader: Box<dyn AsyncRead + Send + Unpin>,
    completion: BoxFuture<'static, af_core::Result<()>>,
}

impl ByteStream {
    /// A stream whose provider reports its final status through `completion`.
    pub fn new(
        reader: impl AsyncRead + Send + Unpin + 'static,
        completion: impl Future<Output = af_core::Result<()>> + Send + 'static,
    ) -> Self {
        Self {
            reader: Box::new(reader),
            completion: completion.boxed(),
        }
    }

    /// A stream that is complete once the reader hits EOF.
    pub fn from_reader(reader: impl AsyncRead + Send + Unpin + 'static) -> Self {
        Self::new(reader, futures::future::ready(Ok(())))
    }

    /// Drain the stream into `dest`, then wait for the provider's verdict.
    ///
    /// Returns the number of bytes copied. Every failure is
    /// [`af_core::Error::SourceFetch`]: the input was never acquired, whether
    /// the provider broke off, the local write failed or nothing arrived.
    pub async fn copy_to<W>(self, dest: &mut W) -> af_core::Result<u64>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        let ByteStream {
            mut reader,
            completion,
        } = self;

        let copied = tokio::io::copy(&mut reader, dest)
            .await
            .map_err(|e| af_core::Error::source_fetch(format!("stream interrupted: {e}")))?;
        dest.flush()
            .await
            .map_err(|e| af_core::Error::source_fetch(format!("cannot stage stream: {e}")))?;
        drop(reader);

        completion.await?;

        if copied == 0 {
            return Err(af_core::Error::source_fetch("provider returned an empty stream"));
        }
        Ok(copied)
    }
}

/// Resolves a URL into a byte stream.
#[async_trait]
pub trait RemoteExtractor: Send + Sync {
    async fn resolve(&self, url: &Url) -> af_core::Result<ByteStream>;
}

/// [`RemoteExtractor`] backed by the yt-dlp CLI writing to stdout.
#[derive(Debug, Clone)]
pub struct YtDlpExtractor {
    program: PathBuf,
}

impl YtDlpExtractor {
    pub fn new(program: PathBuf) -> Self {
        Self { program }
    }

    pub fn from_registry(tools: &ToolRegistry) -> af_core::Result<Self> {
        Ok(Self::new(tools.require(YTDLP)?.path.clone()))
    }

    pub fn command(&self, url: &Url) -> ToolCommand {
        let mut cmd = ToolCommand::new(self.program.clone());
        cmd.args([
            "--quiet",
            "--no-warnings",
            "--no-progress",
            "--no-playlist",
            "-f",
            "bestaudio/best",
            "-o",
            "-",
        ]);
        cmd.arg(url.as_str());
        cmd
    }
}

#[async_trait]
impl RemoteExtractor for YtDlpExtractor {
    async fn resolve(&self, url: &Url) -> af_core::Result<ByteStream> {
        tracing::info!(host = url.host_str().unwrap_or_default(), "yt-dlp extract");

        let mut child = self
            .command(url)
            .spawn()
            .map_err(|e| af_core::Error::source_fetch(e.detail()))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| af_core::Error::Internal("yt-dlp stdout was not captured".into()))?;

        // Drain stderr concurrently so a chatty provider cannot block on a full
        // pipe while we are reading stdout.
        let stderr_task = child.stderr.take().map(|mut stderr| {
            tokio::spawn(async move {
                let mut text = String::new();
                let _ = stderr.read_to_string(&mut text).await;
                text
            })
        });

        let completion = async move {
            let status = child
                .wait()
                .await
                .map_err(|e| af_core::Error::source_fetch(format!("waiting for yt-dlp: {e}")))?;
            let stderr = match stderr_task {
                Some(task) => task.await.unwrap_or_default(),
                None => String::new(),
            };

            if status.success() {
                Ok(())
            } else {
                Err(af_core::Error::source_fetch(format!(
                    "yt-dlp exited with {status}: {}",
                    stderr_tail(&stderr, 5)
                )))
            }
        };

        Ok(ByteStream::new(stdout, completion))
    }
}
