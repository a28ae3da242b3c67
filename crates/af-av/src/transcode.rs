//! Audio-only transcoding through ffmpeg.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use af_core::AudioFormat;

use crate::command::ToolCommand;
use crate::tools::{ToolRegistry, FFMPEG};

/// Result of a successful transcode.
#[derive(Debug, Clone)]
pub struct TranscodeReport {
    /// The written output file.
    pub output: PathBuf,
    /// Size of the output file in bytes (always non-zero).
    pub bytes: u64,
    /// Wall-clock time spent in the external process.
    pub elapsed: Duration,
}

/// Drives one external transcode of a staged input into `output`.
///
/// Implementations make exactly one attempt. On any error the partial output
/// file must not be left behind.
#[async_trait]
pub trait Transcoder: Send + Sync {
    async fn transcode(
        &self,
        input: &Path,
        format: AudioFormat,
        output: &Path,
        cancel: &CancellationToken,
    ) -> af_core::Result<TranscodeReport>;
}

/// [`Transcoder`] backed by the ffmpeg CLI.
#[derive(Debug, Clone)]
pub struct FfmpegTranscoder {
    ffmpeg: PathBuf,
    audio_bitrate: Option<String>,
    timeout: Duration,
}

impl FfmpegTranscoder {
    pub fn new(ffmpeg: PathBuf) -> Self {
        Self {
            ffmpeg,
            audio_bitrate: None,
            timeout: Duration::from_secs(600),
        }
    }

    /// Build a transcoder from the discovered ffmpeg and the conversion
    /// settings.
    pub fn from_registry(
        tools: &ToolRegistry,
        config: &af_core::config::ConversionConfig,
    ) -> af_core::Result<Self> {
        let ffmpeg = tools.require(FFMPEG)?;
        Ok(Self::new(ffmpeg.path.clone())
            .with_bitrate(config.audio_bitrate.clone())
            .with_timeout(config.job_timeout()))
    }

    /// Target bitrate for lossy formats (ignored for wav).
    pub fn with_bitrate(mut self, bitrate: Option<String>) -> Self {
        self.audio_bitrate = bitrate;
        self
    }

    /// Hard limit on the ffmpeg process, independent of any job deadline.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Assemble the ffmpeg invocation: drop video, encode audio with the
    /// format's codec, write to `output`.
    pub fn command(&self, input: &Path, format: AudioFormat, output: &Path) -> ToolCommand {
        let mut cmd = ToolCommand::new(self.ffmpeg.clone());
        cmd.timeout(self.timeout);
        cmd.args(["-hide_banner", "-nostdin", "-loglevel", "error", "-y"]);
        cmd.arg("-i");
        cmd.arg(input.to_string_lossy().as_ref());
        cmd.args(["-vn", "-c:a", format.codec()]);

        if format.is_lossy() {
            if let Some(ref bitrate) = self.audio_bitrate {
                cmd.args(["-b:a", bitrate.as_str()]);
            }
        }

        cmd.arg(output.to_string_lossy().as_ref());
        cmd
    }
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    async fn transcode(
        &self,
        input: &Path,
        format: AudioFormat,
        output: &Path,
        cancel: &CancellationToken,
    ) -> af_core::Result<TranscodeReport> {
        let started = Instant::now();

        tracing::info!(
            codec = format.codec(),
            "ffmpeg transcode: {:?} -> {:?}",
            input,
            output
        );

        let mut cmd = self.command(input, format, output);
        cmd.cancel_on(cancel.clone());

        let result = match cmd.execute().await {
            Ok(_) => verify_output(output).await.map(|bytes| TranscodeReport {
                output: output.to_path_buf(),
                bytes,
                elapsed: started.elapsed(),
            }),
            Err(e) => Err(e),
        };

        if let Err(ref e) = result {
            tracing::debug!("transcode failed ({e}); discarding partial output");
            discard_partial(output).await;
        }

        result
    }
}

/// Confirm ffmpeg left a non-empty file behind.
async fn verify_output(output: &Path) -> af_core::Result<u64> {
    match tokio::fs::metadata(output).await {
        Ok(meta) if meta.len() > 0 => Ok(meta.len()),
        Ok(_) => Err(af_core::Error::tool(FFMPEG, "produced an empty output file")),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(af_core::Error::tool(FFMPEG, "produced no output file"))
        }
        Err(e) => Err(e.into()),
    }
}

/// Remove a partially written output, tolerating its absence.
async fn discard_partial(output: &Path) {
    match tokio::fs::remove_file(output).await {
        Ok(()) => tracing::debug!("removed partial output {:?}", output),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!("failed to remove partial output {:?}: {e}", output),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args_of(cmd: &ToolCommand) -> Vec<&str> {
        cmd.get_args().iter().map(String::as_str).collect()
    }

    #[test]
    fn command_drops_video_and_selects_codec() {
        let t = FfmpegTranscoder::new(PathBuf::from("ffmpeg"));
        let cmd = t.command(Path::new("in.mov"), AudioFormat::Wav, Path::new("out.wav"));
        let args = args_of(&cmd);

        assert_eq!(
            args,
            vec![
                "-hide_banner", "-nostdin", "-loglevel", "error", "-y", "-i", "in.mov", "-vn",
                "-c:a", "pcm_s16le", "out.wav",
            ]
        );
    }

    #[test]
    fn bitrate_only_applies_to_lossy_formats() {
        let t = FfmpegTranscoder::new(PathBuf::from("ffmpeg")).with_bitrate(Some("192k".into()));

        let mp3 = t.command(Path::new("a"), AudioFormat::Mp3, Path::new("b.mp3"));
        let args = args_of(&mp3);
        let pos = args.iter().position(|a| *a == "-b:a").unwrap();
        assert_eq!(args[pos + 1], "192k");

        let wav = t.command(Path::new("a"), AudioFormat::Wav, Path::new("b.wav"));
        assert!(!args_of(&wav).contains(&"-b:a"));
    }

    #[test]
    fn from_registry_requires_ffmpeg() {
        let cfg = af_core::config::ConversionConfig::default();
        let err = FfmpegTranscoder::from_registry(&ToolRegistry::default(), &cfg).unwrap_err();
        assert!(err.to_string().contains("ffmpeg not found"));
    }

    #[cfg(unix)]
    mod process {
        use super::*;
        use std::os::unix::fs::PermissionsExt;

        /// Write an executable shell script standing in for ffmpeg. `$last`
        /// holds the output path.
        fn fake_ffmpeg(dir: &Path, body: &str) -> PathBuf {
            let path = dir.join("ffmpeg");
            let script = format!("#!/bin/sh\nfor last; do :; done\n{body}\n");
            std::fs::write(&path, script).unwrap();
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
            path
        }

        fn staged_input(dir: &Path) -> PathBuf {
            let input = dir.join("clip.mov");
            std::fs::write(&input, b"not really a movie").unwrap();
            input
        }

        #[tokio::test]
        async fn success_reports_non_empty_output() {
            let dir = tempfile::tempdir().unwrap();
            let ffmpeg = fake_ffmpeg(dir.path(), "printf 'RIFFdata' > \"$last\"");
            let input = staged_input(dir.path());
            let output = dir.path().join("out.wav");

            let report = FfmpegTranscoder::new(ffmpeg)
                .transcode(&input, AudioFormat::Wav, &output, &CancellationToken::new())
                .await
                .unwrap();

            assert_eq!(report.output, output);
            assert_eq!(report.bytes, 8);
            assert!(output.exists());
        }

        #[tokio::test]
        async fn failure_removes_partial_output() {
            let dir = tempfile::tempdir().unwrap();
            let ffmpeg = fake_ffmpeg(
                dir.path(),
                "printf 'half' > \"$last\"\necho 'Error while decoding stream #0:1' >&2\nexit 1",
            );
            let input = staged_input(dir.path());
            let output = dir.path().join("out.mp3");

            let err = FfmpegTranscoder::new(ffmpeg)
                .transcode(&input, AudioFormat::Mp3, &output, &CancellationToken::new())
                .await
                .unwrap_err();

            assert_eq!(err.kind(), af_core::ErrorKind::TranscodeFailed);
            assert!(err.to_string().contains("Error while decoding"), "{err}");
            assert!(!output.exists());
        }

        #[tokio::test]
        async fn empty_output_is_a_failure() {
            let dir = tempfile::tempdir().unwrap();
            let ffmpeg = fake_ffmpeg(dir.path(), ": > \"$last\"");
            let input = staged_input(dir.path());
            let output = dir.path().join("out.ogg");

            let err = FfmpegTranscoder::new(ffmpeg)
                .transcode(&input, AudioFormat::Ogg, &output, &CancellationToken::new())
                .await
                .unwrap_err();

            assert!(err.to_string().contains("empty output"), "{err}");
            assert!(!output.exists());
        }

        #[tokio::test]
        async fn missing_output_is_a_failure() {
            let dir = tempfile::tempdir().unwrap();
            let ffmpeg = fake_ffmpeg(dir.path(), "exit 0");
            let input = staged_input(dir.path());
            let output = dir.path().join("out.aac");

            let err = FfmpegTranscoder::new(ffmpeg)
                .transcode(&input, AudioFormat::Aac, &output, &CancellationToken::new())
                .await
                .unwrap_err();

            assert!(err.to_string().contains("no output file"), "{err}");
        }

        #[tokio::test]
        async fn cancellation_kills_and_cleans_up() {
            let dir = tempfile::tempdir().unwrap();
            let ffmpeg = fake_ffmpeg(dir.path(), "printf 'x' > \"$last\"\nsleep 10");
            let input = staged_input(dir.path());
            let output = dir.path().join("out.mp3");

            let token = CancellationToken::new();
            let trigger = token.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(200)).await;
                trigger.cancel();
            });

            let err = FfmpegTranscoder::new(ffmpeg)
                .transcode(&input, AudioFormat::Mp3, &output, &token)
                .await
                .unwrap_err();

            assert!(matches!(err, af_core::Error::Cancelled));
            assert!(!output.exists());
        }
    }
}
