//! Output audio formats and their ffmpeg encoder mapping.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Supported output formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioFormat {
    #[default]
    Mp3,
    Wav,
    Aac,
    Ogg,
}

impl AudioFormat {
    /// All supported formats.
    pub const ALL: [AudioFormat; 4] = [
        AudioFormat::Mp3,
        AudioFormat::Wav,
        AudioFormat::Aac,
        AudioFormat::Ogg,
    ];

    /// Resolve a requested format token.
    ///
    /// Tokens are trimmed and matched case-insensitively. Anything else,
    /// including an empty or missing token, resolves to [`AudioFormat::Mp3`].
    pub fn resolve(token: Option<&str>) -> Self {
        let Some(token) = token else {
            return Self::default();
        };
        match token.trim().to_ascii_lowercase().as_str() {
            "mp3" => AudioFormat::Mp3,
            "wav" => AudioFormat::Wav,
            "aac" => AudioFormat::Aac,
            "ogg" => AudioFormat::Ogg,
            _ => Self::default(),
        }
    }

    /// ffmpeg audio encoder name.
    pub fn codec(&self) -> &'static str {
        match self {
            AudioFormat::Mp3 => "libmp3lame",
            AudioFormat::Wav => "pcm_s16le",
            AudioFormat::Aac => "aac",
            AudioFormat::Ogg => "libvorbis",
        }
    }

    /// Container file extension (without the dot).
    pub fn extension(&self) -> &'static str {
        match self {
            AudioFormat::Mp3 => "mp3",
            AudioFormat::Wav => "wav",
            AudioFormat::Aac => "aac",
            AudioFormat::Ogg => "ogg",
        }
    }

    /// MIME type of the produced file.
    pub fn mime(&self) -> &'static str {
        match self {
            AudioFormat::Mp3 => "audio/mpeg",
            AudioFormat::Wav => "audio/wav",
            AudioFormat::Aac => "audio/aac",
            AudioFormat::Ogg => "audio/ogg",
        }
    }

    /// Whether a target bitrate applies to this encoder.
    pub fn is_lossy(&self) -> bool {
        !matches!(self, AudioFormat::Wav)
    }

    /// Upper-case label returned to callers ("MP3", "WAV", ...).
    pub fn label(&self) -> &'static str {
        match self {
            AudioFormat::Mp3 => "MP3",
            AudioFormat::Wav => "WAV",
            AudioFormat::Aac => "AAC",
            AudioFormat::Ogg => "OGG",
        }
    }
}

impl fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// Resolve a format token straight to its `(codec, extension)` pair.
pub fn resolve_format(token: Option<&str>) -> (&'static str, &'static str) {
    let format = AudioFormat::resolve(token);
    (format.codec(), format.extension())
}
