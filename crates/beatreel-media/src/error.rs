//! Error types for media operations.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

use beatreel_models::{ConfigError, SourceId};

/// Result type for media operations.
pub type MediaResult<T> = Result<T, MediaError>;

/// Pipeline stage an error is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Decode,
    Analyze,
    Plan,
    Trim,
    Concat,
    Merge,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Decode => "decode",
            Stage::Analyze => "analyze",
            Stage::Plan => "plan",
            Stage::Trim => "trim",
            Stage::Concat => "concat",
            Stage::Merge => "merge",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that can occur during media processing.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("FFmpeg not found in PATH")]
    FfmpegNotFound,

    #[error("FFprobe not found in PATH")]
    FfprobeNotFound,

    #[error("No usable encode backend: {0}")]
    EncodeBackendUnavailable(String),

    #[error("FFmpeg command failed: {message}")]
    FfmpegFailed {
        message: String,
        stderr: Option<String>,
        exit_code: Option<i32>,
    },

    #[error("FFprobe command failed: {message}")]
    FfprobeFailed {
        message: String,
        stderr: Option<String>,
    },

    #[error("Audio decode failed for {source_id}: {message}")]
    AudioDecode { source_id: SourceId, message: String },

    #[error("Video decode failed for {source_id}: {message}")]
    VideoDecode { source_id: SourceId, message: String },

    #[error("Source {source_id} unavailable: {reason}")]
    SourceUnavailable { source_id: SourceId, reason: String },

    #[error("Invalid range [{start:.3}s, {end:.3}s) for source of {duration:.3}s")]
    InvalidRange { start: f64, end: f64, duration: f64 },

    #[error("Nothing left to assemble at {stage} stage ({attempted} inputs attempted)")]
    EmptyAssembly { stage: Stage, attempted: usize },

    #[error("{stage} output is {size} bytes, below the {minimum} byte minimum")]
    OutputTooSmall { stage: Stage, size: u64, minimum: u64 },

    #[error("{stage} produced an empty output")]
    EmptyOutput { stage: Stage },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(#[from] ConfigError),

    #[error("{stage} timed out after {seconds:.1} seconds")]
    Timeout { stage: Stage, seconds: f64 },

    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl MediaError {
    /// Create an FFmpeg failure error.
    pub fn ffmpeg_failed(
        message: impl Into<String>,
        stderr: Option<String>,
        exit_code: Option<i32>,
    ) -> Self {
        Self::FfmpegFailed {
            message: message.into(),
            stderr,
            exit_code,
        }
    }

    pub fn audio_decode(source_id: &SourceId, message: impl Into<String>) -> Self {
        Self::AudioDecode {
            source_id: source_id.clone(),
            message: message.into(),
        }
    }

    pub fn video_decode(source_id: &SourceId, message: impl Into<String>) -> Self {
        Self::VideoDecode {
            source_id: source_id.clone(),
            message: message.into(),
        }
    }

    pub fn source_unavailable(source_id: &SourceId, reason: impl Into<String>) -> Self {
        Self::SourceUnavailable {
            source_id: source_id.clone(),
            reason: reason.into(),
        }
    }

    pub fn timeout(stage: Stage, limit: std::time::Duration) -> Self {
        Self::Timeout {
            stage,
            seconds: limit.as_secs_f64(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Errors that must abort the whole run instead of degrading locally.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Cancelled
                | Self::FfmpegNotFound
                | Self::FfprobeNotFound
                | Self::EncodeBackendUnavailable(_)
        )
    }

    /// Short label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::FfmpegNotFound => "ffmpeg_not_found",
            Self::FfprobeNotFound => "ffprobe_not_found",
            Self::EncodeBackendUnavailable(_) => "encode_backend_unavailable",
            Self::FfmpegFailed { .. } => "ffmpeg_failed",
            Self::FfprobeFailed { .. } => "ffprobe_failed",
            Self::AudioDecode { .. } => "audio_decode",
            Self::VideoDecode { .. } => "video_decode",
            Self::SourceUnavailable { .. } => "source_unavailable",
            Self::InvalidRange { .. } => "invalid_range",
            Self::EmptyAssembly { .. } => "empty_assembly",
            Self::OutputTooSmall { .. } => "output_too_small",
            Self::EmptyOutput { .. } => "empty_output",
            Self::Cancelled => "cancelled",
            Self::InvalidConfig(_) => "invalid_config",
            Self::Timeout { .. } => "timeout",
            Self::FileNotFound(_) => "file_not_found",
            Self::Io(_) => "io",
            Self::JsonParse(_) => "json_parse",
            Self::Internal(_) => "internal",
        }
    }
}

/// Why a merge cascade state did not produce an accepted clip.
#[derive(Debug, Error)]
pub enum MergeRejection {
    #[error("audio input has no audio channel")]
    NoAudioChannel,

    #[error("output {output} bytes is {ratio:.3} of input {input} bytes, below {minimum:.3}")]
    Undersized {
        output: u64,
        input: u64,
        ratio: f64,
        minimum: f64,
    },

    #[error(transparent)]
    Backend(#[from] MediaError),

    #[error("circuit open after repeated failures")]
    Skipped,
}

impl MergeRejection {
    /// Whether the rejection says something about this host's encode path
    /// rather than about the input.
    pub fn counts_against_strategy(&self) -> bool {
        match self {
            MergeRejection::Undersized { .. } => true,
            MergeRejection::Backend(e) => !e.is_cancelled(),
            MergeRejection::NoAudioChannel | MergeRejection::Skipped => false,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, MergeRejection::Backend(e) if e.is_cancelled())
    }
}
