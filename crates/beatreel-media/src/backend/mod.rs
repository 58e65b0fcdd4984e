//! Media backend boundary.
//!
//! The pipeline never spawns encoders directly. It describes each job and
//! hands it to a [`MediaBackend`]; [`FfmpegBackend`] is the production
//! implementation.

mod ffmpeg;

pub use ffmpeg::FfmpegBackend;

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;

use beatreel_models::{EncodingConfig, Geometry, TrimMode};

use crate::control::RunControl;
use crate::error::MediaResult;
use crate::probe::MediaInfo;
use crate::progress::ProgressSpan;

/// Layout of a headerless interleaved f32 little-endian PCM buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PcmFormat {
    pub sample_rate: u32,
    pub channels: u32,
}

impl PcmFormat {
    pub fn new(sample_rate: u32, channels: u32) -> Self {
        Self {
            sample_rate: sample_rate.max(1),
            channels: channels.max(1),
        }
    }
}

/// Cut `[start, end)` out of `input` into `output`.
#[derive(Debug, Clone)]
pub struct TrimJob {
    pub input: PathBuf,
    pub output: PathBuf,
    pub start: f64,
    pub end: f64,
    pub mode: TrimMode,
    /// Output frame rate for re-encoding trims
    pub frame_rate: u32,
    pub encoding: EncodingConfig,
}

impl TrimJob {
    pub fn duration(&self) -> f64 {
        (self.end - self.start).max(0.0)
    }

    pub fn expected_frames(&self) -> u64 {
        (self.duration() * self.frame_rate as f64).round().max(1.0) as u64
    }
}

/// Re-encode `input` to `geometry` (scale, pad, frame rate, square pixels).
#[derive(Debug, Clone)]
pub struct NormalizeJob {
    pub input: PathBuf,
    pub output: PathBuf,
    pub geometry: Geometry,
    /// Expected duration, used for progress only
    pub duration: f64,
    pub encoding: EncodingConfig,
}

/// How the audio reaches a merge recording.
#[derive(Debug, Clone)]
pub enum AudioFeed {
    /// The audio file's own decoded stream.
    Direct { path: PathBuf },
    /// The audio file routed through a resample + gain + stereo graph.
    Graph {
        path: PathBuf,
        sample_rate: u32,
        gain: f32,
    },
    /// A raw interleaved f32 buffer, bypassing the container demuxer.
    Buffer { path: PathBuf, format: PcmFormat },
}

impl AudioFeed {
    pub fn path(&self) -> &Path {
        match self {
            AudioFeed::Direct { path } | AudioFeed::Graph { path, .. } | AudioFeed::Buffer { path, .. } => path,
        }
    }
}

/// Record the video stream next to an audio feed.
#[derive(Debug, Clone)]
pub struct RecordingJob {
    pub video: PathBuf,
    pub audio: AudioFeed,
    pub output: PathBuf,
    /// Output duration, pinned to the video's
    pub duration: f64,
    pub encoding: EncodingConfig,
}

/// Per-call execution bounds shared by every backend operation.
#[derive(Clone)]
pub struct BackendCall {
    pub control: RunControl,
    pub timeout: Duration,
    pub progress: ProgressSpan,
}

impl BackendCall {
    pub fn new(control: RunControl, timeout: Duration, progress: ProgressSpan) -> Self {
        Self {
            control,
            timeout,
            progress,
        }
    }
}

/// Encode/decode operations the pipeline depends on.
#[async_trait]
pub trait MediaBackend: Send + Sync {
    /// Short backend name for logs.
    fn name(&self) -> &'static str;

    /// Inspect a file's streams.
    async fn probe(&self, path: &Path) -> MediaResult<MediaInfo>;

    /// Decode the first audio stream to interleaved f32 samples in `format`.
    /// `scratch` is a workspace path the backend may use for the raw dump.
    async fn decode_pcm(
        &self,
        input: &Path,
        scratch: &Path,
        format: PcmFormat,
        call: &BackendCall,
    ) -> MediaResult<Vec<f32>>;

    async fn trim(&self, job: &TrimJob, call: &BackendCall) -> MediaResult<()>;

    async fn normalize(&self, job: &NormalizeJob, call: &BackendCall) -> MediaResult<()>;

    /// Join files that share one geometry and codec, in order, without
    /// re-encoding.
    async fn join(&self, inputs: &[PathBuf], output: &Path, call: &BackendCall) -> MediaResult<()>;

    async fn record(&self, job: &RecordingJob, call: &BackendCall) -> MediaResult<()>;
}
