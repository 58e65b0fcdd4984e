//! In-process [`MediaBackend`] for tests.
//!
//! Fake media files are a `FAKE` tag, one JSON line describing the streams,
//! and padding up to a size proportional to the duration. Every operation
//! reads and writes that format, so size ratios, geometry checks and stream
//! presence behave like the real thing without spawning FFmpeg.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::fs;

use beatreel_models::{Clip, ClipMeta, Geometry, MediaSource, TrimMode};

use crate::backend::{
    AudioFeed, BackendCall, MediaBackend, NormalizeJob, PcmFormat, RecordingJob, TrimJob,
};
use crate::error::{MediaError, MediaResult};
use crate::probe::{AudioStreamInfo, MediaInfo, VideoStreamInfo};

const MAGIC: &[u8] = b"FAKE";
const BYTES_PER_SECOND: f64 = 2000.0;
const DEFAULT_RECORD_RATIO: f64 = 1.1;
const BURST_SECS: f64 = 0.05;
const BURST_HZ: f64 = 440.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FakeVideo {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FakeAudio {
    pub channels: u32,
    pub sample_rate: u32,
}

/// Stream description stored in a fake media file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FakeMedia {
    pub duration: f64,
    pub video: Option<FakeVideo>,
    pub audio: Option<FakeAudio>,
    #[serde(default)]
    pub beats: Vec<f64>,
    /// Tags of the pieces this file was joined from, in order
    #[serde(default)]
    pub parts: Vec<String>,
}

impl FakeMedia {
    fn geometry(&self) -> Option<Geometry> {
        self.video.map(|v| Geometry {
            width: v.width,
            height: v.height,
            frame_rate: v.fps,
        })
    }

    fn default_size(&self) -> usize {
        (self.duration.max(0.0) * BYTES_PER_SECOND).round() as usize
    }

    /// Encode with `size` total bytes (never less than the header).
    pub fn encode(&self, size: usize) -> Vec<u8> {
        let mut data = MAGIC.to_vec();
        data.extend(serde_json::to_vec(self).unwrap_or_default());
        data.push(b'\n');
        if data.len() < size {
            data.resize(size, b'.');
        }
        data
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.encode(self.default_size())
    }
}

type TrimHook = Box<dyn Fn(&TrimJob) -> Option<MediaError> + Send + Sync>;
type NormalizeHook = Box<dyn Fn(&NormalizeJob) -> Option<MediaError> + Send + Sync>;
type RecordHook = Box<dyn Fn(&RecordingJob) -> MediaResult<f64> + Send + Sync>;

/// Programmable backend. Hooks decide failures; counters tell tests which
/// operations ran.
#[derive(Default)]
pub struct FakeBackend {
    trim_hook: Option<TrimHook>,
    normalize_hook: Option<NormalizeHook>,
    record_hook: Option<RecordHook>,
    record_delay: Option<Duration>,
    probes: AtomicUsize,
    decodes: AtomicUsize,
    trims: AtomicUsize,
    normalizes: AtomicUsize,
    joins: AtomicUsize,
    records: AtomicUsize,
    feeds: Mutex<Vec<&'static str>>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail trims for which `hook` returns an error.
    pub fn with_trim_failure<F>(mut self, hook: F) -> Self
    where
        F: Fn(&TrimJob) -> Option<MediaError> + Send + Sync + 'static,
    {
        self.trim_hook = Some(Box::new(hook));
        self
    }

    pub fn with_normalize_failure<F>(mut self, hook: F) -> Self
    where
        F: Fn(&NormalizeJob) -> Option<MediaError> + Send + Sync + 'static,
    {
        self.normalize_hook = Some(Box::new(hook));
        self
    }

    /// Decide each recording: `Ok(ratio)` writes an output of
    /// `video_size * ratio` bytes, `Err` fails the run.
    pub fn with_record<F>(mut self, hook: F) -> Self
    where
        F: Fn(&RecordingJob) -> MediaResult<f64> + Send + Sync + 'static,
    {
        self.record_hook = Some(Box::new(hook));
        self
    }

    pub fn with_record_delay(mut self, delay: Duration) -> Self {
        self.record_delay = Some(delay);
        self
    }

    pub fn probe_count(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }

    pub fn decode_count(&self) -> usize {
        self.decodes.load(Ordering::SeqCst)
    }

    pub fn trim_count(&self) -> usize {
        self.trims.load(Ordering::SeqCst)
    }

    pub fn normalize_count(&self) -> usize {
        self.normalizes.load(Ordering::SeqCst)
    }

    pub fn join_count(&self) -> usize {
        self.joins.load(Ordering::SeqCst)
    }

    pub fn record_count(&self) -> usize {
        self.records.load(Ordering::SeqCst)
    }

    /// Audio feed kinds seen by `record`, in call order.
    pub fn recorded_feeds(&self) -> Vec<&'static str> {
        self.feeds.lock().unwrap().clone()
    }

    pub fn video_source_with(id: &str, duration: f64, width: u32, height: u32, fps: f64) -> MediaSource {
        let media = FakeMedia {
            duration,
            video: Some(FakeVideo { width, height, fps }),
            audio: None,
            beats: Vec::new(),
            parts: Vec::new(),
        };
        MediaSource::new(id, media.to_bytes(), "video/mp4")
    }

    /// 1280x720 at 30 fps, no audio.
    pub fn video_source(id: &str, duration: f64) -> MediaSource {
        Self::video_source_with(id, duration, 1280, 720, 30.0)
    }

    /// Stereo 8 kHz track with a short tone burst at each beat.
    pub fn audio_source(id: &str, duration: f64, beats: &[f64]) -> MediaSource {
        let media = FakeMedia {
            duration,
            video: None,
            audio: Some(FakeAudio {
                channels: 2,
                sample_rate: 8000,
            }),
            beats: beats.to_vec(),
            parts: Vec::new(),
        };
        MediaSource::new(id, media.to_bytes(), "audio/wav")
    }

    pub fn clip(duration: f64, width: u32, height: u32, fps: f64) -> Clip {
        Self::tagged_clip("", duration, width, height, fps)
    }

    /// A clip whose `parts` carries `tag`, so joins can be checked for order.
    pub fn tagged_clip(tag: &str, duration: f64, width: u32, height: u32, fps: f64) -> Clip {
        let media = FakeMedia {
            duration,
            video: Some(FakeVideo { width, height, fps }),
            audio: None,
            beats: Vec::new(),
            parts: if tag.is_empty() { Vec::new() } else { vec![tag.to_string()] },
        };
        let geometry = Geometry {
            width,
            height,
            frame_rate: fps,
        };
        Clip::new(media.to_bytes(), ClipMeta::with_geometry(geometry, duration))
    }

    pub fn read_fake(bytes: &[u8]) -> Option<FakeMedia> {
        let body = bytes.strip_prefix(MAGIC)?;
        let end = body.iter().position(|b| *b == b'\n')?;
        serde_json::from_slice(&body[..end]).ok()
    }

    async fn load(path: &Path) -> MediaResult<(FakeMedia, u64)> {
        let bytes = fs::read(path).await?;
        let media = Self::read_fake(&bytes).ok_or_else(|| {
            MediaError::ffmpeg_failed(
                format!("{}: Invalid data found when processing input", path.display()),
                None,
                Some(1),
            )
        })?;
        Ok((media, bytes.len() as u64))
    }
}

fn feed_kind(feed: &AudioFeed) -> &'static str {
    match feed {
        AudioFeed::Direct { .. } => "direct",
        AudioFeed::Graph { .. } => "graph",
        AudioFeed::Buffer { .. } => "buffer",
    }
}

#[async_trait]
impl MediaBackend for FakeBackend {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn probe(&self, path: &Path) -> MediaResult<MediaInfo> {
        self.probes.fetch_add(1, Ordering::SeqCst);
        let bytes = fs::read(path).await?;
        let media = Self::read_fake(&bytes).ok_or_else(|| MediaError::FfprobeFailed {
            message: "Invalid data found when processing input".to_string(),
            stderr: None,
        })?;

        Ok(MediaInfo {
            duration: media.duration,
            size: bytes.len() as u64,
            bitrate: 0,
            video: media.video.map(|v| VideoStreamInfo {
                width: v.width,
                height: v.height,
                fps: Some(v.fps),
                codec: "h264".to_string(),
            }),
            audio: media.audio.map(|a| AudioStreamInfo {
                channels: a.channels,
                sample_rate: a.sample_rate,
                codec: "aac".to_string(),
            }),
        })
    }

    async fn decode_pcm(
        &self,
        input: &Path,
        _scratch: &Path,
        format: PcmFormat,
        _call: &BackendCall,
    ) -> MediaResult<Vec<f32>> {
        self.decodes.fetch_add(1, Ordering::SeqCst);
        let (media, _) = Self::load(input).await?;
        if media.audio.is_none() {
            return Err(MediaError::ffmpeg_failed(
                "Output file does not contain any stream",
                None,
                Some(1),
            ));
        }

        let rate = format.sample_rate as f64;
        let channels = format.channels as usize;
        let frames = (media.duration * rate).round() as usize;
        let mut samples = vec![0.0f32; frames * channels];
        let burst = (BURST_SECS * rate).round() as usize;

        for beat in &media.beats {
            let first = (beat * rate).round() as usize;
            for frame in first..(first + burst).min(frames) {
                let t = frame as f64 / rate;
                let value = (0.8 * (2.0 * std::f64::consts::PI * BURST_HZ * t).sin()) as f32;
                for c in 0..channels {
                    samples[frame * channels + c] = value;
                }
            }
        }
        Ok(samples)
    }

    async fn trim(&self, job: &TrimJob, call: &BackendCall) -> MediaResult<()> {
        self.trims.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.trim_hook.as_ref().and_then(|hook| hook(job)) {
            return Err(err);
        }
        let (input, _) = Self::load(&job.input).await?;
        call.progress.report(50.0);

        let video = input.video.map(|v| match job.mode {
            TrimMode::FrameAccurate => FakeVideo {
                fps: job.frame_rate as f64,
                ..v
            },
            TrimMode::KeyframeCopy => v,
        });
        let output = FakeMedia {
            duration: job.duration(),
            video,
            audio: None,
            beats: Vec::new(),
            parts: vec![format!("{:.2}-{:.2}", job.start, job.end)],
        };
        fs::write(&job.output, output.to_bytes()).await?;
        call.progress.finish();
        Ok(())
    }

    async fn normalize(&self, job: &NormalizeJob, call: &BackendCall) -> MediaResult<()> {
        self.normalizes.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.normalize_hook.as_ref().and_then(|hook| hook(job)) {
            return Err(err);
        }
        let (input, _) = Self::load(&job.input).await?;
        let g = job.geometry.even();
        let output = FakeMedia {
            video: Some(FakeVideo {
                width: g.width,
                height: g.height,
                fps: g.frame_rate,
            }),
            audio: None,
            ..input
        };
        fs::write(&job.output, output.to_bytes()).await?;
        call.progress.finish();
        Ok(())
    }

    async fn join(&self, inputs: &[PathBuf], output: &Path, call: &BackendCall) -> MediaResult<()> {
        self.joins.fetch_add(1, Ordering::SeqCst);
        let mut joined: Option<FakeMedia> = None;
        let mut size = 0u64;

        for path in inputs {
            let (media, bytes) = Self::load(path).await?;
            size += bytes;
            match joined.as_mut() {
                None => joined = Some(media),
                Some(acc) => {
                    if acc.geometry() != media.geometry() {
                        return Err(MediaError::ffmpeg_failed(
                            "concat inputs differ in geometry",
                            None,
                            Some(1),
                        ));
                    }
                    acc.duration += media.duration;
                    acc.parts.extend(media.parts);
                }
            }
        }

        let media = joined.ok_or_else(|| MediaError::internal("join called without inputs"))?;
        fs::write(output, media.encode(size as usize)).await?;
        call.progress.finish();
        Ok(())
    }

    async fn record(&self, job: &RecordingJob, call: &BackendCall) -> MediaResult<()> {
        self.records.fetch_add(1, Ordering::SeqCst);
        self.feeds.lock().unwrap().push(feed_kind(&job.audio));

        if let Some(delay) = self.record_delay {
            tokio::time::sleep(delay).await;
        }

        let (video, video_size) = Self::load(&job.video).await?;
        let audio = match &job.audio {
            AudioFeed::Direct { path } | AudioFeed::Graph { path, .. } => {
                let (audio, _) = Self::load(path).await?;
                audio.audio.ok_or_else(|| {
                    MediaError::ffmpeg_failed(
                        "Stream map '1:a:0' matches no streams",
                        None,
                        Some(1),
                    )
                })?
            }
            AudioFeed::Buffer { path, format } => {
                if fs::metadata(path).await.map(|m| m.len()).unwrap_or(0) == 0 {
                    return Err(MediaError::ffmpeg_failed("empty PCM input", None, Some(1)));
                }
                FakeAudio {
                    channels: format.channels,
                    sample_rate: format.sample_rate,
                }
            }
        };

        let ratio = match &self.record_hook {
            Some(hook) => hook(job)?,
            None => DEFAULT_RECORD_RATIO,
        };
        let output = FakeMedia {
            duration: job.duration,
            video: video.video,
            audio: Some(audio),
            beats: Vec::new(),
            parts: video.parts.clone(),
        };
        let size = (video_size as f64 * ratio).round().max(0.0) as usize;
        fs::write(&job.output, output.encode(size)).await?;
        call.progress.finish();
        Ok(())
    }
}
