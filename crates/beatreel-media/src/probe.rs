//! FFprobe media information.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;

use beatreel_models::Geometry;

use crate::command::check_ffprobe;
use crate::error::{MediaError, MediaResult};

/// Video stream details.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoStreamInfo {
    pub width: u32,
    pub height: u32,
    /// Frame rate (fps), `None` when the container does not declare one
    pub fps: Option<f64>,
    pub codec: String,
}

/// Audio stream details.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioStreamInfo {
    pub channels: u32,
    pub sample_rate: u32,
    pub codec: String,
}

/// Media file information.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaInfo {
    /// Duration in seconds
    pub duration: f64,
    /// File size in bytes
    pub size: u64,
    /// Bitrate in bits/second
    pub bitrate: u64,
    pub video: Option<VideoStreamInfo>,
    pub audio: Option<AudioStreamInfo>,
}

impl MediaInfo {
    /// Geometry of the first video stream, falling back to `default_fps`
    /// when the frame rate is unknown.
    pub fn geometry(&self, default_fps: f64) -> Option<Geometry> {
        self.video.as_ref().map(|v| Geometry {
            width: v.width,
            height: v.height,
            frame_rate: v.fps.filter(|f| f.is_finite() && *f > 0.0).unwrap_or(default_fps),
        })
    }

    pub fn audio_channels(&self) -> u32 {
        self.audio.as_ref().map(|a| a.channels).unwrap_or(0)
    }

    pub fn has_video(&self) -> bool {
        self.video.is_some()
    }
}

/// FFprobe JSON output format.
#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    format: FfprobeFormat,
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
    size: Option<String>,
    bit_rate: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: String,
    codec_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
    avg_frame_rate: Option<String>,
    channels: Option<u32>,
    sample_rate: Option<String>,
    duration: Option<String>,
}

/// Probe a media file with the `ffprobe` found on `PATH`.
pub async fn probe_media(path: impl AsRef<Path>) -> MediaResult<MediaInfo> {
    let ffprobe = check_ffprobe()?;
    probe_media_with(&ffprobe, path).await
}

/// Probe a media file with a specific `ffprobe` binary.
pub async fn probe_media_with(ffprobe: &Path, path: impl AsRef<Path>) -> MediaResult<MediaInfo> {
    let path = path.as_ref();

    if !path.exists() {
        return Err(MediaError::FileNotFound(path.to_path_buf()));
    }

    let output = Command::new(ffprobe)
        .args([
            "-v",
            "quiet",
            "-print_format",
            "json",
            "-show_format",
            "-show_streams",
        ])
        .arg(path)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output()
        .await?;

    if !output.status.success() {
        return Err(MediaError::FfprobeFailed {
            message: format!("FFprobe failed for {}", path.display()),
            stderr: Some(String::from_utf8_lossy(&output.stderr).to_string()),
        });
    }

    parse_probe_output(&output.stdout)
}

/// Parse ffprobe's JSON into [`MediaInfo`].
pub(crate) fn parse_probe_output(json: &[u8]) -> MediaResult<MediaInfo> {
    let probe: FfprobeOutput = serde_json::from_slice(json)?;

    let video = probe
        .streams
        .iter()
        .find(|s| s.codec_type == "video")
        .map(|s| VideoStreamInfo {
            width: s.width.unwrap_or(0),
            height: s.height.unwrap_or(0),
            fps: s
                .avg_frame_rate
                .as_deref()
                .and_then(parse_frame_rate)
                .or_else(|| s.r_frame_rate.as_deref().and_then(parse_frame_rate)),
            codec: s.codec_name.clone().unwrap_or_default(),
        });

    let audio = probe
        .streams
        .iter()
        .find(|s| s.codec_type == "audio")
        .map(|s| AudioStreamInfo {
            channels: s.channels.unwrap_or(0),
            sample_rate: s
                .sample_rate
                .as_deref()
                .and_then(|r| r.parse().ok())
                .unwrap_or(0),
            codec: s.codec_name.clone().unwrap_or_default(),
        });

    // Some containers (raw webm from recorders) only carry stream durations
    let duration = probe
        .format
        .duration
        .as_deref()
        .and_then(|d| d.parse::<f64>().ok())
        .or_else(|| {
            probe
                .streams
                .iter()
                .filter_map(|s| s.duration.as_deref().and_then(|d| d.parse::<f64>().ok()))
                .reduce(f64::max)
        })
        .filter(|d| d.is_finite() && *d >= 0.0)
        .unwrap_or(0.0);

    let size = probe
        .format
        .size
        .as_deref()
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or(0);

    let bitrate = probe
        .format
        .bit_rate
        .as_deref()
        .and_then(|b| b.parse::<u64>().ok())
        .unwrap_or(0);

    Ok(MediaInfo {
        duration,
        size,
        bitrate,
        video,
        audio,
    })
}

/// Parse frame rate string (e.g., "30/1" or "29.97"). "0/0" yields `None`.
pub(crate) fn parse_frame_rate(s: &str) -> Option<f64> {
    let rate = if let Some((num, den)) = s.split_once('/') {
        let num: f64 = num.parse().ok()?;
        let den: f64 = den.parse().ok()?;
        if den <= 0.0 {
            return None;
        }
        num / den
    } else {
        s.parse().ok()?
    };
    (rate.is_finite() && rate > 0.0).then_some(rate)
}
