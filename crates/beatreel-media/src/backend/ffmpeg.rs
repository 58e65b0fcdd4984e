//! FFmpeg CLI backend.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

use beatreel_models::{EncodingConfig, Geometry, TrimMode};

use super::{AudioFeed, BackendCall, MediaBackend, NormalizeJob, PcmFormat, RecordingJob, TrimJob};
use crate::command::{check_ffmpeg, check_ffprobe, format_rate, FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult, Stage};
use crate::probe::{probe_media_with, MediaInfo};

/// Input seek lands this far before the cut; the output seek covers the rest.
const FAST_SEEK_MARGIN_SECS: f64 = 5.0;

/// Backend that shells out to `ffmpeg` and `ffprobe`.
#[derive(Debug, Clone)]
pub struct FfmpegBackend {
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
}

impl FfmpegBackend {
    /// Locate both binaries on `PATH`.
    pub fn new() -> MediaResult<Self> {
        let ffmpeg = check_ffmpeg()
            .map_err(|e| MediaError::EncodeBackendUnavailable(e.to_string()))?;
        let ffprobe = check_ffprobe()
            .map_err(|e| MediaError::EncodeBackendUnavailable(e.to_string()))?;
        info!(ffmpeg = %ffmpeg.display(), ffprobe = %ffprobe.display(), "FFmpeg backend ready");
        Ok(Self { ffmpeg, ffprobe })
    }

    fn runner(&self, stage: Stage, call: &BackendCall) -> FfmpegRunner {
        FfmpegRunner::new(stage)
            .with_binary(&self.ffmpeg)
            .with_cancel(call.control.receiver())
            .with_timeout(call.timeout)
    }
}

/// Apply the configured video encoder settings.
fn with_video_encoder(cmd: FfmpegCommand, encoding: &EncodingConfig) -> FfmpegCommand {
    cmd.video_codec(&encoding.codec)
        .preset(&encoding.preset)
        .quality(encoding.quality_flag(), encoding.crf)
        .pixel_format(&encoding.pixel_format)
}

/// Scale into `geometry` keeping aspect ratio, pad the rest, fix the frame
/// rate and force square pixels.
pub(crate) fn normalize_filter(geometry: Geometry) -> String {
    let g = geometry.even();
    format!(
        "scale={w}:{h}:force_original_aspect_ratio=decrease,pad={w}:{h}:(ow-iw)/2:(oh-ih)/2,fps={fps},setsar=1",
        w = g.width,
        h = g.height,
        fps = format_rate(g.frame_rate)
    )
}

pub(crate) fn trim_command(job: &TrimJob) -> FfmpegCommand {
    let duration = job.duration();
    match job.mode {
        TrimMode::FrameAccurate => {
            let fast_seek = (job.start - FAST_SEEK_MARGIN_SECS).max(0.0);
            let accurate_seek = job.start - fast_seek;
            let cmd = FfmpegCommand::new(&job.input, &job.output)
                .seek(fast_seek)
                .output_seek(accurate_seek)
                .duration(duration)
                .map("0:v:0")
                .no_audio()
                .frame_rate(job.frame_rate as f64);
            with_video_encoder(cmd, &job.encoding)
                .zero_timestamps()
                .faststart()
        }
        TrimMode::KeyframeCopy => FfmpegCommand::new(&job.input, &job.output)
            .seek(job.start)
            .duration(duration)
            .map("0:v:0")
            .no_audio()
            .output_args(["-c:v", "copy"])
            .zero_timestamps()
            .faststart(),
    }
}

pub(crate) fn normalize_command(job: &NormalizeJob) -> FfmpegCommand {
    let cmd = FfmpegCommand::new(&job.input, &job.output)
        .map("0:v:0")
        .video_filter(normalize_filter(job.geometry))
        .no_audio();
    with_video_encoder(cmd, &job.encoding)
        .zero_timestamps()
        .faststart()
}

pub(crate) fn join_command(manifest: &Path, output: &Path) -> FfmpegCommand {
    FfmpegCommand::new(manifest, output)
        .input_args(["-f", "concat", "-safe", "0"])
        .codec_copy()
        .faststart()
}

pub(crate) fn decode_command(input: &Path, output: &Path, format: PcmFormat) -> FfmpegCommand {
    FfmpegCommand::new(input, output)
        .map("0:a:0")
        .output_args(["-vn", "-f", "f32le", "-acodec", "pcm_f32le"])
        .output_arg("-ac")
        .output_arg(format.channels.to_string())
        .output_arg("-ar")
        .output_arg(format.sample_rate.to_string())
}

pub(crate) fn record_command(job: &RecordingJob) -> FfmpegCommand {
    let mut cmd = FfmpegCommand::new(&job.video, &job.output).add_input(job.audio.path());

    let audio_map = match &job.audio {
        AudioFeed::Direct { .. } => "1:a:0".to_string(),
        AudioFeed::Graph {
            sample_rate, gain, ..
        } => {
            cmd = cmd.filter_complex(format!(
                "[1:a]aresample={},volume={:.3},aformat=channel_layouts=stereo[aout]",
                sample_rate, gain
            ));
            "[aout]".to_string()
        }
        AudioFeed::Buffer { format, .. } => {
            // Attaches to the PCM input, ahead of its -i
            cmd = cmd
                .input_args(["-f", "f32le"])
                .input_arg("-ar")
                .input_arg(format.sample_rate.to_string())
                .input_arg("-ac")
                .input_arg(format.channels.to_string());
            "1:a:0".to_string()
        }
    };

    cmd.map("0:v:0")
        .map(audio_map)
        .video_codec("copy")
        .audio_codec(&job.encoding.audio_codec)
        .audio_bitrate(&job.encoding.audio_bitrate)
        .duration(job.duration)
        .faststart()
}

/// Concat demuxer manifest. Single quotes are escaped the way the demuxer
/// expects.
pub(crate) fn concat_manifest(inputs: &[PathBuf]) -> String {
    inputs
        .iter()
        .map(|p| format!("file '{}'\n", p.display().to_string().replace('\'', r"'\''")))
        .collect()
}

#[async_trait]
impl MediaBackend for FfmpegBackend {
    fn name(&self) -> &'static str {
        "ffmpeg"
    }

    async fn probe(&self, path: &Path) -> MediaResult<MediaInfo> {
        probe_media_with(&self.ffprobe, path).await
    }

    async fn decode_pcm(
        &self,
        input: &Path,
        scratch: &Path,
        format: PcmFormat,
        call: &BackendCall,
    ) -> MediaResult<Vec<f32>> {
        let cmd = decode_command(input, scratch, format);
        self.runner(Stage::Decode, call).run(&cmd).await?;

        let bytes = fs::read(scratch).await?;
        let samples: Vec<f32> = bytes
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect();
        debug!(
            samples = samples.len(),
            sample_rate = format.sample_rate,
            channels = format.channels,
            "Decoded PCM"
        );
        let _ = fs::remove_file(scratch).await;
        Ok(samples)
    }

    async fn trim(&self, job: &TrimJob, call: &BackendCall) -> MediaResult<()> {
        let cmd = trim_command(job);
        self.runner(Stage::Trim, call)
            .run_with_progress(&cmd, call.progress.frame_callback(job.expected_frames()))
            .await
    }

    async fn normalize(&self, job: &NormalizeJob, call: &BackendCall) -> MediaResult<()> {
        let cmd = normalize_command(job);
        let total_ms = (job.duration * 1000.0) as i64;
        self.runner(Stage::Concat, call)
            .run_with_progress(&cmd, call.progress.time_callback(total_ms))
            .await
    }

    async fn join(&self, inputs: &[PathBuf], output: &Path, call: &BackendCall) -> MediaResult<()> {
        let manifest = output.with_extension("txt");
        fs::write(&manifest, concat_manifest(inputs)).await?;

        let cmd = join_command(&manifest, output);
        let result = self.runner(Stage::Concat, call).run(&cmd).await;
        let _ = fs::remove_file(&manifest).await;
        result
    }

    async fn record(&self, job: &RecordingJob, call: &BackendCall) -> MediaResult<()> {
        let cmd = record_command(job);
        let total_ms = (job.duration * 1000.0) as i64;
        self.runner(Stage::Merge, call)
            .run_with_progress(&cmd, call.progress.time_callback(total_ms))
            .await
    }
}
