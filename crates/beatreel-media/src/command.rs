//! FFmpeg command builder and runner.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::error::{MediaError, MediaResult, Stage};
use crate::progress::FfmpegProgress;

/// Number of non-progress stderr lines kept for error reports.
const STDERR_TAIL_LINES: usize = 20;

/// One `-i` input together with the arguments that precede it.
#[derive(Debug, Clone)]
struct FfmpegInput {
    args: Vec<String>,
    path: PathBuf,
}

/// Builder for FFmpeg commands.
///
/// Input arguments always attach to the most recently added input, so
/// `FfmpegCommand::new(a, out).seek(3.0).add_input(b).input_args(["-f", "f32le"])`
/// seeks `a` and declares `b` as raw PCM.
#[derive(Debug, Clone)]
pub struct FfmpegCommand {
    inputs: Vec<FfmpegInput>,
    output: PathBuf,
    /// Output arguments (after the last -i)
    output_args: Vec<String>,
    overwrite: bool,
    log_level: String,
}

impl FfmpegCommand {
    /// Create a new FFmpeg command with a single input.
    pub fn new(input: impl AsRef<Path>, output: impl AsRef<Path>) -> Self {
        Self {
            inputs: vec![FfmpegInput {
                args: Vec::new(),
                path: input.as_ref().to_path_buf(),
            }],
            output: output.as_ref().to_path_buf(),
            output_args: Vec::new(),
            overwrite: true,
            log_level: "error".to_string(),
        }
    }

    /// Append another input. Subsequent input arguments apply to it.
    pub fn add_input(mut self, input: impl AsRef<Path>) -> Self {
        self.inputs.push(FfmpegInput {
            args: Vec::new(),
            path: input.as_ref().to_path_buf(),
        });
        self
    }

    /// Add an argument before the current input's -i.
    pub fn input_arg(mut self, arg: impl Into<String>) -> Self {
        if let Some(input) = self.inputs.last_mut() {
            input.args.push(arg.into());
        }
        self
    }

    pub fn input_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if let Some(input) = self.inputs.last_mut() {
            input.args.extend(args.into_iter().map(Into::into));
        }
        self
    }

    /// Add output arguments (after every -i).
    pub fn output_arg(mut self, arg: impl Into<String>) -> Self {
        self.output_args.push(arg.into());
        self
    }

    pub fn output_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.output_args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Fast seek on the current input (keyframe granularity).
    pub fn seek(self, seconds: f64) -> Self {
        self.input_arg("-ss").input_arg(format!("{:.3}", seconds))
    }

    /// Accurate seek applied after decoding.
    pub fn output_seek(self, seconds: f64) -> Self {
        self.output_arg("-ss").output_arg(format!("{:.3}", seconds))
    }

    /// Limit the output duration.
    pub fn duration(self, seconds: f64) -> Self {
        self.output_arg("-t").output_arg(format!("{:.3}", seconds))
    }

    pub fn video_filter(self, filter: impl Into<String>) -> Self {
        self.output_arg("-vf").output_arg(filter)
    }

    pub fn filter_complex(self, filter: impl Into<String>) -> Self {
        self.output_arg("-filter_complex").output_arg(filter)
    }

    /// Select a stream (`0:v:0`, `[aout]`) for the output.
    pub fn map(self, spec: impl Into<String>) -> Self {
        self.output_arg("-map").output_arg(spec)
    }

    pub fn video_codec(self, codec: impl Into<String>) -> Self {
        self.output_arg("-c:v").output_arg(codec)
    }

    pub fn audio_codec(self, codec: impl Into<String>) -> Self {
        self.output_arg("-c:a").output_arg(codec)
    }

    /// Copy every mapped stream without re-encoding.
    pub fn codec_copy(self) -> Self {
        self.output_arg("-c").output_arg("copy")
    }

    /// Drop audio from the output.
    pub fn no_audio(self) -> Self {
        self.output_arg("-an")
    }

    /// Set the quality flag (`-crf` or `-cq`) and value.
    pub fn quality(self, flag: &str, value: u8) -> Self {
        self.output_arg(flag).output_arg(value.to_string())
    }

    pub fn crf(self, crf: u8) -> Self {
        self.quality("-crf", crf)
    }

    pub fn preset(self, preset: impl Into<String>) -> Self {
        self.output_arg("-preset").output_arg(preset)
    }

    pub fn pixel_format(self, format: impl Into<String>) -> Self {
        self.output_arg("-pix_fmt").output_arg(format)
    }

    pub fn frame_rate(self, fps: f64) -> Self {
        self.output_arg("-r").output_arg(format_rate(fps))
    }

    pub fn audio_bitrate(self, bitrate: impl Into<String>) -> Self {
        self.output_arg("-b:a").output_arg(bitrate)
    }

    /// Move the moov atom to the front so the clip streams from its head.
    pub fn faststart(self) -> Self {
        self.output_arg("-movflags").output_arg("+faststart")
    }

    /// Shift timestamps so the output starts at zero.
    pub fn zero_timestamps(self) -> Self {
        self.output_arg("-avoid_negative_ts").output_arg("make_zero")
    }

    /// Build the command arguments.
    pub fn build_args(&self) -> Vec<String> {
        let mut args = Vec::new();

        if self.overwrite {
            args.push("-y".to_string());
        }

        args.push("-v".to_string());
        args.push(self.log_level.clone());

        // Progress output to stderr
        args.push("-progress".to_string());
        args.push("pipe:2".to_string());
        args.push("-nostats".to_string());

        for input in &self.inputs {
            args.extend(input.args.iter().cloned());
            args.push("-i".to_string());
            args.push(input.path.to_string_lossy().to_string());
        }

        args.extend(self.output_args.iter().cloned());
        args.push(self.output.to_string_lossy().to_string());

        args
    }
}

/// Render a frame rate without a trailing `.000` for whole numbers.
pub fn format_rate(fps: f64) -> String {
    if (fps - fps.round()).abs() < 1e-6 {
        format!("{}", fps.round() as u64)
    } else {
        format!("{:.3}", fps)
    }
}

/// Runner for FFmpeg commands with progress tracking, timeout and
/// cancellation.
pub struct FfmpegRunner {
    stage: Stage,
    binary: Option<PathBuf>,
    cancel_rx: Option<watch::Receiver<bool>>,
    timeout: Option<Duration>,
}

impl FfmpegRunner {
    /// Create a runner whose failures are attributed to `stage`.
    pub fn new(stage: Stage) -> Self {
        Self {
            stage,
            binary: None,
            cancel_rx: None,
            timeout: None,
        }
    }

    /// Run this `ffmpeg` binary instead of looking it up on `PATH`.
    pub fn with_binary(mut self, binary: impl Into<PathBuf>) -> Self {
        self.binary = Some(binary.into());
        self
    }

    /// Set cancellation signal.
    pub fn with_cancel(mut self, cancel_rx: watch::Receiver<bool>) -> Self {
        self.cancel_rx = Some(cancel_rx);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Run an FFmpeg command.
    pub async fn run(&self, cmd: &FfmpegCommand) -> MediaResult<()> {
        self.run_with_progress(cmd, |_| {}).await
    }

    /// Run an FFmpeg command with progress callback.
    pub async fn run_with_progress<F>(&self, cmd: &FfmpegCommand, progress_callback: F) -> MediaResult<()>
    where
        F: Fn(FfmpegProgress) + Send + 'static,
    {
        self.ensure_not_cancelled()?;
        let program = match &self.binary {
            Some(binary) => binary.clone(),
            None => check_ffmpeg()?,
        };

        let args = cmd.build_args();
        debug!(stage = %self.stage, "Running FFmpeg: {} {}", program.display(), args.join(" "));

        let mut child = Command::new(&program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| MediaError::internal("ffmpeg stderr was not captured"))?;
        let mut reader = BufReader::new(stderr).lines();

        // Progress lines go to the callback, everything else into a short tail
        let progress_handle = tokio::spawn(async move {
            let mut current_progress = FfmpegProgress::default();
            let mut tail = VecDeque::with_capacity(STDERR_TAIL_LINES);

            while let Ok(Some(line)) = reader.next_line().await {
                if is_progress_key(&line) {
                    if let Some(progress) = parse_progress_line(&line, &mut current_progress) {
                        progress_callback(progress);
                    }
                } else if !line.trim().is_empty() {
                    if tail.len() == STDERR_TAIL_LINES {
                        tail.pop_front();
                    }
                    tail.push_back(line);
                }
            }

            tail.into_iter().collect::<Vec<_>>().join("\n")
        });

        let result = self.wait_for_completion(&mut child).await;
        let stderr_tail = progress_handle.await.unwrap_or_default();

        match result {
            Err(MediaError::FfmpegFailed {
                message, exit_code, ..
            }) => Err(MediaError::FfmpegFailed {
                message,
                stderr: (!stderr_tail.is_empty()).then_some(stderr_tail),
                exit_code,
            }),
            other => other,
        }
    }

    fn ensure_not_cancelled(&self) -> MediaResult<()> {
        match self.cancel_rx {
            Some(ref rx) if *rx.borrow() => Err(MediaError::Cancelled),
            _ => Ok(()),
        }
    }

    /// Wait for the child, racing it against the timeout and the cancel
    /// signal. The child is killed on either.
    async fn wait_for_completion(&self, child: &mut Child) -> MediaResult<()> {
        let mut cancel_rx = self.cancel_rx.clone();
        let cancelled = async {
            match cancel_rx.as_mut() {
                Some(rx) => {
                    // A dropped sender can never cancel
                    if rx.wait_for(|cancelled| *cancelled).await.is_err() {
                        std::future::pending::<()>().await;
                    }
                }
                None => std::future::pending::<()>().await,
            }
        };
        let deadline = async {
            match self.timeout {
                Some(limit) => tokio::time::sleep(limit).await,
                None => std::future::pending::<()>().await,
            }
        };

        let status = tokio::select! {
            status = child.wait() => status?,
            _ = cancelled => {
                info!(stage = %self.stage, "FFmpeg cancelled, killing process");
                let _ = child.kill().await;
                return Err(MediaError::Cancelled);
            }
            _ = deadline => {
                let limit = self.timeout.unwrap_or_default();
                warn!(stage = %self.stage, "FFmpeg timed out after {:?}, killing process", limit);
                let _ = child.kill().await;
                return Err(MediaError::timeout(self.stage, limit));
            }
        };

        if status.success() {
            Ok(())
        } else {
            Err(MediaError::ffmpeg_failed(
                format!("FFmpeg exited with non-zero status during {}", self.stage),
                None,
                status.code(),
            ))
        }
    }
}

const PROGRESS_KEYS: &[&str] = &[
    "frame",
    "fps",
    "stream_0_0_q",
    "bitrate",
    "total_size",
    "out_time_us",
    "out_time_ms",
    "out_time",
    "dup_frames",
    "drop_frames",
    "speed",
    "progress",
];

fn is_progress_key(line: &str) -> bool {
    line.split_once('=')
        .map(|(key, _)| PROGRESS_KEYS.contains(&key.trim()))
        .unwrap_or(false)
}

/// Parse a progress line from FFmpeg's -progress output.
///
/// Returns a snapshot at each `progress=` line, which closes a block.
pub(crate) fn parse_progress_line(line: &str, current: &mut FfmpegProgress) -> Option<FfmpegProgress> {
    let line = line.trim();

    if let Some((key, value)) = line.split_once('=') {
        match key {
            // Both keys carry microseconds despite the name
            "out_time_ms" | "out_time_us" => {
                if let Ok(us) = value.parse::<i64>() {
                    current.out_time_ms = us / 1000;
                }
            }
            "out_time" => {
                current.out_time = value.to_string();
            }
            "frame" => {
                if let Ok(frame) = value.parse() {
                    current.frame = frame;
                }
            }
            "fps" => {
                if let Ok(fps) = value.parse() {
                    current.fps = fps;
                }
            }
            "speed" => {
                // "1.5x" or "N/A"
                if let Some(speed) = value.trim().strip_suffix('x').and_then(|s| s.parse().ok()) {
                    current.speed = speed;
                }
            }
            "progress" => {
                if value == "end" {
                    current.is_complete = true;
                }
                return Some(current.clone());
            }
            _ => {}
        }
    }

    None
}

/// Check if FFmpeg is available.
pub fn check_ffmpeg() -> MediaResult<PathBuf> {
    which::which("ffmpeg").map_err(|_| MediaError::FfmpegNotFound)
}

/// Check if FFprobe is available.
pub fn check_ffprobe() -> MediaResult<PathBuf> {
    which::which("ffprobe").map_err(|_| MediaError::FfprobeNotFound)
}
