//! Progress reporting.
//!
//! Callers hand in one [`ProgressSink`]. Every public operation wraps it in a
//! [`ProgressTracker`], which clamps values to 0-100 and drops anything that
//! would move backwards, so sinks only ever observe a non-decreasing series.
//! Stages report through a [`ProgressSpan`], which maps a local 0-100 onto the
//! slice of the global range the stage owns.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicI16, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Progress information from FFmpeg.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FfmpegProgress {
    /// Frames written so far
    pub frame: u64,
    pub fps: f64,
    /// Output time in milliseconds
    pub out_time_ms: i64,
    /// Output time as string (HH:MM:SS.microseconds)
    pub out_time: String,
    /// Encoding speed (1.5 = 1.5x realtime)
    pub speed: f64,
    pub is_complete: bool,
}

impl FfmpegProgress {
    /// Percentage of `total_duration_ms` written so far.
    pub fn percentage(&self, total_duration_ms: i64) -> f64 {
        if total_duration_ms <= 0 {
            return 0.0;
        }
        ((self.out_time_ms as f64 / total_duration_ms as f64) * 100.0).clamp(0.0, 100.0)
    }

    /// Percentage of `expected_frames` produced so far.
    pub fn frame_percentage(&self, expected_frames: u64) -> f64 {
        if expected_frames == 0 {
            return 0.0;
        }
        ((self.frame as f64 / expected_frames as f64) * 100.0).clamp(0.0, 100.0)
    }
}

/// Receives percentage updates (0-100) from a pipeline operation.
pub trait ProgressSink: Send + Sync {
    fn report(&self, percent: u8);
}

impl<F> ProgressSink for F
where
    F: Fn(u8) + Send + Sync,
{
    fn report(&self, percent: u8) {
        self(percent)
    }
}

/// Shared sink handle accepted by public operations.
pub type SharedSink = Arc<dyn ProgressSink>;

/// Sink that forwards into a bounded tokio channel.
///
/// Uses `try_send`, so a slow consumer loses intermediate values instead of
/// stalling the pipeline.
#[derive(Clone)]
pub struct ChannelSink {
    tx: mpsc::Sender<u8>,
}

impl ProgressSink for ChannelSink {
    fn report(&self, percent: u8) {
        let _ = self.tx.try_send(percent);
    }
}

/// Create a channel-backed sink and its receiver.
pub fn channel(buffer: usize) -> (SharedSink, mpsc::Receiver<u8>) {
    let (tx, rx) = mpsc::channel(buffer.max(1));
    (Arc::new(ChannelSink { tx }), rx)
}

/// Monotonic, clamped wrapper around an optional sink. One per run.
#[derive(Clone)]
pub struct ProgressTracker {
    sink: Option<SharedSink>,
    last: Arc<AtomicI16>,
}

impl ProgressTracker {
    pub fn new(sink: Option<SharedSink>) -> Self {
        Self {
            sink,
            last: Arc::new(AtomicI16::new(-1)),
        }
    }

    /// A tracker that reports nowhere.
    pub fn silent() -> Self {
        Self::new(None)
    }

    /// Report a global percentage. Values are clamped and never go backwards.
    pub fn report(&self, percent: f64) {
        let Some(ref sink) = self.sink else {
            return;
        };
        let value = if percent.is_finite() {
            percent.clamp(0.0, 100.0).floor() as i16
        } else {
            return;
        };
        let previous = self.last.fetch_max(value, Ordering::SeqCst);
        if value > previous {
            sink.report(value as u8);
        }
    }

    /// Last value delivered to the sink, if any.
    pub fn last(&self) -> Option<u8> {
        let value = self.last.load(Ordering::SeqCst);
        (value >= 0).then_some(value as u8)
    }

    pub fn complete(&self) {
        self.report(100.0);
    }

    /// Span covering the whole 0-100 range.
    pub fn full(&self) -> ProgressSpan {
        self.span(0.0, 100.0)
    }

    /// Span covering `[start, end]` of the global range.
    pub fn span(&self, start: f64, end: f64) -> ProgressSpan {
        ProgressSpan {
            tracker: self.clone(),
            start,
            end: end.max(start),
        }
    }
}

/// A slice of the global progress range owned by one stage.
#[derive(Clone)]
pub struct ProgressSpan {
    tracker: ProgressTracker,
    start: f64,
    end: f64,
}

impl ProgressSpan {
    /// Report local progress (0-100) inside this span.
    pub fn report(&self, local: f64) {
        let local = if local.is_finite() { local.clamp(0.0, 100.0) } else { 0.0 };
        self.tracker
            .report(self.start + (self.end - self.start) * local / 100.0);
    }

    pub fn begin(&self) {
        self.report(0.0);
    }

    pub fn finish(&self) {
        self.report(100.0);
    }

    /// Nested span over `[local_start, local_end]` of this span.
    pub fn sub(&self, local_start: f64, local_end: f64) -> ProgressSpan {
        let width = self.end - self.start;
        self.tracker.span(
            self.start + width * local_start.clamp(0.0, 100.0) / 100.0,
            self.start + width * local_end.clamp(0.0, 100.0) / 100.0,
        )
    }

    /// The `index`-th of `count` equal slices of this span.
    pub fn slice(&self, index: usize, count: usize) -> ProgressSpan {
        let count = count.max(1) as f64;
        let step = 100.0 / count;
        self.sub(step * index as f64, step * (index as f64 + 1.0))
    }

    /// FFmpeg callback reporting frames produced over `expected_frames`.
    pub fn frame_callback(&self, expected_frames: u64) -> impl Fn(FfmpegProgress) + Send + 'static {
        let span = self.clone();
        move |progress: FfmpegProgress| {
            if progress.is_complete {
                span.finish();
            } else {
                span.report(progress.frame_percentage(expected_frames));
            }
        }
    }

    /// FFmpeg callback reporting output time over `total_duration_ms`.
    pub fn time_callback(&self, total_duration_ms: i64) -> impl Fn(FfmpegProgress) + Send + 'static {
        let span = self.clone();
        move |progress: FfmpegProgress| {
            if progress.is_complete {
                span.finish();
            } else {
                span.report(progress.percentage(total_duration_ms));
            }
        }
    }
}
