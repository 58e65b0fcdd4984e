//! Frame-accurate trimming.
//!
//! # Modes
//!
//! - `FrameAccurate`: fast input seek to 5 s before the cut, accurate output
//!   seek for the remainder, re-encode at the target frame rate
//! - `KeyframeCopy`: input seek plus stream copy; the cut may snap to the
//!   nearest keyframe
//!
//! Audio is always stripped; the reel's soundtrack is attached at merge time.

use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

use beatreel_models::{Clip, ClipMeta, Geometry, MediaSource, SegmentDescriptor, TrimMode};

use crate::backend::TrimJob;
use crate::context::{AssemblyContext, PreparedSource};
use crate::control::RunControl;
use crate::error::{MediaError, MediaResult, Stage};
use crate::metrics;
use crate::progress::{ProgressSink, ProgressSpan, ProgressTracker};
use crate::workspace::Workspace;

impl AssemblyContext {
    /// Cut `[segment.start_time, segment.end_time)` out of `source`.
    ///
    /// Backend failures propagate; an output below `min_trim_bytes` is
    /// reported as `OutputTooSmall`.
    pub async fn trim_segment(
        &self,
        source: &MediaSource,
        segment: &SegmentDescriptor,
        progress: Option<Arc<dyn ProgressSink>>,
        control: &RunControl,
    ) -> MediaResult<Clip> {
        let tracker = ProgressTracker::new(progress);
        let span = tracker.full();
        span.begin();

        let workspace = self.workspace("trim")?;
        let prepared = self.prepare_video(&workspace, source, control).await?;
        let clip = self
            .trim_prepared(&workspace, &prepared, segment, &span, control)
            .await?;

        tracker.complete();
        Ok(clip)
    }

    pub(crate) async fn trim_prepared(
        &self,
        workspace: &Workspace,
        source: &PreparedSource,
        segment: &SegmentDescriptor,
        span: &ProgressSpan,
        control: &RunControl,
    ) -> MediaResult<Clip> {
        let started = Instant::now();
        let duration = source.info.duration;
        let start = segment.start_time.max(0.0);
        let end = segment.end_time.min(duration);
        if !(start.is_finite() && end.is_finite()) || start >= end {
            return Err(MediaError::InvalidRange {
                start: segment.start_time,
                end: segment.end_time,
                duration,
            });
        }

        let config = self.config();
        let job = TrimJob {
            input: source.path.clone(),
            output: workspace.file(&format!("{}_trim", source.id.file_stem()), "mp4"),
            start,
            end,
            mode: config.trim_mode,
            frame_rate: config.target_frame_rate,
            encoding: config.encoding.clone(),
        };
        debug!(
            source_id = %source.id,
            start,
            end,
            mode = %job.mode,
            "Trimming segment"
        );

        let call = self.call(control, span.clone());
        control
            .guard(
                Stage::Trim,
                Some(config.stage_timeout()),
                self.backend().trim(&job, &call),
            )
            .await?;

        let data = workspace.read_output(&job.output, Stage::Trim).await?;
        let size = data.len() as u64;
        if size < config.min_trim_bytes {
            return Err(MediaError::OutputTooSmall {
                stage: Stage::Trim,
                size,
                minimum: config.min_trim_bytes,
            });
        }

        let source_geometry = source.info.geometry(config.target_frame_rate as f64);
        let geometry = match (config.trim_mode, source_geometry) {
            (TrimMode::FrameAccurate, Some(g)) => Geometry {
                frame_rate: config.target_frame_rate as f64,
                ..g
            },
            (TrimMode::KeyframeCopy, Some(g)) => g,
            (_, None) => Geometry {
                width: 0,
                height: 0,
                frame_rate: config.target_frame_rate as f64,
            },
        };

        metrics::record_stage_duration(Stage::Trim, started.elapsed());
        span.finish();
        info!(
            source_id = %source.id,
            start,
            end,
            bytes = size,
            "Trimmed segment"
        );

        Ok(Clip::new(data, ClipMeta::with_geometry(geometry, end - start)))
    }
}
