//! Segment concatenation.
//!
//! Clips are re-encoded to one canonical geometry (the first clip's) and then
//! joined with the concat demuxer using stream copy. A single clip passes
//! through untouched.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use beatreel_models::{Clip, ClipMeta, Geometry};

use crate::backend::NormalizeJob;
use crate::context::AssemblyContext;
use crate::control::RunControl;
use crate::error::{MediaError, MediaResult, Stage};
use crate::metrics;
use crate::progress::{ProgressSink, ProgressSpan, ProgressTracker};
use crate::workspace::Workspace;

/// Share of the concat span spent normalizing; the join owns the rest.
const NORMALIZE_SHARE: f64 = 90.0;

impl AssemblyContext {
    /// Join `clips` in order into one clip.
    pub async fn concatenate(
        &self,
        clips: Vec<Clip>,
        progress: Option<Arc<dyn ProgressSink>>,
        control: &RunControl,
    ) -> MediaResult<Clip> {
        let tracker = ProgressTracker::new(progress);
        let clip = self.concatenate_with(clips, &tracker.full(), control).await?;
        tracker.complete();
        Ok(clip)
    }

    pub(crate) async fn concatenate_with(
        &self,
        mut clips: Vec<Clip>,
        span: &ProgressSpan,
        control: &RunControl,
    ) -> MediaResult<Clip> {
        control.check()?;
        span.begin();

        if clips.len() <= 1 {
            let attempted = clips.len();
            return match clips.pop() {
                Some(clip) if !clip.is_empty() => {
                    span.finish();
                    Ok(clip)
                }
                _ => Err(MediaError::EmptyAssembly {
                    stage: Stage::Concat,
                    attempted,
                }),
            };
        }

        let started = Instant::now();
        let attempted = clips.len();
        let workspace = self.workspace("concat")?;
        let geometry = self.canonical_geometry(&workspace, &clips, control).await?;
        debug!(
            clips = attempted,
            width = geometry.width,
            height = geometry.height,
            fps = geometry.frame_rate,
            "Normalizing clips for concat"
        );

        let normalize_span = span.sub(0.0, NORMALIZE_SHARE);
        let mut normalized: Vec<PathBuf> = Vec::with_capacity(attempted);
        let mut total_duration = 0.0;

        for (index, clip) in clips.into_iter().enumerate() {
            let slice = normalize_span.slice(index, attempted);
            match self
                .normalize_clip(&workspace, index, &clip, geometry, &slice, control)
                .await
            {
                Ok(path) => {
                    total_duration += clip.meta.duration_estimate;
                    normalized.push(path);
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    warn!(clip = index, error = %e, "Skipping clip that failed to normalize");
                    metrics::record_clip_skipped();
                }
            }
            slice.finish();
        }

        if normalized.is_empty() {
            return Err(MediaError::EmptyAssembly {
                stage: Stage::Concat,
                attempted,
            });
        }

        let output = workspace.file("reel", "mp4");
        let call = self.call(control, span.sub(NORMALIZE_SHARE, 100.0));
        control
            .guard(
                Stage::Concat,
                Some(self.config().stage_timeout()),
                self.backend().join(&normalized, &output, &call),
            )
            .await?;
        let data = workspace.read_output(&output, Stage::Concat).await?;

        metrics::record_stage_duration(Stage::Concat, started.elapsed());
        span.finish();
        info!(
            clips = normalized.len(),
            skipped = attempted - normalized.len(),
            bytes = data.len(),
            "Concatenated clips"
        );

        Ok(Clip::new(data, ClipMeta::with_geometry(geometry, total_duration)))
    }

    /// The first clip's geometry. Clips whose metadata lacks dimensions are
    /// probed; the frame rate falls back to `target_frame_rate`.
    async fn canonical_geometry(
        &self,
        workspace: &Workspace,
        clips: &[Clip],
        control: &RunControl,
    ) -> MediaResult<Geometry> {
        let default_fps = self.config().target_frame_rate as f64;
        let with_fps = |g: Geometry| Geometry {
            frame_rate: if g.frame_rate.is_finite() && g.frame_rate > 0.0 {
                g.frame_rate
            } else {
                default_fps
            },
            ..g
        };

        for (index, clip) in clips.iter().enumerate() {
            let meta = with_fps(clip.meta.geometry());
            if meta.is_valid() {
                return Ok(meta);
            }

            let path = workspace
                .write(&format!("probe_{}", index), "mp4", &clip.data)
                .await?;
            match control
                .guard(
                    Stage::Concat,
                    Some(self.config().readiness_timeout()),
                    self.backend().probe(&path),
                )
                .await
            {
                Ok(info) => {
                    if let Some(g) = info.geometry(default_fps).filter(Geometry::is_valid) {
                        return Ok(g);
                    }
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => debug!(clip = index, error = %e, "Could not probe clip geometry"),
            }
            workspace.discard(&path).await;
        }

        Err(MediaError::EmptyAssembly {
            stage: Stage::Concat,
            attempted: clips.len(),
        })
    }

    async fn normalize_clip(
        &self,
        workspace: &Workspace,
        index: usize,
        clip: &Clip,
        geometry: Geometry,
        span: &ProgressSpan,
        control: &RunControl,
    ) -> MediaResult<PathBuf> {
        if clip.is_empty() {
            return Err(MediaError::EmptyOutput { stage: Stage::Concat });
        }
        let input = workspace
            .write(&format!("clip_{}", index), "mp4", &clip.data)
            .await?;
        let job = NormalizeJob {
            input: input.clone(),
            output: workspace.file(&format!("norm_{}", index), "mp4"),
            geometry,
            duration: clip.meta.duration_estimate,
            encoding: self.config().encoding.clone(),
        };

        let call = self.call(control, span.clone());
        let result = control
            .guard(
                Stage::Concat,
                Some(self.config().stage_timeout()),
                self.backend().normalize(&job, &call),
            )
            .await;
        workspace.discard(&input).await;
        result?;

        if workspace.output_size(&job.output).await == 0 {
            return Err(MediaError::EmptyOutput { stage: Stage::Concat });
        }
        Ok(job.output)
    }
}
