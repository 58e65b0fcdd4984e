//! End-to-end reel assembly.
//!
//! analyze -> plan -> trim (sequential) -> concat -> merge, with one
//! progress range per stage:
//!
//! | stage           | range  |
//! |-----------------|--------|
//! | prepare/analyze | 0-10   |
//! | plan            | 10-12  |
//! | trim            | 12-60  |
//! | concat          | 60-75  |
//! | merge           | 75-100 |

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn, Instrument};

use beatreel_models::{
    AssemblyReport, BeatPoint, BeatSource, Clip, DroppedSegment, MediaSource, RunId, SourceId,
};

use crate::audio::{analyze_onsets, OnsetAnalysis, OnsetConfig, DEFAULT_TEMPO_BPM};
use crate::context::{AssemblyContext, PreparedSource};
use crate::control::RunControl;
use crate::error::{MediaError, MediaResult, Stage};
use crate::logging::RunLogger;
use crate::metrics;
use crate::planner::{plan_segments, PlannerConfig, SourceSpan};
use crate::progress::{ProgressSink, ProgressSpan, ProgressTracker};
use crate::workspace::Workspace;

/// Everything needed to build one reel.
#[derive(Debug, Clone)]
pub struct ReelRequest {
    /// Soundtrack; also the beat source unless manual beats are given
    pub audio: MediaSource,
    /// Source clips, in the order segments should cycle through them
    pub videos: Vec<MediaSource>,
    /// Beats to use instead of detection
    pub manual_beats: Option<Vec<BeatPoint>>,
    /// Reel end on the music timeline; derived from the beats when unset
    pub end_time: Option<f64>,
}

impl ReelRequest {
    pub fn new(audio: MediaSource, videos: Vec<MediaSource>) -> Self {
        Self {
            audio,
            videos,
            manual_beats: None,
            end_time: None,
        }
    }

    pub fn with_manual_beats(mut self, beats: Vec<BeatPoint>) -> Self {
        self.manual_beats = Some(beats);
        self
    }

    pub fn with_end_time(mut self, end_time: f64) -> Self {
        self.end_time = Some(end_time);
        self
    }
}

/// The finished reel and what happened while building it.
#[derive(Debug, Clone)]
pub struct ReelOutput {
    pub clip: Clip,
    pub report: AssemblyReport,
}

struct Beats {
    points: Vec<BeatPoint>,
    source: BeatSource,
    tempo_bpm: u32,
    detected: usize,
}

impl AssemblyContext {
    /// Decode `audio` and run onset detection on it.
    pub async fn detect_beats(&self, audio: &MediaSource, control: &RunControl) -> MediaResult<OnsetAnalysis> {
        let workspace = self.workspace("analyze")?;
        self.analyze_audio(&workspace, audio, &ProgressTracker::silent().full(), control)
            .await
    }

    /// Build a beat-synced reel from `request`.
    pub async fn assemble_reel(
        &self,
        request: ReelRequest,
        progress: Option<Arc<dyn ProgressSink>>,
        control: &RunControl,
    ) -> MediaResult<ReelOutput> {
        let run_id = RunId::new();
        let logger = RunLogger::new(&run_id, "assemble_reel");
        let span = logger.create_span();
        let started = Instant::now();

        let result = self
            .run_assembly(run_id, &logger, request, ProgressTracker::new(progress), control)
            .instrument(span)
            .await;

        match &result {
            Ok(output) => {
                metrics::record_run("ok", started.elapsed());
                logger.log_completion(&format!(
                    "{} bytes via {} in {:.1}s",
                    output.report.output_bytes,
                    output.report.merge_strategy,
                    started.elapsed().as_secs_f64()
                ));
            }
            Err(e) => {
                metrics::record_run(e.kind(), started.elapsed());
                logger.log_error(&e.to_string());
            }
        }
        result
    }

    async fn run_assembly(
        &self,
        run_id: RunId,
        logger: &RunLogger,
        request: ReelRequest,
        tracker: ProgressTracker,
        control: &RunControl,
    ) -> MediaResult<ReelOutput> {
        control.check()?;
        logger.log_start(&format!(
            "{} video sources, {} beats",
            request.videos.len(),
            if request.manual_beats.is_some() { "manual" } else { "detected" }
        ));
        tracker.report(0.0);

        if request.videos.is_empty() {
            return Err(MediaError::EmptyAssembly {
                stage: Stage::Plan,
                attempted: 0,
            });
        }
        let workspace = self.workspace("reel")?;

        // Prepare / analyze
        let beats = match request.manual_beats.clone() {
            Some(points) => Beats {
                detected: points.len(),
                points,
                source: BeatSource::Manual,
                tempo_bpm: DEFAULT_TEMPO_BPM,
            },
            None => {
                let analysis = self
                    .analyze_audio(&workspace, &request.audio, &tracker.span(0.0, 8.0), control)
                    .await?;
                Beats {
                    points: analysis.beats,
                    source: BeatSource::Detected,
                    tempo_bpm: analysis.tempo_bpm,
                    detected: analysis.detected_count,
                }
            }
        };
        let (prepared, spans) = self
            .prepare_videos(&workspace, &request.videos, &tracker.span(8.0, 10.0), control)
            .await?;
        logger.log_progress(&format!(
            "{} beats ({:?}), {} sources ready",
            beats.points.len(),
            beats.source,
            spans.len()
        ));

        // Plan
        control.check()?;
        let plan_started = Instant::now();
        let plan = plan_segments(
            &beats.points,
            request.end_time,
            &spans,
            &PlannerConfig::from(self.config()),
        )?;
        metrics::record_stage_duration(Stage::Plan, plan_started.elapsed());
        tracker.report(12.0);
        logger.log_progress(&format!(
            "Planned {} segments ending at {:.2}s",
            plan.segments.len(),
            plan.end_time
        ));

        // Trim
        let trim_span = tracker.span(12.0, 60.0);
        let mut clips = Vec::with_capacity(plan.segments.len());
        let mut dropped = Vec::new();
        for (index, segment) in plan.segments.iter().enumerate() {
            let slice = trim_span.slice(index, plan.segments.len());
            let Some(source) = prepared.get(&segment.source_id) else {
                continue;
            };
            match self
                .trim_prepared(&workspace, source, segment, &slice, control)
                .await
            {
                Ok(clip) => clips.push(clip),
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    logger.log_warning(&format!(
                        "Dropping segment {} [{:.2}, {:.2}): {}",
                        segment.source_id, segment.start_time, segment.end_time, e
                    ));
                    metrics::record_segment_dropped(e.kind());
                    dropped.push(DroppedSegment {
                        segment: segment.clone(),
                        reason: e.to_string(),
                    });
                }
            }
            slice.finish();
        }
        if clips.is_empty() {
            return Err(MediaError::EmptyAssembly {
                stage: Stage::Trim,
                attempted: plan.segments.len(),
            });
        }
        let segments_trimmed = clips.len();
        drop(workspace);

        // Concat
        let video = self
            .concatenate_with(clips, &tracker.span(60.0, 75.0), control)
            .await?;

        // Merge
        let merged = self
            .merge_with(video, &request.audio, &tracker.span(75.0, 100.0), control)
            .await?;
        tracker.complete();

        let report = AssemblyReport {
            run_id,
            beat_source: beats.source,
            tempo_bpm: beats.tempo_bpm,
            beats_detected: beats.detected,
            beats_used: plan.beat_times(),
            end_time: plan.end_time,
            segments_planned: plan.segments.len(),
            segments_trimmed,
            dropped_segments: dropped,
            merge_strategy: merged.strategy,
            merge_size_ratio: merged.size_ratio,
            merge_attempts: merged.attempts,
            output_bytes: merged.clip.size(),
        };

        Ok(ReelOutput {
            clip: merged.clip,
            report,
        })
    }

    async fn analyze_audio(
        &self,
        workspace: &Workspace,
        audio: &MediaSource,
        span: &ProgressSpan,
        control: &RunControl,
    ) -> MediaResult<OnsetAnalysis> {
        let started = Instant::now();
        span.begin();
        let prepared = self.prepare_audio(workspace, audio, control).await?;
        let sample = self
            .decoded_audio(workspace, &prepared, control, span.sub(0.0, 70.0))
            .await?;

        let analysis = control
            .guard(
                Stage::Analyze,
                Some(self.config().stage_timeout()),
                analyze_onsets(sample, OnsetConfig::from(self.config())),
            )
            .await?;

        metrics::record_beats_detected(analysis.detected_count);
        metrics::record_stage_duration(Stage::Analyze, started.elapsed());
        span.finish();
        debug!(
            source_id = %audio.id,
            detected = analysis.detected_count,
            returned = analysis.beats.len(),
            tempo_bpm = analysis.tempo_bpm,
            "Detected beats"
        );
        Ok(analysis)
    }

    /// Materialize and probe every video. Any failure is fatal; a repeated
    /// ID is ignored after its first occurrence.
    async fn prepare_videos(
        &self,
        workspace: &Workspace,
        videos: &[MediaSource],
        span: &ProgressSpan,
        control: &RunControl,
    ) -> MediaResult<(HashMap<SourceId, PreparedSource>, Vec<SourceSpan>)> {
        let started = Instant::now();
        let mut prepared: HashMap<SourceId, PreparedSource> = HashMap::with_capacity(videos.len());
        let mut spans = Vec::with_capacity(videos.len());

        for (index, video) in videos.iter().enumerate() {
            if prepared.contains_key(&video.id) {
                warn!(source_id = %video.id, "Ignoring repeated video source ID");
                continue;
            }
            let source = self.prepare_video(workspace, video, control).await?;
            spans.push(SourceSpan::new(source.id.clone(), source.info.duration));
            prepared.insert(source.id.clone(), source);
            span.slice(index, videos.len()).finish();
        }

        metrics::record_stage_duration(Stage::Decode, started.elapsed());
        Ok((prepared, spans))
    }
}
