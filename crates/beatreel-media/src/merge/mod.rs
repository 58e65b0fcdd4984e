//! Audio/video merge cascade.
//!
//! The assembled video is recorded next to the audio track by the first
//! strategy whose output passes validation:
//!
//! 1. `DirectStream`: the audio file's own stream
//! 2. `AudioGraph`: the audio routed through a resample/gain/stereo graph
//! 3. `DecodedBuffer`: the audio decoded to raw PCM first
//! 4. `VideoOnly`: the video as given, without audio
//!
//! Only cancellation stops the cascade early. `VideoOnly` cannot fail, so a
//! non-empty video always yields a non-empty result.

mod recorder;
mod session;
mod strategy;
mod validate;

pub use validate::validate_recording;

use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

use beatreel_models::{AttemptOutcome, AttemptRecord, Clip, MediaSource, MergeStrategyId};

use crate::context::AssemblyContext;
use crate::control::RunControl;
use crate::error::{MediaError, MediaResult, MergeRejection, Stage};
use crate::metrics;
use crate::progress::{ProgressSink, ProgressSpan, ProgressTracker};
use recorder::Recorder;
use session::MergeSession;

/// Width of each audio state's slice of the merge progress range.
const STATE_PROGRESS_WIDTH: f64 = 30.0;

/// Result of a merge cascade.
#[derive(Debug, Clone)]
pub struct MergeOutcome {
    pub clip: Clip,
    /// The state that produced `clip`
    pub strategy: MergeStrategyId,
    /// Output size over input video size (1.0 for `VideoOnly`)
    pub size_ratio: f64,
    /// Every visited state, in order
    pub attempts: Vec<AttemptRecord>,
}

impl AssemblyContext {
    /// Attach `audio` to `video`.
    ///
    /// Fails only on cancellation or an empty video.
    pub async fn merge_audio_video(
        &self,
        video: Clip,
        audio: &MediaSource,
        progress: Option<Arc<dyn ProgressSink>>,
        control: &RunControl,
    ) -> MediaResult<MergeOutcome> {
        let tracker = ProgressTracker::new(progress);
        let outcome = self.merge_with(video, audio, &tracker.full(), control).await?;
        tracker.complete();
        Ok(outcome)
    }

    pub(crate) async fn merge_with(
        &self,
        video: Clip,
        audio: &MediaSource,
        span: &ProgressSpan,
        control: &RunControl,
    ) -> MediaResult<MergeOutcome> {
        control.check()?;
        if video.is_empty() {
            return Err(MediaError::EmptyAssembly {
                stage: Stage::Merge,
                attempted: 0,
            });
        }
        span.begin();
        let started = Instant::now();

        let (session, setup_error) = match MergeSession::open(self, &video, audio).await {
            Ok(session) => (Some(session), None),
            Err(e) if e.is_cancelled() => return Err(e),
            Err(e) => {
                warn!(error = %e, "Merge inputs could not be prepared, falling back to video only");
                (None, Some(e.to_string()))
            }
        };

        let mut attempts: Vec<AttemptRecord> = Vec::with_capacity(MergeStrategyId::CASCADE.len());

        for (index, strategy) in MergeStrategyId::CASCADE.iter().copied().enumerate() {
            if strategy.is_terminal() {
                break;
            }
            let slice = span.sub(
                index as f64 * STATE_PROGRESS_WIDTH,
                (index + 1) as f64 * STATE_PROGRESS_WIDTH,
            );

            let Some(session) = session.as_ref() else {
                push_attempt(
                    &mut attempts,
                    strategy,
                    AttemptOutcome::Failed,
                    None,
                    setup_error.clone().unwrap_or_default(),
                );
                continue;
            };

            let breaker = self.breaker(strategy);
            if breaker.is_some_and(|b| !b.allow()) {
                push_attempt(
                    &mut attempts,
                    strategy,
                    AttemptOutcome::Skipped,
                    None,
                    MergeRejection::Skipped.to_string(),
                );
                continue;
            }

            match Recorder::new(self, session).record(strategy, &slice, control).await {
                Ok(result) => {
                    if let Some(b) = breaker {
                        b.success();
                    }
                    push_attempt(
                        &mut attempts,
                        result.strategy_id,
                        AttemptOutcome::Accepted,
                        Some(result.size_ratio),
                        "accepted".to_string(),
                    );
                    metrics::record_stage_duration(Stage::Merge, started.elapsed());
                    span.finish();
                    info!(
                        strategy = %result.strategy_id,
                        size_ratio = result.size_ratio,
                        bytes = result.output_clip.size(),
                        "Merged audio and video"
                    );
                    return Ok(MergeOutcome {
                        clip: result.output_clip,
                        strategy: result.strategy_id,
                        size_ratio: result.size_ratio,
                        attempts,
                    });
                }
                Err(rejection) if rejection.is_cancelled() => return Err(MediaError::Cancelled),
                Err(rejection) => {
                    if rejection.counts_against_strategy() {
                        if let Some(b) = breaker {
                            b.failure();
                        }
                    }
                    let (outcome, ratio) = match &rejection {
                        MergeRejection::Undersized { ratio, .. } => (AttemptOutcome::Rejected, Some(*ratio)),
                        MergeRejection::NoAudioChannel => (AttemptOutcome::Rejected, None),
                        MergeRejection::Skipped => (AttemptOutcome::Skipped, None),
                        MergeRejection::Backend(_) => (AttemptOutcome::Failed, None),
                    };
                    warn!(strategy = %strategy, reason = %rejection, "Merge strategy rejected");
                    push_attempt(&mut attempts, strategy, outcome, ratio, rejection.to_string());
                }
            }
            slice.finish();
        }

        control.check()?;
        push_attempt(
            &mut attempts,
            MergeStrategyId::VideoOnly,
            AttemptOutcome::Accepted,
            Some(1.0),
            "video without audio".to_string(),
        );
        metrics::record_stage_duration(Stage::Merge, started.elapsed());
        span.finish();
        warn!(
            attempts = attempts.len(),
            "Every audio strategy failed, returning the video without audio"
        );

        Ok(MergeOutcome {
            clip: video,
            strategy: MergeStrategyId::VideoOnly,
            size_ratio: 1.0,
            attempts,
        })
    }
}

fn push_attempt(
    attempts: &mut Vec<AttemptRecord>,
    strategy: MergeStrategyId,
    outcome: AttemptOutcome,
    size_ratio: Option<f64>,
    detail: String,
) {
    metrics::record_merge_attempt(strategy, outcome, size_ratio);
    attempts.push(AttemptRecord {
        strategy,
        outcome,
        size_ratio,
        detail,
    });
}
