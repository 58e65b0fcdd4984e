//! One recording pass of the merge cascade.
//!
//! # Steps
//!
//! 1. Audio readiness: probe the audio input, require an audio stream
//!    (and, for the direct stream, a declared channel)
//! 2. Build the state's audio feed
//! 3. Video readiness: probe the video input
//! 4. Settle delay
//! 5. Record, bounded by `video_duration + recording_timeout_ms`
//! 6. Validate the output size; rejected outputs are deleted

use std::time::Duration;
use tracing::debug;

use beatreel_models::{Clip, MergeStrategyId};

use super::session::MergeSession;
use super::strategy::audio_feed;
use super::validate::validate_recording;
use crate::backend::{AudioFeed, BackendCall, RecordingJob};
use crate::context::AssemblyContext;
use crate::control::RunControl;
use crate::error::{MergeRejection, Stage};
use crate::progress::ProgressSpan;

/// An accepted recording of one cascade state.
#[derive(Debug)]
pub(crate) struct MergeAttemptResult {
    pub strategy_id: MergeStrategyId,
    /// The merged clip, carrying the input video's metadata
    pub output_clip: Clip,
    /// Output size over input video size
    pub size_ratio: f64,
}

pub(crate) struct Recorder<'a> {
    ctx: &'a AssemblyContext,
    session: &'a MergeSession,
}

impl<'a> Recorder<'a> {
    pub fn new(ctx: &'a AssemblyContext, session: &'a MergeSession) -> Self {
        Self { ctx, session }
    }

    pub async fn record(
        &self,
        strategy: MergeStrategyId,
        span: &ProgressSpan,
        control: &RunControl,
    ) -> Result<MergeAttemptResult, MergeRejection> {
        let config = self.ctx.config();

        let audio = self.session.audio_info(self.ctx, control).await?;
        if audio.audio.is_none() {
            return Err(MergeRejection::NoAudioChannel);
        }
        // The graph and buffer states synthesize their own stereo layout
        if strategy == MergeStrategyId::DirectStream && audio.audio_channels() == 0 {
            return Err(MergeRejection::NoAudioChannel);
        }
        span.report(5.0);

        let feed = audio_feed(self.ctx, strategy, self.session, &audio, span.sub(5.0, 35.0), control).await?;
        if let AudioFeed::Buffer { path, .. } = &feed {
            if self.session.workspace.output_size(path).await == 0 {
                return Err(MergeRejection::NoAudioChannel);
            }
        }

        let video = self.session.video_info(self.ctx, control).await?;
        let duration = self.session.video_duration(video);
        span.report(40.0);

        control.sleep(config.settle_delay()).await?;

        let job = RecordingJob {
            video: self.session.video_path.clone(),
            audio: feed,
            output: self
                .session
                .workspace
                .file(&format!("merged_{}", strategy.as_str()), "mp4"),
            duration,
            encoding: config.encoding.clone(),
        };
        let limit = Duration::from_secs_f64(duration) + config.recording_buffer();
        debug!(
            strategy = %strategy,
            duration,
            limit_secs = limit.as_secs_f64(),
            "Recording merge output"
        );

        let call = BackendCall::new(control.clone(), limit, span.sub(40.0, 95.0));
        control
            .guard(Stage::Merge, Some(limit), self.ctx.backend().record(&job, &call))
            .await?;

        let output_size = self.session.workspace.output_size(&job.output).await;
        let size_ratio = match validate_recording(output_size, self.session.video_size, config.min_output_size_ratio) {
            Ok(ratio) => ratio,
            Err(rejection) => {
                self.session.workspace.discard(&job.output).await;
                return Err(rejection);
            }
        };

        let data = self
            .session
            .workspace
            .read_output(&job.output, Stage::Merge)
            .await
            .map_err(MergeRejection::from)?;
        span.finish();
        Ok(MergeAttemptResult {
            strategy_id: strategy,
            output_clip: Clip::new(data, self.session.video_meta.clone()),
            size_ratio,
        })
    }
}
