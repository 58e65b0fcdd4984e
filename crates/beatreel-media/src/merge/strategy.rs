//! Audio feeds for each merge cascade state.

use beatreel_models::encoding::DEFAULT_AUDIO_SAMPLE_RATE;
use beatreel_models::MergeStrategyId;

use super::session::MergeSession;
use crate::backend::AudioFeed;
use crate::context::AssemblyContext;
use crate::control::RunControl;
use crate::error::{MediaError, MediaResult};
use crate::probe::MediaInfo;
use crate::progress::ProgressSpan;

/// Build the feed `strategy` records with. `audio` is the probe of the
/// session's audio input.
pub(crate) async fn audio_feed(
    ctx: &AssemblyContext,
    strategy: MergeStrategyId,
    session: &MergeSession,
    audio: &MediaInfo,
    span: ProgressSpan,
    control: &RunControl,
) -> MediaResult<AudioFeed> {
    match strategy {
        MergeStrategyId::DirectStream => Ok(AudioFeed::Direct {
            path: session.audio_path.clone(),
        }),
        MergeStrategyId::AudioGraph => {
            let sample_rate = audio
                .audio
                .as_ref()
                .map(|a| a.sample_rate)
                .filter(|rate| *rate > 0)
                .unwrap_or(DEFAULT_AUDIO_SAMPLE_RATE);
            Ok(AudioFeed::Graph {
                path: session.audio_path.clone(),
                sample_rate,
                gain: ctx.config().audio_gain,
            })
        }
        MergeStrategyId::DecodedBuffer => {
            let (path, format) = session.pcm(ctx, audio, span, control).await?;
            Ok(AudioFeed::Buffer {
                path: path.clone(),
                format: *format,
            })
        }
        MergeStrategyId::VideoOnly => Err(MediaError::internal("video_only has no audio feed")),
    }
}
