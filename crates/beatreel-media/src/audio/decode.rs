use std::path::Path;
use tracing::debug;

use beatreel_models::encoding::DEFAULT_AUDIO_SAMPLE_RATE;
use beatreel_models::SourceId;

use super::AudioSample;
use crate::backend::{BackendCall, MediaBackend, PcmFormat};
use crate::error::{MediaError, MediaResult};
use crate::probe::MediaInfo;
use crate::workspace::Workspace;

/// PCM layout to decode a probed file to: its native rate, at most stereo.
/// A stream without a declared channel count is downmixed to stereo.
/// `None` when the file has no audio stream.
pub fn pcm_format_for(info: &MediaInfo) -> Option<PcmFormat> {
    let audio = info.audio.as_ref()?;
    let channels = match audio.channels {
        0 => 2,
        n => n.min(2),
    };
    let sample_rate = if audio.sample_rate > 0 {
        audio.sample_rate
    } else {
        DEFAULT_AUDIO_SAMPLE_RATE
    };
    Some(PcmFormat::new(sample_rate, channels))
}

/// Decode the first audio stream of `path` into an [`AudioSample`].
pub async fn decode_audio(
    backend: &dyn MediaBackend,
    source_id: &SourceId,
    path: &Path,
    info: &MediaInfo,
    workspace: &Workspace,
    call: &BackendCall,
) -> MediaResult<AudioSample> {
    let format = pcm_format_for(info)
        .ok_or_else(|| MediaError::audio_decode(source_id, "no audio stream"))?;

    let scratch = workspace.file(&source_id.file_stem(), "pcm");
    let samples = backend
        .decode_pcm(path, &scratch, format, call)
        .await
        .map_err(|e| match e {
            e if e.is_fatal() => e,
            e @ MediaError::Timeout { .. } => e,
            other => MediaError::audio_decode(source_id, other.to_string()),
        })?;

    let sample = AudioSample::from_interleaved(&samples, format);
    if sample.is_empty() {
        return Err(MediaError::audio_decode(source_id, "decoded zero samples"));
    }

    debug!(
        source_id = %source_id,
        sample_rate = sample.sample_rate,
        channels = sample.channel_count(),
        duration_secs = sample.duration(),
        "Decoded audio"
    );
    Ok(sample)
}
