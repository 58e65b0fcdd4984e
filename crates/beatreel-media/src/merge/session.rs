//! Inputs shared by every state of one merge cascade.

use std::path::PathBuf;
use tokio::sync::OnceCell;
use tracing::debug;

use beatreel_models::{Clip, ClipMeta, MediaSource, SourceId};

use crate::backend::PcmFormat;
use crate::context::{AssemblyContext, PreparedSource};
use crate::control::RunControl;
use crate::error::{MediaError, MediaResult, Stage};
use crate::probe::MediaInfo;
use crate::progress::ProgressSpan;
use crate::workspace::Workspace;

/// Video and audio materialized once, plus lazily computed facts about them.
pub(crate) struct MergeSession {
    pub workspace: Workspace,
    pub video_path: PathBuf,
    pub video_size: u64,
    pub video_meta: ClipMeta,
    pub audio_id: SourceId,
    pub audio_path: PathBuf,
    audio_key: String,
    video_info: OnceCell<MediaInfo>,
    pcm: OnceCell<(PathBuf, PcmFormat)>,
}

impl MergeSession {
    pub async fn open(ctx: &AssemblyContext, video: &Clip, audio: &MediaSource) -> MediaResult<Self> {
        let workspace = ctx.workspace("merge")?;
        let video_path = workspace.write("video", "mp4", &video.data).await?;
        let audio_path = workspace.materialize(audio).await?;
        debug!(
            video_bytes = video.size(),
            audio_bytes = audio.len(),
            "Opened merge session"
        );

        Ok(Self {
            workspace,
            video_path,
            video_size: video.size() as u64,
            video_meta: video.meta.clone(),
            audio_id: audio.id.clone(),
            audio_path,
            audio_key: audio.cache_key(),
            video_info: OnceCell::new(),
            pcm: OnceCell::new(),
        })
    }

    /// Probe of the audio input, shared with the context probe cache.
    pub async fn audio_info(&self, ctx: &AssemblyContext, control: &RunControl) -> MediaResult<MediaInfo> {
        ctx.probe_cached(&self.audio_key, &self.audio_path, control).await
    }

    /// Probe of the video input, bounded by the readiness timeout.
    pub async fn video_info(&self, ctx: &AssemblyContext, control: &RunControl) -> MediaResult<&MediaInfo> {
        self.video_info
            .get_or_try_init(|| {
                control.guard(
                    Stage::Merge,
                    Some(ctx.config().readiness_timeout()),
                    ctx.backend().probe(&self.video_path),
                )
            })
            .await
    }

    /// Recording length: the probed video duration, or the clip's estimate
    /// when the container does not declare one.
    pub fn video_duration(&self, info: &MediaInfo) -> f64 {
        if info.duration.is_finite() && info.duration > 0.0 {
            info.duration
        } else {
            self.video_meta.duration_estimate.max(0.0)
        }
    }

    /// Raw interleaved f32 dump of the audio, decoded at most once per
    /// session and reusing the context's decoded-audio cache.
    pub async fn pcm(
        &self,
        ctx: &AssemblyContext,
        info: &MediaInfo,
        span: ProgressSpan,
        control: &RunControl,
    ) -> MediaResult<&(PathBuf, PcmFormat)> {
        self.pcm
            .get_or_try_init(|| async {
                let prepared = PreparedSource {
                    id: self.audio_id.clone(),
                    path: self.audio_path.clone(),
                    info: info.clone(),
                    cache_key: self.audio_key.clone(),
                };
                let sample = ctx
                    .decoded_audio(&self.workspace, &prepared, control, span)
                    .await?;
                let path = self
                    .workspace
                    .write(&format!("{}_buffer", self.audio_id.file_stem()), "pcm", &sample.to_f32le_bytes())
                    .await?;
                Ok::<_, MediaError>((path, sample.format()))
            })
            .await
    }
}
