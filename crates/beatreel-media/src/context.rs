//! Caller-owned assembly context.
//!
//! Holds the backend, the validated configuration, short-lived caches for
//! probes and decoded audio, and one circuit breaker per merge strategy.
//! Create one per process (or per tenant) and share it across runs.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

use beatreel_models::{MediaSource, MergeStrategyId, ReelConfig, SourceId};

use crate::audio::{decode_audio, AudioSample};
use crate::backend::{BackendCall, FfmpegBackend, MediaBackend};
use crate::cache::TtlCache;
use crate::circuit_breaker::CircuitBreaker;
use crate::control::RunControl;
use crate::error::{MediaError, MediaResult, Stage};
use crate::metrics;
use crate::probe::MediaInfo;
use crate::progress::ProgressSpan;
use crate::workspace::Workspace;

/// A source materialized in a workspace and probed.
#[derive(Debug, Clone)]
pub(crate) struct PreparedSource {
    pub id: SourceId,
    pub path: PathBuf,
    pub info: MediaInfo,
    pub cache_key: String,
}

pub struct AssemblyContext {
    backend: Arc<dyn MediaBackend>,
    config: ReelConfig,
    probes: TtlCache<String, MediaInfo>,
    audio: TtlCache<String, Arc<AudioSample>>,
    breakers: HashMap<MergeStrategyId, CircuitBreaker>,
}

impl AssemblyContext {
    /// Build a context around `backend`. The configuration is validated.
    pub fn new(backend: Arc<dyn MediaBackend>, config: ReelConfig) -> MediaResult<Self> {
        config.validate()?;

        let breakers = MergeStrategyId::CASCADE
            .iter()
            .filter(|s| !s.is_terminal())
            .map(|s| {
                (
                    *s,
                    CircuitBreaker::new(config.breaker_failure_threshold, config.breaker_recovery()),
                )
            })
            .collect();

        Ok(Self {
            probes: TtlCache::new(config.cache_capacity, config.cache_ttl()),
            audio: TtlCache::new(config.cache_capacity, config.cache_ttl()),
            backend,
            config,
            breakers,
        })
    }

    /// Context backed by the FFmpeg CLI found on `PATH`.
    pub fn with_ffmpeg(config: ReelConfig) -> MediaResult<Self> {
        Self::new(Arc::new(FfmpegBackend::new()?), config)
    }

    pub fn config(&self) -> &ReelConfig {
        &self.config
    }

    pub fn backend(&self) -> &dyn MediaBackend {
        self.backend.as_ref()
    }

    /// Circuit breaker guarding a merge strategy. `None` for the terminal state.
    pub fn breaker(&self, strategy: MergeStrategyId) -> Option<&CircuitBreaker> {
        self.breakers.get(&strategy)
    }

    /// Decoded audio cached for `source`, if any.
    pub fn cached_audio(&self, source: &MediaSource) -> Option<Arc<AudioSample>> {
        self.audio.get(&source.cache_key())
    }

    /// Drop every cached probe and decoded buffer.
    pub fn clear_caches(&self) {
        self.probes.clear();
        self.audio.clear();
    }

    pub(crate) fn workspace(&self, label: &str) -> MediaResult<Workspace> {
        Workspace::create(self.config.work_dir.as_deref().map(Path::new), label)
    }

    pub(crate) fn call(&self, control: &RunControl, progress: ProgressSpan) -> BackendCall {
        BackendCall::new(control.clone(), self.config.stage_timeout(), progress)
    }

    /// Probe `path`, reusing a cached result for the same source bytes.
    pub(crate) async fn probe_cached(
        &self,
        cache_key: &str,
        path: &Path,
        control: &RunControl,
    ) -> MediaResult<MediaInfo> {
        if let Some(info) = self.probes.get(&cache_key.to_string()) {
            metrics::record_cache_lookup("probe", true);
            return Ok(info);
        }
        metrics::record_cache_lookup("probe", false);

        let info = control
            .guard(
                Stage::Decode,
                Some(self.config.readiness_timeout()),
                self.backend.probe(path),
            )
            .await?;
        self.probes.insert(cache_key.to_string(), info.clone());
        Ok(info)
    }

    /// Materialize and probe a video source. Failures surface as
    /// `VideoDecode` / `SourceUnavailable`.
    pub(crate) async fn prepare_video(
        &self,
        workspace: &Workspace,
        source: &MediaSource,
        control: &RunControl,
    ) -> MediaResult<PreparedSource> {
        let path = workspace.materialize(source).await?;
        let cache_key = source.cache_key();
        let info = self
            .probe_cached(&cache_key, &path, control)
            .await
            .map_err(|e| decode_failure(e, |msg| MediaError::video_decode(&source.id, msg)))?;

        if !info.has_video() {
            return Err(MediaError::video_decode(&source.id, "no video stream"));
        }
        if !(info.duration.is_finite() && info.duration > 0.0) {
            return Err(MediaError::video_decode(&source.id, "unknown duration"));
        }

        debug!(source_id = %source.id, duration = info.duration, "Prepared video source");
        Ok(PreparedSource {
            id: source.id.clone(),
            path,
            info,
            cache_key,
        })
    }

    /// Materialize and probe an audio source.
    pub(crate) async fn prepare_audio(
        &self,
        workspace: &Workspace,
        source: &MediaSource,
        control: &RunControl,
    ) -> MediaResult<PreparedSource> {
        let path = workspace.materialize(source).await?;
        let cache_key = source.cache_key();
        let info = self
            .probe_cached(&cache_key, &path, control)
            .await
            .map_err(|e| decode_failure(e, |msg| MediaError::audio_decode(&source.id, msg)))?;

        Ok(PreparedSource {
            id: source.id.clone(),
            path,
            info,
            cache_key,
        })
    }

    /// Decoded samples for a prepared audio source, cached per source bytes.
    pub(crate) async fn decoded_audio(
        &self,
        workspace: &Workspace,
        prepared: &PreparedSource,
        control: &RunControl,
        progress: ProgressSpan,
    ) -> MediaResult<Arc<AudioSample>> {
        if let Some(sample) = self.audio.get(&prepared.cache_key) {
            metrics::record_cache_lookup("audio", true);
            return Ok(sample);
        }
        metrics::record_cache_lookup("audio", false);

        let call = self.call(control, progress);
        let sample = control
            .guard(
                Stage::Decode,
                Some(self.config.stage_timeout()),
                decode_audio(
                    self.backend.as_ref(),
                    &prepared.id,
                    &prepared.path,
                    &prepared.info,
                    workspace,
                    &call,
                ),
            )
            .await?;

        let sample = Arc::new(sample);
        self.audio.insert(prepared.cache_key.clone(), sample.clone());
        Ok(sample)
    }
}

/// Keep fatal errors and timeouts as they are; attribute the rest to the
/// source being decoded.
fn decode_failure(err: MediaError, wrap: impl FnOnce(String) -> MediaError) -> MediaError {
    match err {
        e if e.is_fatal() => e,
        e @ (MediaError::Timeout { .. }
        | MediaError::AudioDecode { .. }
        | MediaError::VideoDecode { .. }
        | MediaError::SourceUnavailable { .. }) => e,
        other => wrap(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeBackend;

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = ReelConfig {
            target_frame_rate: 0,
            ..Default::default()
        };
        let result = AssemblyContext::new(Arc::new(FakeBackend::new()), config);
        assert!(matches!(result, Err(MediaError::InvalidConfig(_))));
    }

    #[test]
    fn test_breakers_exist_for_audio_strategies() {
        let ctx = AssemblyContext::new(Arc::new(FakeBackend::new()), ReelConfig::default()).unwrap();
        assert!(ctx.breaker(MergeStrategyId::DirectStream).is_some());
        assert!(ctx.breaker(MergeStrategyId::DecodedBuffer).is_some());
        assert!(ctx.breaker(MergeStrategyId::VideoOnly).is_none());
    }

    #[tokio::test]
    async fn test_probe_is_cached() {
        let backend = Arc::new(FakeBackend::new());
        let ctx = AssemblyContext::new(backend.clone(), ReelConfig::default()).unwrap();
        let ws = ctx.workspace("test").unwrap();
        let source = FakeBackend::video_source("a", 10.0);
        let control = RunControl::never();

        ctx.prepare_video(&ws, &source, &control).await.unwrap();
        ctx.prepare_video(&ws, &source, &control).await.unwrap();
        assert_eq!(backend.probe_count(), 1);

        ctx.clear_caches();
        ctx.prepare_video(&ws, &source, &control).await.unwrap();
        assert_eq!(backend.probe_count(), 2);
    }

    #[tokio::test]
    async fn test_unprobeable_video_is_video_decode() {
        let backend = Arc::new(FakeBackend::new());
        let ctx = AssemblyContext::new(backend, ReelConfig::default()).unwrap();
        let ws = ctx.workspace("test").unwrap();
        let source = MediaSource::new("junk", b"not a video".to_vec(), "video/mp4");

        let result = ctx.prepare_video(&ws, &source, &RunControl::never()).await;
        assert!(matches!(result, Err(MediaError::VideoDecode { .. })));
    }
}
