//! Pipeline configuration.
//!
//! Every field has a default so a partial JSON document is a valid config.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

use crate::encoding::EncodingConfig;

/// How the trimmer cuts a segment out of its source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum TrimMode {
    /// Decode and re-encode every frame. Exact cut points, costs CPU.
    #[default]
    FrameAccurate,
    /// Stream copy. Fast, but cut points snap to the nearest keyframe.
    KeyframeCopy,
}

impl TrimMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrimMode::FrameAccurate => "frame_accurate",
            TrimMode::KeyframeCopy => "keyframe_copy",
        }
    }
}

impl fmt::Display for TrimMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TrimMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "frame_accurate" | "accurate" | "reencode" => Ok(TrimMode::FrameAccurate),
            "keyframe_copy" | "copy" | "fast" => Ok(TrimMode::KeyframeCopy),
            other => Err(ConfigError::Invalid {
                field: "trim_mode",
                reason: format!("unknown trim mode '{}'", other),
            }),
        }
    }
}

/// Configuration error.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl ConfigError {
    fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

/// Options recognized by every pipeline entry point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct ReelConfig {
    /// Length of each planned segment in seconds (2.0-4.0 is the useful range)
    pub segment_duration_seconds: f64,
    /// Segments shorter than this are discarded by the planner
    pub min_segment_seconds: f64,
    /// Frame rate used by frame-accurate trims
    pub target_frame_rate: u32,
    /// A merge recording smaller than `input_size * ratio` is rejected
    pub min_output_size_ratio: f64,
    /// Safety buffer added to the video duration for each recording pass
    pub recording_timeout_ms: u64,
    /// Bound on each readiness probe before a recording starts
    pub readiness_timeout_ms: u64,
    /// Pause between audio readiness and recording start
    pub settle_delay_ms: u64,
    /// Bound on each trim / normalize / join run
    pub stage_timeout_secs: u64,
    pub trim_mode: TrimMode,
    /// A trimmed clip below this size is dropped from the plan
    pub min_trim_bytes: u64,
    /// Gain applied by the audio-graph merge strategy
    pub audio_gain: f32,
    /// Cap on the number of beats returned by detection
    pub max_beats: usize,
    /// Minimum gap between two accepted detected beats
    pub min_beat_interval_seconds: f64,
    /// Entries kept by each context cache
    pub cache_capacity: usize,
    pub cache_ttl_secs: u64,
    /// Consecutive failures before a merge strategy is skipped
    pub breaker_failure_threshold: u32,
    pub breaker_recovery_secs: u64,
    /// Parent directory for per-run scratch space (system temp when unset)
    pub work_dir: Option<String>,
    pub encoding: EncodingConfig,
}

impl Default for ReelConfig {
    fn default() -> Self {
        Self {
            segment_duration_seconds: 3.0,
            min_segment_seconds: 1.0,
            target_frame_rate: 30,
            min_output_size_ratio: 0.3,
            recording_timeout_ms: 20_000,
            readiness_timeout_ms: 5_000,
            settle_delay_ms: 150,
            stage_timeout_secs: 300,
            trim_mode: TrimMode::default(),
            min_trim_bytes: 1024,
            audio_gain: 1.0,
            max_beats: 20,
            min_beat_interval_seconds: 0.3,
            cache_capacity: 16,
            cache_ttl_secs: 600,
            breaker_failure_threshold: 3,
            breaker_recovery_secs: 300,
            work_dir: None,
            encoding: EncodingConfig::default(),
        }
    }
}

impl ReelConfig {
    /// Check value ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.segment_duration_seconds.is_finite() && self.segment_duration_seconds > 0.0) {
            return Err(ConfigError::invalid(
                "segment_duration_seconds",
                "must be a positive number",
            ));
        }
        if !(self.min_segment_seconds.is_finite() && self.min_segment_seconds > 0.0) {
            return Err(ConfigError::invalid(
                "min_segment_seconds",
                "must be a positive number",
            ));
        }
        if self.min_segment_seconds > self.segment_duration_seconds {
            return Err(ConfigError::invalid(
                "min_segment_seconds",
                "cannot exceed segment_duration_seconds",
            ));
        }
        if self.target_frame_rate == 0 || self.target_frame_rate > 240 {
            return Err(ConfigError::invalid("target_frame_rate", "must be within 1-240"));
        }
        if !(self.min_output_size_ratio > 0.0 && self.min_output_size_ratio <= 1.0) {
            return Err(ConfigError::invalid(
                "min_output_size_ratio",
                "must be within (0, 1]",
            ));
        }
        if self.recording_timeout_ms == 0 {
            return Err(ConfigError::invalid("recording_timeout_ms", "must be non-zero"));
        }
        if self.readiness_timeout_ms == 0 {
            return Err(ConfigError::invalid("readiness_timeout_ms", "must be non-zero"));
        }
        if self.stage_timeout_secs == 0 {
            return Err(ConfigError::invalid("stage_timeout_secs", "must be non-zero"));
        }
        if !(self.audio_gain.is_finite() && self.audio_gain >= 0.0) {
            return Err(ConfigError::invalid("audio_gain", "must be a non-negative number"));
        }
        if self.max_beats == 0 {
            return Err(ConfigError::invalid("max_beats", "must be non-zero"));
        }
        if self.cache_capacity == 0 {
            return Err(ConfigError::invalid("cache_capacity", "must be non-zero"));
        }
        Ok(())
    }

    pub fn recording_buffer(&self) -> Duration {
        Duration::from_millis(self.recording_timeout_ms)
    }

    pub fn readiness_timeout(&self) -> Duration {
        Duration::from_millis(self.readiness_timeout_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn stage_timeout(&self) -> Duration {
        Duration::from_secs(self.stage_timeout_secs)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn breaker_recovery(&self) -> Duration {
        Duration::from_secs(self.breaker_recovery_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = ReelConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.trim_mode, TrimMode::FrameAccurate);
        assert!((config.min_output_size_ratio - 0.3).abs() < f64::EPSILON);
    }

    #[test]
    fn test_partial_json() {
        let config: ReelConfig =
            serde_json::from_str(r#"{"segment_duration_seconds": 2.5, "trim_mode": "keyframe_copy"}"#)
                .unwrap();
        assert!((config.segment_duration_seconds - 2.5).abs() < f64::EPSILON);
        assert_eq!(config.trim_mode, TrimMode::KeyframeCopy);
        assert_eq!(config.target_frame_rate, 30);
    }

    #[test]
    fn test_rejects_bad_ratio() {
        let config = ReelConfig {
            min_output_size_ratio: 1.5,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { field: "min_output_size_ratio", .. })
        ));
    }

    #[test]
    fn test_rejects_min_segment_above_duration() {
        let config = ReelConfig {
            segment_duration_seconds: 2.0,
            min_segment_seconds: 3.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_trim_mode_from_str() {
        assert_eq!("copy".parse::<TrimMode>().unwrap(), TrimMode::KeyframeCopy);
        assert_eq!(
            "Frame-Accurate".parse::<TrimMode>().unwrap(),
            TrimMode::FrameAccurate
        );
        assert!("bogus".parse::<TrimMode>().is_err());
    }

    #[test]
    fn test_durations() {
        let config = ReelConfig::default();
        assert_eq!(config.recording_buffer(), Duration::from_secs(20));
        assert_eq!(config.readiness_timeout(), Duration::from_secs(5));
    }
}
