//! Encoder settings shared by the trim, concat and merge stages.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Default video codec (H.264)
pub const DEFAULT_VIDEO_CODEC: &str = "libx264";
/// Default audio codec
pub const DEFAULT_AUDIO_CODEC: &str = "aac";
/// Default encoding preset. Segments are short, so speed wins over size.
pub const DEFAULT_PRESET: &str = "veryfast";
/// Default CRF (Constant Rate Factor)
pub const DEFAULT_CRF: u8 = 20;
/// Default audio bitrate
pub const DEFAULT_AUDIO_BITRATE: &str = "128k";
/// Pixel format understood by every web player
pub const DEFAULT_PIXEL_FORMAT: &str = "yuv420p";
/// Sample rate used when the merge stage has to synthesize an audio channel
pub const DEFAULT_AUDIO_SAMPLE_RATE: u32 = 48_000;

/// Encoder settings for every re-encoding stage. Fields missing from a
/// config file keep their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct EncodingConfig {
    /// Video codec ("libx264", "h264_nvenc", ...)
    pub codec: String,
    pub preset: String,
    /// Quality, 0-51, lower is better. Passed as `-cq` under NVENC.
    pub crf: u8,
    pub pixel_format: String,
    /// Codec for the merged soundtrack
    pub audio_codec: String,
    pub audio_bitrate: String,
    pub use_nvenc: bool,
}

impl Default for EncodingConfig {
    fn default() -> Self {
        Self {
            codec: DEFAULT_VIDEO_CODEC.to_string(),
            preset: DEFAULT_PRESET.to_string(),
            crf: DEFAULT_CRF,
            pixel_format: DEFAULT_PIXEL_FORMAT.to_string(),
            audio_codec: DEFAULT_AUDIO_CODEC.to_string(),
            audio_bitrate: DEFAULT_AUDIO_BITRATE.to_string(),
            use_nvenc: false,
        }
    }
}

impl EncodingConfig {
    /// Returns a new config with updated CRF.
    pub fn with_crf(mut self, crf: u8) -> Self {
        self.crf = crf.min(51);
        self
    }

    /// Enable NVENC hardware acceleration.
    pub fn with_nvenc(mut self) -> Self {
        self.use_nvenc = true;
        self.codec = "h264_nvenc".to_string();
        self.preset = "p4".to_string();
        self
    }

    /// NVENC takes `-cq` instead of `-crf`.
    pub fn quality_flag(&self) -> &'static str {
        if self.use_nvenc {
            "-cq"
        } else {
            "-crf"
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_encoding() {
        let config = EncodingConfig::default();
        assert_eq!(config.codec, "libx264");
        assert_eq!(config.crf, 20);
        assert_eq!(config.pixel_format, "yuv420p");
        assert_eq!(config.quality_flag(), "-crf");
    }

    #[test]
    fn test_nvenc() {
        let config = EncodingConfig::default().with_nvenc();
        assert_eq!(config.codec, "h264_nvenc");
        assert_eq!(config.quality_flag(), "-cq");
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: EncodingConfig = serde_json::from_str(r#"{"crf": 28}"#).unwrap();
        assert_eq!(config.crf, 28);
        assert_eq!(config.preset, DEFAULT_PRESET);
        assert_eq!(config.audio_bitrate, DEFAULT_AUDIO_BITRATE);
    }

    #[test]
    fn test_crf_capped() {
        assert_eq!(EncodingConfig::default().with_crf(80).crf, 51);
    }
}
