//! Media handles and encoded clips.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::segment::SourceId;

/// MIME type used for every clip the pipeline produces.
pub const OUTPUT_MIME_TYPE: &str = "video/mp4";

/// Map a MIME type to the file extension the backend expects.
pub fn extension_for_mime(mime_type: &str) -> &'static str {
    let essence = mime_type.split(';').next().unwrap_or("").trim();
    match essence.to_ascii_lowercase().as_str() {
        "video/mp4" | "application/mp4" => "mp4",
        "video/webm" => "webm",
        "video/quicktime" => "mov",
        "video/x-matroska" => "mkv",
        "video/x-msvideo" => "avi",
        "audio/mpeg" | "audio/mp3" => "mp3",
        "audio/wav" | "audio/x-wav" | "audio/wave" => "wav",
        "audio/mp4" | "audio/x-m4a" | "audio/m4a" => "m4a",
        "audio/aac" => "aac",
        "audio/ogg" => "ogg",
        "audio/webm" => "weba",
        "audio/flac" | "audio/x-flac" => "flac",
        _ => "bin",
    }
}

/// An opaque input handle: encoded bytes plus a MIME type.
#[derive(Clone)]
pub struct MediaSource {
    pub id: SourceId,
    pub data: Vec<u8>,
    pub mime_type: String,
}

impl MediaSource {
    pub fn new(id: impl Into<SourceId>, data: Vec<u8>, mime_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            data,
            mime_type: mime_type.into(),
        }
    }

    /// Size in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// File extension derived from the MIME type.
    pub fn extension(&self) -> &'static str {
        extension_for_mime(&self.mime_type)
    }

    /// Key used by caches: SHA-256 of the bytes. Sources with equal bytes
    /// share cache entries whatever their IDs.
    pub fn cache_key(&self) -> String {
        let digest = Sha256::digest(&self.data);
        format!("{:x}", digest)
    }
}

impl std::fmt::Debug for MediaSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaSource")
            .field("id", &self.id)
            .field("bytes", &self.data.len())
            .field("mime_type", &self.mime_type)
            .finish()
    }
}

/// Frame geometry shared by clips that are joined together.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Geometry {
    pub width: u32,
    pub height: u32,
    pub frame_rate: f64,
}

impl Geometry {
    /// Whether the geometry can drive a scale/fps filter.
    pub fn is_valid(&self) -> bool {
        self.width > 0 && self.height > 0 && self.frame_rate.is_finite() && self.frame_rate > 0.0
    }

    /// Encoders using yuv420p need even dimensions.
    pub fn even(self) -> Self {
        Self {
            width: self.width & !1,
            height: self.height & !1,
            frame_rate: self.frame_rate,
        }
    }
}

/// Metadata carried alongside an encoded clip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ClipMeta {
    pub width: u32,
    pub height: u32,
    pub frame_rate: f64,
    /// Estimated duration in seconds
    pub duration_estimate: f64,
    pub mime_type: String,
}

impl ClipMeta {
    pub fn geometry(&self) -> Geometry {
        Geometry {
            width: self.width,
            height: self.height,
            frame_rate: self.frame_rate,
        }
    }

    pub fn with_geometry(geometry: Geometry, duration_estimate: f64) -> Self {
        Self {
            width: geometry.width,
            height: geometry.height,
            frame_rate: geometry.frame_rate,
            duration_estimate,
            mime_type: OUTPUT_MIME_TYPE.to_string(),
        }
    }
}

/// An encoded media buffer with its metadata.
#[derive(Clone, PartialEq)]
pub struct Clip {
    pub data: Vec<u8>,
    pub meta: ClipMeta,
}

impl Clip {
    pub fn new(data: Vec<u8>, meta: ClipMeta) -> Self {
        Self { data, meta }
    }

    /// Size in bytes.
    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn mime_type(&self) -> &str {
        &self.meta.mime_type
    }

    /// Reinterpret the clip as an input handle for a later stage.
    pub fn into_source(self, id: impl Into<SourceId>) -> MediaSource {
        MediaSource::new(id, self.data, self.meta.mime_type)
    }
}

impl std::fmt::Debug for Clip {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Clip")
            .field("bytes", &self.data.len())
            .field("meta", &self.meta)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_for_mime() {
        assert_eq!(extension_for_mime("video/mp4"), "mp4");
        assert_eq!(extension_for_mime("video/webm; codecs=vp9"), "webm");
        assert_eq!(extension_for_mime("Audio/MPEG"), "mp3");
        assert_eq!(extension_for_mime("application/octet-stream"), "bin");
    }

    #[test]
    fn test_geometry_even() {
        let g = Geometry {
            width: 1281,
            height: 721,
            frame_rate: 30.0,
        };
        let even = g.even();
        assert_eq!((even.width, even.height), (1280, 720));
        assert!(even.is_valid());
    }

    #[test]
    fn test_invalid_geometry() {
        let g = Geometry {
            width: 0,
            height: 720,
            frame_rate: 30.0,
        };
        assert!(!g.is_valid());
    }

    #[test]
    fn test_cache_key_follows_content() {
        let a = MediaSource::new("a", vec![0, 1, 2, 3], "video/mp4");
        let b = MediaSource::new("a", vec![3, 2, 1, 0], "video/mp4");
        let c = MediaSource::new("c", vec![0, 1, 2, 3], "video/mp4");
        assert_ne!(a.cache_key(), b.cache_key());
        assert_eq!(a.cache_key(), c.cache_key());
        assert_eq!(a.cache_key().len(), 64);
    }

    #[test]
    fn test_clip_into_source_keeps_bytes() {
        let meta = ClipMeta::with_geometry(
            Geometry {
                width: 640,
                height: 360,
                frame_rate: 24.0,
            },
            2.0,
        );
        let clip = Clip::new(vec![1, 2, 3], meta);
        let source = clip.into_source("reel");
        assert_eq!(source.data, vec![1, 2, 3]);
        assert_eq!(source.extension(), "mp4");
    }
}
