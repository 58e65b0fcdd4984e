//! Segment descriptors and source identifiers.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Identifier of an input media handle.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct SourceId(pub String);

impl SourceId {
    /// Generate a new random source ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// A version of the ID safe to embed in a file name.
    pub fn file_stem(&self) -> String {
        let stem: String = self
            .0
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .take(48)
            .collect();
        if stem.is_empty() {
            "source".to_string()
        } else {
            stem
        }
    }
}

impl Default for SourceId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for SourceId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for SourceId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Segment construction error.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SegmentError {
    #[error("segment start {start:.3}s must be before end {end:.3}s")]
    StartNotBeforeEnd { start: f64, end: f64 },

    #[error("segment start {0:.3}s is negative")]
    NegativeStart(f64),

    #[error("segment end {end:.3}s exceeds source duration {duration:.3}s")]
    ExceedsSource { end: f64, duration: f64 },

    #[error("segment bounds must be finite")]
    NonFinite,
}

/// A time range `[start_time, end_time)` of one source clip.
///
/// Invariant: `0 <= start_time < end_time <= source duration`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SegmentDescriptor {
    pub source_id: SourceId,
    pub start_time: f64,
    pub end_time: f64,
}

impl SegmentDescriptor {
    /// Create a descriptor, checking it against the source duration.
    pub fn new(
        source_id: SourceId,
        start_time: f64,
        end_time: f64,
        source_duration: f64,
    ) -> Result<Self, SegmentError> {
        if !start_time.is_finite() || !end_time.is_finite() {
            return Err(SegmentError::NonFinite);
        }
        if start_time < 0.0 {
            return Err(SegmentError::NegativeStart(start_time));
        }
        if start_time >= end_time {
            return Err(SegmentError::StartNotBeforeEnd {
                start: start_time,
                end: end_time,
            });
        }
        if end_time > source_duration {
            return Err(SegmentError::ExceedsSource {
                end: end_time,
                duration: source_duration,
            });
        }
        Ok(Self {
            source_id,
            start_time,
            end_time,
        })
    }

    /// Duration in seconds.
    pub fn duration(&self) -> f64 {
        self.end_time - self.start_time
    }
}
