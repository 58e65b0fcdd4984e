//! Shared data models for the beatreel pipeline.
//!
//! This crate provides Serde-serializable types for:
//! - Beat points and manual beat marks
//! - Segment descriptors and media handles
//! - Clips and their metadata
//! - Encoding and pipeline configuration
//! - Run reports for the merge cascade

pub mod beat;
pub mod config;
pub mod encoding;
pub mod media;
pub mod report;
pub mod segment;
pub mod timestamp;

// Re-export common types
pub use beat::{manual_beats, normalize_beats, BeatBand, BeatPoint, MIN_BEAT_SPACING_SECS};
pub use config::{ConfigError, ReelConfig, TrimMode};
pub use encoding::EncodingConfig;
pub use media::{Clip, ClipMeta, Geometry, MediaSource};
pub use report::{
    AssemblyReport, AttemptOutcome, AttemptRecord, BeatSource, DroppedSegment, MergeStrategyId,
    RunId,
};
pub use segment::{SegmentDescriptor, SegmentError, SourceId};
pub use timestamp::{format_seconds, parse_beat_marks, parse_timestamp, TimestampError};
