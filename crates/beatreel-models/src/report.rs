//! Run reports: what each stage did and why.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::segment::SegmentDescriptor;

/// Identifier of one assembly run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct RunId(pub String);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// States of the merge cascade, in the order they are attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum MergeStrategyId {
    /// Mux the audio source's own stream next to the video stream
    DirectStream,
    /// Route the audio through a gain/resample filter graph first
    AudioGraph,
    /// Decode the audio to PCM in memory and feed the raw buffer
    DecodedBuffer,
    /// Terminal state: the video without audio
    VideoOnly,
}

impl MergeStrategyId {
    /// Every state in cascade order.
    pub const CASCADE: [MergeStrategyId; 4] = [
        MergeStrategyId::DirectStream,
        MergeStrategyId::AudioGraph,
        MergeStrategyId::DecodedBuffer,
        MergeStrategyId::VideoOnly,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MergeStrategyId::DirectStream => "direct_stream",
            MergeStrategyId::AudioGraph => "audio_graph",
            MergeStrategyId::DecodedBuffer => "decoded_buffer",
            MergeStrategyId::VideoOnly => "video_only",
        }
    }

    /// Whether this state never fails and ends the cascade.
    pub fn is_terminal(&self) -> bool {
        matches!(self, MergeStrategyId::VideoOnly)
    }

    /// Whether the output carries an audio channel.
    pub fn carries_audio(&self) -> bool {
        !self.is_terminal()
    }
}

impl fmt::Display for MergeStrategyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How one cascade state ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    Accepted,
    Rejected,
    Failed,
    Skipped,
}

/// One visited cascade state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AttemptRecord {
    pub strategy: MergeStrategyId,
    pub outcome: AttemptOutcome,
    /// Output size over input video size, when a recording was produced
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size_ratio: Option<f64>,
    pub detail: String,
}

/// Where the beats used for planning came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum BeatSource {
    Detected,
    Manual,
}

/// A planned segment the trimmer could not turn into a clip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct DroppedSegment {
    pub segment: SegmentDescriptor,
    pub reason: String,
}

/// Summary of a complete assembly run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AssemblyReport {
    pub run_id: RunId,
    pub beat_source: BeatSource,
    pub tempo_bpm: u32,
    /// Beats found before capping (equal to the manual count for manual marks)
    pub beats_detected: usize,
    pub beats_used: Vec<f64>,
    pub end_time: f64,
    pub segments_planned: usize,
    pub segments_trimmed: usize,
    pub dropped_segments: Vec<DroppedSegment>,
    pub merge_strategy: MergeStrategyId,
    pub merge_size_ratio: f64,
    pub merge_attempts: Vec<AttemptRecord>,
    pub output_bytes: usize,
}
