#![deny(unreachable_patterns)]
//! Beat-synced reel assembly on top of the FFmpeg CLI.
//!
//! This crate provides:
//! - Audio decoding and energy-based onset detection
//! - Beat-driven segment planning
//! - Frame-accurate trimming and geometry-normalizing concatenation
//! - An audio/video merge cascade with size validation and circuit breakers
//! - Monotonic progress reporting and cooperative cancellation
//!
//! Every operation hangs off a caller-owned [`AssemblyContext`].

pub mod audio;
pub mod backend;
pub mod cache;
pub mod circuit_breaker;
pub mod command;
pub mod context;
pub mod control;
pub mod error;
pub mod logging;
pub mod merge;
pub mod metrics;
pub mod pipeline;
pub mod planner;
pub mod probe;
pub mod progress;
pub mod workspace;

mod concat;
mod trim;

#[cfg(test)]
mod testing;

pub use audio::{detect_onsets, AudioSample, OnsetAnalysis, OnsetConfig};
pub use backend::{AudioFeed, BackendCall, FfmpegBackend, MediaBackend, PcmFormat};
pub use circuit_breaker::{CircuitBreaker, CircuitState};
pub use command::{FfmpegCommand, FfmpegRunner};
pub use context::AssemblyContext;
pub use control::{cancel_pair, CancelHandle, RunControl};
pub use error::{MediaError, MediaResult, MergeRejection, Stage};
pub use logging::RunLogger;
pub use merge::{validate_recording, MergeOutcome};
pub use pipeline::{ReelOutput, ReelRequest};
pub use planner::{plan_segments, PlannerConfig, SegmentPlan, SourceSpan};
pub use probe::{probe_media, probe_media_with, MediaInfo};
pub use progress::{channel as progress_channel, FfmpegProgress, ProgressSink, ProgressTracker};
pub use workspace::Workspace;
