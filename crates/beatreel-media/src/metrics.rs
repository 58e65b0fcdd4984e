//! Pipeline metrics.
//!
//! Recorded through the `metrics` facade; nothing is exported unless the
//! embedding binary installs a recorder.

use metrics::{counter, histogram};
use std::time::Duration;

use beatreel_models::{AttemptOutcome, MergeStrategyId};

use crate::error::Stage;

/// Metric names as constants for consistency.
pub mod names {
    pub const RUNS_TOTAL: &str = "beatreel_runs_total";
    pub const RUN_DURATION_SECONDS: &str = "beatreel_run_duration_seconds";
    pub const STAGE_DURATION_SECONDS: &str = "beatreel_stage_duration_seconds";
    pub const BEATS_DETECTED: &str = "beatreel_beats_detected";
    pub const SEGMENTS_DROPPED_TOTAL: &str = "beatreel_segments_dropped_total";
    pub const CLIPS_SKIPPED_TOTAL: &str = "beatreel_concat_clips_skipped_total";
    pub const MERGE_ATTEMPTS_TOTAL: &str = "beatreel_merge_attempts_total";
    pub const MERGE_SIZE_RATIO: &str = "beatreel_merge_size_ratio";
    pub const CACHE_LOOKUPS_TOTAL: &str = "beatreel_cache_lookups_total";
}

fn outcome_label(outcome: AttemptOutcome) -> &'static str {
    match outcome {
        AttemptOutcome::Accepted => "accepted",
        AttemptOutcome::Rejected => "rejected",
        AttemptOutcome::Failed => "failed",
        AttemptOutcome::Skipped => "skipped",
    }
}

/// Record the end of a run; `result` is `"ok"` or an error kind.
pub fn record_run(result: &str, duration: Duration) {
    let labels = [("result", result.to_string())];
    counter!(names::RUNS_TOTAL, &labels).increment(1);
    histogram!(names::RUN_DURATION_SECONDS, &labels).record(duration.as_secs_f64());
}

pub fn record_stage_duration(stage: Stage, duration: Duration) {
    let labels = [("stage", stage.as_str().to_string())];
    histogram!(names::STAGE_DURATION_SECONDS, &labels).record(duration.as_secs_f64());
}

pub fn record_beats_detected(count: usize) {
    histogram!(names::BEATS_DETECTED).record(count as f64);
}

pub fn record_segment_dropped(reason: &str) {
    let labels = [("reason", reason.to_string())];
    counter!(names::SEGMENTS_DROPPED_TOTAL, &labels).increment(1);
}

pub fn record_clip_skipped() {
    counter!(names::CLIPS_SKIPPED_TOTAL).increment(1);
}

/// Record one visited merge cascade state.
pub fn record_merge_attempt(strategy: MergeStrategyId, outcome: AttemptOutcome, size_ratio: Option<f64>) {
    let labels = [
        ("strategy", strategy.as_str().to_string()),
        ("outcome", outcome_label(outcome).to_string()),
    ];
    counter!(names::MERGE_ATTEMPTS_TOTAL, &labels).increment(1);
    if let Some(ratio) = size_ratio {
        let labels = [("strategy", strategy.as_str().to_string())];
        histogram!(names::MERGE_SIZE_RATIO, &labels).record(ratio);
    }
}

pub fn record_cache_lookup(cache: &'static str, hit: bool) {
    let labels = [
        ("cache", cache.to_string()),
        ("result", if hit { "hit" } else { "miss" }.to_string()),
    ];
    counter!(names::CACHE_LOOKUPS_TOTAL, &labels).increment(1);
}
