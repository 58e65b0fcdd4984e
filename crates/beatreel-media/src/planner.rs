//! Segment planning: beats in, source ranges out.
//!
//! # Rules
//!
//! - Beats are normalized and anything past the end time is dropped
//! - A single beat is padded with synthetic beats 3 s and 6 s later, each
//!   kept only when it lands at least 1 s before the end
//! - No beats at all: one segment from the start of the first source
//! - Otherwise each source contributes one beat-centred segment per beat,
//!   sources in input order

use tracing::{debug, warn};

use beatreel_models::{
    normalize_beats, BeatPoint, ReelConfig, SegmentDescriptor, SourceId, MIN_BEAT_SPACING_SECS,
};

use crate::error::{MediaError, MediaResult, Stage};

/// Offsets of the beats synthesized after a lone beat.
const SYNTHETIC_OFFSETS_SECS: [f64; 2] = [3.0, 6.0];

/// Synthetic beats must leave this much room before the end time.
const END_BUFFER_SECS: f64 = 1.0;

/// Default end time past the last beat.
const DEFAULT_TAIL_SECS: f64 = 2.0;

/// A source clip as the planner sees it.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceSpan {
    pub id: SourceId,
    /// Probed duration in seconds
    pub duration: f64,
}

impl SourceSpan {
    pub fn new(id: impl Into<SourceId>, duration: f64) -> Self {
        Self {
            id: id.into(),
            duration,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlannerConfig {
    pub segment_duration_secs: f64,
    pub min_segment_secs: f64,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            segment_duration_secs: 3.0,
            min_segment_secs: 1.0,
        }
    }
}

impl From<&ReelConfig> for PlannerConfig {
    fn from(config: &ReelConfig) -> Self {
        Self {
            segment_duration_secs: config.segment_duration_seconds,
            min_segment_secs: config.min_segment_seconds,
        }
    }
}

/// Output of [`plan_segments`].
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentPlan {
    pub segments: Vec<SegmentDescriptor>,
    /// Beats the segments were built from, synthetic ones included
    pub effective_beats: Vec<BeatPoint>,
    pub end_time: f64,
    /// Whether synthetic beats were added
    pub synthesized: bool,
}

impl SegmentPlan {
    pub fn beat_times(&self) -> Vec<f64> {
        self.effective_beats.iter().map(|b| b.time).collect()
    }

    /// Sum of planned segment durations.
    pub fn total_duration(&self) -> f64 {
        self.segments.iter().map(SegmentDescriptor::duration).sum()
    }
}

fn empty_plan(attempted: usize) -> MediaError {
    MediaError::EmptyAssembly {
        stage: Stage::Plan,
        attempted,
    }
}

/// Build the ordered segment list for a reel.
pub fn plan_segments(
    beats: &[BeatPoint],
    end_time: Option<f64>,
    sources: &[SourceSpan],
    config: &PlannerConfig,
) -> MediaResult<SegmentPlan> {
    let usable: Vec<&SourceSpan> = sources
        .iter()
        .filter(|s| {
            let ok = s.duration.is_finite() && s.duration > 0.0;
            if !ok {
                warn!(source_id = %s.id, duration = s.duration, "Skipping source without a usable duration");
            }
            ok
        })
        .collect();
    let Some(first) = usable.first() else {
        return Err(empty_plan(sources.len()));
    };

    let mut effective = normalize_beats(beats.iter().cloned(), MIN_BEAT_SPACING_SECS);

    let end_time = match end_time.filter(|t| t.is_finite() && *t > 0.0) {
        Some(t) => t,
        None => match effective.last() {
            Some(last) => last.time + DEFAULT_TAIL_SECS,
            None => first.duration,
        },
    };
    effective.retain(|b| b.time <= end_time);

    let mut synthesized = false;
    if let [only] = effective.as_slice() {
        let base = only.clone();
        for offset in SYNTHETIC_OFFSETS_SECS {
            let time = base.time + offset;
            if time <= end_time - END_BUFFER_SECS {
                effective.push(BeatPoint::new(time, base.confidence, base.band));
                synthesized = true;
            }
        }
    }

    let segments = if effective.is_empty() {
        let end = end_time.min(first.duration);
        SegmentDescriptor::new(first.id.clone(), 0.0, end, first.duration)
            .map(|segment| vec![segment])
            .unwrap_or_default()
    } else {
        let half = config.segment_duration_secs / 2.0;
        let mut segments = Vec::new();
        for source in &usable {
            for beat in &effective {
                let start = (beat.time - half).max(0.0);
                let end = (beat.time + half).min(source.duration).min(end_time);
                if end - start < config.min_segment_secs {
                    continue;
                }
                match SegmentDescriptor::new(source.id.clone(), start, end, source.duration) {
                    Ok(segment) => segments.push(segment),
                    Err(e) => debug!(source_id = %source.id, error = %e, "Discarding segment"),
                }
            }
        }
        segments
    };

    if segments.is_empty() {
        return Err(empty_plan(sources.len()));
    }

    debug!(
        segments = segments.len(),
        beats = effective.len(),
        end_time,
        synthesized,
        "Planned segments"
    );

    Ok(SegmentPlan {
        segments,
        effective_beats: effective,
        end_time,
        synthesized,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use beatreel_models::manual_beats;

    fn bounds(plan: &SegmentPlan) -> Vec<(String, f64, f64)> {
        plan.segments
            .iter()
            .map(|s| (s.source_id.to_string(), s.start_time, s.end_time))
            .collect()
    }

    #[test]
    fn test_single_beat_is_padded() {
        let plan = plan_segments(
            &manual_beats(&[2.0]),
            Some(10.0),
            &[SourceSpan::new("a", 20.0)],
            &PlannerConfig::default(),
        )
        .unwrap();

        assert_eq!(plan.beat_times(), vec![2.0, 5.0, 8.0]);
        assert!(plan.synthesized);
        assert_eq!(
            bounds(&plan),
            vec![
                ("a".to_string(), 0.5, 3.5),
                ("a".to_string(), 3.5, 6.5),
                ("a".to_string(), 6.5, 9.5),
            ]
        );
    }

    #[test]
    fn test_synthetic_beats_respect_end_buffer() {
        let plan = plan_segments(
            &manual_beats(&[2.0]),
            Some(7.5),
            &[SourceSpan::new("a", 20.0)],
            &PlannerConfig::default(),
        )
        .unwrap();
        assert_eq!(plan.beat_times(), vec![2.0, 5.0]);
    }

    #[test]
    fn test_no_beats_uses_first_source() {
        let plan = plan_segments(
            &[],
            Some(12.0),
            &[SourceSpan::new("a", 20.0), SourceSpan::new("b", 30.0)],
            &PlannerConfig::default(),
        )
        .unwrap();

        assert_eq!(bounds(&plan), vec![("a".to_string(), 0.0, 12.0)]);
        assert!(plan.effective_beats.is_empty());
    }

    #[test]
    fn test_no_beats_short_source() {
        let plan = plan_segments(&[], Some(12.0), &[SourceSpan::new("a", 8.0)], &PlannerConfig::default())
            .unwrap();
        assert_eq!(bounds(&plan), vec![("a".to_string(), 0.0, 8.0)]);
    }

    #[test]
    fn test_no_beats_no_end_time() {
        let plan = plan_segments(&[], None, &[SourceSpan::new("a", 6.0)], &PlannerConfig::default()).unwrap();
        assert!((plan.end_time - 6.0).abs() < 1e-9);
    }

    #[test]
    fn test_default_end_time_follows_last_beat() {
        let plan = plan_segments(
            &manual_beats(&[1.0, 4.0, 7.0]),
            None,
            &[SourceSpan::new("a", 30.0)],
            &PlannerConfig::default(),
        )
        .unwrap();
        assert!((plan.end_time - 9.0).abs() < 1e-9);
        assert!(!plan.synthesized);
    }

    #[test]
    fn test_source_major_order_and_clamping() {
        let plan = plan_segments(
            &manual_beats(&[1.0, 5.0, 9.0]),
            Some(20.0),
            &[SourceSpan::new("a", 10.0), SourceSpan::new("b", 6.0)],
            &PlannerConfig::default(),
        )
        .unwrap();

        assert_eq!(
            bounds(&plan),
            vec![
                ("a".to_string(), 0.0, 2.5),
                ("a".to_string(), 3.5, 6.5),
                ("a".to_string(), 7.5, 10.0),
                ("b".to_string(), 0.0, 2.5),
                ("b".to_string(), 3.5, 6.0),
            ]
        );
    }

    #[test]
    fn test_short_segments_are_discarded() {
        let plan = plan_segments(
            &manual_beats(&[3.0, 9.8]),
            Some(10.0),
            &[SourceSpan::new("a", 10.0)],
            &PlannerConfig::default(),
        )
        .unwrap();

        // The 9.8 s beat is clipped to [8.3, 10.0)
        assert_eq!(plan.segments.len(), 2);

        let plan = plan_segments(
            &manual_beats(&[3.0, 9.8]),
            Some(10.0),
            &[SourceSpan::new("a", 10.0)],
            &PlannerConfig {
                segment_duration_secs: 3.0,
                min_segment_secs: 2.0,
            },
        )
        .unwrap();
        assert_eq!(plan.segments.len(), 1);
    }

    #[test]
    fn test_beats_past_end_are_dropped() {
        let plan = plan_segments(
            &manual_beats(&[1.0, 4.0, 15.0]),
            Some(6.0),
            &[SourceSpan::new("a", 30.0)],
            &PlannerConfig::default(),
        )
        .unwrap();
        assert_eq!(plan.beat_times(), vec![1.0, 4.0]);
    }

    #[test]
    fn test_every_segment_satisfies_bounds() {
        let plan = plan_segments(
            &manual_beats(&[0.2, 2.0, 4.4, 6.1, 11.0]),
            Some(12.0),
            &[SourceSpan::new("a", 5.0), SourceSpan::new("b", 12.0)],
            &PlannerConfig::default(),
        )
        .unwrap();
        for segment in &plan.segments {
            assert!(segment.start_time >= 0.0);
            assert!(segment.start_time < segment.end_time);
            assert!(segment.duration() >= 1.0);
            assert!(segment.end_time <= 12.0);
        }
    }

    #[test]
    fn test_no_sources_is_empty_assembly() {
        let result = plan_segments(&manual_beats(&[1.0]), Some(5.0), &[], &PlannerConfig::default());
        assert!(matches!(
            result,
            Err(MediaError::EmptyAssembly {
                stage: Stage::Plan,
                ..
            })
        ));
    }
}
