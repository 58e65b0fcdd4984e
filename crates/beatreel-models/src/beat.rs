//! Beat points produced by onset detection or entered by hand.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Smallest spacing allowed between two beats of a normalized sequence.
pub const MIN_BEAT_SPACING_SECS: f64 = 0.1;

/// Frequency band a beat was dominated by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum BeatBand {
    Bass,
    #[default]
    Mid,
    Treble,
}

impl BeatBand {
    pub fn as_str(&self) -> &'static str {
        match self {
            BeatBand::Bass => "bass",
            BeatBand::Mid => "mid",
            BeatBand::Treble => "treble",
        }
    }
}

impl fmt::Display for BeatBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A synchronization anchor on the music timeline.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct BeatPoint {
    /// Position in seconds from the start of the track
    pub time: f64,
    /// Detection confidence (0.0-1.0)
    pub confidence: f32,
    /// Dominant band
    pub band: BeatBand,
}

impl BeatPoint {
    pub fn new(time: f64, confidence: f32, band: BeatBand) -> Self {
        Self {
            time,
            confidence: confidence.clamp(0.0, 1.0),
            band,
        }
    }

    /// A beat placed by the user. Manual marks are trusted fully.
    pub fn manual(time: f64) -> Self {
        Self::new(time, 1.0, BeatBand::Mid)
    }
}

/// Sort beats ascending and drop any point closer than `min_spacing` to the
/// previously kept one.
///
/// Non-finite and negative times are discarded. `min_spacing` never goes
/// below [`MIN_BEAT_SPACING_SECS`].
pub fn normalize_beats<I>(points: I, min_spacing: f64) -> Vec<BeatPoint>
where
    I: IntoIterator<Item = BeatPoint>,
{
    let spacing = if min_spacing.is_finite() {
        min_spacing.max(MIN_BEAT_SPACING_SECS)
    } else {
        MIN_BEAT_SPACING_SECS
    };

    let mut sorted: Vec<BeatPoint> = points
        .into_iter()
        .filter(|p| p.time.is_finite() && p.time >= 0.0)
        .collect();
    sorted.sort_by(|a, b| a.time.total_cmp(&b.time));

    let mut kept: Vec<BeatPoint> = Vec::with_capacity(sorted.len());
    for point in sorted {
        match kept.last() {
            Some(last) if point.time - last.time < spacing => continue,
            _ => kept.push(point),
        }
    }
    kept
}

/// Build a normalized beat list from manual mark times.
pub fn manual_beats(times: &[f64]) -> Vec<BeatPoint> {
    normalize_beats(times.iter().copied().map(BeatPoint::manual), MIN_BEAT_SPACING_SECS)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn times(beats: &[BeatPoint]) -> Vec<f64> {
        beats.iter().map(|b| b.time).collect()
    }

    #[test]
    fn test_normalize_sorts_ascending() {
        let beats = vec![
            BeatPoint::manual(3.0),
            BeatPoint::manual(1.0),
            BeatPoint::manual(2.0),
        ];
        assert_eq!(times(&normalize_beats(beats, 0.1)), vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_normalize_removes_close_points() {
        let beats = vec![
            BeatPoint::manual(1.0),
            BeatPoint::manual(1.05),
            BeatPoint::manual(1.2),
            BeatPoint::manual(1.25),
        ];
        let result = normalize_beats(beats, 0.1);
        assert_eq!(times(&result), vec![1.0, 1.2]);
    }

    #[test]
    fn test_normalize_spacing_floor() {
        // A smaller requested spacing is raised to the floor
        let beats = vec![BeatPoint::manual(0.0), BeatPoint::manual(0.05)];
        assert_eq!(normalize_beats(beats, 0.01).len(), 1);
    }

    #[test]
    fn test_normalize_drops_invalid_times() {
        let beats = vec![
            BeatPoint::manual(f64::NAN),
            BeatPoint::manual(-1.0),
            BeatPoint::manual(f64::INFINITY),
            BeatPoint::manual(4.0),
        ];
        assert_eq!(times(&normalize_beats(beats, 0.1)), vec![4.0]);
    }

    #[test]
    fn test_normalized_output_holds_spacing_invariant() {
        let raw: Vec<BeatPoint> = (0..200)
            .map(|i| BeatPoint::manual(((i * 37) % 101) as f64 * 0.07))
            .collect();
        let spacing = 0.3;
        let result = normalize_beats(raw, spacing);
        for pair in result.windows(2) {
            assert!(pair[0].time < pair[1].time);
            assert!(pair[1].time - pair[0].time >= spacing);
        }
    }

    #[test]
    fn test_manual_beats() {
        let beats = manual_beats(&[5.0, 2.0, 2.02]);
        assert_eq!(times(&beats), vec![2.0, 5.0]);
        assert!(beats.iter().all(|b| (b.confidence - 1.0).abs() < f32::EPSILON));
    }

    #[test]
    fn test_confidence_clamped() {
        let beat = BeatPoint::new(1.0, 1.7, BeatBand::Bass);
        assert!((beat.confidence - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_band_serialization() {
        let json = serde_json::to_string(&BeatBand::Treble).unwrap();
        assert_eq!(json, "\"treble\"");
    }
}
