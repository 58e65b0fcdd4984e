//! Energy-based onset detection.
//!
//! # Algorithm
//!
//! 1. Slide a ~100 ms window with 4x overlap over channel 0
//! 2. Take the RMS of each window and normalize by the loudest window
//! 3. Accept a window as a beat when its normalized energy clears the
//!    threshold, it is a local maximum, and the previous beat is at least
//!    `min_beat_interval` behind it
//!
//! The beat sits at the window center. Its band comes from the window's
//! zero-crossing rate, which stands in for the dominant frequency.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

use beatreel_models::{BeatBand, BeatPoint, ReelConfig};

use super::AudioSample;
use crate::error::{MediaError, MediaResult};

/// Tempo reported when fewer than two beats are found.
pub const DEFAULT_TEMPO_BPM: u32 = 120;

/// Confidence reported when nothing is detected.
const NO_BEAT_CONFIDENCE: f32 = 0.1;
const MAX_CONFIDENCE: f32 = 0.85;

const BASS_CEILING_HZ: f32 = 250.0;
const MID_CEILING_HZ: f32 = 2000.0;

/// Detector parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct OnsetConfig {
    /// Window length in seconds
    pub window_secs: f64,
    /// Hop = window / overlap
    pub overlap: usize,
    /// Normalized energy a beat window must exceed
    pub energy_threshold: f32,
    pub min_beat_interval_secs: f64,
    pub max_beats: usize,
}

impl Default for OnsetConfig {
    fn default() -> Self {
        Self {
            window_secs: 0.1,
            overlap: 4,
            energy_threshold: 0.3,
            min_beat_interval_secs: 0.3,
            max_beats: 20,
        }
    }
}

impl From<&ReelConfig> for OnsetConfig {
    fn from(config: &ReelConfig) -> Self {
        Self {
            min_beat_interval_secs: config.min_beat_interval_seconds,
            max_beats: config.max_beats,
            ..Default::default()
        }
    }
}

/// Result of one analysis.
#[derive(Debug, Clone, PartialEq)]
pub struct OnsetAnalysis {
    /// At most `max_beats` beats, ascending
    pub beats: Vec<BeatPoint>,
    pub tempo_bpm: u32,
    /// Mean normalized window energy (0-1)
    pub energy: f32,
    pub confidence: f32,
    /// Beats found before capping
    pub detected_count: usize,
}

impl OnsetAnalysis {
    fn empty(energy: f32) -> Self {
        Self {
            beats: Vec::new(),
            tempo_bpm: DEFAULT_TEMPO_BPM,
            energy,
            confidence: NO_BEAT_CONFIDENCE,
            detected_count: 0,
        }
    }
}

/// Map an estimated dominant frequency to a band.
pub fn classify_band(frequency_hz: f32) -> BeatBand {
    if frequency_hz < BASS_CEILING_HZ {
        BeatBand::Bass
    } else if frequency_hz < MID_CEILING_HZ {
        BeatBand::Mid
    } else {
        BeatBand::Treble
    }
}

fn rms(window: &[f32]) -> f32 {
    if window.is_empty() {
        return 0.0;
    }
    let sum: f64 = window.iter().map(|s| (*s as f64) * (*s as f64)).sum();
    (sum / window.len() as f64).sqrt() as f32
}

/// Dominant frequency estimate: one cycle per two sign changes.
fn zero_crossing_frequency(window: &[f32], sample_rate: u32) -> f32 {
    if window.len() < 2 {
        return 0.0;
    }
    let crossings = window
        .windows(2)
        .filter(|pair| (pair[0] >= 0.0) != (pair[1] >= 0.0))
        .count();
    crossings as f32 * sample_rate as f32 / (2.0 * window.len() as f32)
}

/// Coarse confidence from the number of beats found.
fn confidence_for(count: usize) -> f32 {
    let confidence = match count {
        0 => NO_BEAT_CONFIDENCE,
        1..=3 => 0.3,
        4..=7 => 0.5,
        8..=15 => 0.7,
        _ => MAX_CONFIDENCE,
    };
    confidence.min(MAX_CONFIDENCE)
}

fn median_interval(beats: &[BeatPoint]) -> Option<f64> {
    let mut intervals: Vec<f64> = beats
        .windows(2)
        .map(|pair| pair[1].time - pair[0].time)
        .filter(|d| *d > 0.0)
        .collect();
    if intervals.is_empty() {
        return None;
    }
    intervals.sort_by(f64::total_cmp);
    let mid = intervals.len() / 2;
    Some(if intervals.len() % 2 == 0 {
        (intervals[mid - 1] + intervals[mid]) / 2.0
    } else {
        intervals[mid]
    })
}

/// Detect onsets in channel 0 of `sample`. CPU-bound; see [`analyze_onsets`]
/// for the async entry point.
pub fn detect_onsets(sample: &AudioSample, config: &OnsetConfig) -> OnsetAnalysis {
    detect_onsets_until(sample, config, &AtomicBool::new(false)).unwrap_or_else(|| OnsetAnalysis::empty(0.0))
}

/// [`detect_onsets`] that gives up with `None` once `stop` is raised.
pub fn detect_onsets_until(sample: &AudioSample, config: &OnsetConfig, stop: &AtomicBool) -> Option<OnsetAnalysis> {
    let Some(samples) = sample.channel(0) else {
        return Some(OnsetAnalysis::empty(0.0));
    };
    let sample_rate = sample.sample_rate.max(1);
    let window = ((sample_rate as f64 * config.window_secs).round() as usize).max(4);
    let hop = (window / config.overlap.max(1)).max(1);

    if samples.len() < window {
        debug!(samples = samples.len(), window, "Audio shorter than one analysis window");
        return Some(OnsetAnalysis::empty(0.0));
    }

    let starts: Vec<usize> = (0..=samples.len() - window).step_by(hop).collect();
    let mut energies = Vec::with_capacity(starts.len());
    for &start in &starts {
        if stop.load(Ordering::Relaxed) {
            debug!(windows_done = energies.len(), "Onset analysis stopped");
            return None;
        }
        energies.push(rms(&samples[start..start + window]));
    }

    let max_energy = energies.iter().copied().fold(0.0f32, f32::max);
    if max_energy <= f32::EPSILON {
        return Some(OnsetAnalysis::empty(0.0));
    }
    let normalized: Vec<f32> = energies.iter().map(|e| e / max_energy).collect();
    let mean_energy = normalized.iter().sum::<f32>() / normalized.len() as f32;

    let mut beats: Vec<BeatPoint> = Vec::new();
    for i in 1..normalized.len().saturating_sub(1) {
        let energy = normalized[i];
        if energy <= config.energy_threshold {
            continue;
        }
        if !(energy >= normalized[i - 1] && energy > normalized[i + 1]) {
            continue;
        }

        let start = starts[i];
        let time = (start as f64 + window as f64 / 2.0) / sample_rate as f64;
        if let Some(last) = beats.last() {
            if time - last.time < config.min_beat_interval_secs {
                continue;
            }
        }

        let frequency = zero_crossing_frequency(&samples[start..start + window], sample_rate);
        beats.push(BeatPoint::new(time, energy, classify_band(frequency)));
    }

    let detected_count = beats.len();
    let tempo_bpm = median_interval(&beats)
        .map(|interval| (60.0 / interval).round() as u32)
        .unwrap_or(DEFAULT_TEMPO_BPM);
    beats.truncate(config.max_beats);

    debug!(
        windows = normalized.len(),
        detected = detected_count,
        tempo_bpm,
        "Onset analysis complete"
    );

    Some(OnsetAnalysis {
        beats,
        tempo_bpm,
        energy: mean_energy.clamp(0.0, 1.0),
        confidence: confidence_for(detected_count),
        detected_count,
    })
}

/// Raises the flag when dropped.
struct StopOnDrop(Arc<AtomicBool>);

impl Drop for StopOnDrop {
    fn drop(&mut self) {
        self.0.store(true, Ordering::Relaxed);
    }
}

/// Run [`detect_onsets`] on the blocking pool. Dropping the future (timeout or
/// cancellation) stops the analysis at its next window.
pub async fn analyze_onsets(sample: Arc<AudioSample>, config: OnsetConfig) -> MediaResult<OnsetAnalysis> {
    let stop = Arc::new(AtomicBool::new(false));
    let _stop_on_drop = StopOnDrop(Arc::clone(&stop));

    let analysis = tokio::task::spawn_blocking(move || detect_onsets_until(&sample, &config, &stop))
        .await
        .map_err(|e| MediaError::internal(format!("onset analysis task failed: {}", e)))?;
    analysis.ok_or(MediaError::Cancelled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    /// 50 ms 440 Hz bursts every 0.5 s starting at 0.25 s.
    fn bursts_at_120_bpm(seconds: f64, sample_rate: u32) -> AudioSample {
        let total = (seconds * sample_rate as f64) as usize;
        let burst_len = (0.05 * sample_rate as f64) as usize;
        let mut samples = vec![0.0f32; total];

        let mut onset = 0.25;
        while onset + 0.05 <= seconds {
            let start = (onset * sample_rate as f64).round() as usize;
            for n in 0..burst_len {
                let t = n as f32 / sample_rate as f32;
                samples[start + n] = 0.8 * (2.0 * PI * 440.0 * t).sin();
            }
            onset += 0.5;
        }
        AudioSample::mono(sample_rate, samples)
    }

    #[test]
    fn test_detects_120_bpm() {
        let sample = bursts_at_120_bpm(30.0, 8000);
        let analysis = detect_onsets(&sample, &OnsetConfig::default());

        assert!((55..=65).contains(&analysis.detected_count), "{}", analysis.detected_count);
        assert_eq!(analysis.beats.len(), 20);
        assert!((115..=125).contains(&analysis.tempo_bpm), "{}", analysis.tempo_bpm);
        assert!((analysis.confidence - 0.85).abs() < 1e-6);

        // Beats follow the bursts
        assert!((analysis.beats[0].time - 0.3).abs() < 0.06);
        for pair in analysis.beats.windows(2) {
            assert!((pair[1].time - pair[0].time - 0.5).abs() < 0.03);
        }
    }

    #[test]
    fn test_silence_yields_no_beats() {
        let sample = AudioSample::mono(8000, vec![0.0; 8000 * 5]);
        let analysis = detect_onsets(&sample, &OnsetConfig::default());

        assert!(analysis.beats.is_empty());
        assert_eq!(analysis.detected_count, 0);
        assert_eq!(analysis.tempo_bpm, DEFAULT_TEMPO_BPM);
        assert!((analysis.confidence - 0.1).abs() < 1e-6);
    }

    #[test]
    fn test_too_short_for_a_window() {
        let sample = AudioSample::mono(8000, vec![0.5; 100]);
        let analysis = detect_onsets(&sample, &OnsetConfig::default());
        assert!(analysis.beats.is_empty());
    }

    #[test]
    fn test_min_interval_respected() {
        let sample = bursts_at_120_bpm(10.0, 8000);
        let config = OnsetConfig {
            min_beat_interval_secs: 0.8,
            ..Default::default()
        };
        let analysis = detect_onsets(&sample, &config);

        assert!(!analysis.beats.is_empty());
        for pair in analysis.beats.windows(2) {
            assert!(pair[1].time - pair[0].time >= 0.8);
        }
    }

    #[test]
    fn test_classify_band() {
        assert_eq!(classify_band(80.0), BeatBand::Bass);
        assert_eq!(classify_band(440.0), BeatBand::Mid);
        assert_eq!(classify_band(6000.0), BeatBand::Treble);
    }

    #[test]
    fn test_zero_crossing_frequency() {
        let sr = 8000;
        let tone: Vec<f32> = (0..800)
            .map(|n| (2.0 * PI * 1000.0 * n as f32 / sr as f32 + 0.1).sin())
            .collect();
        let freq = zero_crossing_frequency(&tone, sr);
        assert!((freq - 1000.0).abs() < 50.0, "{}", freq);
    }

    #[test]
    fn test_raised_stop_flag_halts_detection() {
        let sample = bursts_at_120_bpm(5.0, 8000);
        let stop = AtomicBool::new(true);
        assert!(detect_onsets_until(&sample, &OnsetConfig::default(), &stop).is_none());

        stop.store(false, Ordering::Relaxed);
        let analysis = detect_onsets_until(&sample, &OnsetConfig::default(), &stop).unwrap();
        assert!(analysis.detected_count >= 8);
    }

    #[test]
    fn test_stop_flag_raised_on_drop() {
        let stop = Arc::new(AtomicBool::new(false));
        let guard = StopOnDrop(Arc::clone(&stop));
        assert!(!stop.load(Ordering::Relaxed));
        drop(guard);
        assert!(stop.load(Ordering::Relaxed));
    }

    #[tokio::test]
    async fn test_analyze_onsets_on_blocking_pool() {
        let sample = Arc::new(bursts_at_120_bpm(5.0, 8000));
        let analysis = analyze_onsets(sample, OnsetConfig::default()).await.unwrap();
        assert!(analysis.detected_count >= 8);
    }
}
