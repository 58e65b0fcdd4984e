//! Decoded audio and onset analysis.
//!
//! This module handles:
//! 1. Decoding an audio source to per-channel f32 PCM
//! 2. Windowed RMS onset detection over the decoded samples

mod decode;
pub mod onset;

pub use decode::{decode_audio, pcm_format_for};
pub use onset::{analyze_onsets, classify_band, detect_onsets, detect_onsets_until, OnsetAnalysis, OnsetConfig, DEFAULT_TEMPO_BPM};

use crate::backend::PcmFormat;

/// Decoded PCM, one `Vec<f32>` per channel. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioSample {
    pub sample_rate: u32,
    pub channels: Vec<Vec<f32>>,
}

impl AudioSample {
    pub fn new(sample_rate: u32, channels: Vec<Vec<f32>>) -> Self {
        Self {
            sample_rate,
            channels,
        }
    }

    /// Mono sample from a single channel.
    pub fn mono(sample_rate: u32, samples: Vec<f32>) -> Self {
        Self::new(sample_rate, vec![samples])
    }

    /// Split an interleaved buffer into channels. A trailing partial frame is
    /// dropped.
    pub fn from_interleaved(samples: &[f32], format: PcmFormat) -> Self {
        let channel_count = format.channels.max(1) as usize;
        let frames = samples.len() / channel_count;
        let mut channels = vec![Vec::with_capacity(frames); channel_count];

        for frame in samples.chunks_exact(channel_count) {
            for (channel, sample) in channels.iter_mut().zip(frame) {
                channel.push(*sample);
            }
        }

        Self::new(format.sample_rate, channels)
    }

    /// Interleave channels back into one buffer.
    pub fn to_interleaved(&self) -> Vec<f32> {
        let frames = self.frames();
        let mut out = Vec::with_capacity(frames * self.channels.len());
        for i in 0..frames {
            for channel in &self.channels {
                out.push(channel[i]);
            }
        }
        out
    }

    /// Little-endian bytes of the interleaved buffer.
    pub fn to_f32le_bytes(&self) -> Vec<u8> {
        self.to_interleaved()
            .into_iter()
            .flat_map(f32::to_le_bytes)
            .collect()
    }

    pub fn format(&self) -> PcmFormat {
        PcmFormat::new(self.sample_rate, self.channels.len() as u32)
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Samples per channel (shortest channel wins).
    pub fn frames(&self) -> usize {
        self.channels.iter().map(Vec::len).min().unwrap_or(0)
    }

    pub fn duration(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames() as f64 / self.sample_rate as f64
    }

    pub fn is_empty(&self) -> bool {
        self.frames() == 0
    }

    pub fn channel(&self, index: usize) -> Option<&[f32]> {
        self.channels.get(index).map(Vec::as_slice)
    }
}
