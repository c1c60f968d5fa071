//! Core types for the fingerprinting pipeline.

use serde::{Deserialize, Serialize};

/// Sample rate every clip is fingerprinted at
pub const TARGET_SAMPLE_RATE: u32 = 44_100;

/// Mono PCM audio normalized to [-1.0, 1.0].
#[derive(Debug, Clone, PartialEq)]
pub struct AudioData {
    /// PCM samples normalized to [-1.0, 1.0]
    pub samples: Vec<f32>,
    /// Sample rate in Hz
    pub sample_rate: u32,
}

impl AudioData {
    /// Create new audio data from mono samples.
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    /// Duration in seconds.
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }

    /// Get a slice of samples for a specific time range.
    pub fn slice(&self, start_secs: f64, end_secs: f64) -> &[f32] {
        let start_idx = (start_secs * self.sample_rate as f64) as usize;
        let end_idx = (end_secs * self.sample_rate as f64) as usize;
        let end_idx = end_idx.min(self.samples.len());
        &self.samples[start_idx.min(end_idx)..end_idx]
    }

    /// Get number of samples.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Check if audio data is empty.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// A constellation point: a loud local maximum of the spectrogram.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Peak {
    /// Time-frame index (column). Ordered first so peaks sort time-major.
    pub frame: u32,
    /// Frequency-bin index (row)
    pub bin: u32,
}

/// An (anchor, target) peak pair, anchored at the anchor's frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint {
    pub anchor_bin: u32,
    pub target_bin: u32,
    /// `target.frame - anchor.frame`
    pub delta: u32,
    pub anchor_frame: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audio_duration() {
        let audio = AudioData::new(vec![0.0; 88_200], TARGET_SAMPLE_RATE);
        assert_eq!(audio.duration_secs(), 2.0);
        assert_eq!(audio.slice(0.5, 1.0).len(), 22_050);
        assert!(audio.slice(3.0, 4.0).is_empty());
    }

    #[test]
    fn test_peak_ordering_is_time_major() {
        let mut peaks = vec![
            Peak { frame: 2, bin: 1 },
            Peak { frame: 1, bin: 900 },
            Peak { frame: 1, bin: 3 },
        ];
        peaks.sort();
        assert_eq!(
            peaks,
            vec![
                Peak { frame: 1, bin: 3 },
                Peak { frame: 1, bin: 900 },
                Peak { frame: 2, bin: 1 },
            ]
        );
    }
}
