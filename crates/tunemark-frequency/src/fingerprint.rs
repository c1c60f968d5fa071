//! Landmark fingerprinting.
//!
//! # Algorithm Overview
//!
//! 1. Compute the log-power spectrogram of the clip
//! 2. Keep loud local maxima as a constellation of peaks
//! 3. Pair every peak with the next few peaks that follow it closely in time
//! 4. Pack each pair into a 32-bit hash anchored at the first peak's frame
//!
//! Matching a recording against the catalog then reduces to counting hashes
//! that agree on a single time offset.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use tunemark_core::{Error, Result};

use crate::constellation::ConstellationExtractor;
use crate::hash::HashTable;
use crate::spectrogram::SpectrogramBuilder;
use crate::types::*;

/// Identifies the parameter set below. Tables built with different
/// versions are not comparable.
pub const FINGERPRINT_VERSION: u32 = 1;

/// Fingerprinting configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FingerprintConfig {
    /// STFT window size, samples
    pub window_size: usize,
    /// Hop between frames, samples
    pub hop_size: usize,
    /// Peak neighbourhood along time, frames
    pub neighborhood_frames: usize,
    /// Peak neighbourhood along frequency, bins
    pub neighborhood_bins: usize,
    /// Row threshold is `mean + threshold_k * stddev`
    pub threshold_k: f64,
    /// Maximum targets paired with one anchor
    pub fan_out: usize,
    /// Largest anchor-to-target distance, frames
    pub max_delta: u32,
}

impl Default for FingerprintConfig {
    fn default() -> Self {
        Self {
            window_size: 4096,
            hop_size: 2048,
            neighborhood_frames: 25,
            neighborhood_bins: 80,
            threshold_k: 2.28,
            fan_out: 20,
            max_delta: 200,
        }
    }
}

impl FingerprintConfig {
    pub fn validate(&self) -> Result<()> {
        if self.window_size < 2 {
            return Err(Error::InvalidConfig("window_size must be at least 2".into()));
        }
        if self.hop_size == 0 {
            return Err(Error::InvalidConfig("hop_size must be positive".into()));
        }
        if self.neighborhood_frames == 0 || self.neighborhood_bins == 0 {
            return Err(Error::InvalidConfig("neighbourhood must be non-empty".into()));
        }
        if !self.threshold_k.is_finite() {
            return Err(Error::InvalidConfig("threshold_k must be finite".into()));
        }
        if self.fan_out == 0 {
            return Err(Error::InvalidConfig("fan_out must be positive".into()));
        }
        Ok(())
    }
}

/// Pair each peak with up to `fan_out` following peaks at most `max_delta`
/// frames later.
///
/// `peaks` should be sorted by frame. Targets earlier than their anchor are
/// skipped.
pub fn generate_fingerprints(peaks: &[Peak], fan_out: usize, max_delta: u32) -> Vec<Fingerprint> {
    let mut fingerprints = Vec::new();

    for (i, anchor) in peaks.iter().enumerate() {
        for target in peaks.iter().skip(i + 1).take(fan_out) {
            let Some(delta) = target.frame.checked_sub(anchor.frame) else {
                continue;
            };
            if delta > max_delta {
                break;
            }
            fingerprints.push(Fingerprint {
                anchor_bin: anchor.bin,
                target_bin: target.bin,
                delta,
                anchor_frame: anchor.frame,
            });
        }
    }

    fingerprints
}

/// Intermediate results of one pipeline run.
#[derive(Debug, Clone)]
pub struct ClipAnalysis {
    pub bins: usize,
    pub frames: usize,
    pub peaks: Vec<Peak>,
    pub fingerprint_count: usize,
    pub table: HashTable,
}

/// Audio fingerprinter: spectrogram, constellation, pairing and hashing.
#[derive(Debug, Clone)]
pub struct Fingerprinter {
    config: FingerprintConfig,
    spectrogram: SpectrogramBuilder,
    constellation: ConstellationExtractor,
}

impl Fingerprinter {
    /// Create a new fingerprinter with default configuration.
    pub fn new() -> Result<Self> {
        Self::with_config(FingerprintConfig::default())
    }

    /// Create a fingerprinter with custom configuration.
    pub fn with_config(config: FingerprintConfig) -> Result<Self> {
        config.validate()?;
        let spectrogram = SpectrogramBuilder::new(config.window_size, config.hop_size)?;
        let constellation = ConstellationExtractor {
            neighborhood_frames: config.neighborhood_frames,
            neighborhood_bins: config.neighborhood_bins,
            threshold_k: config.threshold_k,
        };

        Ok(Self {
            config,
            spectrogram,
            constellation,
        })
    }

    pub fn config(&self) -> &FingerprintConfig {
        &self.config
    }

    /// Run the whole pipeline and keep the intermediate counts.
    pub fn analyze(&self, audio: &AudioData) -> Result<ClipAnalysis> {
        info!(
            samples = audio.len(),
            sample_rate = audio.sample_rate,
            "Fingerprinting clip"
        );

        let spectrogram = self.spectrogram.build(&audio.samples, audio.sample_rate)?;
        let peaks = self.constellation.extract(&spectrogram);
        let fingerprints =
            generate_fingerprints(&peaks, self.config.fan_out, self.config.max_delta);
        debug!(fingerprints = fingerprints.len(), "Paired peaks");

        let table = HashTable::from_fingerprints(&fingerprints);
        debug!(
            hashes = table.len(),
            offsets = table.total_offsets(),
            "Built hash table"
        );

        Ok(ClipAnalysis {
            bins: spectrogram.bins(),
            frames: spectrogram.frames(),
            peaks,
            fingerprint_count: fingerprints.len(),
            table,
        })
    }

    /// Generate the hash table for a clip.
    pub fn fingerprint(&self, audio: &AudioData) -> Result<HashTable> {
        Ok(self.analyze(audio)?.table)
    }
}

/// Run [`Fingerprinter::analyze`] on the blocking thread pool.
pub async fn analyze_blocking(
    fingerprinter: Arc<Fingerprinter>,
    audio: AudioData,
) -> Result<ClipAnalysis> {
    tokio::task::spawn_blocking(move || fingerprinter.analyze(&audio))
        .await
        .map_err(|e| Error::Internal(format!("fingerprint task failed: {}", e)))?
}
