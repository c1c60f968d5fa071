//! Constellation peak extraction.
//!
//! A cell of the spectrogram is a peak when it equals the maximum of its
//! neighbourhood and is louder than `mean + k * stddev` of its frequency row.

use std::collections::VecDeque;

use ndarray::Axis;
use tracing::debug;

use crate::spectrogram::Spectrogram;
use crate::types::Peak;

/// Extracts sparse local maxima from a spectrogram.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConstellationExtractor {
    /// Neighbourhood width along the time axis, in frames
    pub neighborhood_frames: usize,
    /// Neighbourhood height along the frequency axis, in bins
    pub neighborhood_bins: usize,
    /// Standard deviations above the row mean a peak must reach
    pub threshold_k: f64,
}

impl Default for ConstellationExtractor {
    fn default() -> Self {
        Self {
            neighborhood_frames: 25,
            neighborhood_bins: 80,
            threshold_k: 2.28,
        }
    }
}

impl ConstellationExtractor {
    /// Find all peaks, sorted by (frame, bin).
    pub fn extract(&self, spectrogram: &Spectrogram) -> Vec<Peak> {
        let values = &spectrogram.values;
        let (bins, frames) = values.dim();
        if bins == 0 || frames == 0 {
            return Vec::new();
        }

        let thresholds = self.row_thresholds(spectrogram);
        let local_max = self.maximum_filter(spectrogram);

        let mut peaks = Vec::new();
        for frame in 0..frames {
            for bin in 0..bins {
                let value = values[[bin, frame]];
                if value == local_max[bin * frames + frame] && value > thresholds[bin] {
                    peaks.push(Peak {
                        frame: frame as u32,
                        bin: bin as u32,
                    });
                }
            }
        }

        debug!(peaks = peaks.len(), "Extracted constellation");
        peaks
    }

    /// `mean + k * stddev` per frequency row (population stddev)
    fn row_thresholds(&self, spectrogram: &Spectrogram) -> Vec<f64> {
        let values = &spectrogram.values;
        let std = values.std_axis(Axis(1), 0.0);
        values
            .rows()
            .into_iter()
            .zip(std.iter())
            .map(|(row, &sd)| {
                let mean = row.sum() / row.len() as f64;
                mean + self.threshold_k * sd
            })
            .collect()
    }

    /// Separable max filter, row-major `[bin * frames + frame]`
    fn maximum_filter(&self, spectrogram: &Spectrogram) -> Vec<f64> {
        let values = &spectrogram.values;
        let (bins, frames) = values.dim();
        let mut out = vec![0.0; bins * frames];

        let (before_t, after_t) = extent(self.neighborhood_frames);
        for (bin, row) in values.rows().into_iter().enumerate() {
            let row: Vec<f64> = row.iter().copied().collect();
            sliding_max(
                &row,
                before_t,
                after_t,
                &mut out[bin * frames..(bin + 1) * frames],
            );
        }

        let (before_f, after_f) = extent(self.neighborhood_bins);
        let mut column = vec![0.0; bins];
        let mut filtered = vec![0.0; bins];
        for frame in 0..frames {
            for bin in 0..bins {
                column[bin] = out[bin * frames + frame];
            }
            sliding_max(&column, before_f, after_f, &mut filtered);
            for bin in 0..bins {
                out[bin * frames + frame] = filtered[bin];
            }
        }

        out
    }
}

/// Cells before and after the centre covered by a window of `size`
fn extent(size: usize) -> (usize, usize) {
    let size = size.max(1);
    (size / 2, size - size / 2 - 1)
}

/// Maximum over `[i - before, i + after]`, clamped to the slice.
pub(crate) fn sliding_max(input: &[f64], before: usize, after: usize, out: &mut [f64]) {
    let n = input.len();
    let mut window: VecDeque<usize> = VecDeque::new();
    let mut next = 0;

    for i in 0..n {
        let right = (i + after).min(n - 1);
        while next <= right {
            while window.back().is_some_and(|&j| input[j] <= input[next]) {
                window.pop_back();
            }
            window.push_back(next);
            next += 1;
        }

        let left = i.saturating_sub(before);
        while window.front().is_some_and(|&j| j < left) {
            window.pop_front();
        }

        if let Some(&j) = window.front() {
            out[i] = input[j];
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    fn grid(bins: usize, frames: usize, fill: f64) -> Spectrogram {
        Spectrogram {
            values: Array2::from_elem((bins, frames), fill),
            frequencies: (0..bins).map(|b| b as f64).collect(),
            times: (0..frames).map(|t| t as f64).collect(),
        }
    }

    fn brute_max(input: &[f64], before: usize, after: usize) -> Vec<f64> {
        (0..input.len())
            .map(|i| {
                let lo = i.saturating_sub(before);
                let hi = (i + after).min(input.len() - 1);
                input[lo..=hi].iter().cloned().fold(f64::MIN, f64::max)
            })
            .collect()
    }

    #[test]
    fn test_extent_even_and_odd() {
        assert_eq!(extent(25), (12, 12));
        assert_eq!(extent(80), (40, 39));
        assert_eq!(extent(1), (0, 0));
    }

    #[test]
    fn test_sliding_max_matches_brute_force() {
        let input: Vec<f64> = (0..57).map(|i| ((i * 37) % 23) as f64).collect();
        for &(before, after) in &[(0, 0), (2, 1), (12, 12), (40, 39), (100, 100)] {
            let mut out = vec![0.0; input.len()];
            sliding_max(&input, before, after, &mut out);
            assert_eq!(out, brute_max(&input, before, after));
        }
    }

    #[test]
    fn test_flat_spectrogram_has_no_peaks() {
        let spec = grid(100, 40, -100.0);
        assert!(ConstellationExtractor::default().extract(&spec).is_empty());
    }

    #[test]
    fn test_isolated_spikes_are_peaks() {
        let mut spec = grid(200, 100, -80.0);
        spec.values[[50, 10]] = 0.0;
        spec.values[[150, 70]] = -10.0;
        // Suppressed by the louder cell 20 bins away
        spec.values[[70, 12]] = -5.0;

        let peaks = ConstellationExtractor::default().extract(&spec);
        assert_eq!(
            peaks,
            vec![Peak { frame: 10, bin: 50 }, Peak { frame: 70, bin: 150 }]
        );
    }

    #[test]
    fn test_peaks_sorted_time_major() {
        let mut spec = grid(400, 200, -90.0);
        for (bin, frame) in [(300, 5), (10, 5), (200, 150), (100, 60)] {
            spec.values[[bin, frame]] = -20.0;
        }
        let peaks = ConstellationExtractor::default().extract(&spec);
        let mut sorted = peaks.clone();
        sorted.sort();
        assert_eq!(peaks, sorted);
        assert_eq!(peaks.len(), 4);
    }
}
