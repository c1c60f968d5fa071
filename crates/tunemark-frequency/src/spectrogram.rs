//! Short-time Fourier transform into a log-power spectrogram.
//!
//! Each frame is mean-removed, Hann-windowed and scaled as a one-sided power
//! spectral density before conversion to decibels.

use std::f64::consts::PI;
use std::fmt;
use std::sync::Arc;

use ndarray::Array2;
use num_complex::Complex;
use realfft::{RealFftPlanner, RealToComplex};
use tracing::debug;
use tunemark_core::{Error, Result};

/// Floor added to the power before taking the logarithm
pub const POWER_FLOOR: f64 = 1e-10;

/// Log-power grid indexed `[bin, frame]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Spectrogram {
    /// `10 * log10(power + 1e-10)`, shape (bins, frames)
    pub values: Array2<f64>,
    /// Centre frequency of each bin, Hz
    pub frequencies: Vec<f64>,
    /// Centre time of each frame, seconds
    pub times: Vec<f64>,
}

impl Spectrogram {
    pub fn bins(&self) -> usize {
        self.values.nrows()
    }

    pub fn frames(&self) -> usize {
        self.values.ncols()
    }
}

/// Periodic Hann window of length `n`
pub fn hann_periodic(n: usize) -> Vec<f64> {
    (0..n)
        .map(|i| 0.5 - 0.5 * (2.0 * PI * i as f64 / n as f64).cos())
        .collect()
}

/// STFT planner holding the window and a shared FFT plan.
#[derive(Clone)]
pub struct SpectrogramBuilder {
    window_size: usize,
    hop_size: usize,
    window: Vec<f64>,
    window_power: f64,
    fft: Arc<dyn RealToComplex<f64>>,
}

impl fmt::Debug for SpectrogramBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpectrogramBuilder")
            .field("window_size", &self.window_size)
            .field("hop_size", &self.hop_size)
            .finish()
    }
}

impl SpectrogramBuilder {
    /// Plan an STFT with the given window and hop, in samples.
    pub fn new(window_size: usize, hop_size: usize) -> Result<Self> {
        if window_size < 2 {
            return Err(Error::InvalidConfig(format!(
                "window size {} is too small",
                window_size
            )));
        }
        if hop_size == 0 {
            return Err(Error::InvalidConfig("hop size must be positive".into()));
        }

        let window = hann_periodic(window_size);
        let window_power = window.iter().map(|w| w * w).sum();
        let fft = RealFftPlanner::<f64>::new().plan_fft_forward(window_size);

        Ok(Self {
            window_size,
            hop_size,
            window,
            window_power,
            fft,
        })
    }

    /// Number of frequency rows produced
    pub fn bins(&self) -> usize {
        self.window_size / 2 + 1
    }

    /// Number of frames for a clip of `len` samples
    pub fn frame_count(&self, len: usize) -> usize {
        match len {
            0 => 0,
            len if len < self.window_size => 1,
            len => 1 + (len - self.window_size) / self.hop_size,
        }
    }

    /// Compute the log-power spectrogram of mono samples.
    pub fn build(&self, samples: &[f32], sample_rate: u32) -> Result<Spectrogram> {
        if samples.is_empty() {
            return Err(Error::invalid_input("no samples"));
        }
        if sample_rate == 0 {
            return Err(Error::invalid_input("sample rate is zero"));
        }

        let fs = sample_rate as f64;
        let bins = self.bins();
        let frames = self.frame_count(samples.len());
        let scale = 1.0 / (fs * self.window_power);
        let nyquist = (self.window_size % 2 == 0).then_some(bins - 1);

        let mut values = Array2::<f64>::zeros((bins, frames));
        let mut segment = self.fft.make_input_vec();
        let mut spectrum = self.fft.make_output_vec();
        let mut scratch = self.fft.make_scratch_vec();

        for frame in 0..frames {
            let start = frame * self.hop_size;
            let end = (start + self.window_size).min(samples.len());

            segment.fill(0.0);
            for (dst, &src) in segment.iter_mut().zip(&samples[start..end]) {
                *dst = src as f64;
            }

            let mean = segment.iter().sum::<f64>() / self.window_size as f64;
            for (x, w) in segment.iter_mut().zip(&self.window) {
                *x = (*x - mean) * w;
            }

            self.fft
                .process_with_scratch(&mut segment, &mut spectrum, &mut scratch)
                .map_err(|e| Error::Internal(format!("FFT failed: {}", e)))?;

            for (bin, value) in spectrum.iter().enumerate() {
                let one_sided = if bin == 0 || Some(bin) == nyquist { 1.0 } else { 2.0 };
                let power = power_density(value, scale) * one_sided;
                values[[bin, frame]] = 10.0 * (power + POWER_FLOOR).log10();
            }
        }

        let frequencies = (0..bins)
            .map(|k| k as f64 * fs / self.window_size as f64)
            .collect();
        let times = (0..frames)
            .map(|i| (self.window_size as f64 / 2.0 + (i * self.hop_size) as f64) / fs)
            .collect();

        debug!(bins, frames, "Computed spectrogram");

        Ok(Spectrogram {
            values,
            frequencies,
            times,
        })
    }
}

fn power_density(value: &Complex<f64>, scale: f64) -> f64 {
    value.norm_sqr() * scale
}
