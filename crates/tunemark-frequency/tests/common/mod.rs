//! Synthetic audio shared by the integration tests.
#![allow(dead_code)]

use std::f64::consts::PI;

use tunemark_frequency::AudioData;

pub const SAMPLE_RATE: u32 = 44_100;
pub const WINDOW: usize = 4096;
pub const HOP: usize = 2048;

const NOTE_SECS: f64 = 0.3;
const RAMP_SECS: f64 = 0.02;

/// Deterministic linear congruential generator
pub struct Lcg(u64);

impl Lcg {
    pub fn new(seed: u64) -> Self {
        Self(seed)
    }

    pub fn next_u32(&mut self) -> u32 {
        self.0 = self
            .0
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1_442_695_040_888_963_407);
        (self.0 >> 33) as u32
    }

    /// Uniform in [-1, 1)
    pub fn next_signed(&mut self) -> f64 {
        self.next_u32() as f64 / (1u64 << 30) as f64 - 1.0
    }
}

/// Frequency at the centre of STFT bin `bin`
pub fn bin_hz(bin: u32) -> f64 {
    bin as f64 * SAMPLE_RATE as f64 / WINDOW as f64
}

/// Expected bin of a pure tone
pub fn expected_bin(freq: f64) -> u32 {
    (freq * WINDOW as f64 / SAMPLE_RATE as f64).round() as u32
}

/// A sequence of 0.3 s notes with one harmonic over quiet noise.
///
/// Prefix-stable: the first `n` seconds do not depend on `duration_secs`.
pub fn melody(seed: u64, duration_secs: f64) -> Vec<f32> {
    let total = (duration_secs * SAMPLE_RATE as f64) as usize;
    let note_len = (NOTE_SECS * SAMPLE_RATE as f64) as usize;
    let ramp = (RAMP_SECS * SAMPLE_RATE as f64) as usize;

    let mut notes = Lcg::new(seed);
    let mut noise = Lcg::new(seed ^ 0x9E37_79B9_7F4A_7C15);
    let mut samples = Vec::with_capacity(total);

    let mut start = 0;
    while start < total {
        let bin = 40 + notes.next_u32() % 420;
        let fundamental = bin_hz(bin);
        let harmonic = bin_hz(bin * 2);

        for n in 0..note_len.min(total - start) {
            let t = n as f64 / SAMPLE_RATE as f64;
            let envelope = if n < ramp {
                0.5 - 0.5 * (PI * n as f64 / ramp as f64).cos()
            } else if n >= note_len - ramp {
                0.5 - 0.5 * (PI * (note_len - n) as f64 / ramp as f64).cos()
            } else {
                1.0
            };
            let tone = 0.5 * (2.0 * PI * fundamental * t).sin()
                + 0.2 * (2.0 * PI * harmonic * t).sin();
            samples.push((envelope * tone + 0.003 * noise.next_signed()) as f32);
        }
        start += note_len;
    }

    samples
}

/// Gain change, 16-bit requantization and a little extra noise
pub fn reencode(samples: &[f32], seed: u64) -> Vec<f32> {
    let mut noise = Lcg::new(seed);
    samples
        .iter()
        .map(|&s| {
            let altered = 0.8 * s as f64 + 0.0003 * noise.next_signed();
            let quantized = (altered * 32_767.0).round().clamp(-32_768.0, 32_767.0) as i16;
            quantized as f32 / 32_768.0
        })
        .collect()
}

/// Silence with a half-second, Hann-enveloped burst of two tones in the middle
pub fn two_tones(freq_a: f64, freq_b: f64, duration_secs: f64) -> Vec<f32> {
    let total = (duration_secs * SAMPLE_RATE as f64) as usize;
    let burst_len = SAMPLE_RATE as usize / 2;
    let burst_start = total.saturating_sub(burst_len) / 2;

    (0..total)
        .map(|i| {
            if i < burst_start || i >= burst_start + burst_len {
                return 0.0;
            }
            let n = (i - burst_start) as f64;
            let envelope = 0.5 - 0.5 * (2.0 * PI * n / burst_len as f64).cos();
            let t = i as f64 / SAMPLE_RATE as f64;
            let tone = 0.4 * (2.0 * PI * freq_a * t).sin() + 0.4 * (2.0 * PI * freq_b * t).sin();
            (envelope * tone) as f32
        })
        .collect()
}

pub fn audio(samples: Vec<f32>) -> AudioData {
    AudioData::new(samples, SAMPLE_RATE)
}

/// Little-endian 16-bit PCM, as a stream source would deliver it
pub fn to_s16le(samples: &[f32]) -> Vec<u8> {
    samples
        .iter()
        .flat_map(|&s| {
            let v = (s as f64 * 32_767.0).round().clamp(-32_768.0, 32_767.0) as i16;
            v.to_le_bytes()
        })
        .collect()
}
