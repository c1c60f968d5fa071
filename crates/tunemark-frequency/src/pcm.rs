//! PCM normalization and down-mixing.

use tunemark_core::{Error, Result};

use crate::types::AudioData;

/// A PCM sample format accepted by the pipeline.
pub trait Sample: Copy {
    /// Scale to [-1.0, 1.0] by dividing by full scale.
    fn to_f32(self) -> f32;
}

impl Sample for i16 {
    fn to_f32(self) -> f32 {
        self as f32 / 32_768.0
    }
}

impl Sample for i32 {
    fn to_f32(self) -> f32 {
        (self as f64 / 2_147_483_648.0) as f32
    }
}

impl Sample for f32 {
    fn to_f32(self) -> f32 {
        self
    }
}

/// Average interleaved channels into one.
pub fn downmix<S: Sample>(interleaved: &[S], channels: usize) -> Result<Vec<f32>> {
    if channels == 0 {
        return Err(Error::invalid_input("channel count is zero"));
    }
    if interleaved.len() % channels != 0 {
        return Err(Error::invalid_input(format!(
            "{} samples is not a whole number of {}-channel frames",
            interleaved.len(),
            channels
        )));
    }

    if channels == 1 {
        return Ok(interleaved.iter().map(|s| s.to_f32()).collect());
    }

    Ok(interleaved
        .chunks_exact(channels)
        .map(|frame| frame.iter().map(|s| s.to_f32()).sum::<f32>() / channels as f32)
        .collect())
}

/// Decode little-endian 16-bit PCM. A trailing odd byte is ignored.
pub fn i16_from_le_bytes(bytes: &[u8]) -> Vec<i16> {
    bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect()
}

impl AudioData {
    /// Build mono audio from interleaved PCM of any supported format.
    pub fn from_interleaved<S: Sample>(
        interleaved: &[S],
        channels: usize,
        sample_rate: u32,
    ) -> Result<Self> {
        if sample_rate == 0 {
            return Err(Error::invalid_input("sample rate is zero"));
        }
        if interleaved.is_empty() {
            return Err(Error::invalid_input("no samples"));
        }
        Ok(Self::new(downmix(interleaved, channels)?, sample_rate))
    }

    /// Build mono audio from raw s16le bytes.
    pub fn from_s16le(bytes: &[u8], sample_rate: u32) -> Result<Self> {
        Self::from_interleaved(&i16_from_le_bytes(bytes), 1, sample_rate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integer_full_scale() {
        assert_eq!(i16::MIN.to_f32(), -1.0);
        assert_eq!(16_384i16.to_f32(), 0.5);
        assert_eq!(i32::MIN.to_f32(), -1.0);
        assert_eq!(0.25f32.to_f32(), 0.25);
    }

    #[test]
    fn test_downmix_averages_channels() {
        let stereo = [16_384i16, 0, -16_384, -16_384];
        assert_eq!(downmix(&stereo, 2).unwrap(), vec![0.25, -0.5]);
    }

    #[test]
    fn test_downmix_rejects_ragged_frames() {
        assert!(downmix(&[0i16; 3], 2).is_err());
        assert!(downmix(&[0i16; 4], 0).is_err());
    }

    #[test]
    fn test_from_interleaved_validation() {
        assert!(AudioData::from_interleaved::<f32>(&[], 1, 44_100).is_err());
        assert!(AudioData::from_interleaved(&[0.0f32], 1, 0).is_err());
    }

    #[test]
    fn test_s16le_bytes() {
        let bytes = [0x00, 0x40, 0x00, 0xC0, 0x7F];
        assert_eq!(i16_from_le_bytes(&bytes), vec![16_384, -16_384]);
        let audio = AudioData::from_s16le(&bytes, 44_100).unwrap();
        assert_eq!(audio.samples, vec![0.5, -0.5]);
    }
}
