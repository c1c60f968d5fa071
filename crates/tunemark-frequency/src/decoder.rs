//! Audio file decoding into pipeline-ready PCM.
//!
//! WAV payloads are read with `hound`; everything else goes through
//! `symphonia`. [`prepare`] then brings the result to the form the
//! fingerprinter expects: mono, 44.1 kHz, peak-normalized.

use std::io::Cursor;

use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{debug, info};
use tunemark_core::{Error, Result};

use crate::pcm::{downmix, Sample};
use crate::types::{AudioData, TARGET_SAMPLE_RATE};

/// Peak level after normalization, dBFS
pub const NORMALIZE_HEADROOM_DB: f32 = -0.1;

const RESAMPLE_CHUNK: usize = 1024;

/// Decoded, still interleaved audio
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedAudio {
    pub sample_rate: u32,
    pub channels: usize,
    /// Interleaved samples in [-1.0, 1.0]
    pub samples: Vec<f32>,
}

/// Turns an encoded audio payload into PCM.
pub trait Decoder: Send + Sync {
    fn decode(&self, bytes: &[u8]) -> Result<DecodedAudio>;
}

/// Default decoder: `hound` for RIFF/WAVE, `symphonia` otherwise
#[derive(Debug, Clone, Copy, Default)]
pub struct AudioDecoder;

impl Decoder for AudioDecoder {
    fn decode(&self, bytes: &[u8]) -> Result<DecodedAudio> {
        if bytes.is_empty() {
            return Err(Error::Decode("empty payload".into()));
        }
        let decoded = if is_wav(bytes) {
            decode_wav(bytes)?
        } else {
            decode_symphonia(bytes)?
        };

        if decoded.samples.is_empty() {
            return Err(Error::Decode("no audio samples decoded".into()));
        }
        debug!(
            sample_rate = decoded.sample_rate,
            channels = decoded.channels,
            samples = decoded.samples.len(),
            "Decoded audio"
        );
        Ok(decoded)
    }
}

fn is_wav(bytes: &[u8]) -> bool {
    bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WAVE"
}

fn decode_wav(bytes: &[u8]) -> Result<DecodedAudio> {
    let reader = hound::WavReader::new(Cursor::new(bytes))
        .map_err(|e| Error::Decode(format!("invalid WAV: {}", e)))?;
    let spec = reader.spec();

    let samples = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .into_samples::<f32>()
            .collect::<std::result::Result<Vec<_>, _>>(),
        hound::SampleFormat::Int if spec.bits_per_sample == 16 => reader
            .into_samples::<i16>()
            .map(|s| s.map(Sample::to_f32))
            .collect(),
        hound::SampleFormat::Int => {
            // Left-align narrower integers to full 32-bit scale
            let shift = 32u32.saturating_sub(spec.bits_per_sample as u32);
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v.wrapping_shl(shift).to_f32()))
                .collect()
        }
    }
    .map_err(|e| Error::Decode(format!("corrupt WAV data: {}", e)))?;

    Ok(DecodedAudio {
        sample_rate: spec.sample_rate,
        channels: spec.channels as usize,
        samples,
    })
}

fn decode_symphonia(bytes: &[u8]) -> Result<DecodedAudio> {
    let mss = MediaSourceStream::new(Box::new(Cursor::new(bytes.to_vec())), Default::default());

    let mut probed = symphonia::default::get_probe()
        .format(
            &Hint::new(),
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| Error::Decode(format!("unsupported format: {}", e)))?;

    let track = probed
        .format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| Error::Decode("no audio track".into()))?;

    let track_id = track.id;
    let sample_rate = track
        .codec_params
        .sample_rate
        .ok_or_else(|| Error::Decode("unknown sample rate".into()))?;
    let mut channels = track.codec_params.channels.map(|c| c.count()).unwrap_or(0);

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| Error::Decode(format!("unsupported codec: {}", e)))?;

    let mut samples: Vec<f32> = Vec::new();
    let mut sample_buf: Option<SampleBuffer<f32>> = None;

    loop {
        let packet = match probed.format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(ref e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break
            }
            Err(SymphoniaError::ResetRequired) => {
                decoder.reset();
                continue;
            }
            Err(e) => return Err(Error::Decode(e.to_string())),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(buf) => buf,
            Err(SymphoniaError::DecodeError(_)) => continue,
            Err(e) => return Err(Error::Decode(e.to_string())),
        };

        if sample_buf.is_none() {
            let spec = *decoded.spec();
            channels = spec.channels.count();
            sample_buf = Some(SampleBuffer::new(decoded.capacity() as u64, spec));
        }

        if let Some(ref mut buf) = sample_buf {
            buf.copy_interleaved_ref(decoded);
            samples.extend_from_slice(buf.samples());
        }
    }

    if channels == 0 {
        return Err(Error::Decode("unknown channel layout".into()));
    }

    Ok(DecodedAudio {
        sample_rate,
        channels,
        samples,
    })
}

/// Resample mono audio with a windowed-sinc interpolator.
pub fn resample(input: &[f32], from_rate: u32, to_rate: u32) -> Result<Vec<f32>> {
    if from_rate == 0 || to_rate == 0 {
        return Err(Error::invalid_input("sample rate is zero"));
    }
    if from_rate == to_rate || input.is_empty() {
        return Ok(input.to_vec());
    }

    let ratio = to_rate as f64 / from_rate as f64;
    let params = SincInterpolationParameters {
        sinc_len: 128,
        f_cutoff: 0.95,
        oversampling_factor: 128,
        interpolation: SincInterpolationType::Linear,
        window: WindowFunction::BlackmanHarris2,
    };
    let mut resampler = SincFixedIn::<f32>::new(ratio, 1.0, params, RESAMPLE_CHUNK, 1)
        .map_err(|e| Error::Internal(format!("resampler setup failed: {}", e)))?;

    let expected = (input.len() as f64 * ratio).ceil() as usize;
    let delay = resampler.output_delay();
    let mut output = Vec::with_capacity(delay + expected + RESAMPLE_CHUNK);
    let mut chunks = input.chunks(RESAMPLE_CHUNK);
    let mut block = vec![0.0f32; RESAMPLE_CHUNK];

    // Keep feeding silence after the input ends until the delayed tail is out
    while output.len() < delay + expected {
        block.fill(0.0);
        if let Some(chunk) = chunks.next() {
            block[..chunk.len()].copy_from_slice(chunk);
        }
        let resampled = resampler
            .process(std::slice::from_ref(&block), None)
            .map_err(|e| Error::Internal(format!("resampling failed: {}", e)))?;
        output.extend_from_slice(&resampled[0]);
    }

    output.drain(..delay);
    output.truncate(expected);
    Ok(output)
}

/// Scale so the loudest sample sits at `headroom_db` dBFS. Silence is left alone.
pub fn normalize_peak(samples: &mut [f32], headroom_db: f32) {
    let peak = samples.iter().fold(0.0f32, |m, s| m.max(s.abs()));
    if peak <= f32::EPSILON {
        return;
    }
    let gain = 10f32.powf(headroom_db / 20.0) / peak;
    for s in samples.iter_mut() {
        *s *= gain;
    }
}

/// Down-mix, resample to 44.1 kHz and normalize.
pub fn prepare(decoded: DecodedAudio) -> Result<AudioData> {
    let mono = downmix(&decoded.samples, decoded.channels)?;
    let mut samples = resample(&mono, decoded.sample_rate, TARGET_SAMPLE_RATE)?;
    normalize_peak(&mut samples, NORMALIZE_HEADROOM_DB);

    let audio = AudioData::new(samples, TARGET_SAMPLE_RATE);
    info!(
        source_rate = decoded.sample_rate,
        channels = decoded.channels,
        duration_secs = audio.duration_secs(),
        "Prepared clip"
    );
    Ok(audio)
}

/// Decode and prepare a file payload in one step.
pub fn load_clip(decoder: &dyn Decoder, bytes: &[u8]) -> Result<AudioData> {
    prepare(decoder.decode(bytes)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wav_bytes(samples: &[i16], channels: u16, sample_rate: u32) -> Vec<u8> {
        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
            for &s in samples {
                writer.write_sample(s).unwrap();
            }
            writer.finalize().unwrap();
        }
        cursor.into_inner()
    }

    #[test]
    fn test_decode_wav_stereo() {
        let bytes = wav_bytes(&[16_384, 0, -16_384, -16_384], 2, 44_100);
        let decoded = AudioDecoder.decode(&bytes).unwrap();
        assert_eq!(decoded.channels, 2);
        assert_eq!(decoded.sample_rate, 44_100);
        assert_eq!(decoded.samples, vec![0.5, 0.0, -0.5, -0.5]);
    }

    #[test]
    fn test_garbage_is_decode_error() {
        let err = AudioDecoder.decode(b"definitely not audio").unwrap_err();
        assert!(matches!(err, Error::Decode(_)));
        assert!(matches!(AudioDecoder.decode(&[]), Err(Error::Decode(_))));
    }

    #[test]
    fn test_normalize_peak() {
        let mut samples = vec![0.25, -0.5, 0.1];
        normalize_peak(&mut samples, NORMALIZE_HEADROOM_DB);
        let target = 10f32.powf(-0.1 / 20.0);
        assert!((samples[1] + target).abs() < 1e-6);
        assert!((samples[0] - target / 2.0).abs() < 1e-6);

        let mut silence = vec![0.0; 4];
        normalize_peak(&mut silence, NORMALIZE_HEADROOM_DB);
        assert_eq!(silence, vec![0.0; 4]);
    }

    #[test]
    fn test_resample_length() {
        let input = vec![0.1f32; 22_050];
        let output = resample(&input, 22_050, 44_100).unwrap();
        assert_eq!(output.len(), 44_100);
        assert_eq!(resample(&input, 44_100, 44_100).unwrap().len(), 22_050);
    }

    #[test]
    fn test_resample_is_time_aligned() {
        let tone = |rate: u32, len: usize| -> Vec<f32> {
            let step = 2.0 * std::f64::consts::PI * 200.0 / rate as f64;
            (0..len).map(|i| (0.5 * (step * i as f64).sin()) as f32).collect()
        };
        let output = resample(&tone(22_050, 22_050), 22_050, 44_100).unwrap();
        let reference = tone(44_100, 44_100);

        assert_eq!(output.len(), reference.len());
        for i in 2_000..42_000 {
            assert!(
                (output[i] - reference[i]).abs() < 0.02,
                "sample {} is {} not {}",
                i,
                output[i],
                reference[i]
            );
        }
        // The end of the clip survives
        assert!(output[43_000..].iter().any(|s| s.abs() > 0.1));
    }

    #[test]
    fn test_prepare_wav_to_mono_44k() {
        let frames: Vec<i16> = (0..8_000)
            .flat_map(|i| {
                let v = ((i as f32 * 0.05).sin() * 8_000.0) as i16;
                [v, v]
            })
            .collect();
        let bytes = wav_bytes(&frames, 2, 8_000);

        let audio = load_clip(&AudioDecoder, &bytes).unwrap();
        assert_eq!(audio.sample_rate, TARGET_SAMPLE_RATE);
        assert_eq!(audio.len(), 44_100);
        let peak = audio.samples.iter().fold(0.0f32, |m, s| m.max(s.abs()));
        assert!((peak - 10f32.powf(-0.1 / 20.0)).abs() < 1e-4);
    }
}
