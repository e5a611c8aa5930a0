//! PCM wire codec
//!
//! The realtime endpoint speaks raw little-endian 16-bit PCM wrapped in
//! base64: 16 kHz mono upstream, 24 kHz mono downstream. Both directions
//! are pure sample conversions with no state.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;

use crate::{Error, Result};

/// Sample rate for microphone capture (speech band)
pub const CAPTURE_SAMPLE_RATE: u32 = 16000;

/// Sample rate of synthesized audio from the endpoint
pub const PLAYBACK_SAMPLE_RATE: u32 = 24000;

/// Encode f32 samples in [-1, 1] as base64-wrapped little-endian PCM16.
///
/// NaN samples are sanitized to 0 before scaling; out-of-range values are
/// clamped rather than wrapped.
#[must_use]
pub fn encode_pcm16(samples: &[f32]) -> String {
    let mut bytes = Vec::with_capacity(samples.len() * 2);

    for &sample in samples {
        let sample = if sample.is_nan() { 0.0 } else { sample };
        #[allow(clippy::cast_possible_truncation)]
        let value = (sample * 32768.0).clamp(-32768.0, 32767.0) as i16;
        bytes.extend_from_slice(&value.to_le_bytes());
    }

    BASE64.encode(bytes)
}

/// Decode a base64-wrapped little-endian PCM16 payload back to f32 samples.
///
/// A trailing partial sample (odd byte count) is dropped rather than
/// treated as an error.
///
/// # Errors
///
/// Returns [`Error::Decode`] if the payload is not valid base64.
pub fn decode_pcm16(payload: &str) -> Result<Vec<f32>> {
    let bytes = BASE64
        .decode(payload)
        .map_err(|e| Error::Decode(format!("invalid base64 payload: {e}")))?;

    let samples = bytes
        .chunks_exact(2)
        .map(|pair| f32::from(i16::from_le_bytes([pair[0], pair[1]])) / 32768.0)
        .collect();

    Ok(samples)
}

/// Peak absolute amplitude of a sample block
#[must_use]
pub fn peak_amplitude(samples: &[f32]) -> f32 {
    samples.iter().map(|s| s.abs()).fold(0.0f32, f32::max)
}

/// Write f32 samples to a 16-bit mono WAV file (debug/diagnostic dumps)
///
/// # Errors
///
/// Returns error if WAV encoding or the underlying write fails.
pub fn write_wav(path: &std::path::Path, samples: &[f32], sample_rate: u32) -> Result<()> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut writer =
        hound::WavWriter::create(path, spec).map_err(|e| Error::Audio(e.to_string()))?;

    for &sample in samples {
        #[allow(clippy::cast_possible_truncation)]
        let value = (sample * 32767.0).clamp(-32768.0, 32767.0) as i16;
        writer
            .write_sample(value)
            .map_err(|e| Error::Audio(e.to_string()))?;
    }

    writer.finalize().map_err(|e| Error::Audio(e.to_string()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip_within_quantization_step() {
        let samples = vec![0.0, 0.25, -0.25, 0.9999, -1.0, 0.5];
        let decoded = decode_pcm16(&encode_pcm16(&samples)).unwrap();

        assert_eq!(decoded.len(), samples.len());
        for (original, restored) in samples.iter().zip(&decoded) {
            assert!((original - restored).abs() <= 1.0 / 32768.0);
        }
    }

    #[test]
    fn test_encode_sanitizes_nan_and_clamps() {
        let encoded = encode_pcm16(&[f32::NAN, 2.0, -2.0]);
        let decoded = decode_pcm16(&encoded).unwrap();

        assert_eq!(decoded[0], 0.0);
        assert!((decoded[1] - (32767.0 / 32768.0)).abs() < f32::EPSILON);
        assert!((decoded[2] + 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_decode_drops_trailing_partial_sample() {
        // Three bytes: one full sample plus a dangling byte
        let payload = BASE64.encode([0x00, 0x40, 0x7f]);
        let decoded = decode_pcm16(&payload).unwrap();
        assert_eq!(decoded.len(), 1);
    }

    #[test]
    fn test_decode_rejects_malformed_base64() {
        assert!(matches!(
            decode_pcm16("not valid base64!!!"),
            Err(Error::Decode(_))
        ));
    }

    #[test]
    fn test_peak_amplitude() {
        assert_eq!(peak_amplitude(&[]), 0.0);
        assert!((peak_amplitude(&[0.1, -0.4, 0.2]) - 0.4).abs() < f32::EPSILON);
    }
}
