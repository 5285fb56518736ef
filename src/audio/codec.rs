//! PCM16 wire codec — `f32` samples ↔ base64-wrapped little-endian `i16`.
//!
//! The agent protocol carries audio inside JSON text frames, so raw PCM is
//! packed as little-endian signed 16-bit integers and base64-encoded.  Both
//! directions are pure functions and invertible up to 16-bit quantization.
//!
//! ## Scaling
//!
//! Negative samples are scaled by 32 768 and non-negative samples by 32 767.
//! The asymmetric factors use the full signed 16-bit range: -1.0 maps to
//! `i16::MIN` and +1.0 maps to `i16::MAX` — a single ±32 767 factor would
//! waste the bottom code, a single ±32 768 factor would overflow at +1.0.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use thiserror::Error;

// ---------------------------------------------------------------------------
// CodecError
// ---------------------------------------------------------------------------

/// Errors that can occur while decoding an inbound audio payload.
#[derive(Debug, Clone, Error)]
pub enum CodecError {
    /// The payload was not valid base64.
    #[error("invalid base64 audio payload: {0}")]
    InvalidBase64(String),

    /// The decoded byte length was odd — PCM16 samples are 2 bytes each.
    #[error("PCM16 payload has odd length ({0} bytes)")]
    OddLength(usize),
}

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

/// Convert one `f32` sample in `[-1.0, 1.0]` to a signed 16-bit value.
///
/// Out-of-range input is clamped first, so the conversion never overflows.
fn sample_to_i16(sample: f32) -> i16 {
    let clamped = sample.clamp(-1.0, 1.0);
    if clamped < 0.0 {
        (clamped * 32_768.0) as i16
    } else {
        (clamped * 32_767.0) as i16
    }
}

/// Convert a signed 16-bit value back to an `f32` sample in `[-1.0, 1.0]`.
fn i16_to_sample(value: i16) -> f32 {
    if value < 0 {
        value as f32 / 32_768.0
    } else {
        value as f32 / 32_767.0
    }
}

/// Encode `samples` as base64-wrapped little-endian PCM16.
///
/// Samples outside `[-1.0, 1.0]` are clamped.  The output is safe to embed
/// in a JSON text frame.
pub fn encode_samples(samples: &[f32]) -> String {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for &sample in samples {
        bytes.extend_from_slice(&sample_to_i16(sample).to_le_bytes());
    }
    BASE64.encode(&bytes)
}

/// Decode a base64-wrapped little-endian PCM16 payload back to `f32`
/// samples in `[-1.0, 1.0]`.
///
/// # Errors
///
/// - [`CodecError::InvalidBase64`] — the payload is not valid base64.
/// - [`CodecError::OddLength`] — the decoded byte count is not a multiple
///   of 2.
pub fn decode_samples(payload: &str) -> Result<Vec<f32>, CodecError> {
    let bytes = BASE64
        .decode(payload)
        .map_err(|e| CodecError::InvalidBase64(e.to_string()))?;

    if bytes.len() % 2 != 0 {
        return Err(CodecError::OddLength(bytes.len()));
    }

    Ok(bytes
        .chunks_exact(2)
        .map(|pair| i16_to_sample(i16::from_le_bytes([pair[0], pair[1]])))
        .collect())
}

// ---------------------------------------------------------------------------
// Duration helper
// ---------------------------------------------------------------------------

/// Playback duration in seconds of `sample_count` mono samples at
/// `sample_rate` Hz.  Returns `0.0` for a zero sample rate.
pub fn duration_secs(sample_count: usize, sample_rate: u32) -> f64 {
    if sample_rate == 0 {
        return 0.0;
    }
    sample_count as f64 / sample_rate as f64
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
