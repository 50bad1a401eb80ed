//! Conversions between float samples, PCM16 samples and wire bytes.
//!
//! All functions are stateless. The PCM16 path is exact:
//! `decode(encode(frame))` reproduces the original samples. The float path
//! is lossy by at most one quantization step (1/32768).

use super::{AudioFrame, EncodedChunk, Format};
use crate::error::{Error, Result};

/// Full-scale value used for normalization.
const SCALE: f32 = 32768.0;

/// Converts a normalized float sample to PCM16, clamping out-of-range input.
#[inline]
pub fn f32_to_i16(sample: f32) -> i16 {
    if sample.is_nan() {
        return 0;
    }
    (sample * SCALE).clamp(i16::MIN as f32, i16::MAX as f32) as i16
}

/// Converts a PCM16 sample to a normalized float in `[-1.0, 1.0)`.
#[inline]
pub fn i16_to_f32(sample: i16) -> f32 {
    sample as f32 / SCALE
}

/// Encodes a frame as little-endian PCM16 bytes.
pub fn encode(frame: &AudioFrame) -> EncodedChunk {
    let samples = frame.samples();
    let mut data = Vec::with_capacity(samples.len() * 2);
    for sample in samples {
        data.extend_from_slice(&sample.to_le_bytes());
    }
    EncodedChunk::new(frame.format(), data)
}

/// Decodes PCM16 bytes into a frame of the given format.
///
/// Fails with [`Error::MalformedFrame`] when the byte length is not a
/// multiple of `2 * channels`.
pub fn decode(chunk: &EncodedChunk, format: Format) -> Result<AudioFrame> {
    let data = chunk.data();
    if data.len() % format.frame_bytes() != 0 {
        return Err(Error::MalformedFrame {
            len: data.len(),
            channels: format.channels(),
        });
    }

    let samples = data
        .chunks_exact(2)
        .map(|b| i16::from_le_bytes([b[0], b[1]]))
        .collect();
    Ok(AudioFrame::new(format, samples))
}

impl EncodedChunk {
    /// Decodes the chunk using its own format tag.
    pub fn decode(&self) -> Result<AudioFrame> {
        decode(self, self.format())
    }
}
