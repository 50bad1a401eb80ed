//! Immutable blocks of PCM16 samples.

use std::sync::Arc;
use std::time::Duration;

use super::Format;

/// A contiguous block of interleaved PCM16 samples at one pipeline stage.
///
/// Frames are immutable once produced. Cloning shares the sample buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioFrame {
    format: Format,
    samples: Arc<[i16]>,
}

impl AudioFrame {
    /// Creates a frame from interleaved samples.
    ///
    /// A trailing partial sample frame (fewer samples than channels) is
    /// discarded so the buffer always holds whole sample frames.
    pub fn new(format: Format, mut samples: Vec<i16>) -> Self {
        let channels = format.channels() as usize;
        let whole = samples.len() - samples.len() % channels;
        samples.truncate(whole);
        Self {
            format,
            samples: samples.into(),
        }
    }

    /// Creates a frame by copying interleaved samples.
    pub fn from_slice(format: Format, samples: &[i16]) -> Self {
        let channels = format.channels() as usize;
        let whole = samples.len() - samples.len() % channels;
        Self {
            format,
            samples: Arc::from(&samples[..whole]),
        }
    }

    /// Creates a frame from normalized float samples in `[-1.0, 1.0]`.
    pub fn from_f32(format: Format, samples: &[f32]) -> Self {
        let samples = samples.iter().map(|&s| super::codec::f32_to_i16(s)).collect();
        Self::new(format, samples)
    }

    /// Creates a frame of silence lasting `duration`.
    pub fn silence(format: Format, duration: Duration) -> Self {
        let bytes = format.bytes_in_duration(duration) as usize;
        Self::new(format, vec![0; bytes / 2])
    }

    /// Returns the frame format.
    pub fn format(&self) -> Format {
        self.format
    }

    /// Returns the interleaved samples.
    pub fn samples(&self) -> &[i16] {
        &self.samples
    }

    /// Returns the samples as normalized floats.
    pub fn to_f32(&self) -> Vec<f32> {
        self.samples.iter().map(|&s| super::codec::i16_to_f32(s)).collect()
    }

    /// Returns the number of sample frames (samples per channel).
    pub fn frames(&self) -> usize {
        self.samples.len() / self.format.channels() as usize
    }

    /// Returns true if the frame holds no samples.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Returns the playback duration of the frame.
    pub fn duration(&self) -> Duration {
        self.format.frames_duration(self.frames() as u64)
    }
}
