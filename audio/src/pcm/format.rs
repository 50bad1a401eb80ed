//! PCM16 audio format descriptor.

use std::fmt;
use std::time::Duration;

/// Describes a signed 16-bit little-endian PCM stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Format {
    sample_rate: u32,
    // Always at least 1.
    channels: u16,
}

impl Format {
    /// Creates a mono format with the given sample rate.
    pub const fn mono(sample_rate: u32) -> Self {
        Self { sample_rate, channels: 1 }
    }

    /// Creates a format with the given sample rate and channel count.
    ///
    /// A channel count of zero is raised to one.
    pub const fn new(sample_rate: u32, channels: u16) -> Self {
        let channels = if channels == 0 { 1 } else { channels };
        Self { sample_rate, channels }
    }

    /// Returns the sample rate in Hz.
    pub const fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Returns the number of channels.
    pub const fn channels(&self) -> u16 {
        self.channels
    }

    /// Returns the number of bytes in one sample frame (all channels).
    pub fn frame_bytes(&self) -> usize {
        2 * self.channels as usize
    }

    /// Returns the byte rate of the stream.
    pub fn bytes_rate(&self) -> u64 {
        self.sample_rate as u64 * self.frame_bytes() as u64
    }

    /// Returns the number of bytes needed for the given duration,
    /// rounded down to a whole sample frame.
    pub fn bytes_in_duration(&self, duration: Duration) -> u64 {
        let frames = self.sample_rate as u128 * duration.as_nanos() / 1_000_000_000;
        frames as u64 * self.frame_bytes() as u64
    }

    /// Returns the playback duration of `frames` sample frames.
    pub fn frames_duration(&self, frames: u64) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        let nanos = frames as u128 * 1_000_000_000 / self.sample_rate as u128;
        Duration::from_nanos(nanos as u64)
    }

    /// Returns the playback duration of `bytes` bytes of PCM data.
    pub fn duration(&self, bytes: u64) -> Duration {
        self.frames_duration(bytes / self.frame_bytes() as u64)
    }

    /// Returns the mime type used on the wire, e.g. `audio/pcm;rate=16000`.
    pub fn mime_type(&self) -> String {
        if self.channels == 1 {
            format!("audio/pcm;rate={}", self.sample_rate)
        } else {
            format!("audio/pcm;rate={};channels={}", self.sample_rate, self.channels)
        }
    }

    /// Parses a mime type such as `audio/pcm;rate=24000`.
    ///
    /// Returns `None` for non-PCM types. Missing parameters fall back to
    /// the values in `fallback`.
    pub fn from_mime(mime: &str, fallback: Format) -> Option<Format> {
        let mut parts = mime.split(';').map(str::trim);
        let base = parts.next()?;
        if !base.eq_ignore_ascii_case("audio/pcm") && !base.eq_ignore_ascii_case("audio/l16") {
            return None;
        }

        let mut format = fallback;
        for param in parts {
            let Some((key, value)) = param.split_once('=') else {
                continue;
            };
            match key.trim().to_ascii_lowercase().as_str() {
                "rate" => format.sample_rate = value.trim().parse().ok()?,
                "channels" => format.channels = value.trim().parse().ok().filter(|c| *c > 0)?,
                _ => {}
            }
        }
        Some(format)
    }
}

impl fmt::Display for Format {
    /// Formats as the chunk tag, e.g. `pcm16@16000` or `pcm16@48000x2`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.channels == 1 {
            write!(f, "pcm16@{}", self.sample_rate)
        } else {
            write!(f, "pcm16@{}x{}", self.sample_rate, self.channels)
        }
    }
}

// Direction presets
impl Format {
    /// Microphone audio sent to the remote endpoint.
    pub const MONO_16K: Format = Format::mono(16000);
    /// Synthesized speech received from the remote endpoint.
    pub const MONO_24K: Format = Format::mono(24000);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_properties() {
        let format = Format::MONO_16K;
        assert_eq!(format.sample_rate(), 16000);
        assert_eq!(format.channels(), 1);
        assert_eq!(format.frame_bytes(), 2);
        assert_eq!(format.bytes_rate(), 32000);
    }

    #[test]
    fn test_zero_channels_is_mono() {
        let format = Format::new(8000, 0);
        assert_eq!(format.channels(), 1);
        assert_eq!(format.frame_bytes(), 2);
        assert_eq!(format.duration(16000), Duration::from_secs(1));
    }

    #[test]
    fn test_bytes_in_duration() {
        let format = Format::MONO_16K;
        assert_eq!(format.bytes_in_duration(Duration::from_secs(1)), 32000);
        assert_eq!(format.bytes_in_duration(Duration::from_millis(100)), 3200);
    }

    #[test]
    fn test_duration() {
        let format = Format::MONO_24K;
        assert_eq!(format.duration(48000), Duration::from_secs(1));
        assert_eq!(format.duration(9600), Duration::from_millis(200));
        assert_eq!(format.frames_duration(3600), Duration::from_millis(150));
    }

    #[test]
    fn test_mime_type() {
        assert_eq!(Format::MONO_16K.mime_type(), "audio/pcm;rate=16000");
        assert_eq!(Format::new(48000, 2).mime_type(), "audio/pcm;rate=48000;channels=2");
    }

    #[test]
    fn test_from_mime() {
        let f = Format::from_mime("audio/pcm;rate=24000", Format::MONO_16K).unwrap();
        assert_eq!(f, Format::MONO_24K);

        let f = Format::from_mime("audio/pcm", Format::MONO_24K).unwrap();
        assert_eq!(f, Format::MONO_24K);

        let f = Format::from_mime("audio/pcm; rate=48000; channels=2", Format::MONO_24K).unwrap();
        assert_eq!(f, Format::new(48000, 2));

        assert!(Format::from_mime("audio/opus", Format::MONO_24K).is_none());
        assert!(Format::from_mime("audio/pcm;rate=abc", Format::MONO_24K).is_none());
    }

    #[test]
    fn test_display_tag() {
        assert_eq!(Format::MONO_16K.to_string(), "pcm16@16000");
        assert_eq!(Format::new(48000, 2).to_string(), "pcm16@48000x2");
    }
}
