//! Error types for audio operations.

use thiserror::Error;

use crate::pcm::Format;

/// Result type for audio operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while capturing, coding or scheduling audio.
#[derive(Error, Debug)]
pub enum Error {
    /// The microphone or output device cannot be acquired.
    #[error("device unavailable: {0}")]
    DeviceUnavailable(String),

    /// Byte length does not fit the expected sample/channel layout.
    #[error("malformed frame: {len} bytes does not fit {channels} channel(s) of 16-bit samples")]
    MalformedFrame { len: usize, channels: u16 },

    /// An inbound chunk is tagged with a format the output is not running at.
    #[error("format mismatch: chunk is {actual}, output is {expected}")]
    FormatMismatch { expected: Format, actual: Format },

    /// Transport text encoding could not be decoded.
    #[error("base64 error: {0}")]
    Base64(#[from] base64::DecodeError),

    /// A pipeline parameter is out of range.
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    /// A non-restartable stage was started twice.
    #[error("already started")]
    AlreadyStarted,

    /// The stage has been closed.
    #[error("closed")]
    Closed,
}

impl Error {
    /// Returns true for errors that affect a single chunk only.
    pub fn is_per_chunk(&self) -> bool {
        matches!(
            self,
            Error::MalformedFrame { .. } | Error::FormatMismatch { .. } | Error::Base64(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_malformed_display() {
        let err = Error::MalformedFrame { len: 5, channels: 1 };
        assert_eq!(
            err.to_string(),
            "malformed frame: 5 bytes does not fit 1 channel(s) of 16-bit samples"
        );
        assert!(err.is_per_chunk());
    }

    #[test]
    fn test_format_mismatch_is_per_chunk() {
        let err = Error::FormatMismatch {
            expected: Format::MONO_24K,
            actual: Format::MONO_16K,
        };
        assert_eq!(
            err.to_string(),
            "format mismatch: chunk is pcm16@16000, output is pcm16@24000"
        );
        assert!(err.is_per_chunk());
    }

    #[test]
    fn test_device_unavailable_is_session_level() {
        let err = Error::DeviceUnavailable("permission denied".into());
        assert!(!err.is_per_chunk());
        assert!(err.to_string().contains("permission denied"));
    }
}
