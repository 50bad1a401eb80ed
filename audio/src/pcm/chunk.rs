//! Transport-ready encoded audio.

use std::fmt;

use base64::Engine;
use bytes::Bytes;

use super::Format;
use crate::error::Result;

/// PCM16 little-endian bytes tagged with their format.
///
/// Chunks produced by [`encode`](super::encode) always hold whole sample
/// frames. Chunks built from wire data are validated when decoded.
#[derive(Clone, PartialEq, Eq)]
pub struct EncodedChunk {
    format: Format,
    data: Bytes,
}

impl EncodedChunk {
    /// Creates a chunk from raw PCM bytes.
    pub fn new(format: Format, data: impl Into<Bytes>) -> Self {
        Self {
            format,
            data: data.into(),
        }
    }

    /// Creates a chunk from the base64 text encoding used on the wire.
    pub fn from_base64(format: Format, text: &str) -> Result<Self> {
        let data = base64::engine::general_purpose::STANDARD.decode(text)?;
        Ok(Self::new(format, data))
    }

    /// Returns the base64 text encoding of the bytes.
    pub fn to_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(&self.data)
    }

    /// Returns the chunk format.
    pub fn format(&self) -> Format {
        self.format
    }

    /// Returns the format tag, e.g. `pcm16@16000`.
    pub fn tag(&self) -> String {
        self.format.to_string()
    }

    /// Returns the wire mime type, e.g. `audio/pcm;rate=16000`.
    pub fn mime_type(&self) -> String {
        self.format.mime_type()
    }

    /// Returns the raw bytes.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Returns the length in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns true if the chunk holds no bytes.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl fmt::Debug for EncodedChunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncodedChunk")
            .field("format", &self.tag())
            .field("len", &self.data.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base64_wire_text() {
        let chunk = EncodedChunk::new(Format::MONO_16K, vec![0x01, 0x00, 0xff, 0x7f]);
        let text = chunk.to_base64();
        assert_eq!(text, "AQD/fw==");

        let back = EncodedChunk::from_base64(Format::MONO_16K, &text).unwrap();
        assert_eq!(back, chunk);
    }

    #[test]
    fn test_invalid_base64() {
        let err = EncodedChunk::from_base64(Format::MONO_24K, "not base64!").unwrap_err();
        assert!(err.is_per_chunk());
    }

    #[test]
    fn test_tag_and_mime() {
        let chunk = EncodedChunk::new(Format::MONO_16K, Vec::new());
        assert_eq!(chunk.tag(), "pcm16@16000");
        assert_eq!(chunk.mime_type(), "audio/pcm;rate=16000");
        assert!(chunk.is_empty());
    }

    #[test]
    fn test_debug_omits_payload() {
        let chunk = EncodedChunk::new(Format::MONO_24K, vec![0u8; 64]);
        let s = format!("{:?}", chunk);
        assert!(s.contains("pcm16@24000"));
        assert!(s.contains("64"));
    }
}
