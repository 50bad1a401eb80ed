//! PCM16 audio frames and their transport encoding.
//!
//! # Key Types
//!
//! - [`Format`]: sample rate and channel count of a PCM16 stream
//! - [`AudioFrame`]: immutable block of interleaved samples
//! - [`EncodedChunk`]: little-endian bytes tagged with their format
//!
//! # Example
//!
//! ```rust
//! use concierge_audio::pcm::{self, AudioFrame, Format};
//!
//! let frame = AudioFrame::from_f32(Format::MONO_16K, &[0.0, 0.25, -0.25]);
//! let chunk = pcm::encode(&frame);
//! assert_eq!(chunk.mime_type(), "audio/pcm;rate=16000");
//!
//! let back = pcm::decode(&chunk, Format::MONO_16K).unwrap();
//! assert_eq!(back.samples(), frame.samples());
//! ```

mod chunk;
mod codec;
mod format;
mod frame;

pub use chunk::EncodedChunk;
pub use codec::{decode, encode, f32_to_i16, i16_to_f32};
pub use format::Format;
pub use frame::AudioFrame;
