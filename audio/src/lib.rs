//! Audio plumbing for the voice concierge.
//!
//! This crate provides:
//!
//! - `pcm`: PCM16 frames, the wire encoding and the frame codec
//! - `capture`: the microphone pipeline and its bounded hand-off queue
//! - `playback`: gapless scheduling of inbound speech on the device clock
//! - `device`: input/output device traits with in-memory and cpal backends
//!
//! # Example
//!
//! ```rust
//! use concierge_audio::device::OutputDevice;
//! use concierge_audio::device::memory::MemoryOutput;
//! use concierge_audio::pcm::{self, AudioFrame, Format};
//! use concierge_audio::playback::PlaybackScheduler;
//! use std::time::Duration;
//!
//! let speaker = MemoryOutput::new();
//! let mut scheduler = PlaybackScheduler::new(speaker.acquire(Format::MONO_24K).unwrap());
//!
//! let chunk = pcm::encode(&AudioFrame::silence(Format::MONO_24K, Duration::from_millis(200)));
//! let first = scheduler.schedule_chunk(&chunk).unwrap();
//! let second = scheduler.schedule_chunk(&chunk).unwrap();
//! assert_eq!(second.start, first.start + Duration::from_millis(200));
//! ```

pub mod capture;
pub mod device;
pub mod error;
pub mod pcm;
pub mod playback;

pub use capture::{CaptureConfig, CapturePipeline, CaptureSink, FrameQueue};
pub use error::{Error, Result};
pub use pcm::{AudioFrame, EncodedChunk, Format};
pub use playback::{Placement, PlaybackCursor, PlaybackScheduler};
