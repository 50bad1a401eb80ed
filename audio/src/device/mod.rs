//! Audio device abstraction.
//!
//! The session acquires one input and one output device per run and owns
//! both handles exclusively. Acquisition is where permission and hardware
//! failures surface ([`Error::DeviceUnavailable`](crate::Error::DeviceUnavailable)).
//!
//! - [`memory`]: in-process devices with a manual clock, used by tests and
//!   headless runs
//! - `cpal` (feature `cpal`): the platform's default microphone and speaker

use std::time::Duration;

use crate::capture::CaptureSink;
use crate::error::Result;
use crate::pcm::{AudioFrame, Format};

pub mod memory;

#[cfg(feature = "cpal")]
pub mod cpal;

/// A monotonic clock driven by an output device.
pub trait DeviceClock: Send {
    /// Returns the current device time since the stream was acquired.
    fn now(&self) -> Duration;
}

/// A source of microphone audio.
pub trait InputDevice: Send + Sync {
    /// Returns a human-readable device name.
    fn name(&self) -> String;

    /// Acquires the device for capture in the given format.
    fn acquire(&self, format: Format) -> Result<Box<dyn InputStream>>;
}

/// An acquired microphone.
///
/// Dropping the stream releases the device.
pub trait InputStream: Send {
    /// Starts delivering samples to `sink` from the device's audio thread.
    fn start(&mut self, sink: CaptureSink) -> Result<()>;

    /// Stops capture and releases the device. Idempotent.
    fn stop(&mut self);
}

/// A sink for synthesized speech.
pub trait OutputDevice: Send + Sync {
    /// Returns a human-readable device name.
    fn name(&self) -> String;

    /// Acquires the device for playback in the given format.
    fn acquire(&self, format: Format) -> Result<Box<dyn OutputStream>>;
}

/// An acquired speaker that plays frames at absolute device-clock times.
///
/// Dropping the stream releases the device.
pub trait OutputStream: DeviceClock {
    /// Returns the format frames are rendered in.
    fn format(&self) -> Format;

    /// Hands a frame to the device to begin playing at `start`.
    fn schedule(&mut self, frame: AudioFrame, start: Duration) -> Result<()>;

    /// Discards every frame that has not been rendered yet.
    fn clear(&mut self);

    /// Stops playback and releases the device. Idempotent.
    fn close(&mut self);
}
