//! In-process audio devices.
//!
//! [`MemoryInput`] is fed by the caller instead of a microphone and
//! [`MemoryOutput`] records scheduled frames against a manually advanced
//! clock. Both count acquisitions and currently held handles so callers can
//! check that every exit path releases its devices.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;

use super::{DeviceClock, InputDevice, InputStream, OutputDevice, OutputStream};
use crate::capture::CaptureSink;
use crate::error::{Error, Result};
use crate::pcm::{AudioFrame, Format};

// ============================================================================
// Input
// ============================================================================

/// A microphone fed from memory. Cloning shares the device.
#[derive(Clone, Default)]
pub struct MemoryInput {
    state: Arc<InputState>,
}

#[derive(Default)]
struct InputState {
    unavailable: Option<String>,
    sink: Mutex<Option<CaptureSink>>,
    acquisitions: AtomicUsize,
    open: AtomicUsize,
}

impl MemoryInput {
    /// Creates an available input device.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a device whose acquisition always fails with
    /// [`Error::DeviceUnavailable`].
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self {
            state: Arc::new(InputState {
                unavailable: Some(reason.into()),
                ..Default::default()
            }),
        }
    }

    /// Delivers mono samples as if from the device callback.
    ///
    /// Returns false if no stream is currently capturing.
    pub fn feed(&self, samples: &[f32]) -> bool {
        let mut sink = self.state.sink.lock();
        match sink.as_mut() {
            Some(sink) if sink.is_running() => {
                sink.push_samples(samples);
                true
            }
            _ => false,
        }
    }

    /// Delivers interleaved multi-channel samples, downmixed to mono.
    pub fn feed_interleaved(&self, samples: &[f32], channels: usize) -> bool {
        let mut sink = self.state.sink.lock();
        match sink.as_mut() {
            Some(sink) if sink.is_running() => {
                sink.push_downmix(samples, channels);
                true
            }
            _ => false,
        }
    }

    /// Returns true while a started stream is delivering samples.
    pub fn is_capturing(&self) -> bool {
        self.state.sink.lock().is_some()
    }

    /// Returns how many times the device has been acquired.
    pub fn acquisitions(&self) -> usize {
        self.state.acquisitions.load(Ordering::SeqCst)
    }

    /// Returns how many acquired streams have not been released.
    pub fn open_handles(&self) -> usize {
        self.state.open.load(Ordering::SeqCst)
    }
}

impl InputDevice for MemoryInput {
    fn name(&self) -> String {
        "memory-input".to_string()
    }

    fn acquire(&self, _format: Format) -> Result<Box<dyn InputStream>> {
        if let Some(reason) = &self.state.unavailable {
            return Err(Error::DeviceUnavailable(reason.clone()));
        }
        self.state.acquisitions.fetch_add(1, Ordering::SeqCst);
        self.state.open.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MemoryInputStream {
            state: self.state.clone(),
            released: false,
        }))
    }
}

struct MemoryInputStream {
    state: Arc<InputState>,
    released: bool,
}

impl InputStream for MemoryInputStream {
    fn start(&mut self, sink: CaptureSink) -> Result<()> {
        if self.released {
            return Err(Error::Closed);
        }
        *self.state.sink.lock() = Some(sink);
        Ok(())
    }

    fn stop(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        self.state.sink.lock().take();
        self.state.open.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Drop for MemoryInputStream {
    fn drop(&mut self) {
        self.stop();
    }
}

// ============================================================================
// Output
// ============================================================================

/// A frame handed to a [`MemoryOutput`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledFrame {
    /// Device time the frame begins playing.
    pub start: Duration,
    /// The frame itself.
    pub frame: AudioFrame,
}

impl ScheduledFrame {
    /// Returns the device time the frame finishes playing.
    pub fn end(&self) -> Duration {
        self.start + self.frame.duration()
    }
}

/// A speaker that records scheduled frames. Cloning shares the device.
#[derive(Clone, Default)]
pub struct MemoryOutput {
    state: Arc<OutputState>,
}

#[derive(Default)]
struct OutputState {
    unavailable: Option<String>,
    clock: Mutex<Duration>,
    pending: Mutex<Vec<ScheduledFrame>>,
    history: Mutex<Vec<ScheduledFrame>>,
    acquisitions: AtomicUsize,
    open: AtomicUsize,
    clears: AtomicUsize,
}

impl MemoryOutput {
    /// Creates an available output device with its clock at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a device whose acquisition always fails.
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self {
            state: Arc::new(OutputState {
                unavailable: Some(reason.into()),
                ..Default::default()
            }),
        }
    }

    /// Returns the current device time.
    pub fn now(&self) -> Duration {
        *self.state.clock.lock()
    }

    /// Sets the device clock. The clock never moves backwards.
    pub fn set_time(&self, t: Duration) {
        let mut clock = self.state.clock.lock();
        if t > *clock {
            *clock = t;
        }
    }

    /// Advances the device clock.
    pub fn advance(&self, d: Duration) {
        *self.state.clock.lock() += d;
    }

    /// Returns every frame ever scheduled, in scheduling order.
    pub fn history(&self) -> Vec<ScheduledFrame> {
        self.state.history.lock().clone()
    }

    /// Returns frames scheduled and not yet finished or cleared.
    pub fn pending(&self) -> Vec<ScheduledFrame> {
        let now = self.now();
        self.state
            .pending
            .lock()
            .iter()
            .filter(|f| f.end() > now)
            .cloned()
            .collect()
    }

    /// Returns how many times pending audio has been discarded.
    pub fn clears(&self) -> usize {
        self.state.clears.load(Ordering::SeqCst)
    }

    /// Returns how many times the device has been acquired.
    pub fn acquisitions(&self) -> usize {
        self.state.acquisitions.load(Ordering::SeqCst)
    }

    /// Returns how many acquired streams have not been released.
    pub fn open_handles(&self) -> usize {
        self.state.open.load(Ordering::SeqCst)
    }
}

impl OutputDevice for MemoryOutput {
    fn name(&self) -> String {
        "memory-output".to_string()
    }

    fn acquire(&self, format: Format) -> Result<Box<dyn OutputStream>> {
        if let Some(reason) = &self.state.unavailable {
            return Err(Error::DeviceUnavailable(reason.clone()));
        }
        self.state.acquisitions.fetch_add(1, Ordering::SeqCst);
        self.state.open.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MemoryOutputStream {
            state: self.state.clone(),
            format,
            released: false,
        }))
    }
}

struct MemoryOutputStream {
    state: Arc<OutputState>,
    format: Format,
    released: bool,
}

impl DeviceClock for MemoryOutputStream {
    fn now(&self) -> Duration {
        *self.state.clock.lock()
    }
}

impl OutputStream for MemoryOutputStream {
    fn format(&self) -> Format {
        self.format
    }

    fn schedule(&mut self, frame: AudioFrame, start: Duration) -> Result<()> {
        if self.released {
            return Err(Error::Closed);
        }
        let scheduled = ScheduledFrame { start, frame };
        self.state.history.lock().push(scheduled.clone());
        self.state.pending.lock().push(scheduled);
        Ok(())
    }

    fn clear(&mut self) {
        self.state.pending.lock().clear();
        self.state.clears.fetch_add(1, Ordering::SeqCst);
    }

    fn close(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        self.state.pending.lock().clear();
        self.state.open.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Drop for MemoryOutputStream {
    fn drop(&mut self) {
        self.close();
    }
}
