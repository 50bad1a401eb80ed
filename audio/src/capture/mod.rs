//! Microphone capture pipeline.
//!
//! The device callback runs on a time-sensitive audio thread. Its only job
//! is to normalize samples into a pooled block and, once the block is full,
//! deposit it into a [`FrameQueue`]. Copying blocks out as
//! [`AudioFrame`](crate::pcm::AudioFrame)s, encoding and network I/O happen
//! on the consumer side.
//!
//! # Example
//!
//! ```rust
//! use concierge_audio::capture::{CaptureConfig, CapturePipeline};
//! use concierge_audio::device::memory::MemoryInput;
//!
//! # tokio_test::block_on(async {
//! let mic = MemoryInput::new();
//! let config = CaptureConfig { block_size: 4, ..Default::default() };
//! let mut pipeline = CapturePipeline::open(&mic, config).unwrap();
//! let frames = pipeline.start().unwrap();
//!
//! mic.feed(&[0.0, 0.1, 0.2, 0.3]);
//! let frame = frames.recv().await.unwrap();
//! assert_eq!(frame.frames(), 4);
//!
//! pipeline.stop();
//! # });
//! ```

mod queue;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, info};

use crate::device::{InputDevice, InputStream};
use crate::error::{Error, Result};
use crate::pcm::{Format, f32_to_i16};

pub use queue::FrameQueue;
use queue::BlockPool;

/// Default samples per captured block.
pub const DEFAULT_BLOCK_SIZE: usize = 4096;

/// Default hand-off queue capacity, in frames.
pub const DEFAULT_QUEUE_CAPACITY: usize = 4;

/// Capture pipeline configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureConfig {
    /// Wire format of captured frames.
    pub format: Format,
    /// Sample frames per block.
    pub block_size: usize,
    /// Frames buffered between the callback and the encoder.
    pub queue_capacity: usize,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            format: Format::MONO_16K,
            block_size: DEFAULT_BLOCK_SIZE,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

/// Producer half handed to the input device's audio thread.
///
/// Samples are accumulated into a block drawn from a pool allocated when the
/// pipeline is opened, so the callback never allocates or frees. Once the
/// pipeline is stopped every push is ignored.
pub struct CaptureSink {
    format: Format,
    block_len: usize,
    block: Vec<i16>,
    // Evicted or rejected block kept for reuse ahead of the pool.
    spare: Option<Vec<i16>>,
    pool: BlockPool,
    queue: FrameQueue,
    running: Arc<AtomicBool>,
}

impl CaptureSink {
    fn new(
        config: &CaptureConfig,
        queue: FrameQueue,
        pool: BlockPool,
        running: Arc<AtomicBool>,
    ) -> Self {
        let block_len = config.block_size * config.format.channels() as usize;
        Self {
            format: config.format,
            block_len,
            block: Vec::with_capacity(block_len),
            spare: None,
            pool,
            queue,
            running,
        }
    }

    /// Returns the format the sink produces.
    pub fn format(&self) -> Format {
        self.format
    }

    /// Returns false once the pipeline has been stopped.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// Pushes one normalized sample (interleaved if the format has more
    /// than one channel).
    #[inline]
    pub fn push_sample(&mut self, sample: f32) {
        if !self.is_running() {
            return;
        }
        self.block.push(f32_to_i16(sample));
        if self.block.len() >= self.block_len {
            self.flush();
        }
    }

    /// Pushes a run of normalized samples.
    pub fn push_samples(&mut self, samples: &[f32]) {
        for &s in samples {
            self.push_sample(s);
        }
    }

    /// Pushes interleaved multi-channel samples, averaging each sample
    /// frame down to a single mono sample.
    pub fn push_downmix(&mut self, samples: &[f32], channels: usize) {
        if channels <= 1 {
            self.push_samples(samples);
            return;
        }
        for frame in samples.chunks_exact(channels) {
            let sum: f32 = frame.iter().sum();
            self.push_sample(sum / channels as f32);
        }
    }

    // Hands the full block to the queue and continues in a recycled one.
    fn flush(&mut self) {
        let next = match self.spare.take().or_else(|| self.pool.take()) {
            Some(next) => next,
            None => {
                // Every block is in flight; overwrite this one in place.
                self.queue.record_overrun();
                self.block.clear();
                return;
            }
        };
        let full = std::mem::replace(&mut self.block, next);
        self.block.clear();
        if let Some(mut back) = self.queue.push_block(full) {
            back.clear();
            self.spare = Some(back);
        }
    }
}

/// A lazy, non-restartable sequence of fixed-size microphone frames.
pub struct CapturePipeline {
    config: CaptureConfig,
    stream: Option<Box<dyn InputStream>>,
    queue: FrameQueue,
    pool: Option<BlockPool>,
    running: Arc<AtomicBool>,
    started: bool,
}

impl CapturePipeline {
    /// Acquires the input device.
    ///
    /// Fails with [`Error::InvalidConfig`] for a zero block size or queue
    /// capacity, and with [`Error::DeviceUnavailable`] if permission is
    /// denied or no input device exists.
    pub fn open(device: &dyn InputDevice, config: CaptureConfig) -> Result<Self> {
        if config.block_size == 0 || config.queue_capacity == 0 {
            return Err(Error::InvalidConfig(
                "block size and queue capacity must be positive".to_string(),
            ));
        }

        let stream = device.acquire(config.format)?;
        debug!("acquired input device {} ({})", device.name(), config.format);

        let block_len = config.block_size * config.format.channels() as usize;
        let (queue, pool) = FrameQueue::with_pool(config.format, config.queue_capacity, block_len);
        Ok(Self {
            config,
            stream: Some(stream),
            queue,
            pool: Some(pool),
            running: Arc::new(AtomicBool::new(false)),
            started: false,
        })
    }

    /// Starts the device and returns the consumer side of the hand-off queue.
    ///
    /// The pipeline cannot be restarted: a second call fails with
    /// [`Error::AlreadyStarted`], and a call after [`stop`](Self::stop)
    /// fails with [`Error::Closed`].
    pub fn start(&mut self) -> Result<FrameQueue> {
        if self.started {
            return Err(Error::AlreadyStarted);
        }
        let stream = self.stream.as_mut().ok_or(Error::Closed)?;
        let pool = self.pool.take().ok_or(Error::Closed)?;

        self.started = true;
        self.running.store(true, Ordering::Release);
        let sink = CaptureSink::new(&self.config, self.queue.clone(), pool, self.running.clone());
        if let Err(e) = stream.start(sink) {
            self.stop();
            return Err(e);
        }

        info!(
            "capture started: {} blocks of {} samples",
            self.config.format, self.config.block_size
        );
        Ok(self.queue.clone())
    }

    /// Stops capture, releases the device and closes the queue. Idempotent.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(mut stream) = self.stream.take() {
            stream.stop();
            debug!(
                "capture stopped: {} frames captured, {} dropped",
                self.queue.pushed(),
                self.queue.dropped()
            );
        }
        self.queue.close();
    }

    /// Returns true while the device is held.
    pub fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    /// Returns the number of frames produced so far.
    pub fn captured(&self) -> u64 {
        self.queue.pushed()
    }

    /// Returns the number of frames dropped because the consumer fell behind.
    pub fn dropped(&self) -> u64 {
        self.queue.dropped()
    }

    /// Returns the pipeline configuration.
    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }
}

impl Drop for CapturePipeline {
    fn drop(&mut self) {
        self.stop();
    }
}
