//! Bounded hand-off queue between the capture callback and the encoder.
//!
//! Sample blocks circulate between the two sides instead of being allocated
//! per frame: the callback fills a block from a preallocated pool and
//! deposits it here, and the consumer copies it into an [`AudioFrame`] and
//! returns the emptied block to the pool through an `rtrb` ring.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::Mutex;
use rtrb::{Consumer, Producer, RingBuffer};
use tokio::sync::Notify;

use crate::pcm::{AudioFrame, Format};

/// Blocks in circulation beyond the queue capacity: the one being filled by
/// the callback and the one being copied by the consumer.
const POOL_HEADROOM: usize = 2;

/// A bounded frame queue that overwrites the oldest frame when full.
///
/// # Semantics
///
/// - **Push**: never waits for the consumer. When the queue is at capacity
///   the oldest unconsumed frame is discarded and the drop counter is
///   incremented, so the outbound path favors recency over completeness.
/// - **Recv**: waits asynchronously until a frame is available or the
///   queue is closed and drained.
/// - **Close**: pushes after close are ignored; buffered frames can still
///   be drained.
///
/// Cloning shares the underlying queue.
#[derive(Clone)]
pub struct FrameQueue {
    inner: Arc<QueueInner>,
}

struct QueueInner {
    format: Format,
    blocks: Mutex<VecDeque<Vec<i16>>>,
    capacity: usize,
    recycle: Mutex<Producer<Vec<i16>>>,
    notify: Notify,
    closed: AtomicBool,
    pushed: AtomicU64,
    dropped: AtomicU64,
}

/// Free blocks handed to the capture callback.
pub(crate) struct BlockPool {
    free: Consumer<Vec<i16>>,
}

impl BlockPool {
    /// Takes an empty block, or `None` if every block is in use.
    #[inline]
    pub(crate) fn take(&mut self) -> Option<Vec<i16>> {
        self.free.pop().ok()
    }
}

impl FrameQueue {
    /// Creates a queue holding at most `capacity` blocks of `block_len`
    /// samples, together with the pool the producer draws blocks from.
    ///
    /// All block storage is allocated here.
    pub(crate) fn with_pool(format: Format, capacity: usize, block_len: usize) -> (Self, BlockPool) {
        let pool_len = capacity + POOL_HEADROOM;
        let (mut producer, consumer) = RingBuffer::new(pool_len);
        for _ in 0..pool_len {
            // The ring was sized for exactly this many blocks.
            let _ = producer.push(Vec::with_capacity(block_len));
        }

        let queue = Self {
            inner: Arc::new(QueueInner {
                format,
                blocks: Mutex::new(VecDeque::with_capacity(capacity)),
                capacity,
                recycle: Mutex::new(producer),
                notify: Notify::new(),
                closed: AtomicBool::new(false),
                pushed: AtomicU64::new(0),
                dropped: AtomicU64::new(0),
            }),
        };
        (queue, BlockPool { free: consumer })
    }

    /// Deposits a full block from the capture callback.
    ///
    /// Returns the block that has to go back to the producer: the evicted
    /// oldest block when the queue was full, or `block` itself when the
    /// queue is closed. Nothing is allocated or freed here.
    pub(crate) fn push_block(&self, block: Vec<i16>) -> Option<Vec<i16>> {
        if self.inner.closed.load(Ordering::Acquire) {
            return Some(block);
        }

        let evicted = {
            let mut blocks = self.inner.blocks.lock();
            let evicted = if blocks.len() >= self.inner.capacity {
                blocks.pop_front()
            } else {
                None
            };
            blocks.push_back(block);
            evicted
        };

        self.inner.pushed.fetch_add(1, Ordering::Relaxed);
        if evicted.is_some() {
            self.inner.dropped.fetch_add(1, Ordering::Relaxed);
        }
        self.inner.notify.notify_one();
        evicted
    }

    /// Counts a block the producer had to discard because no free block
    /// was available.
    pub(crate) fn record_overrun(&self) {
        self.inner.pushed.fetch_add(1, Ordering::Relaxed);
        self.inner.dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Removes the oldest frame without waiting.
    pub fn try_recv(&self) -> Option<AudioFrame> {
        let mut block = self.inner.blocks.lock().pop_front()?;
        let frame = AudioFrame::from_slice(self.inner.format, &block);
        block.clear();
        // A full ring means the block was never ours to return; let it go.
        let _ = self.inner.recycle.lock().push(block);
        Some(frame)
    }

    /// Receives the oldest frame, waiting until one is available.
    ///
    /// Returns `None` once the queue is closed and drained.
    pub async fn recv(&self) -> Option<AudioFrame> {
        loop {
            let notified = self.inner.notify.notified();
            if let Some(frame) = self.try_recv() {
                return Some(frame);
            }
            if self.is_closed() {
                return self.try_recv();
            }
            notified.await;
        }
    }

    /// Closes the queue and wakes any waiting receiver.
    pub fn close(&self) {
        if !self.inner.closed.swap(true, Ordering::AcqRel) {
            self.inner.notify.notify_waiters();
            self.inner.notify.notify_one();
        }
    }

    /// Returns true if the queue has been closed.
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Returns the number of buffered frames.
    pub fn len(&self) -> usize {
        self.inner.blocks.lock().len()
    }

    /// Returns true if no frames are buffered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the queue capacity.
    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    /// Returns the number of frames accepted so far.
    pub fn pushed(&self) -> u64 {
        self.inner.pushed.load(Ordering::Relaxed)
    }

    /// Returns the backpressure counter: frames dropped because the
    /// consumer fell behind.
    pub fn dropped(&self) -> u64 {
        self.inner.dropped.load(Ordering::Relaxed)
    }
}
