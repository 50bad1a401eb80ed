//! Session statistics.

use std::sync::atomic::{AtomicU64, Ordering};

use concierge_audio::FrameQueue;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Statistics about a voice session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionStats {
    /// Microphone blocks produced by the capture pipeline.
    pub frames_captured: u64,

    /// Blocks dropped because the encoder fell behind.
    pub frames_dropped: u64,

    /// Chunks handed to the transport.
    pub chunks_sent: u64,

    /// Audio chunks received from the endpoint.
    pub chunks_received: u64,

    /// Chunks scheduled for playback.
    pub chunks_scheduled: u64,

    /// Inbound chunks discarded as unreadable.
    pub malformed_chunks: u64,

    /// Model turns completed.
    pub turns_completed: u64,

    /// Model turns cut short by user speech.
    pub interruptions: u64,
}

/// Live counters shared between the session tasks.
#[derive(Default)]
pub(crate) struct StatsRecorder {
    capture: Mutex<Option<FrameQueue>>,
    chunks_sent: AtomicU64,
    chunks_received: AtomicU64,
    chunks_scheduled: AtomicU64,
    malformed_chunks: AtomicU64,
    turns_completed: AtomicU64,
    interruptions: AtomicU64,
}

impl StatsRecorder {
    pub fn attach_capture(&self, queue: FrameQueue) {
        *self.capture.lock() = Some(queue);
    }

    pub fn chunk_sent(&self) {
        self.chunks_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn chunk_received(&self) {
        self.chunks_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn chunk_scheduled(&self) {
        self.chunks_scheduled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn chunk_malformed(&self) {
        self.malformed_chunks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn turn_completed(&self) {
        self.turns_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn interrupted(&self) {
        self.interruptions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> SessionStats {
        let (frames_captured, frames_dropped) = match self.capture.lock().as_ref() {
            Some(queue) => (queue.pushed(), queue.dropped()),
            None => (0, 0),
        };
        SessionStats {
            frames_captured,
            frames_dropped,
            chunks_sent: self.chunks_sent.load(Ordering::Relaxed),
            chunks_received: self.chunks_received.load(Ordering::Relaxed),
            chunks_scheduled: self.chunks_scheduled.load(Ordering::Relaxed),
            malformed_chunks: self.malformed_chunks.load(Ordering::Relaxed),
            turns_completed: self.turns_completed.load(Ordering::Relaxed),
            interruptions: self.interruptions.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use concierge_audio::capture::{CaptureConfig, CapturePipeline};
    use concierge_audio::device::memory::MemoryInput;

    #[test]
    fn test_snapshot_counts() {
        let stats = StatsRecorder::default();
        assert_eq!(stats.snapshot(), SessionStats::default());

        stats.chunk_sent();
        stats.chunk_sent();
        stats.chunk_received();
        stats.chunk_malformed();
        stats.interrupted();

        let snap = stats.snapshot();
        assert_eq!(snap.chunks_sent, 2);
        assert_eq!(snap.chunks_received, 1);
        assert_eq!(snap.malformed_chunks, 1);
        assert_eq!(snap.interruptions, 1);
        assert_eq!(snap.frames_captured, 0);
    }

    #[test]
    fn test_snapshot_reads_capture_queue() {
        let stats = StatsRecorder::default();
        let mic = MemoryInput::new();
        let config = CaptureConfig {
            block_size: 4,
            queue_capacity: 2,
            ..Default::default()
        };
        let mut pipeline = CapturePipeline::open(&mic, config).unwrap();
        stats.attach_capture(pipeline.start().unwrap());

        for _ in 0..3 {
            mic.feed(&[0.0; 4]);
        }

        let snap = stats.snapshot();
        assert_eq!(snap.frames_captured, 3);
        assert_eq!(snap.frames_dropped, 1);
    }
}
