//! Gapless playback scheduling of inbound speech.
//!
//! Inbound chunks arrive on the network clock but must play on the output
//! device clock. The scheduler keeps a single [`PlaybackCursor`] and places
//! each decoded frame at `max(cursor, now)`:
//!
//! - frames never overlap, the next one never starts before the previous
//!   one ends;
//! - if delivery stalls and the cursor falls behind the device clock, the
//!   next frame starts immediately instead of replaying a stale schedule.

use std::time::Duration;

use tracing::{debug, warn};

use crate::device::OutputStream;
use crate::error::{Error, Result};
use crate::pcm::{self, AudioFrame, EncodedChunk, Format};

/// The scheduling clock for queued playback, in device-clock units.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlaybackCursor {
    next_start: Duration,
}

impl PlaybackCursor {
    /// Creates a cursor positioned at `origin`.
    pub fn new(origin: Duration) -> Self {
        Self { next_start: origin }
    }

    /// Returns the earliest time the next frame may begin.
    pub fn next_start(&self) -> Duration {
        self.next_start
    }

    /// Places a frame of `duration` and returns its start time.
    ///
    /// The start is `max(next_start, now)`; the cursor advances by exactly
    /// `duration` from there, so it never decreases.
    pub fn schedule_next(&mut self, now: Duration, duration: Duration) -> Duration {
        let start = self.next_start.max(now);
        self.next_start = start + duration;
        start
    }
}

/// Where a frame was placed on the device clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    /// Device time the frame begins playing.
    pub start: Duration,
    /// Playback duration of the frame.
    pub duration: Duration,
}

impl Placement {
    /// Returns the device time the frame finishes playing.
    pub fn end(&self) -> Duration {
        self.start + self.duration
    }
}

/// Decodes inbound chunks and schedules them onto an output stream.
///
/// The scheduler is the single owner of its cursor; scheduling takes
/// `&mut self` so there is never more than one writer.
pub struct PlaybackScheduler {
    output: Box<dyn OutputStream>,
    format: Format,
    cursor: PlaybackCursor,
    accepting: bool,
    scheduled: u64,
    malformed: u64,
}

impl PlaybackScheduler {
    /// Arms a scheduler on an acquired output stream.
    pub fn new(output: Box<dyn OutputStream>) -> Self {
        let format = output.format();
        let cursor = PlaybackCursor::new(output.now());
        Self {
            output,
            format,
            cursor,
            accepting: true,
            scheduled: 0,
            malformed: 0,
        }
    }

    /// Decodes a chunk in the output format and schedules it.
    ///
    /// A chunk tagged with a different format is rejected with
    /// [`Error::FormatMismatch`], one that does not hold whole samples with
    /// [`Error::MalformedFrame`]. Both are counted as malformed and the
    /// scheduler stays usable.
    pub fn schedule_chunk(&mut self, chunk: &EncodedChunk) -> Result<Placement> {
        if !self.accepting {
            return Err(Error::Closed);
        }
        let decoded = if chunk.format() == self.format {
            pcm::decode(chunk, self.format)
        } else {
            Err(Error::FormatMismatch {
                expected: self.format,
                actual: chunk.format(),
            })
        };
        let frame = match decoded {
            Ok(frame) => frame,
            Err(e) => {
                self.malformed += 1;
                warn!("dropping inbound chunk: {}", e);
                return Err(e);
            }
        };
        self.schedule_frame(frame)
    }

    /// Schedules a decoded frame right after the previous one.
    pub fn schedule_frame(&mut self, frame: AudioFrame) -> Result<Placement> {
        if !self.accepting {
            return Err(Error::Closed);
        }

        let duration = frame.duration();
        let start = self.cursor.schedule_next(self.output.now(), duration);
        if !frame.is_empty() {
            self.output.schedule(frame, start)?;
        }
        self.scheduled += 1;

        debug!(
            "scheduled {:?} at {:?}, cursor {:?}",
            duration,
            start,
            self.cursor.next_start()
        );
        Ok(Placement { start, duration })
    }

    /// Returns the cursor.
    pub fn cursor(&self) -> PlaybackCursor {
        self.cursor
    }

    /// Returns the current output device time.
    pub fn now(&self) -> Duration {
        self.output.now()
    }

    /// Returns the number of frames scheduled.
    pub fn scheduled(&self) -> u64 {
        self.scheduled
    }

    /// Returns the number of chunks rejected as malformed.
    pub fn malformed(&self) -> u64 {
        self.malformed
    }

    /// Returns false once the scheduler has been reset.
    pub fn is_accepting(&self) -> bool {
        self.accepting
    }

    /// Discards frames not yet rendered, moves the cursor to the device
    /// clock and stops accepting chunks.
    pub fn reset(&mut self) {
        self.output.clear();
        self.cursor = PlaybackCursor::new(self.output.now());
        self.accepting = false;
    }

    /// Resets the scheduler and releases the output device.
    pub fn close(mut self) {
        self.reset();
        self.output.close();
    }
}
