//! Jitter-buffer scheduler: a min-heap of decoded chunks ordered by local
//! play time, released by a fixed-cadence tick.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::time::Instant;

use crate::protocol::format::Sample;
use crate::protocol_constants::{JITTER_WINDOW_US, STARTUP_BUFFER_TARGET};

/// A decoded chunk awaiting release, ordered by `play_at_local` ascending
/// (earliest first) when held in the min-heap.
#[derive(Debug, Clone)]
pub struct ScheduledChunk {
    pub play_at_local: Instant,
    pub samples: Vec<Sample>,
}

impl PartialEq for ScheduledChunk {
    fn eq(&self, other: &Self) -> bool {
        self.play_at_local == other.play_at_local
    }
}
impl Eq for ScheduledChunk {}

impl PartialOrd for ScheduledChunk {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScheduledChunk {
    /// Reversed so `BinaryHeap` (a max-heap) pops the earliest `play_at_local`
    /// first, turning it into a min-heap by play time.
    fn cmp(&self, other: &Self) -> Ordering {
        other.play_at_local.cmp(&self.play_at_local)
    }
}

/// Outcome of one release-tick decision on the head of the queue.
#[derive(Debug, PartialEq, Eq)]
pub enum ReleaseDecision {
    /// Still buffering; nothing was considered.
    Buffering,
    /// Queue is empty; nothing to release.
    Empty,
    /// Head is not due yet.
    TooEarly,
    /// Head was dropped as too late.
    Dropped,
    /// Head was released to the output channel.
    Released(ScheduledChunk),
}

/// Min-heap jitter buffer with a startup gate, per the player scheduling
/// pipeline.
pub struct SchedulerQueue {
    heap: BinaryHeap<ScheduledChunk>,
    buffering: bool,
    buffer_target: usize,
    played: u64,
    dropped: u64,
}

impl SchedulerQueue {
    pub fn new() -> Self {
        Self::with_buffer_target(STARTUP_BUFFER_TARGET)
    }

    pub fn with_buffer_target(buffer_target: usize) -> Self {
        Self {
            heap: BinaryHeap::new(),
            buffering: true,
            buffer_target,
            played: 0,
            dropped: 0,
        }
    }

    /// Inserts a decoded chunk into the heap by its local play time.
    pub fn push(&mut self, chunk: ScheduledChunk) {
        self.heap.push(chunk);
    }

    /// Empties the queue and re-arms startup buffering, per `stream/clear`.
    pub fn clear(&mut self) {
        self.heap.clear();
        self.buffering = true;
        log::info!("[Scheduler] cleared; re-arming startup buffering");
    }

    pub fn is_buffering(&self) -> bool {
        self.buffering
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn played(&self) -> u64 {
        self.played
    }

    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Runs one release-tick decision against `now`.
    pub fn tick(&mut self, now: Instant) -> ReleaseDecision {
        if self.buffering {
            if self.heap.len() >= self.buffer_target {
                self.buffering = false;
                log::info!("[Scheduler] startup buffering complete");
            } else {
                return ReleaseDecision::Buffering;
            }
        }

        let Some(head) = self.heap.peek() else {
            return ReleaseDecision::Empty;
        };

        let delta_us = if head.play_at_local >= now {
            head.play_at_local.duration_since(now).as_micros() as i64
        } else {
            -(now.duration_since(head.play_at_local).as_micros() as i64)
        };

        if delta_us > JITTER_WINDOW_US {
            return ReleaseDecision::TooEarly;
        }

        if delta_us < -JITTER_WINDOW_US {
            self.heap.pop();
            self.dropped += 1;
            return ReleaseDecision::Dropped;
        }

        let chunk = self.heap.pop().expect("peeked Some above");
        self.played += 1;
        ReleaseDecision::Released(chunk)
    }
}

impl Default for SchedulerQueue {
    fn default() -> Self {
        Self::new()
    }
}
