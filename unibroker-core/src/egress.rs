//! Bounded per-connection egress queue

use std::collections::VecDeque;

use bytes::Bytes;
use serde::Deserialize;

/// What to do when a connection's egress queue is full
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Close the slow connection
    #[default]
    DropConnection,
    /// Evict the oldest frame that has not started transmitting
    DropOldest,
    /// Discard the incoming frame
    DropNewest,
}

/// Result of offering a frame to an [`EgressQueue`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    Queued,
    /// Queued after evicting an older frame
    DroppedOldest,
    /// The offered frame was discarded
    DroppedNewest,
    /// Queue full under [`OverflowPolicy::DropConnection`]; nothing queued
    Overflow,
    /// The endpoint is already closed; nothing queued
    Discarded,
}

/// FIFO of encoded frames awaiting transmission
///
/// The front frame may be partially written; `front_offset` tracks how much
/// of it already reached the socket. A partially written frame is never
/// evicted, so the peer always sees whole frames.
#[derive(Debug)]
pub struct EgressQueue {
    frames: VecDeque<Bytes>,
    front_offset: usize,
    max_depth: usize,
    policy: OverflowPolicy,
    dropped: u64,
}

impl EgressQueue {
    /// `max_depth == 0` means unbounded
    pub fn new(max_depth: usize, policy: OverflowPolicy) -> Self {
        Self {
            frames: VecDeque::new(),
            front_offset: 0,
            max_depth,
            policy,
            dropped: 0,
        }
    }

    pub fn push(&mut self, frame: Bytes) -> EnqueueOutcome {
        if self.max_depth == 0 || self.frames.len() < self.max_depth {
            self.frames.push_back(frame);
            return EnqueueOutcome::Queued;
        }

        match self.policy {
            OverflowPolicy::DropConnection => EnqueueOutcome::Overflow,
            OverflowPolicy::DropNewest => {
                self.dropped += 1;
                EnqueueOutcome::DroppedNewest
            }
            OverflowPolicy::DropOldest => {
                self.dropped += 1;
                let victim = if self.front_offset > 0 { 1 } else { 0 };
                if self.frames.remove(victim).is_some() {
                    self.frames.push_back(frame);
                    EnqueueOutcome::DroppedOldest
                } else {
                    // only the in-flight frame is queued
                    EnqueueOutcome::DroppedNewest
                }
            }
        }
    }

    /// Unwritten bytes of the front frame
    pub fn front_remaining(&self) -> Option<&[u8]> {
        self.frames
            .front()
            .map(|frame| &frame[self.front_offset..])
    }

    /// Record that `written` bytes of the front frame were transmitted
    ///
    /// Returns true when the front frame completed and was removed.
    pub fn advance(&mut self, written: usize) -> bool {
        let Some(front) = self.frames.front() else {
            return false;
        };
        self.front_offset = (self.front_offset + written).min(front.len());
        if self.front_offset == front.len() {
            self.frames.pop_front();
            self.front_offset = 0;
            return true;
        }
        false
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Frames discarded by the overflow policy so far
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    pub fn clear(&mut self) {
        self.frames.clear();
        self.front_offset = 0;
    }
}
