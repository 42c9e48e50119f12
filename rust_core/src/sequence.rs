//! Per-channel sequence tracking
//!
//! Every channel has its own sequence space. The tracker remembers the last
//! accepted sequence of each channel and classifies the next packet:
//!
//! - first packet on a channel: accepted
//! - `last + 1`: fresh
//! - `last`: duplicate, ignored
//! - beyond `last + 1`: packets lost, state jumps ahead, resync needed
//! - below `last`: feed reset, state restarts, resync needed

use crate::error::SequenceError;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tracing::debug;

/// Outcome for a packet that can be processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceStatus {
    /// First packet seen on this channel
    First,
    Fresh,
    /// Same sequence as the previous packet; skip it
    Duplicate,
}

impl SequenceStatus {
    pub fn should_process(&self) -> bool {
        !matches!(self, SequenceStatus::Duplicate)
    }
}

#[derive(Debug, Default)]
pub struct SequenceTracker {
    last_seen: Mutex<FxHashMap<u16, u32>>,
}

impl SequenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Classify `sequence` on `channel_id` and update the channel state.
    ///
    /// Loss and reset are returned as errors; the state has already moved to
    /// `sequence` so the same break is not reported twice.
    pub fn check(&self, channel_id: u16, sequence: u32) -> Result<SequenceStatus, SequenceError> {
        let mut last_seen = self.last_seen.lock();
        let Some(last) = last_seen.insert(channel_id, sequence) else {
            debug!("Channel {} first sequence {}", channel_id, sequence);
            return Ok(SequenceStatus::First);
        };

        let expected = last.wrapping_add(1);
        if sequence == expected {
            Ok(SequenceStatus::Fresh)
        } else if sequence == last {
            Ok(SequenceStatus::Duplicate)
        } else if sequence > last {
            Err(SequenceError::Lost {
                channel_id,
                expected,
                received: sequence,
            })
        } else {
            Err(SequenceError::Reset {
                channel_id,
                last,
                received: sequence,
            })
        }
    }

    pub fn last_sequence(&self, channel_id: u16) -> Option<u32> {
        self.last_seen.lock().get(&channel_id).copied()
    }

    /// Forget every channel; the next packet of each is accepted as first.
    pub fn clear(&self) {
        self.last_seen.lock().clear();
    }

    pub fn channel_count(&self) -> usize {
        self.last_seen.lock().len()
    }
}
