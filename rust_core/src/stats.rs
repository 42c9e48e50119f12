//! Feed statistics
//!
//! Lock-free counters updated from every receive loop. `snapshot()` gives a
//! consistent-enough copy for periodic logging.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct FeedStats {
    pub packets_received: AtomicU64,
    pub packets_processed: AtomicU64,
    pub duplicates: AtomicU64,
    pub packets_lost: AtomicU64,
    pub resets: AtomicU64,
    pub malformed_packets: AtomicU64,
    pub decode_errors: AtomicU64,
    pub unsupported_templates: AtomicU64,
    pub messages_decoded: AtomicU64,
    pub events_emitted: AtomicU64,
    pub resyncs: AtomicU64,
    pub rebuild_failures: AtomicU64,
    /// Resyncs that could not rejoin; the client is down after each
    pub rejoin_failures: AtomicU64,
}

/// Plain copy of the counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FeedStatsSnapshot {
    pub packets_received: u64,
    pub packets_processed: u64,
    pub duplicates: u64,
    pub packets_lost: u64,
    pub resets: u64,
    pub malformed_packets: u64,
    pub decode_errors: u64,
    pub unsupported_templates: u64,
    pub messages_decoded: u64,
    pub events_emitted: u64,
    pub resyncs: u64,
    pub rebuild_failures: u64,
    pub rejoin_failures: u64,
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

impl FeedStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_packet(&self) {
        bump(&self.packets_received);
    }

    pub fn record_processed(&self) {
        bump(&self.packets_processed);
    }

    pub fn record_duplicate(&self) {
        bump(&self.duplicates);
    }

    pub fn record_lost(&self) {
        bump(&self.packets_lost);
    }

    pub fn record_reset(&self) {
        bump(&self.resets);
    }

    pub fn record_malformed(&self) {
        bump(&self.malformed_packets);
    }

    pub fn record_decode_error(&self) {
        bump(&self.decode_errors);
    }

    pub fn record_unsupported_template(&self) {
        bump(&self.unsupported_templates);
    }

    pub fn record_message(&self) {
        bump(&self.messages_decoded);
    }

    pub fn record_events(&self, n: u64) {
        self.events_emitted.fetch_add(n, Ordering::Relaxed);
    }

    pub fn record_resync(&self) {
        bump(&self.resyncs);
    }

    pub fn record_rebuild_failure(&self) {
        bump(&self.rebuild_failures);
    }

    pub fn record_rejoin_failure(&self) {
        bump(&self.rejoin_failures);
    }

    pub fn snapshot(&self) -> FeedStatsSnapshot {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        FeedStatsSnapshot {
            packets_received: load(&self.packets_received),
            packets_processed: load(&self.packets_processed),
            duplicates: load(&self.duplicates),
            packets_lost: load(&self.packets_lost),
            resets: load(&self.resets),
            malformed_packets: load(&self.malformed_packets),
            decode_errors: load(&self.decode_errors),
            unsupported_templates: load(&self.unsupported_templates),
            messages_decoded: load(&self.messages_decoded),
            events_emitted: load(&self.events_emitted),
            resyncs: load(&self.resyncs),
            rebuild_failures: load(&self.rebuild_failures),
            rejoin_failures: load(&self.rejoin_failures),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot() {
        let stats = FeedStats::new();
        stats.record_packet();
        stats.record_packet();
        stats.record_duplicate();
        stats.record_events(5);
        stats.record_rejoin_failure();

        let snap = stats.snapshot();
        assert_eq!(snap.packets_received, 2);
        assert_eq!(snap.duplicates, 1);
        assert_eq!(snap.events_emitted, 5);
        assert_eq!(snap.resyncs, 0);
        assert_eq!(snap.rejoin_failures, 1);
    }
}
