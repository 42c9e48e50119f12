//! Periodic feed statistics

use chrono::Utc;
use deribit_multicast::{FeedStats, FeedStatsSnapshot};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Log counters every `interval` until the task is aborted.
pub fn spawn_stats_logger(stats: Arc<FeedStats>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // First tick completes immediately
        ticker.tick().await;
        let mut previous = stats.snapshot();

        loop {
            ticker.tick().await;
            let current = stats.snapshot();
            report(&previous, &current);
            previous = current;
        }
    })
}

fn report(previous: &FeedStatsSnapshot, current: &FeedStatsSnapshot) {
    let packets = current.packets_received - previous.packets_received;
    let lost = current.packets_lost - previous.packets_lost;
    let errors = (current.decode_errors + current.malformed_packets)
        - (previous.decode_errors + previous.malformed_packets);
    let rejoin_failures = current.rejoin_failures - previous.rejoin_failures;

    info!(
        "Feed stats: packets={} (+{}), messages={}, events={}, duplicates={}, lost={}, resyncs={}",
        current.packets_received,
        packets,
        current.messages_decoded,
        current.events_emitted,
        current.duplicates,
        current.packets_lost,
        current.resyncs
    );

    if rejoin_failures > 0 {
        error!("Multicast client is down: {} failed rejoin(s) since last report", rejoin_failures);
    }
    if packets == 0 {
        warn!("No multicast packets received since last report");
    }
    if lost > 0 || errors > 0 {
        warn!("{} packets lost and {} decode errors since last report", lost, errors);
    }

    let health = serde_json::json!({
        "service": "multicast_listener_rust",
        "healthy": is_healthy(previous, current),
        "stats": current,
        "timestamp": Utc::now().to_rfc3339(),
    });
    debug!("Health: {}", health);
}

/// Packets arrived and no resync left the client down.
fn is_healthy(previous: &FeedStatsSnapshot, current: &FeedStatsSnapshot) -> bool {
    current.packets_received > previous.packets_received
        && current.rejoin_failures == previous.rejoin_failures
}
