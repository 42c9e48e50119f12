//! Logging listeners registered on the event bus

use crate::config::ListenerConfig;
use deribit_multicast::channels::{
    book_channel, instrument_channel, ticker_channel, trades_channel, UNKNOWN_TRADES_CHANNEL,
};
use deribit_multicast::models::{Event, InstrumentKind};
use deribit_multicast::{EventBus, ListenerId};
use tracing::{debug, info};

const KINDS: [InstrumentKind; 4] = [
    InstrumentKind::Future,
    InstrumentKind::Option,
    InstrumentKind::FutureCombo,
    InstrumentKind::OptionCombo,
];

/// Channels the service listens on for `config`.
pub fn channels_for(config: &ListenerConfig) -> Vec<String> {
    let mut channels = Vec::new();
    for currency in &config.multicast.currencies {
        for kind in KINDS {
            channels.push(instrument_channel(kind, currency));
            channels.push(trades_channel(kind, currency));
        }
    }
    channels.push(UNKNOWN_TRADES_CHANNEL.to_string());
    for name in &config.watch_instruments {
        channels.push(book_channel(name));
        channels.push(ticker_channel(name));
    }
    channels
}

/// Register one logging listener per channel. Returns the ids so callers
/// can unsubscribe.
pub fn subscribe_logging(bus: &EventBus, config: &ListenerConfig) -> Vec<(String, ListenerId)> {
    let log_payloads = config.log_payloads;
    channels_for(config)
        .into_iter()
        .map(|channel| {
            let name = channel.clone();
            let id = bus.on(&channel, move |event| log_event(&name, event, log_payloads));
            (channel, id)
        })
        .collect()
}

fn log_event(channel: &str, event: &Event, log_payloads: bool) {
    match event {
        Event::Instrument(instrument) => info!(
            "[{}] {} id={} state={} expires={:?}",
            channel,
            instrument.instrument_name,
            instrument.instrument_id,
            instrument.state,
            instrument.expires_at()
        ),
        Event::Trades(trades) => {
            for trade in trades {
                info!(
                    "[{}] {} {} {} @ {} (trade {})",
                    channel,
                    trade.instrument_name,
                    trade.direction,
                    trade.amount,
                    trade.price,
                    trade.trade_id
                );
            }
        }
        Event::Book(book) => debug!(
            "[{}] change {} -> {}: {} bids, {} asks",
            channel,
            book.prev_change_id,
            book.change_id,
            book.bids().count(),
            book.asks().count()
        ),
        Event::Ticker(ticker) => debug!(
            "[{}] mark={} bid={:?} ask={:?} spread={:?}",
            channel,
            ticker.mark_price,
            ticker.best_bid_price,
            ticker.best_ask_price,
            ticker.spread()
        ),
    }

    if log_payloads {
        match serde_json::to_string(event) {
            Ok(json) => debug!("[{}] {}", channel, json),
            Err(e) => debug!("[{}] {} payload not serializable: {}", channel, event.kind(), e),
        }
    }
}
