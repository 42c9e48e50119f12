//! Channel names consumers subscribe to.
//!
//! - `book.<instrument_name>`
//! - `trades.<kind>.<base_currency>`
//! - `ticker.<instrument_name>`
//! - `instrument.<kind>.<base_currency>`

use crate::models::{Instrument, InstrumentKind};

/// Used for trades whose instrument is not in the registry yet.
pub const UNKNOWN_TRADES_CHANNEL: &str = "trades.any.any";

pub fn book_channel(instrument_name: &str) -> String {
    format!("book.{}", instrument_name)
}

pub fn ticker_channel(instrument_name: &str) -> String {
    format!("ticker.{}", instrument_name)
}

pub fn trades_channel(kind: InstrumentKind, base_currency: &str) -> String {
    format!("trades.{}.{}", kind, base_currency)
}

pub fn instrument_channel(kind: InstrumentKind, base_currency: &str) -> String {
    format!("instrument.{}.{}", kind, base_currency)
}

/// Trades channel for a possibly unknown instrument.
pub fn trades_channel_for(instrument: Option<&Instrument>) -> String {
    instrument
        .map(|i| trades_channel(i.kind, &i.base_currency))
        .unwrap_or_else(|| UNKNOWN_TRADES_CHANNEL.to_string())
}

pub fn instrument_channel_for(instrument: &Instrument) -> String {
    instrument_channel(instrument.kind, &instrument.base_currency)
}
