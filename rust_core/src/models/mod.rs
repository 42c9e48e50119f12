// Domain models delivered to listeners
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

pub use crate::sbe::enums::{
    BookAction, BookSide, Direction, InstrumentKind, InstrumentState, InstrumentType,
    Liquidation, OptionType, SettlementPeriod, TickDirection,
};
use crate::sbe::{Book, Ticker, TradeRecord};

fn millis_to_datetime(ms: u64) -> Option<DateTime<Utc>> {
    i64::try_from(ms)
        .ok()
        .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
}

// ============================================================================
// Instrument
// ============================================================================

/// Static definition of a tradable instrument.
///
/// Built from an Instrument message on the feed or from the REST instrument
/// list during a registry rebuild.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instrument {
    pub instrument_id: u32,
    pub instrument_name: String,
    pub state: InstrumentState,
    pub kind: InstrumentKind,
    pub instrument_type: InstrumentType,
    pub option_type: OptionType,
    pub rfq: bool,
    pub settlement_period: SettlementPeriod,
    pub settlement_period_count: u16,
    pub base_currency: String,
    pub quote_currency: String,
    pub counter_currency: String,
    pub settlement_currency: String,
    pub size_currency: String,
    pub creation_timestamp_ms: u64,
    pub expiration_timestamp_ms: u64,
    pub strike_price: f64,
    pub contract_size: f64,
    pub min_trade_amount: f64,
    pub tick_size: f64,
    pub maker_commission: f64,
    pub taker_commission: f64,
    /// NaN when block trading is not offered
    pub block_trade_commission: f64,
    pub max_liquidation_commission: f64,
    pub max_leverage: f64,
}

impl Instrument {
    pub fn is_active(&self) -> bool {
        self.state.is_active()
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        millis_to_datetime(self.creation_timestamp_ms)
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        millis_to_datetime(self.expiration_timestamp_ms)
    }
}

// ============================================================================
// Order Book
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BookChange {
    pub side: BookSide,
    pub action: BookAction,
    pub price: f64,
    pub amount: f64,
}

/// Incremental order book update for one instrument.
///
/// `prev_change_id` / `change_id` are passed through untouched; a consumer
/// rebuilding the book should resubscribe when they stop being contiguous.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookEvent {
    pub instrument_name: String,
    pub instrument_id: u32,
    pub timestamp_ms: u64,
    pub prev_change_id: u64,
    pub change_id: u64,
    pub is_last: bool,
    pub changes: Vec<BookChange>,
}

impl BookEvent {
    pub fn new(book: Book, instrument_name: String) -> Self {
        Self {
            instrument_name,
            instrument_id: book.instrument_id,
            timestamp_ms: book.timestamp_ms,
            prev_change_id: book.prev_change_id,
            change_id: book.change_id,
            is_last: book.is_last,
            changes: book.changes,
        }
    }

    pub fn bids(&self) -> impl Iterator<Item = &BookChange> {
        self.changes.iter().filter(|c| c.side == BookSide::Bid)
    }

    pub fn asks(&self) -> impl Iterator<Item = &BookChange> {
        self.changes.iter().filter(|c| c.side == BookSide::Ask)
    }

    /// True when this update directly follows `previous_change_id`.
    pub fn follows(&self, previous_change_id: u64) -> bool {
        self.prev_change_id == previous_change_id
    }
}

// ============================================================================
// Trades
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub instrument_name: String,
    pub instrument_id: u32,
    pub direction: Direction,
    pub price: f64,
    pub amount: f64,
    pub timestamp_ms: u64,
    pub mark_price: f64,
    pub index_price: f64,
    pub trade_seq: u64,
    pub trade_id: u64,
    pub tick_direction: TickDirection,
    pub liquidation: Liquidation,
    /// Implied volatility, NaN for non-option trades
    pub iv: f64,
    pub block_trade_id: Option<u64>,
    pub combo_trade_id: Option<u64>,
}

impl Trade {
    pub fn new(record: TradeRecord, instrument_id: u32, instrument_name: String) -> Self {
        Self {
            instrument_name,
            instrument_id,
            direction: record.direction,
            price: record.price,
            amount: record.amount,
            timestamp_ms: record.timestamp_ms,
            mark_price: record.mark_price,
            index_price: record.index_price,
            trade_seq: record.trade_seq,
            trade_id: record.trade_id,
            tick_direction: record.tick_direction,
            liquidation: record.liquidation,
            iv: record.iv,
            block_trade_id: record.block_trade_id,
            combo_trade_id: record.combo_trade_id,
        }
    }

    pub fn is_block_trade(&self) -> bool {
        self.block_trade_id.is_some()
    }
}

// ============================================================================
// Ticker
// ============================================================================

/// Top-of-book and reference prices for one instrument.
///
/// Fields the exchange does not publish for an instrument arrive as NaN and
/// stay NaN. Best bid/ask prices are `None` on an empty side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickerEvent {
    pub instrument_name: String,
    pub instrument_id: u32,
    pub state: InstrumentState,
    pub timestamp_ms: u64,
    pub open_interest: f64,
    pub min_sell_price: f64,
    pub max_buy_price: f64,
    pub last_price: f64,
    pub index_price: f64,
    pub mark_price: f64,
    pub best_bid_price: Option<f64>,
    pub best_bid_amount: f64,
    pub best_ask_price: Option<f64>,
    pub best_ask_amount: f64,
    pub current_funding: f64,
    pub funding_8h: f64,
    pub estimated_delivery_price: f64,
    pub delivery_price: f64,
    pub settlement_price: f64,
}

impl TickerEvent {
    pub fn new(ticker: Ticker, instrument_name: String) -> Self {
        Self {
            instrument_name,
            instrument_id: ticker.instrument_id,
            state: ticker.state,
            timestamp_ms: ticker.timestamp_ms,
            open_interest: ticker.open_interest,
            min_sell_price: ticker.min_sell_price,
            max_buy_price: ticker.max_buy_price,
            last_price: ticker.last_price,
            index_price: ticker.index_price,
            mark_price: ticker.mark_price,
            best_bid_price: ticker.best_bid_price,
            best_bid_amount: ticker.best_bid_amount,
            best_ask_price: ticker.best_ask_price,
            best_ask_amount: ticker.best_ask_amount,
            current_funding: ticker.current_funding,
            funding_8h: ticker.funding_8h,
            estimated_delivery_price: ticker.estimated_delivery_price,
            delivery_price: ticker.delivery_price,
            settlement_price: ticker.settlement_price,
        }
    }

    pub fn mid_price(&self) -> Option<f64> {
        match (self.best_bid_price, self.best_ask_price) {
            (Some(bid), Some(ask)) => Some((bid + ask) / 2.0),
            _ => None,
        }
    }

    pub fn spread(&self) -> Option<f64> {
        match (self.best_bid_price, self.best_ask_price) {
            (Some(bid), Some(ask)) => Some(ask - bid),
            _ => None,
        }
    }
}

// ============================================================================
// Event (what listeners receive)
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum Event {
    Instrument(Instrument),
    Book(BookEvent),
    Trades(Vec<Trade>),
    Ticker(TickerEvent),
}

impl Event {
    /// Label for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Event::Instrument(_) => "instrument",
            Event::Book(_) => "book",
            Event::Trades(_) => "trades",
            Event::Ticker(_) => "ticker",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn change(side: BookSide, price: f64) -> BookChange {
        BookChange {
            side,
            action: BookAction::New,
            price,
            amount: 1.0,
        }
    }

    #[test]
    fn test_book_event_sides() {
        let event = BookEvent {
            instrument_name: "BTC-PERPETUAL".to_string(),
            instrument_id: 1,
            timestamp_ms: 0,
            prev_change_id: 10,
            change_id: 11,
            is_last: true,
            changes: vec![
                change(BookSide::Bid, 100.0),
                change(BookSide::Ask, 101.0),
                change(BookSide::Bid, 99.5),
            ],
        };

        assert_eq!(event.bids().count(), 2);
        assert_eq!(event.asks().count(), 1);
        assert!(event.follows(10));
        assert!(!event.follows(9));
    }

    #[test]
    fn test_ticker_mid_requires_both_sides() {
        let mut ticker = TickerEvent {
            instrument_name: "ETH-PERPETUAL".to_string(),
            instrument_id: 2,
            state: InstrumentState::Open,
            timestamp_ms: 0,
            open_interest: f64::NAN,
            min_sell_price: 0.0,
            max_buy_price: 0.0,
            last_price: f64::NAN,
            index_price: 0.0,
            mark_price: 0.0,
            best_bid_price: Some(1000.0),
            best_bid_amount: 5.0,
            best_ask_price: None,
            best_ask_amount: 0.0,
            current_funding: f64::NAN,
            funding_8h: f64::NAN,
            estimated_delivery_price: f64::NAN,
            delivery_price: f64::NAN,
            settlement_price: f64::NAN,
        };
        assert_eq!(ticker.mid_price(), None);

        ticker.best_ask_price = Some(1002.0);
        assert_eq!(ticker.mid_price(), Some(1001.0));
        assert_eq!(ticker.spread(), Some(2.0));
    }

    #[test]
    fn test_millis_to_datetime() {
        let dt = millis_to_datetime(1_680_249_600_000).unwrap();
        assert_eq!(dt.format("%Y-%m-%d").to_string(), "2023-03-31");
        assert!(millis_to_datetime(u64::MAX).is_none());
    }
}
