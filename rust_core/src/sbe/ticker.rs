//! Template 1003: ticker snapshot.

use super::enums::InstrumentState;
use super::header::MessageHeader;
use super::reader::SbeReader;
use super::writer::SbeWriter;
use super::{read_block, SCHEMA_ID, SCHEMA_VERSION, TEMPLATE_TICKER};
use crate::error::DecodeError;

pub const BLOCK_LENGTH: u16 = 133;

const EMPTY_SIDE: u64 = u64::MAX;

#[derive(Debug, Clone, PartialEq)]
pub struct Ticker {
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

/// Best bid/ask price: all bits set means the side is empty.
fn read_side_price(reader: &mut SbeReader<'_>) -> Result<Option<f64>, DecodeError> {
    let bits = reader.read_u64()?;
    Ok((bits != EMPTY_SIDE).then(|| f64::from_bits(bits)))
}

pub fn decode(header: &MessageHeader, reader: &mut SbeReader<'_>) -> Result<Ticker, DecodeError> {
    read_block(reader, "ticker", header.block_length, BLOCK_LENGTH, |r| {
        Ok(Ticker {
            instrument_id: r.read_u32()?,
            state: InstrumentState::from_wire(r.read_u8()?)?,
            timestamp_ms: r.read_u64()?,
            open_interest: r.read_f64()?,
            min_sell_price: r.read_f64()?,
            max_buy_price: r.read_f64()?,
            last_price: r.read_f64()?,
            index_price: r.read_f64()?,
            mark_price: r.read_f64()?,
            best_bid_price: read_side_price(r)?,
            best_bid_amount: r.read_f64()?,
            best_ask_price: read_side_price(r)?,
            best_ask_amount: r.read_f64()?,
            current_funding: r.read_f64()?,
            funding_8h: r.read_f64()?,
            estimated_delivery_price: r.read_f64()?,
            delivery_price: r.read_f64()?,
            settlement_price: r.read_f64()?,
        })
    })
}

pub fn encode(ticker: &Ticker, writer: &mut SbeWriter) {
    MessageHeader {
        block_length: BLOCK_LENGTH,
        template_id: TEMPLATE_TICKER,
        schema_id: SCHEMA_ID,
        version: SCHEMA_VERSION,
        num_groups: 0,
        num_var_data_fields: 0,
    }
    .encode(writer);

    writer.put_u32(ticker.instrument_id);
    writer.put_u8(ticker.state.to_wire());
    writer.put_u64(ticker.timestamp_ms);
    writer.put_f64(ticker.open_interest);
    writer.put_f64(ticker.min_sell_price);
    writer.put_f64(ticker.max_buy_price);
    writer.put_f64(ticker.last_price);
    writer.put_f64(ticker.index_price);
    writer.put_f64(ticker.mark_price);
    writer.put_optional_f64(ticker.best_bid_price);
    writer.put_f64(ticker.best_bid_amount);
    writer.put_optional_f64(ticker.best_ask_price);
    writer.put_f64(ticker.best_ask_amount);
    writer.put_f64(ticker.current_funding);
    writer.put_f64(ticker.funding_8h);
    writer.put_f64(ticker.estimated_delivery_price);
    writer.put_f64(ticker.delivery_price);
    writer.put_f64(ticker.settlement_price);
}

#[cfg(test)]
pub(crate) fn btc_perpetual_ticker(instrument_id: u32) -> Ticker {
    Ticker {
        instrument_id,
        state: InstrumentState::Open,
        timestamp_ms: 1_680_000_000_000,
        open_interest: 512_000_000.0,
        min_sell_price: 27_000.0,
        max_buy_price: 28_000.0,
        last_price: 27_500.0,
        index_price: 27_490.0,
        mark_price: 27_495.0,
        best_bid_price: None,
        best_bid_amount: 0.0,
        best_ask_price: None,
        best_ask_amount: 0.0,
        current_funding: f64::NAN,
        funding_8h: f64::NAN,
        estimated_delivery_price: 27_490.0,
        delivery_price: f64::NAN,
        settlement_price: 27_450.0,
    }
}
