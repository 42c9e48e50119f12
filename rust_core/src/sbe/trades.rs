//! Template 1002: trade prints for one instrument.

use super::enums::{Direction, Liquidation, TickDirection};
use super::header::{GroupHeader, MessageHeader};
use super::reader::SbeReader;
use super::writer::SbeWriter;
use super::{read_block, read_group, SCHEMA_ID, SCHEMA_VERSION, TEMPLATE_TRADES};
use crate::error::DecodeError;

pub const BLOCK_LENGTH: u16 = 4;
pub const TRADE_BLOCK_LENGTH: u16 = 83;

#[derive(Debug, Clone, PartialEq)]
pub struct TradeRecord {
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
    pub iv: f64,
    pub block_trade_id: Option<u64>,
    pub combo_trade_id: Option<u64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Trades {
    pub instrument_id: u32,
    pub trades: Vec<TradeRecord>,
}

pub fn decode(header: &MessageHeader, reader: &mut SbeReader<'_>) -> Result<Trades, DecodeError> {
    let instrument_id = read_block(reader, "trades", header.block_length, BLOCK_LENGTH, |r| {
        r.read_u32()
    })?;

    let trades = read_group(reader, "trade", TRADE_BLOCK_LENGTH, |r| {
        Ok(TradeRecord {
            direction: Direction::from_wire(r.read_u8()?)?,
            price: r.read_f64()?,
            amount: r.read_f64()?,
            timestamp_ms: r.read_u64()?,
            mark_price: r.read_f64()?,
            index_price: r.read_f64()?,
            trade_seq: r.read_u64()?,
            trade_id: r.read_u64()?,
            tick_direction: TickDirection::from_wire(r.read_u8()?)?,
            liquidation: Liquidation::from_wire(r.read_u8()?)?,
            iv: r.read_f64()?,
            block_trade_id: r.read_optional_u64()?,
            combo_trade_id: r.read_optional_u64()?,
        })
    })?;

    Ok(Trades {
        instrument_id,
        trades,
    })
}

pub fn encode(trades: &Trades, writer: &mut SbeWriter) {
    MessageHeader {
        block_length: BLOCK_LENGTH,
        template_id: TEMPLATE_TRADES,
        schema_id: SCHEMA_ID,
        version: SCHEMA_VERSION,
        num_groups: 1,
        num_var_data_fields: 0,
    }
    .encode(writer);

    writer.put_u32(trades.instrument_id);
    debug_assert!(
        trades.trades.len() <= u16::MAX as usize,
        "{} trades entries exceed the group count",
        trades.trades.len()
    );
    GroupHeader {
        block_length: TRADE_BLOCK_LENGTH,
        num_in_group: trades.trades.len() as u16,
    }
    .encode(writer);

    for t in &trades.trades {
        writer.put_u8(t.direction.to_wire());
        writer.put_f64(t.price);
        writer.put_f64(t.amount);
        writer.put_u64(t.timestamp_ms);
        writer.put_f64(t.mark_price);
        writer.put_f64(t.index_price);
        writer.put_u64(t.trade_seq);
        writer.put_u64(t.trade_id);
        writer.put_u8(t.tick_direction.to_wire());
        writer.put_u8(t.liquidation.to_wire());
        writer.put_f64(t.iv);
        writer.put_optional_u64(t.block_trade_id);
        writer.put_optional_u64(t.combo_trade_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(trade_id: u64, block_trade_id: Option<u64>) -> TradeRecord {
        TradeRecord {
            direction: Direction::Sell,
            price: 27_500.5,
            amount: 1200.0,
            timestamp_ms: 1_680_000_000_000,
            mark_price: 27_499.8,
            index_price: 27_480.1,
            trade_seq: 99,
            trade_id,
            tick_direction: TickDirection::ZeroMinus,
            liquidation: Liquidation::None,
            iv: f64::NAN,
            block_trade_id,
            combo_trade_id: None,
        }
    }

    #[test]
    fn test_trades_decode() {
        let msg = Trades {
            instrument_id: 124972,
            trades: vec![record(1, None), record(2, Some(777))],
        };
        let mut writer = SbeWriter::new();
        encode(&msg, &mut writer);
        assert_eq!(
            writer.len(),
            MessageHeader::SIZE + 4 + GroupHeader::SIZE + 2 * TRADE_BLOCK_LENGTH as usize
        );

        let mut reader = SbeReader::new(writer.as_bytes());
        let header = MessageHeader::decode(&mut reader).unwrap();
        let decoded = decode(&header, &mut reader).unwrap();

        assert!(reader.is_empty());
        assert_eq!(decoded.instrument_id, 124972);
        assert_eq!(decoded.trades.len(), 2);
        assert_eq!(decoded.trades[0].block_trade_id, None);
        assert_eq!(decoded.trades[1].block_trade_id, Some(777));
        assert_eq!(decoded.trades[1].combo_trade_id, None);
        assert_eq!(decoded.trades[0].tick_direction, TickDirection::ZeroMinus);
        assert!(decoded.trades[0].iv.is_nan());
    }

    #[test]
    fn test_empty_group() {
        let msg = Trades {
            instrument_id: 7,
            trades: Vec::new(),
        };
        let mut writer = SbeWriter::new();
        encode(&msg, &mut writer);

        let mut reader = SbeReader::new(writer.as_bytes());
        let header = MessageHeader::decode(&mut reader).unwrap();
        assert!(decode(&header, &mut reader).unwrap().trades.is_empty());
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "trades entries exceed the group count")]
    fn test_oversized_group_rejected() {
        let msg = Trades {
            instrument_id: 7,
            trades: vec![record(1, None); u16::MAX as usize + 1],
        };
        encode(&msg, &mut SbeWriter::new());
    }
}
