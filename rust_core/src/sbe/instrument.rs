//! Template 1000: instrument definition.

use super::enums::{
    bool_from_wire, InstrumentKind, InstrumentState, InstrumentType, OptionType, SettlementPeriod,
};
use super::header::MessageHeader;
use super::reader::SbeReader;
use super::writer::SbeWriter;
use super::{read_block, SCHEMA_ID, SCHEMA_VERSION, TEMPLATE_INSTRUMENT};
use crate::error::DecodeError;
use crate::models::Instrument;

pub const BLOCK_LENGTH: u16 = 140;

pub fn decode(header: &MessageHeader, reader: &mut SbeReader<'_>) -> Result<Instrument, DecodeError> {
    let mut instrument = read_block(reader, "instrument", header.block_length, BLOCK_LENGTH, |r| {
        Ok(Instrument {
            instrument_id: r.read_u32()?,
            state: InstrumentState::from_wire(r.read_u8()?)?,
            kind: InstrumentKind::from_wire(r.read_u8()?)?,
            instrument_type: InstrumentType::from_wire(r.read_u8()?)?,
            option_type: OptionType::from_wire(r.read_u8()?)?,
            rfq: bool_from_wire("rfq", r.read_u8()?)?,
            settlement_period: SettlementPeriod::from_wire(r.read_u8()?)?,
            settlement_period_count: r.read_u16()?,
            base_currency: r.read_char_array::<8>("base_currency")?,
            quote_currency: r.read_char_array::<8>("quote_currency")?,
            counter_currency: r.read_char_array::<8>("counter_currency")?,
            settlement_currency: r.read_char_array::<8>("settlement_currency")?,
            size_currency: r.read_char_array::<8>("size_currency")?,
            creation_timestamp_ms: r.read_u64()?,
            expiration_timestamp_ms: r.read_u64()?,
            strike_price: r.read_f64()?,
            contract_size: r.read_f64()?,
            min_trade_amount: r.read_f64()?,
            tick_size: r.read_f64()?,
            maker_commission: r.read_f64()?,
            taker_commission: r.read_f64()?,
            block_trade_commission: r.read_f64()?,
            max_liquidation_commission: r.read_f64()?,
            max_leverage: r.read_f64()?,
            instrument_name: String::new(),
        })
    })?;

    instrument.instrument_name = reader.read_var_string("instrument_name")?;
    Ok(instrument)
}

pub fn encode(instrument: &Instrument, writer: &mut SbeWriter) {
    MessageHeader {
        block_length: BLOCK_LENGTH,
        template_id: TEMPLATE_INSTRUMENT,
        schema_id: SCHEMA_ID,
        version: SCHEMA_VERSION,
        num_groups: 0,
        num_var_data_fields: 1,
    }
    .encode(writer);

    writer.put_u32(instrument.instrument_id);
    writer.put_u8(instrument.state.to_wire());
    writer.put_u8(instrument.kind.to_wire());
    writer.put_u8(instrument.instrument_type.to_wire());
    writer.put_u8(instrument.option_type.to_wire());
    writer.put_u8(instrument.rfq as u8);
    writer.put_u8(instrument.settlement_period.to_wire());
    writer.put_u16(instrument.settlement_period_count);
    writer.put_char_array::<8>(&instrument.base_currency);
    writer.put_char_array::<8>(&instrument.quote_currency);
    writer.put_char_array::<8>(&instrument.counter_currency);
    writer.put_char_array::<8>(&instrument.settlement_currency);
    writer.put_char_array::<8>(&instrument.size_currency);
    writer.put_u64(instrument.creation_timestamp_ms);
    writer.put_u64(instrument.expiration_timestamp_ms);
    writer.put_f64(instrument.strike_price);
    writer.put_f64(instrument.contract_size);
    writer.put_f64(instrument.min_trade_amount);
    writer.put_f64(instrument.tick_size);
    writer.put_f64(instrument.maker_commission);
    writer.put_f64(instrument.taker_commission);
    writer.put_f64(instrument.block_trade_commission);
    writer.put_f64(instrument.max_liquidation_commission);
    writer.put_f64(instrument.max_leverage);
    writer.put_var_string(&instrument.instrument_name);
}

#[cfg(test)]
pub(crate) fn eth_put() -> Instrument {
    Instrument {
        instrument_id: 210762,
        instrument_name: "ETH-31MAR23-3500-P".to_string(),
        state: InstrumentState::Open,
        kind: InstrumentKind::Option,
        instrument_type: InstrumentType::NotApplicable,
        option_type: OptionType::Put,
        rfq: false,
        settlement_period: SettlementPeriod::Month,
        settlement_period_count: 1,
        base_currency: "ETH".to_string(),
        quote_currency: "ETH".to_string(),
        counter_currency: "USD".to_string(),
        settlement_currency: "ETH".to_string(),
        size_currency: "ETH".to_string(),
        creation_timestamp_ms: 1_664_784_000_000,
        expiration_timestamp_ms: 1_680_249_600_000,
        strike_price: 3500.0,
        contract_size: 1.0,
        min_trade_amount: 1.0,
        tick_size: 0.0005,
        maker_commission: 0.0003,
        taker_commission: 0.0003,
        block_trade_commission: 0.0003,
        max_liquidation_commission: f64::NAN,
        max_leverage: f64::NAN,
    }
}
