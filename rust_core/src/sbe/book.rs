//! Template 1001: incremental order book changes.

use super::enums::{bool_from_wire, BookAction, BookSide};
use super::header::{GroupHeader, MessageHeader};
use super::reader::SbeReader;
use super::writer::SbeWriter;
use super::{read_block, read_group, SCHEMA_ID, SCHEMA_VERSION, TEMPLATE_BOOK};
use crate::error::DecodeError;
use crate::models::BookChange;

pub const BLOCK_LENGTH: u16 = 29;
pub const CHANGE_BLOCK_LENGTH: u16 = 18;

/// Decoded book message before the instrument id is resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct Book {
    pub instrument_id: u32,
    pub timestamp_ms: u64,
    pub prev_change_id: u64,
    pub change_id: u64,
    pub is_last: bool,
    pub changes: Vec<BookChange>,
}

pub fn decode(header: &MessageHeader, reader: &mut SbeReader<'_>) -> Result<Book, DecodeError> {
    let (instrument_id, timestamp_ms, prev_change_id, change_id, is_last) =
        read_block(reader, "book", header.block_length, BLOCK_LENGTH, |r| {
            Ok((
                r.read_u32()?,
                r.read_u64()?,
                r.read_u64()?,
                r.read_u64()?,
                bool_from_wire("is_last", r.read_u8()?)?,
            ))
        })?;

    let changes = read_group(reader, "book_change", CHANGE_BLOCK_LENGTH, |r| {
        Ok(BookChange {
            side: BookSide::from_wire(r.read_u8()?)?,
            action: BookAction::from_wire(r.read_u8()?)?,
            price: r.read_f64()?,
            amount: r.read_f64()?,
        })
    })?;

    Ok(Book {
        instrument_id,
        timestamp_ms,
        prev_change_id,
        change_id,
        is_last,
        changes,
    })
}

pub fn encode(book: &Book, writer: &mut SbeWriter) {
    MessageHeader {
        block_length: BLOCK_LENGTH,
        template_id: TEMPLATE_BOOK,
        schema_id: SCHEMA_ID,
        version: SCHEMA_VERSION,
        num_groups: 1,
        num_var_data_fields: 0,
    }
    .encode(writer);

    writer.put_u32(book.instrument_id);
    writer.put_u64(book.timestamp_ms);
    writer.put_u64(book.prev_change_id);
    writer.put_u64(book.change_id);
    writer.put_u8(book.is_last as u8);

    debug_assert!(
        book.changes.len() <= u16::MAX as usize,
        "{} book entries exceed the group count",
        book.changes.len()
    );
    GroupHeader {
        block_length: CHANGE_BLOCK_LENGTH,
        num_in_group: book.changes.len() as u16,
    }
    .encode(writer);
    for change in &book.changes {
        writer.put_u8(change.side.to_wire());
        writer.put_u8(change.action.to_wire());
        writer.put_f64(change.price);
        writer.put_f64(change.amount);
    }
}
