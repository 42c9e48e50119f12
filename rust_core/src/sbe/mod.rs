//! SBE codec for the Deribit multicast schema
//!
//! Decodes (and encodes) the four templates carried on the feed:
//! - 1000 Instrument: fixed block + name tail
//! - 1001 Book: fixed block + one group of level changes
//! - 1002 Trades: instrument id + one group of trade prints
//! - 1003 Ticker: fixed block only
//!
//! A datagram payload holds one or more messages back to back; use
//! [`MessageIter`] to walk them.

pub mod book;
pub mod enums;
pub mod header;
pub mod instrument;
pub mod reader;
pub mod ticker;
pub mod trades;
pub mod writer;

pub use book::Book;
pub use header::{GroupHeader, MessageHeader, PackageHeader};
pub use reader::SbeReader;
pub use ticker::Ticker;
pub use trades::{TradeRecord, Trades};
pub use writer::SbeWriter;

use crate::error::DecodeError;
use crate::models::Instrument;

pub const SCHEMA_ID: u16 = 1;
pub const SCHEMA_VERSION: u16 = 1;

pub const TEMPLATE_INSTRUMENT: u16 = 1000;
pub const TEMPLATE_BOOK: u16 = 1001;
pub const TEMPLATE_TRADES: u16 = 1002;
pub const TEMPLATE_TICKER: u16 = 1003;

/// Decoder switches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecoderConfig {
    /// Run the semantic validation pass on every decoded message
    pub validate: bool,
}

/// One decoded message, instrument ids not yet resolved.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Instrument(Instrument),
    Book(Book),
    Trades(Trades),
    Ticker(Ticker),
}

impl Message {
    pub fn template_id(&self) -> u16 {
        match self {
            Message::Instrument(_) => TEMPLATE_INSTRUMENT,
            Message::Book(_) => TEMPLATE_BOOK,
            Message::Trades(_) => TEMPLATE_TRADES,
            Message::Ticker(_) => TEMPLATE_TICKER,
        }
    }

    pub fn instrument_id(&self) -> u32 {
        match self {
            Message::Instrument(i) => i.instrument_id,
            Message::Book(b) => b.instrument_id,
            Message::Trades(t) => t.instrument_id,
            Message::Ticker(t) => t.instrument_id,
        }
    }
}

/// Reads a fixed block of `block_length` bytes whose known fields take
/// `expected` bytes. Trailing padding is skipped.
pub(crate) fn read_block<'a, T>(
    reader: &mut SbeReader<'a>,
    context: &'static str,
    block_length: u16,
    expected: u16,
    decode: impl FnOnce(&mut SbeReader<'a>) -> Result<T, DecodeError>,
) -> Result<T, DecodeError> {
    if block_length < expected {
        return Err(DecodeError::BlockTooShort {
            context,
            expected,
            actual: block_length,
        });
    }
    let start = reader.position();
    let value = decode(reader)?;
    let consumed = reader.position() - start;
    reader.skip(block_length as usize - consumed)?;
    Ok(value)
}

/// Reads a repeating group whose elements carry `expected` bytes of known fields.
pub(crate) fn read_group<'a, T>(
    reader: &mut SbeReader<'a>,
    context: &'static str,
    expected: u16,
    mut decode: impl FnMut(&mut SbeReader<'a>) -> Result<T, DecodeError>,
) -> Result<Vec<T>, DecodeError> {
    let group = GroupHeader::decode(reader)?;
    let mut items = Vec::with_capacity(group.num_in_group as usize);
    for _ in 0..group.num_in_group {
        items.push(read_block(reader, context, group.block_length, expected, &mut decode)?);
    }
    Ok(items)
}

/// Decodes the body that follows an already-read message header.
pub fn decode_body(
    header: &MessageHeader,
    reader: &mut SbeReader<'_>,
) -> Result<Message, DecodeError> {
    match header.template_id {
        TEMPLATE_INSTRUMENT => instrument::decode(header, reader).map(Message::Instrument),
        TEMPLATE_BOOK => book::decode(header, reader).map(Message::Book),
        TEMPLATE_TRADES => trades::decode(header, reader).map(Message::Trades),
        TEMPLATE_TICKER => ticker::decode(header, reader).map(Message::Ticker),
        other => Err(DecodeError::UnsupportedTemplate(other)),
    }
}

/// Decodes exactly one message at the reader's position.
///
/// On success the reader sits after the message (and any padding). On
/// failure it is left at the start of the message, so an unsupported
/// template does not consume the rest of the payload.
pub fn decode_message(
    reader: &mut SbeReader<'_>,
    config: DecoderConfig,
) -> Result<Message, DecodeError> {
    decode_framed(reader, config).map(|(_, message)| message)
}

fn decode_framed(
    reader: &mut SbeReader<'_>,
    config: DecoderConfig,
) -> Result<(MessageHeader, Message), DecodeError> {
    let mut cursor = reader.clone();
    let header = MessageHeader::decode(&mut cursor)?;
    let message = decode_body(&header, &mut cursor)?;
    if config.validate {
        validate(&header, &message)?;
    }
    *reader = cursor;
    Ok((header, message))
}

/// Semantic checks beyond what the wire format enforces.
pub fn validate(header: &MessageHeader, message: &Message) -> Result<(), DecodeError> {
    if header.schema_id != SCHEMA_ID {
        return Err(DecodeError::Validation(format!(
            "unexpected schema id {}",
            header.schema_id
        )));
    }

    match message {
        Message::Instrument(i) if i.instrument_name.is_empty() => Err(DecodeError::Validation(
            format!("instrument {} has an empty name", i.instrument_id),
        )),
        Message::Book(b) => {
            if b.change_id < b.prev_change_id {
                return Err(DecodeError::Validation(format!(
                    "book change id {} precedes previous {}",
                    b.change_id, b.prev_change_id
                )));
            }
            if let Some(c) = b
                .changes
                .iter()
                .find(|c| !c.price.is_finite() || c.amount.is_nan() || c.amount < 0.0)
            {
                return Err(DecodeError::Validation(format!(
                    "book level {} x {} for instrument {}",
                    c.price, c.amount, b.instrument_id
                )));
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

/// Walks the messages of one packet payload.
///
/// Yields each decoded message in order. The first error is yielded once and
/// ends the iteration; the remainder of the payload is abandoned.
pub struct MessageIter<'a> {
    reader: SbeReader<'a>,
    config: DecoderConfig,
    last_template_id: Option<u16>,
    done: bool,
}

impl<'a> MessageIter<'a> {
    pub fn new(payload: &'a [u8], config: DecoderConfig) -> Self {
        Self {
            reader: SbeReader::new(payload),
            config,
            last_template_id: None,
            done: false,
        }
    }

    /// Template id of the most recent header read, if one could be read.
    pub fn last_template_id(&self) -> Option<u16> {
        self.last_template_id
    }

    /// Offset of the next unread byte in the payload.
    pub fn position(&self) -> usize {
        self.reader.position()
    }
}

impl<'a> Iterator for MessageIter<'a> {
    type Item = Result<Message, DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done || self.reader.is_empty() {
            return None;
        }

        self.last_template_id = MessageHeader::decode(&mut self.reader.clone())
            .ok()
            .map(|h| h.template_id);

        match decode_framed(&mut self.reader, self.config) {
            Ok((_, message)) => Some(Ok(message)),
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

impl std::iter::FusedIterator for MessageIter<'_> {}

/// Appends one message, header included.
pub fn encode_message(message: &Message, writer: &mut SbeWriter) {
    match message {
        Message::Instrument(i) => instrument::encode(i, writer),
        Message::Book(b) => book::encode(b, writer),
        Message::Trades(t) => trades::encode(t, writer),
        Message::Ticker(t) => ticker::encode(t, writer),
    }
}

/// Builds a complete datagram: package header followed by `messages`.
pub fn encode_packet(channel_id: u16, sequence: u32, messages: &[Message]) -> Vec<u8> {
    let mut writer = SbeWriter::with_capacity(256);
    PackageHeader {
        payload_length: 0,
        channel_id,
        sequence,
    }
    .encode(&mut writer);

    for message in messages {
        encode_message(message, &mut writer);
    }

    let payload_length = (writer.len() - PackageHeader::SIZE).min(u16::MAX as usize) as u16;
    writer.patch_u16(0, payload_length);
    writer.into_bytes()
}
