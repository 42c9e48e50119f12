//! Error types for the multicast feed
//!
//! - `DecodeError`: one SBE message could not be decoded
//! - `SequenceError`: a packet broke the channel's sequence (loss or reset)
//! - `FeedError`: anything that aborts handling of a single datagram

use thiserror::Error;

/// Failure to decode a single SBE message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("unexpected end of stream: needed {needed} bytes at offset {offset}, {remaining} left")]
    EndOfStream {
        offset: usize,
        needed: usize,
        remaining: usize,
    },

    #[error("unsupported template id {0}")]
    UnsupportedTemplate(u16),

    #[error("value {value} out of range for {field}")]
    OutOfRange { field: &'static str, value: u64 },

    #[error("block length {actual} shorter than the {expected} bytes required by {context}")]
    BlockTooShort {
        context: &'static str,
        expected: u16,
        actual: u16,
    },

    #[error("invalid utf-8 in {0}")]
    InvalidUtf8(&'static str),

    #[error("validation failed: {0}")]
    Validation(String),
}

/// Sequence breaks that require resynchronization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SequenceError {
    #[error("packet(s) lost on channel {channel_id}: expected {expected}, got {received}")]
    Lost {
        channel_id: u16,
        expected: u32,
        received: u32,
    },

    #[error("connection reset on channel {channel_id}: last {last}, got {received}")]
    Reset {
        channel_id: u16,
        last: u32,
        received: u32,
    },
}

impl SequenceError {
    pub fn channel_id(&self) -> u16 {
        match self {
            SequenceError::Lost { channel_id, .. } | SequenceError::Reset { channel_id, .. } => {
                *channel_id
            }
        }
    }
}

/// Errors raised while handling one datagram.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FeedError {
    #[error("malformed package header: {0}")]
    Header(DecodeError),

    #[error(transparent)]
    Sequence(#[from] SequenceError),

    #[error("decode failed on channel {channel_id} (template {template_id:?}): {source}")]
    Decode {
        channel_id: u16,
        /// `None` when the message header itself could not be read
        template_id: Option<u16>,
        #[source]
        source: DecodeError,
    },
}

impl FeedError {
    /// Loss and reset need a resync; everything else only costs one packet.
    pub fn requires_resync(&self) -> bool {
        matches!(self, FeedError::Sequence(_))
    }
}
