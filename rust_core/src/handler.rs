//! Per-datagram pipeline
//!
//! package header -> sequence check -> decode -> resolve -> emit
//!
//! Runs synchronously on the receive task that read the datagram. Errors are
//! returned to the caller, which decides whether to resynchronize; listeners
//! only ever see fully decoded events.

use crate::bus::EventBus;
use crate::channels::{book_channel, instrument_channel_for, ticker_channel, trades_channel_for};
use crate::error::{DecodeError, FeedError, SequenceError};
use crate::models::{BookEvent, Event, TickerEvent, Trade};
use crate::registry::InstrumentRegistry;
use crate::sbe::{DecoderConfig, Message, MessageIter, PackageHeader};
use crate::sequence::{SequenceStatus, SequenceTracker};
use crate::stats::FeedStats;
use std::sync::Arc;
use tracing::{debug, warn};

/// What happened to one accepted datagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketOutcome {
    pub channel_id: u16,
    pub sequence: u32,
    pub status: SequenceStatus,
    pub messages: usize,
    pub events: usize,
}

pub struct PacketHandler {
    registry: Arc<InstrumentRegistry>,
    sequences: Arc<SequenceTracker>,
    bus: Arc<EventBus>,
    stats: Arc<FeedStats>,
    config: DecoderConfig,
}

impl PacketHandler {
    pub fn new(
        registry: Arc<InstrumentRegistry>,
        sequences: Arc<SequenceTracker>,
        bus: Arc<EventBus>,
        stats: Arc<FeedStats>,
        config: DecoderConfig,
    ) -> Self {
        Self {
            registry,
            sequences,
            bus,
            stats,
            config,
        }
    }

    pub fn registry(&self) -> &Arc<InstrumentRegistry> {
        &self.registry
    }

    pub fn sequences(&self) -> &Arc<SequenceTracker> {
        &self.sequences
    }

    pub fn stats(&self) -> &Arc<FeedStats> {
        &self.stats
    }

    /// Process one datagram.
    ///
    /// A packet that breaks the channel sequence is not decoded; the caller
    /// is expected to resynchronize. On a decode error, events for messages
    /// earlier in the packet have already been emitted.
    pub fn handle(&self, datagram: &[u8]) -> Result<PacketOutcome, FeedError> {
        self.stats.record_packet();

        let (header, payload) = PackageHeader::split(datagram).map_err(|e| {
            self.stats.record_malformed();
            FeedError::Header(e)
        })?;

        let status = self
            .sequences
            .check(header.channel_id, header.sequence)
            .map_err(|e| {
                match e {
                    SequenceError::Lost { .. } => self.stats.record_lost(),
                    SequenceError::Reset { .. } => self.stats.record_reset(),
                }
                FeedError::Sequence(e)
            })?;

        let mut outcome = PacketOutcome {
            channel_id: header.channel_id,
            sequence: header.sequence,
            status,
            messages: 0,
            events: 0,
        };

        if !status.should_process() {
            self.stats.record_duplicate();
            debug!(
                "Duplicate packet {} on channel {}",
                header.sequence, header.channel_id
            );
            return Ok(outcome);
        }

        let mut messages = MessageIter::new(payload, self.config);
        while let Some(next) = messages.next() {
            match next {
                Ok(message) => {
                    self.stats.record_message();
                    outcome.messages += 1;
                    if self.dispatch(message) {
                        outcome.events += 1;
                    }
                }
                Err(source) => {
                    if matches!(source, DecodeError::UnsupportedTemplate(_)) {
                        self.stats.record_unsupported_template();
                    } else {
                        self.stats.record_decode_error();
                    }
                    self.stats.record_events(outcome.events as u64);
                    return Err(FeedError::Decode {
                        channel_id: header.channel_id,
                        template_id: messages.last_template_id(),
                        source,
                    });
                }
            }
        }

        self.stats.record_processed();
        self.stats.record_events(outcome.events as u64);
        Ok(outcome)
    }

    /// Resolve and emit one message. Returns true if an event was emitted.
    fn dispatch(&self, message: Message) -> bool {
        match message {
            Message::Instrument(instrument) => {
                let channel = instrument_channel_for(&instrument);
                self.registry.apply_instrument_event(instrument.clone());
                self.emit(&channel, || Event::Instrument(instrument))
            }
            Message::Book(book) => {
                let name = self.registry.resolve(book.instrument_id);
                let channel = book_channel(&name);
                self.emit(&channel, || Event::Book(BookEvent::new(book, name)))
            }
            Message::Trades(trades) => {
                let (name, channel) = self.registry.with_instrument(trades.instrument_id, |i| {
                    let name = i
                        .map(|i| i.instrument_name.clone())
                        .unwrap_or_else(|| trades.instrument_id.to_string());
                    (name, trades_channel_for(i))
                });
                let instrument_id = trades.instrument_id;
                self.emit(&channel, || {
                    Event::Trades(
                        trades
                            .trades
                            .into_iter()
                            .map(|t| Trade::new(t, instrument_id, name.clone()))
                            .collect(),
                    )
                })
            }
            Message::Ticker(ticker) => {
                let name = self.registry.resolve(ticker.instrument_id);
                let channel = ticker_channel(&name);
                self.emit(&channel, || Event::Ticker(TickerEvent::new(ticker, name)))
            }
        }
    }

    fn emit(&self, channel: &str, build: impl FnOnce() -> Event) -> bool {
        if !self.bus.has_listeners(channel) {
            return false;
        }
        let event = build();
        let delivered = self.bus.emit(channel, &event);
        if delivered == 0 {
            warn!("No listener ran for {} on {}", event.kind(), channel);
        }
        true
    }
}
