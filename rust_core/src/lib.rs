//! Deribit Multicast - market data over UDP multicast.
//!
//! This crate provides:
//! - SBE codec for the Instrument, Book, Trades and Ticker templates
//! - Per-channel sequence tracking (fresh, duplicate, lost, reset)
//! - Instrument registry rebuilt from the Deribit REST API
//! - Multicast socket manager with automatic resynchronization
//! - Channel-keyed event bus delivering typed events to listeners
//!
//! ```ignore
//! use deribit_multicast::{DeribitClient, MulticastClient, MulticastConfig, UdpMulticastFactory};
//! use std::sync::Arc;
//!
//! let config = MulticastConfig::from_env()?;
//! let lister = Arc::new(DeribitClient::new(&config.api_url)?);
//! let factory = Arc::new(UdpMulticastFactory::new(config.recv_buffer_bytes));
//! let client = MulticastClient::new(config, factory, lister);
//!
//! client.bus().on_book("book.BTC-PERPETUAL", |book| println!("{:?}", book));
//! client.start().await?;
//! ```

pub mod bus;
pub mod channels;
pub mod clients;
pub mod config;
pub mod error;
pub mod handler;
pub mod models;
pub mod multicast;
pub mod registry;
pub mod retry;
pub mod sbe;
pub mod sequence;
pub mod stats;

pub use bus::{EventBus, ListenerId};
pub use clients::{DeribitClient, InstrumentLister};
pub use config::MulticastConfig;
pub use error::{DecodeError, FeedError, SequenceError};
pub use handler::{PacketHandler, PacketOutcome};
pub use models::{BookChange, BookEvent, Event, Instrument, TickerEvent, Trade};
pub use multicast::{DatagramSource, MulticastClient, SocketFactory, UdpMulticastFactory};
pub use registry::InstrumentRegistry;
pub use sequence::{SequenceStatus, SequenceTracker};
pub use stats::{FeedStats, FeedStatsSnapshot};
