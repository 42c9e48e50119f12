//! End-to-end tests of the multicast client over an in-memory network.

use anyhow::{bail, Result};
use async_trait::async_trait;
use deribit_multicast::models::{
    BookAction, BookChange, BookSide, Direction, InstrumentKind, InstrumentState, InstrumentType,
    Liquidation, OptionType, SettlementPeriod, TickDirection,
};
use deribit_multicast::retry::RetryConfig;
use deribit_multicast::sbe::{encode_packet, Book, Message, Ticker, TradeRecord, Trades};
use deribit_multicast::{
    DatagramSource, Instrument, InstrumentLister, MulticastClient, MulticastConfig, SocketFactory,
};
use parking_lot::Mutex;
use std::io;
use std::net::{Ipv4Addr, SocketAddrV4};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

const GROUP_A: Ipv4Addr = Ipv4Addr::new(239, 111, 111, 1);
const GROUP_B: Ipv4Addr = Ipv4Addr::new(239, 111, 111, 2);
const PORT: u16 = 6100;
const ETH_PUT_ID: u32 = 210762;
const ETH_PUT: &str = "ETH-31MAR23-3500-P";

// ============================================================================
// In-memory network
// ============================================================================

struct Member {
    group: Ipv4Addr,
    tx: mpsc::UnboundedSender<Vec<u8>>,
    left: Arc<AtomicBool>,
}

#[derive(Default)]
struct MemoryNetwork {
    members: Mutex<Vec<Member>>,
    joins: AtomicUsize,
    fail_group: Mutex<Option<Ipv4Addr>>,
}

impl MemoryNetwork {
    fn send(&self, group: Ipv4Addr, datagram: Vec<u8>) {
        for member in self.members.lock().iter() {
            if member.group == group && !member.left.load(Ordering::SeqCst) {
                let _ = member.tx.send(datagram.clone());
            }
        }
    }

    fn joined(&self, group: Ipv4Addr) -> usize {
        self.members
            .lock()
            .iter()
            .filter(|m| m.group == group && !m.left.load(Ordering::SeqCst))
            .count()
    }

    fn joins(&self) -> usize {
        self.joins.load(Ordering::SeqCst)
    }
}

impl SocketFactory for MemoryNetwork {
    fn resolve_interface(&self, _interface: &str) -> Result<Ipv4Addr> {
        Ok(Ipv4Addr::LOCALHOST)
    }

    fn join(&self, group: Ipv4Addr, port: u16, _interface: Ipv4Addr) -> Result<Arc<dyn DatagramSource>> {
        if *self.fail_group.lock() == Some(group) {
            bail!("cannot join {}", group);
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let left = Arc::new(AtomicBool::new(false));
        self.members.lock().push(Member {
            group,
            tx,
            left: left.clone(),
        });
        self.joins.fetch_add(1, Ordering::SeqCst);

        Ok(Arc::new(MemorySource {
            group: SocketAddrV4::new(group, port),
            rx: tokio::sync::Mutex::new(rx),
            left,
        }))
    }
}

struct MemorySource {
    group: SocketAddrV4,
    rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<Vec<u8>>>,
    left: Arc<AtomicBool>,
}

#[async_trait]
impl DatagramSource for MemorySource {
    async fn recv(&self, buf: &mut [u8]) -> io::Result<usize> {
        let mut rx = self.rx.lock().await;
        match rx.recv().await {
            Some(datagram) => {
                let len = datagram.len().min(buf.len());
                buf[..len].copy_from_slice(&datagram[..len]);
                Ok(len)
            }
            None => std::future::pending().await,
        }
    }

    fn group(&self) -> SocketAddrV4 {
        self.group
    }

    fn leave(&self) -> io::Result<()> {
        self.left.store(true, Ordering::SeqCst);
        Ok(())
    }
}

// ============================================================================
// Instrument lister
// ============================================================================

#[derive(Default)]
struct CountingLister {
    instruments: Vec<Instrument>,
    calls: AtomicUsize,
    fail: AtomicBool,
    delay_ms: AtomicU64,
}

impl CountingLister {
    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl InstrumentLister for CountingLister {
    async fn list_instruments(&self, currency: &str) -> Result<Vec<Instrument>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let delay = self.delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if self.fail.load(Ordering::SeqCst) {
            bail!("instrument list for {} unavailable", currency);
        }
        Ok(self
            .instruments
            .iter()
            .filter(|i| i.base_currency == currency)
            .cloned()
            .collect())
    }
}

// ============================================================================
// Fixtures
// ============================================================================

fn eth_put() -> Instrument {
    Instrument {
        instrument_id: ETH_PUT_ID,
        instrument_name: ETH_PUT.to_string(),
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
        creation_timestamp_ms: 1_671_696_002_000,
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

fn book(change_id: u64) -> Message {
    Message::Book(Book {
        instrument_id: ETH_PUT_ID,
        timestamp_ms: 1_680_000_000_000 + change_id,
        prev_change_id: change_id - 1,
        change_id,
        is_last: true,
        changes: vec![BookChange {
            side: BookSide::Bid,
            action: BookAction::New,
            price: 0.0125,
            amount: 40.0,
        }],
    })
}

fn ticker() -> Message {
    Message::Ticker(Ticker {
        instrument_id: ETH_PUT_ID,
        state: InstrumentState::Open,
        timestamp_ms: 1_680_000_000_000,
        open_interest: 1200.0,
        min_sell_price: 0.0005,
        max_buy_price: 0.05,
        last_price: 0.013,
        index_price: 1780.5,
        mark_price: 0.0128,
        best_bid_price: Some(0.0125),
        best_bid_amount: 40.0,
        best_ask_price: Some(0.0135),
        best_ask_amount: 12.0,
        current_funding: f64::NAN,
        funding_8h: f64::NAN,
        estimated_delivery_price: 1780.5,
        delivery_price: f64::NAN,
        settlement_price: 0.0127,
    })
}

fn trades(instrument_id: u32) -> Message {
    Message::Trades(Trades {
        instrument_id,
        trades: vec![TradeRecord {
            direction: Direction::Sell,
            price: 0.013,
            amount: 5.0,
            timestamp_ms: 1_680_000_000_123,
            mark_price: 0.0128,
            index_price: 1780.5,
            trade_seq: 77,
            trade_id: 250_000_001,
            tick_direction: TickDirection::Minus,
            liquidation: Liquidation::None,
            iv: 62.5,
            block_trade_id: None,
            combo_trade_id: None,
        }],
    })
}

fn config(addresses: Vec<Ipv4Addr>) -> MulticastConfig {
    MulticastConfig {
        interface: "lo".to_string(),
        addresses,
        port: PORT,
        currencies: vec!["ETH".to_string()],
        rebuild_retry: RetryConfig {
            max_attempts: 1,
            base_delay_ms: 1,
            max_delay_ms: 1,
            jitter_pct: 0.0,
        },
        ..MulticastConfig::default()
    }
}

struct Harness {
    network: Arc<MemoryNetwork>,
    lister: Arc<CountingLister>,
    client: MulticastClient,
}

fn harness(addresses: Vec<Ipv4Addr>) -> Harness {
    let network = Arc::new(MemoryNetwork::default());
    let lister = Arc::new(CountingLister {
        instruments: vec![eth_put()],
        ..CountingLister::default()
    });
    let client = MulticastClient::new(config(addresses), network.clone(), lister.clone());
    Harness {
        network,
        lister,
        client,
    }
}

async fn eventually(what: &str, condition: impl Fn() -> bool) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {}", what);
}

async fn next<T>(rx: &mut mpsc::UnboundedReceiver<T>) -> T {
    tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("timed out waiting for event")
        .expect("listener channel closed")
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn test_start_routes_events_by_channel() {
    let h = harness(vec![GROUP_A, GROUP_B]);
    let (book_tx, mut book_rx) = mpsc::unbounded_channel();
    let (ticker_tx, mut ticker_rx) = mpsc::unbounded_channel();
    let (trades_tx, mut trades_rx) = mpsc::unbounded_channel();

    h.client.bus().on_book(&format!("book.{}", ETH_PUT), move |b| {
        let _ = book_tx.send(b.clone());
    });
    h.client.bus().on_ticker(&format!("ticker.{}", ETH_PUT), move |t| {
        let _ = ticker_tx.send(t.clone());
    });
    h.client.bus().on_trades("trades.any.any", move |t| {
        let _ = trades_tx.send(t.to_vec());
    });

    h.client.start().await.unwrap();
    assert!(h.client.is_running().await);
    assert_eq!(h.lister.calls(), 1);
    assert_eq!(h.client.registry().len(), 1);
    assert_eq!(h.network.joined(GROUP_A), 1);
    assert_eq!(h.network.joined(GROUP_B), 1);

    h.network.send(GROUP_A, encode_packet(1, 10, &[book(5)]));
    h.network.send(GROUP_B, encode_packet(2, 3, &[ticker(), trades(99)]));

    let book = next(&mut book_rx).await;
    assert_eq!(book.instrument_name, ETH_PUT);
    assert_eq!(book.change_id, 5);
    assert_eq!(book.bids().count(), 1);

    let ticker = next(&mut ticker_rx).await;
    assert_eq!(ticker.spread(), Some(0.0135 - 0.0125));
    assert!(ticker.current_funding.is_nan());

    let trades = next(&mut trades_rx).await;
    assert_eq!(trades.len(), 1);
    assert_eq!(trades[0].instrument_name, "99");

    h.client.stop().await;
}

#[tokio::test]
async fn test_duplicate_packet_delivered_once() {
    let h = harness(vec![GROUP_A]);
    let (tx, mut rx) = mpsc::unbounded_channel();
    h.client.bus().on_book(&format!("book.{}", ETH_PUT), move |b| {
        let _ = tx.send(b.change_id);
    });
    h.client.start().await.unwrap();

    let first = encode_packet(1, 65537, &[book(1)]);
    h.network.send(GROUP_A, first.clone());
    h.network.send(GROUP_A, first);
    h.network.send(GROUP_A, encode_packet(1, 65538, &[book(2)]));

    assert_eq!(next(&mut rx).await, 1);
    assert_eq!(next(&mut rx).await, 2);
    let stats = h.client.stats().clone();
    eventually("duplicate counted", || stats.snapshot().duplicates == 1).await;
    assert_eq!(stats.snapshot().resyncs, 0);

    h.client.stop().await;
}

#[tokio::test]
async fn test_gap_triggers_resync() {
    let h = harness(vec![GROUP_A, GROUP_B]);
    let (tx, mut rx) = mpsc::unbounded_channel();
    h.client.bus().on_book(&format!("book.{}", ETH_PUT), move |b| {
        let _ = tx.send(b.change_id);
    });
    h.client.start().await.unwrap();

    h.network.send(GROUP_A, encode_packet(1, 10, &[book(1)]));
    assert_eq!(next(&mut rx).await, 1);

    // Sequence 11 never arrives; the book in 12 is not delivered
    h.network.send(GROUP_A, encode_packet(1, 12, &[book(3)]));

    let network = h.network.clone();
    let lister = h.lister.clone();
    eventually("rejoin and rebuild", || network.joins() == 4 && lister.calls() == 2).await;

    let stats = h.client.stats().snapshot();
    assert_eq!(stats.packets_lost, 1);
    assert_eq!(stats.resyncs, 1);
    assert_eq!(h.network.joined(GROUP_A), 1);
    assert_eq!(h.network.joined(GROUP_B), 1);
    assert!(h.client.is_running().await);

    // Sequence table was cleared, so any number is accepted as first
    h.network.send(GROUP_A, encode_packet(1, 500, &[book(4)]));
    assert_eq!(next(&mut rx).await, 4);
    assert!(rx.try_recv().is_err());

    h.client.stop().await;
}

#[tokio::test]
async fn test_reset_triggers_resync() {
    let h = harness(vec![GROUP_A]);
    let (tx, mut rx) = mpsc::unbounded_channel();
    h.client.bus().on_book(&format!("book.{}", ETH_PUT), move |b| {
        let _ = tx.send(b.change_id);
    });
    h.client.start().await.unwrap();

    h.network.send(GROUP_A, encode_packet(1, 10, &[book(1)]));
    assert_eq!(next(&mut rx).await, 1);

    // Sequence goes backwards: the publisher restarted
    h.network.send(GROUP_A, encode_packet(1, 5, &[book(2)]));

    let network = h.network.clone();
    let lister = h.lister.clone();
    eventually("rejoin and rebuild", || network.joins() == 2 && lister.calls() == 2).await;

    let stats = h.client.stats().snapshot();
    assert_eq!(stats.resets, 1);
    assert_eq!(stats.packets_lost, 0);
    assert_eq!(stats.resyncs, 1);

    // Lower than the reset sequence; only accepted because the table was cleared
    h.network.send(GROUP_A, encode_packet(1, 3, &[book(3)]));
    assert_eq!(next(&mut rx).await, 3);
    assert!(rx.try_recv().is_err());
    assert_eq!(h.client.stats().snapshot().resets, 1);

    h.client.stop().await;
}

#[tokio::test]
async fn test_rejoin_failure_leaves_client_down() {
    let h = harness(vec![GROUP_A, GROUP_B]);
    h.client.start().await.unwrap();

    *h.network.fail_group.lock() = Some(GROUP_B);
    assert!(h.client.restart_connections().await.is_err());

    assert!(!h.client.is_running().await);
    assert_eq!(h.network.joined(GROUP_A), 0);
    assert_eq!(h.network.joined(GROUP_B), 0);
    assert_eq!(h.lister.calls(), 1);
    let stats = h.client.stats().snapshot();
    assert_eq!(stats.resyncs, 1);
    assert_eq!(stats.rejoin_failures, 1);

    // Recoverable with an explicit start once the group is reachable again
    *h.network.fail_group.lock() = None;
    h.client.start().await.unwrap();
    assert_eq!(h.network.joined(GROUP_B), 1);
    h.client.stop().await;
}

#[tokio::test]
async fn test_stop_cancels_slow_resync() {
    let h = harness(vec![GROUP_A]);
    h.client.start().await.unwrap();

    h.lister.delay_ms.store(30_000, Ordering::SeqCst);
    let client = h.client.clone();
    let restart = tokio::spawn(async move { client.restart_connections().await });

    let lister = h.lister.clone();
    eventually("rebuild in flight", || lister.calls() == 2).await;
    assert!(h.client.is_running().await);

    tokio::time::timeout(Duration::from_secs(1), h.client.stop())
        .await
        .expect("stop waited for the registry rebuild");
    assert!(!h.client.is_running().await);

    let result = tokio::time::timeout(Duration::from_secs(1), restart)
        .await
        .expect("resync not cancelled")
        .unwrap();
    assert!(result.is_ok());
    assert_eq!(h.network.joins(), 2);
    assert_eq!(h.network.joined(GROUP_A), 0);
    assert_eq!(h.client.stats().snapshot().rebuild_failures, 0);
}

#[tokio::test]
async fn test_dropping_client_leaves_groups() {
    let Harness {
        network, client, ..
    } = harness(vec![GROUP_A, GROUP_B]);
    client.start().await.unwrap();
    assert_eq!(network.joined(GROUP_A), 1);

    drop(client);
    let net = network.clone();
    eventually("groups left", || net.joined(GROUP_A) == 0 && net.joined(GROUP_B) == 0).await;
}

#[tokio::test]
async fn test_explicit_restart_keeps_registry_when_rebuild_fails() {
    let h = harness(vec![GROUP_A]);
    h.client.start().await.unwrap();

    h.lister.fail.store(true, Ordering::SeqCst);
    h.client.restart_connections().await.unwrap();

    let stats = h.client.stats().snapshot();
    assert_eq!(stats.resyncs, 1);
    assert_eq!(stats.rebuild_failures, 1);
    assert_eq!(h.network.joins(), 2);
    assert_eq!(h.network.joined(GROUP_A), 1);
    assert_eq!(h.client.registry().resolve(ETH_PUT_ID), ETH_PUT);
    assert!(h.client.is_running().await);

    h.client.stop().await;
}

#[tokio::test]
async fn test_join_failure_leaves_joined_groups() {
    let h = harness(vec![GROUP_A, GROUP_B]);
    *h.network.fail_group.lock() = Some(GROUP_B);

    assert!(h.client.start().await.is_err());
    assert_eq!(h.network.joins(), 1);
    assert_eq!(h.network.joined(GROUP_A), 0);
    assert_eq!(h.lister.calls(), 0);
    assert!(!h.client.is_running().await);
}

#[tokio::test]
async fn test_initial_rebuild_failure_fails_start() {
    let h = harness(vec![GROUP_A]);
    h.lister.fail.store(true, Ordering::SeqCst);

    let err = h.client.start().await.unwrap_err();
    assert!(format!("{:#}", err).contains("unavailable"));
    assert_eq!(h.network.joined(GROUP_A), 0);
    assert_eq!(h.client.stats().snapshot().rebuild_failures, 1);
    assert!(!h.client.is_running().await);
}

#[tokio::test]
async fn test_start_twice_is_noop() {
    let h = harness(vec![GROUP_A, GROUP_B]);
    h.client.start().await.unwrap();
    h.client.start().await.unwrap();

    assert_eq!(h.network.joins(), 2);
    assert_eq!(h.lister.calls(), 1);
    h.client.stop().await;
}

#[tokio::test]
async fn test_stop_is_idempotent_and_restartable() {
    let h = harness(vec![GROUP_A]);
    h.client.stop().await;

    h.client.start().await.unwrap();
    h.client.stop().await;
    h.client.stop().await;
    assert_eq!(h.network.joined(GROUP_A), 0);
    assert!(!h.client.is_running().await);

    // Restart after a stop is not a resync
    h.client.restart_connections().await.unwrap();
    assert_eq!(h.client.stats().snapshot().resyncs, 0);

    h.client.start().await.unwrap();
    assert_eq!(h.lister.calls(), 2);
    assert_eq!(h.network.joined(GROUP_A), 1);
    h.client.stop().await;
}

#[tokio::test]
async fn test_instrument_message_updates_registry() {
    let h = harness(vec![GROUP_A]);
    let (tx, mut rx) = mpsc::unbounded_channel();
    h.client.bus().on_instrument("instrument.option.ETH", move |i| {
        let _ = tx.send(i.clone());
    });
    h.client.start().await.unwrap();

    let mut renamed = eth_put();
    renamed.instrument_id = 300_001;
    renamed.instrument_name = "ETH-30JUN23-4000-P".to_string();
    h.network.send(GROUP_A, encode_packet(1, 1, &[Message::Instrument(renamed)]));

    let event = next(&mut rx).await;
    assert_eq!(event.instrument_id, 300_001);
    assert_eq!(h.client.registry().resolve(300_001), "ETH-30JUN23-4000-P");

    h.client.stop().await;
}
