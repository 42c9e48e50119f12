//! Multicast socket manager
//!
//! Owns group membership and the receive loops:
//! - `start()` joins every configured group, rebuilds the instrument
//!   registry and spawns one tokio task per socket
//! - each task feeds datagrams through the `PacketHandler`
//! - a sequence break triggers `restart_connections()`: leave and rejoin
//!   every group, rebuild the registry, clear the sequence table
//! - `stop()` leaves every group, ends every task and cancels a
//!   resynchronization in progress
//!
//! The state mutex is never held across the rejoin or the registry rebuild.
//! Every start, restart and stop bumps a generation counter; a restart
//! requested by a loop of an older generation is a no-op, so simultaneous
//! sequence breaks on several sockets collapse into a single restart.

pub mod socket;

pub use socket::{DatagramSource, SocketFactory, UdpMulticastFactory};

use crate::bus::EventBus;
use crate::clients::InstrumentLister;
use crate::config::MulticastConfig;
use crate::handler::PacketHandler;
use crate::registry::InstrumentRegistry;
use crate::retry::retry_with_backoff;
use crate::sequence::SequenceTracker;
use crate::stats::FeedStats;
use anyhow::{Context, Result};
use std::future::Future;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{broadcast, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Largest possible UDP payload
const RECV_BUFFER_LEN: usize = 65_536;

/// Sockets and tasks of one generation
struct Connection {
    sources: Vec<Arc<dyn DatagramSource>>,
    shutdown_tx: broadcast::Sender<()>,
    tasks: Vec<JoinHandle<()>>,
}

impl Connection {
    /// Signal the loops and leave every group. Tasks are not aborted.
    fn close(&self) {
        let _ = self.shutdown_tx.send(());
        leave_all(&self.sources);
    }
}

enum State {
    Stopped,
    /// Old sockets closed, rejoin and rebuild in flight
    Resyncing,
    Running(Connection),
}

struct Inner {
    config: MulticastConfig,
    factory: Arc<dyn SocketFactory>,
    registry: Arc<InstrumentRegistry>,
    sequences: Arc<SequenceTracker>,
    bus: Arc<EventBus>,
    stats: Arc<FeedStats>,
    handler: PacketHandler,
    state: Mutex<State>,
    generation: watch::Sender<u64>,
}

impl Inner {
    fn generation(&self) -> u64 {
        *self.generation.borrow()
    }

    fn bump_generation(&self) -> u64 {
        let mut next = 0;
        self.generation.send_modify(|g| {
            *g += 1;
            next = *g;
        });
        next
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let State::Running(connection) = std::mem::replace(self.state.get_mut(), State::Stopped) {
            connection.close();
            for task in &connection.tasks {
                task.abort();
            }
        }
    }
}

/// Deribit multicast market-data client.
///
/// Cheap to clone; clones share the same sockets, registry and bus. Receive
/// loops only hold a weak reference, so dropping the last handle leaves every
/// group and ends the loops. Call `stop()` to do that deterministically.
#[derive(Clone)]
pub struct MulticastClient {
    inner: Arc<Inner>,
}

impl MulticastClient {
    pub fn new(
        config: MulticastConfig,
        factory: Arc<dyn SocketFactory>,
        lister: Arc<dyn InstrumentLister>,
    ) -> Self {
        Self::with_bus(config, factory, lister, Arc::new(EventBus::new()))
    }

    /// Use an existing bus, e.g. one with listeners already registered.
    pub fn with_bus(
        config: MulticastConfig,
        factory: Arc<dyn SocketFactory>,
        lister: Arc<dyn InstrumentLister>,
        bus: Arc<EventBus>,
    ) -> Self {
        let registry = Arc::new(InstrumentRegistry::new(lister));
        let sequences = Arc::new(SequenceTracker::new());
        let stats = Arc::new(FeedStats::new());
        let handler = PacketHandler::new(
            registry.clone(),
            sequences.clone(),
            bus.clone(),
            stats.clone(),
            config.decoder,
        );
        let (generation, _) = watch::channel(0);

        Self {
            inner: Arc::new(Inner {
                config,
                factory,
                registry,
                sequences,
                bus,
                stats,
                handler,
                state: Mutex::new(State::Stopped),
                generation,
            }),
        }
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.inner.bus
    }

    pub fn registry(&self) -> &Arc<InstrumentRegistry> {
        &self.inner.registry
    }

    pub fn stats(&self) -> &Arc<FeedStats> {
        &self.inner.stats
    }

    pub fn config(&self) -> &MulticastConfig {
        &self.inner.config
    }

    /// True while running or resynchronizing.
    pub async fn is_running(&self) -> bool {
        !matches!(*self.inner.state.lock().await, State::Stopped)
    }

    /// Join every group, build the registry and start receiving.
    ///
    /// Fails without leaving any group joined if a socket cannot be opened or
    /// the initial registry rebuild is exhausted. Calling it while running
    /// is a no-op.
    pub async fn start(&self) -> Result<()> {
        let mut state = self.inner.state.lock().await;
        if !matches!(*state, State::Stopped) {
            warn!("Multicast client already started");
            return Ok(());
        }

        let sources = self.join_all()?;
        if let Err(e) = self.rebuild_registry().await {
            leave_all(&sources);
            return Err(e.context("Initial instrument registry rebuild failed"));
        }
        self.inner.sequences.clear();

        let generation = self.inner.bump_generation();
        *state = State::Running(self.spawn_loops(sources, generation));
        info!(
            "Multicast client started: {} groups on {} (generation {})",
            self.inner.config.addresses.len(),
            self.inner.config.interface,
            generation
        );
        Ok(())
    }

    /// Leave every group and stop every loop. Cancels a resynchronization in
    /// progress. Safe to call repeatedly or before `start()`.
    pub async fn stop(&self) {
        let mut state = self.inner.state.lock().await;
        self.inner.bump_generation();
        match std::mem::replace(&mut *state, State::Stopped) {
            State::Stopped => {}
            State::Resyncing => info!("Multicast client stopped during resynchronization"),
            State::Running(current) => {
                current.close();
                for task in &current.tasks {
                    task.abort();
                }
                info!("Multicast client stopped");
            }
        }
    }

    /// Resynchronize: rejoin every group, rebuild the registry, clear the
    /// sequence table.
    pub async fn restart_connections(&self) -> Result<()> {
        let generation = self.inner.generation();
        self.restart_from(generation).await
    }

    async fn restart_from(&self, observed_generation: u64) -> Result<()> {
        let (old, generation, mut cancelled) = {
            let mut state = self.inner.state.lock().await;
            if self.inner.generation() != observed_generation {
                // Someone restarted or stopped since this request was made
                return Ok(());
            }
            match std::mem::replace(&mut *state, State::Resyncing) {
                State::Running(old) => {
                    let generation = self.inner.bump_generation();
                    // Subscribed under the lock so a later stop() is always seen
                    (old, generation, self.inner.generation.subscribe())
                }
                other => {
                    *state = other;
                    return Ok(());
                }
            }
        };

        self.inner.stats.record_resync();
        warn!("Resynchronizing multicast feed (generation {})", generation);
        old.close();

        let retry = &self.inner.config.rebuild_retry;
        let rejoin = retry_with_backoff(retry, "Multicast rejoin", || {
            std::future::ready(self.join_all())
        });
        let sources = match until_changed(&mut cancelled, rejoin).await {
            None => return Ok(()),
            Some(Ok(sources)) => sources,
            Some(Err(e)) => {
                self.inner.stats.record_rejoin_failure();
                let mut state = self.inner.state.lock().await;
                if self.inner.generation() == generation {
                    *state = State::Stopped;
                }
                error!("Multicast rejoin failed, client is down: {:#}", e);
                return Err(e);
            }
        };

        match until_changed(&mut cancelled, self.rebuild_registry()).await {
            None => {
                leave_all(&sources);
                return Ok(());
            }
            // Events still flow; names fall back to numeric ids
            Some(Err(e)) => error!("Instrument registry rebuild failed: {:#}", e),
            Some(Ok(_)) => {}
        }

        let mut state = self.inner.state.lock().await;
        if self.inner.generation() != generation {
            leave_all(&sources);
            return Ok(());
        }
        self.inner.sequences.clear();

        let mut next = self.spawn_loops(sources, generation);
        next.tasks
            .extend(old.tasks.into_iter().filter(|t| !t.is_finished()));
        *state = State::Running(next);
        info!("Multicast feed resynchronized (generation {})", generation);
        Ok(())
    }

    /// Join every configured group; on failure the groups joined so far are left.
    fn join_all(&self) -> Result<Vec<Arc<dyn DatagramSource>>> {
        let config = &self.inner.config;
        let interface = self
            .inner
            .factory
            .resolve_interface(&config.interface)
            .with_context(|| format!("Failed to resolve interface {}", config.interface))?;

        let mut sources: Vec<Arc<dyn DatagramSource>> = Vec::with_capacity(config.addresses.len());
        for group in &config.addresses {
            match self.inner.factory.join(*group, config.port, interface) {
                Ok(source) => sources.push(source),
                Err(e) => {
                    leave_all(&sources);
                    return Err(e.context(format!("Failed to join {}:{}", group, config.port)));
                }
            }
        }
        Ok(sources)
    }

    async fn rebuild_registry(&self) -> Result<usize> {
        let registry = &self.inner.registry;
        let currencies = &self.inner.config.currencies;
        let retry = &self.inner.config.rebuild_retry;
        let result = retry_with_backoff(retry, "Instrument registry rebuild", || {
            registry.rebuild(currencies)
        })
        .await;
        if result.is_err() {
            self.inner.stats.record_rebuild_failure();
        }
        result
    }

    fn spawn_loops(&self, sources: Vec<Arc<dyn DatagramSource>>, generation: u64) -> Connection {
        let (shutdown_tx, _) = broadcast::channel::<()>(1);
        let tasks = sources
            .iter()
            .map(|source| {
                let inner = Arc::downgrade(&self.inner);
                let source = source.clone();
                let shutdown_rx = shutdown_tx.subscribe();
                tokio::spawn(receive_loop(inner, source, generation, shutdown_rx))
            })
            .collect();

        Connection {
            sources,
            shutdown_tx,
            tasks,
        }
    }
}

fn leave_all(sources: &[Arc<dyn DatagramSource>]) {
    for source in sources {
        if let Err(e) = source.leave() {
            warn!("Failed to leave {}: {}", source.group(), e);
        }
    }
}

/// Run `work` unless the generation changes first.
async fn until_changed<F: Future>(generation: &mut watch::Receiver<u64>, work: F) -> Option<F::Output> {
    tokio::select! {
        output = work => Some(output),
        _ = generation.changed() => None,
    }
}

async fn receive_loop(
    inner: Weak<Inner>,
    source: Arc<dyn DatagramSource>,
    generation: u64,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    let group = source.group();
    let mut buf = vec![0u8; RECV_BUFFER_LEN];
    info!("Receiving on {} (generation {})", group, generation);

    loop {
        let received = tokio::select! {
            _ = shutdown_rx.recv() => break,
            received = source.recv(&mut buf) => received,
        };
        let len = match received {
            Ok(len) => len,
            Err(e) => {
                error!("Receive error on {}: {}", group, e);
                tokio::time::sleep(Duration::from_millis(100)).await;
                continue;
            }
        };

        // Every client handle is gone
        let Some(inner) = inner.upgrade() else {
            break;
        };
        let client = MulticastClient { inner };
        match client.inner.handler.handle(&buf[..len]) {
            Ok(_) => {}
            Err(e) if e.requires_resync() => {
                warn!("{} on {}", e, group);
                if let Err(e) = client.restart_from(generation).await {
                    error!("Resynchronization failed: {:#}", e);
                }
                break;
            }
            Err(e) => {
                warn!("Dropped rest of packet on {}: {}", group, e);
            }
        }
    }

    info!("Receive loop for {} exited (generation {})", group, generation);
}
