//! In-process event bus
//!
//! Channel-keyed publish/subscribe between the decode path and consumers.
//! Listeners on a channel run in registration order on the emitting task.
//!
//! Emission works on a snapshot of the channel's listeners taken under the
//! read lock; the lock is released before any listener runs, so listeners
//! may register or remove listeners (including themselves) while being
//! called. A listener removed during an emission is not invoked for the rest
//! of that emission.

use crate::models::{BookEvent, Event, Instrument, TickerEvent, Trade};
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

pub type Listener = Arc<dyn Fn(&Event) + Send + Sync>;

/// Handle returned by `on`, used to remove the listener again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

struct Slot {
    id: ListenerId,
    active: AtomicBool,
    callback: Listener,
}

#[derive(Default)]
pub struct EventBus {
    channels: RwLock<FxHashMap<String, Vec<Arc<Slot>>>>,
    next_id: AtomicU64,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `listener` on `channel`.
    pub fn on<F>(&self, channel: &str, listener: F) -> ListenerId
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let slot = Arc::new(Slot {
            id,
            active: AtomicBool::new(true),
            callback: Arc::new(listener),
        });
        self.channels
            .write()
            .entry(channel.to_string())
            .or_default()
            .push(slot);
        debug!("Listener {:?} registered on {}", id, channel);
        id
    }

    /// Remove a listener. Returns false if it was not registered on `channel`.
    pub fn off(&self, channel: &str, id: ListenerId) -> bool {
        let mut channels = self.channels.write();
        let Some(slots) = channels.get_mut(channel) else {
            return false;
        };
        let Some(index) = slots.iter().position(|s| s.id == id) else {
            return false;
        };

        let slot = slots.remove(index);
        slot.active.store(false, Ordering::Release);
        if slots.is_empty() {
            channels.remove(channel);
        }
        true
    }

    /// Remove every listener on `channel`.
    pub fn off_all(&self, channel: &str) -> usize {
        match self.channels.write().remove(channel) {
            Some(slots) => {
                for slot in &slots {
                    slot.active.store(false, Ordering::Release);
                }
                slots.len()
            }
            None => 0,
        }
    }

    /// Deliver `event` to every listener on `channel`. Returns how many ran.
    pub fn emit(&self, channel: &str, event: &Event) -> usize {
        let snapshot: Vec<Arc<Slot>> = match self.channels.read().get(channel) {
            Some(slots) => slots.clone(),
            None => return 0,
        };

        let mut delivered = 0;
        for slot in snapshot {
            if slot.active.load(Ordering::Acquire) {
                (slot.callback)(event);
                delivered += 1;
            }
        }
        delivered
    }

    pub fn has_listeners(&self, channel: &str) -> bool {
        self.channels.read().contains_key(channel)
    }

    pub fn listener_count(&self, channel: &str) -> usize {
        self.channels.read().get(channel).map_or(0, Vec::len)
    }

    pub fn channels(&self) -> Vec<String> {
        self.channels.read().keys().cloned().collect()
    }

    // Typed registration: the payload type is fixed here, other events on
    // the channel are ignored by the wrapper.

    pub fn on_book<F>(&self, channel: &str, listener: F) -> ListenerId
    where
        F: Fn(&BookEvent) + Send + Sync + 'static,
    {
        self.on(channel, move |event| {
            if let Event::Book(book) = event {
                listener(book)
            }
        })
    }

    pub fn on_trades<F>(&self, channel: &str, listener: F) -> ListenerId
    where
        F: Fn(&[Trade]) + Send + Sync + 'static,
    {
        self.on(channel, move |event| {
            if let Event::Trades(trades) = event {
                listener(trades)
            }
        })
    }

    pub fn on_ticker<F>(&self, channel: &str, listener: F) -> ListenerId
    where
        F: Fn(&TickerEvent) + Send + Sync + 'static,
    {
        self.on(channel, move |event| {
            if let Event::Ticker(ticker) = event {
                listener(ticker)
            }
        })
    }

    pub fn on_instrument<F>(&self, channel: &str, listener: F) -> ListenerId
    where
        F: Fn(&Instrument) + Send + Sync + 'static,
    {
        self.on(channel, move |event| {
            if let Event::Instrument(instrument) = event {
                listener(instrument)
            }
        })
    }
}
