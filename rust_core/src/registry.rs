//! Instrument registry
//!
//! Maps the numeric instrument ids carried on the wire to full instrument
//! definitions. Rebuilt from the instrument lister on every (re)connection
//! and kept current from live Instrument messages.
//!
//! Reads vastly outnumber writes, so the map sits behind a read-favoring
//! `parking_lot::RwLock`. The lister is never awaited while the lock is held.

use crate::clients::InstrumentLister;
use crate::models::Instrument;
use anyhow::{Context, Result};
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::sync::Arc;
use tracing::{debug, info};

pub struct InstrumentRegistry {
    lister: Arc<dyn InstrumentLister>,
    instruments: RwLock<FxHashMap<u32, Instrument>>,
}

impl InstrumentRegistry {
    pub fn new(lister: Arc<dyn InstrumentLister>) -> Self {
        Self {
            lister,
            instruments: RwLock::new(FxHashMap::default()),
        }
    }

    /// Replace the whole map with the instruments of `currencies`.
    ///
    /// Every currency is fetched before anything is written; if any call
    /// fails the previous contents stay in place. Returns the new size.
    pub async fn rebuild(&self, currencies: &[String]) -> Result<usize> {
        let mut fresh = FxHashMap::default();
        for currency in currencies {
            let listed = self
                .lister
                .list_instruments(currency)
                .await
                .with_context(|| {
                    format!("{} failed to list {} instruments", self.lister.name(), currency)
                })?;
            debug!("Listed {} instruments for {}", listed.len(), currency);
            for instrument in listed {
                fresh.insert(instrument.instrument_id, instrument);
            }
        }

        let count = fresh.len();
        *self.instruments.write() = fresh;
        info!(
            "Instrument registry rebuilt: {} instruments across {:?}",
            count, currencies
        );
        Ok(count)
    }

    /// Instrument name, or the id in decimal when unknown.
    pub fn resolve(&self, instrument_id: u32) -> String {
        self.instruments
            .read()
            .get(&instrument_id)
            .map(|i| i.instrument_name.clone())
            .unwrap_or_else(|| instrument_id.to_string())
    }

    pub fn get(&self, instrument_id: u32) -> Option<Instrument> {
        self.instruments.read().get(&instrument_id).cloned()
    }

    /// Borrow an entry under the read lock without cloning it.
    pub fn with_instrument<R>(
        &self,
        instrument_id: u32,
        f: impl FnOnce(Option<&Instrument>) -> R,
    ) -> R {
        f(self.instruments.read().get(&instrument_id))
    }

    /// Upsert from a live Instrument message.
    pub fn apply_instrument_event(&self, instrument: Instrument) {
        let mut instruments = self.instruments.write();
        if !instruments.contains_key(&instrument.instrument_id) {
            debug!(
                "New instrument {} ({})",
                instrument.instrument_name, instrument.instrument_id
            );
        }
        instruments.insert(instrument.instrument_id, instrument);
    }

    pub fn len(&self) -> usize {
        self.instruments.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.instruments.read().is_empty()
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;

    /// Lister returning canned instruments; currencies listed in `fail_on` error.
    #[derive(Default)]
    pub struct StaticLister {
        pub by_currency: FxHashMap<String, Vec<Instrument>>,
        pub fail_on: Mutex<Vec<String>>,
        pub calls: Mutex<Vec<String>>,
    }

    impl StaticLister {
        pub fn with(currency: &str, instruments: Vec<Instrument>) -> Self {
            let mut lister = Self::default();
            lister.by_currency.insert(currency.to_string(), instruments);
            lister
        }
    }

    #[async_trait]
    impl InstrumentLister for StaticLister {
        async fn list_instruments(&self, currency: &str) -> Result<Vec<Instrument>> {
            self.calls.lock().push(currency.to_string());
            if self.fail_on.lock().iter().any(|c| c == currency) {
                anyhow::bail!("{} unavailable", currency);
            }
            Ok(self.by_currency.get(currency).cloned().unwrap_or_default())
        }
    }
}
