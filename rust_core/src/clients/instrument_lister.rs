//! Instrument Lister Trait
//!
//! Source of the instrument universe for one currency. The registry calls
//! it at start and on every resynchronization.

use crate::models::Instrument;
use anyhow::Result;
use async_trait::async_trait;

/// Lists the currently tradable instruments for a currency.
///
/// Implementations must be Send + Sync; the registry holds them behind an
/// `Arc` shared with every receive loop.
#[async_trait]
pub trait InstrumentLister: Send + Sync {
    /// Display name used in logs
    fn name(&self) -> &str {
        "instrument-lister"
    }

    /// All non-expired instruments whose base currency is `currency`
    async fn list_instruments(&self, currency: &str) -> Result<Vec<Instrument>>;
}
