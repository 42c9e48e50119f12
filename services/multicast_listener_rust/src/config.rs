//! Service configuration: the client settings plus what to log

use anyhow::Result;
use deribit_multicast::MulticastConfig;
use std::env;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub struct ListenerConfig {
    pub multicast: MulticastConfig,
    /// Instruments whose book and ticker channels get a logging listener
    pub watch_instruments: Vec<String>,
    /// Log full event payloads as JSON at debug level
    pub log_payloads: bool,
}

impl ListenerConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let multicast = MulticastConfig::from_lookup(&lookup)?;

        let watch_instruments = lookup("DERIBIT_WATCH_INSTRUMENTS")
            .map(|raw| {
                raw.split(',')
                    .map(|s| s.trim().to_uppercase())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let log_payloads = lookup("DERIBIT_LOG_PAYLOADS")
            .map(|v| matches!(v.trim().to_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);

        Ok(Self {
            multicast,
            watch_instruments,
            log_payloads,
        })
    }

    pub fn stats_interval(&self) -> Duration {
        Duration::from_secs(self.multicast.stats_interval_secs.max(1))
    }
}
