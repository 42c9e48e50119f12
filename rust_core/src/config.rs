//! Configuration for the multicast client

use crate::retry::RetryConfig;
use crate::sbe::DecoderConfig;
use anyhow::{anyhow, Result};
use std::env;
use std::net::Ipv4Addr;

pub const DEFAULT_INTERFACE: &str = "eth0";
pub const DEFAULT_ADDRESSES: &str = "239.111.111.1,239.111.111.2,239.111.111.3";
pub const DEFAULT_PORT: u16 = 6100;
pub const DEFAULT_CURRENCIES: &str = "BTC,ETH";
pub const DEFAULT_RECV_BUFFER_BYTES: usize = 4 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq)]
pub struct MulticastConfig {
    // Network
    /// Interface name (e.g. `eth0`) or its IPv4 address
    pub interface: String,
    pub addresses: Vec<Ipv4Addr>,
    pub port: u16,
    pub recv_buffer_bytes: usize,

    // Instruments
    pub currencies: Vec<String>,
    pub api_url: String,
    pub rebuild_retry: RetryConfig,

    // Decoding
    pub decoder: DecoderConfig,

    // Monitoring
    pub stats_interval_secs: u64,
}

impl Default for MulticastConfig {
    fn default() -> Self {
        Self {
            interface: DEFAULT_INTERFACE.to_string(),
            addresses: parse_addresses(DEFAULT_ADDRESSES).unwrap_or_default(),
            port: DEFAULT_PORT,
            recv_buffer_bytes: DEFAULT_RECV_BUFFER_BYTES,
            currencies: split_list(DEFAULT_CURRENCIES),
            api_url: crate::clients::deribit::DEFAULT_BASE_URL.to_string(),
            rebuild_retry: RetryConfig::default(),
            decoder: DecoderConfig::default(),
            stats_interval_secs: 60,
        }
    }
}

impl MulticastConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build from any variable source; `from_env` passes the process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = RetryConfig::default();
        let var = |name: &str, default: &str| lookup(name).unwrap_or_else(|| default.to_string());

        let config = Self {
            interface: var("DERIBIT_MULTICAST_INTERFACE", DEFAULT_INTERFACE),
            addresses: parse_addresses(&var("DERIBIT_MULTICAST_ADDRS", DEFAULT_ADDRESSES))?,
            port: parse(&lookup, "DERIBIT_MULTICAST_PORT", DEFAULT_PORT)?,
            recv_buffer_bytes: parse(&lookup, "DERIBIT_RECV_BUFFER_BYTES", DEFAULT_RECV_BUFFER_BYTES)?,

            currencies: split_list(&var("DERIBIT_CURRENCIES", DEFAULT_CURRENCIES))
                .into_iter()
                .map(|c| c.to_uppercase())
                .collect(),
            api_url: var("DERIBIT_API_URL", crate::clients::deribit::DEFAULT_BASE_URL),
            rebuild_retry: RetryConfig {
                max_attempts: parse(&lookup, "DERIBIT_REBUILD_MAX_ATTEMPTS", defaults.max_attempts)?,
                base_delay_ms: parse(&lookup, "DERIBIT_REBUILD_BASE_DELAY_MS", defaults.base_delay_ms)?,
                max_delay_ms: parse(&lookup, "DERIBIT_REBUILD_MAX_DELAY_MS", defaults.max_delay_ms)?,
                jitter_pct: defaults.jitter_pct,
            },

            decoder: DecoderConfig {
                validate: var("DERIBIT_VALIDATE_MESSAGES", "false")
                    .to_lowercase()
                    .parse()
                    .map_err(|_| anyhow!("DERIBIT_VALIDATE_MESSAGES must be true or false"))?,
            },

            stats_interval_secs: parse(&lookup, "DERIBIT_STATS_INTERVAL_SECS", 60)?,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.interface.trim().is_empty() {
            return Err(anyhow!("DERIBIT_MULTICAST_INTERFACE must not be empty"));
        }
        if self.addresses.is_empty() {
            return Err(anyhow!("DERIBIT_MULTICAST_ADDRS must list at least one group"));
        }
        if let Some(addr) = self.addresses.iter().find(|a| !a.is_multicast()) {
            return Err(anyhow!("{} is not a multicast address", addr));
        }
        if self.port == 0 {
            return Err(anyhow!("DERIBIT_MULTICAST_PORT must be > 0"));
        }
        if self.currencies.is_empty() {
            return Err(anyhow!("DERIBIT_CURRENCIES must list at least one currency"));
        }
        if self.rebuild_retry.max_attempts == 0 {
            return Err(anyhow!("DERIBIT_REBUILD_MAX_ATTEMPTS must be > 0"));
        }
        Ok(())
    }
}

/// Parse a variable with default fallback
fn parse<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    var_name: &str,
    default: T,
) -> Result<T> {
    match lookup(var_name) {
        Some(val) => val
            .trim()
            .parse()
            .map_err(|_| anyhow!("{} has an invalid value '{}'", var_name, val)),
        None => Ok(default),
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn parse_addresses(raw: &str) -> Result<Vec<Ipv4Addr>> {
    split_list(raw)
        .iter()
        .map(|s| {
            s.parse()
                .map_err(|_| anyhow!("invalid multicast address '{}'", s))
        })
        .collect()
}
