//! Deribit REST Client
//!
//! Lists instruments through the public JSON-RPC-over-HTTP endpoint
//! `public/get_instruments`. No API key required.
//!
//! Only used at start and on resynchronization, so there is no caching or
//! client-side rate limiting.

use super::instrument_lister::InstrumentLister;
use crate::models::{
    Instrument, InstrumentKind, InstrumentState, InstrumentType, OptionType, SettlementPeriod,
};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

pub const DEFAULT_BASE_URL: &str = "https://www.deribit.com/api/v2";

/// Deribit API client implementing InstrumentLister
pub struct DeribitClient {
    client: Client,
    base_url: String,
}

impl DeribitClient {
    /// Create a client against `base_url` (e.g. the testnet URL)
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .user_agent("deribit-multicast/0.1")
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl InstrumentLister for DeribitClient {
    fn name(&self) -> &str {
        "Deribit"
    }

    async fn list_instruments(&self, currency: &str) -> Result<Vec<Instrument>> {
        let url = format!("{}/public/get_instruments", self.base_url);
        debug!("Fetching {} instruments from Deribit", currency);

        let response = self
            .client
            .get(&url)
            .query(&[("currency", currency), ("expired", "false")])
            .send()
            .await
            .context("Failed to fetch instruments from Deribit")?;

        let status = response.status();
        let body: RpcResponse = response
            .json()
            .await
            .with_context(|| format!("Failed to parse Deribit response (HTTP {})", status))?;

        if let Some(err) = body.error {
            return Err(anyhow!("Deribit API error {}: {}", err.code, err.message));
        }
        if !status.is_success() {
            return Err(anyhow!("Deribit API error: HTTP {}", status));
        }

        let raw = body
            .result
            .ok_or_else(|| anyhow!("Deribit response has neither result nor error"))?;

        let mut instruments = Vec::with_capacity(raw.len());
        for entry in raw {
            let name = entry.instrument_name.clone();
            match Instrument::try_from(entry) {
                Ok(instrument) => instruments.push(instrument),
                // A single unfamiliar instrument must not fail the whole rebuild
                Err(e) => warn!("Skipping Deribit instrument {}: {}", name, e),
            }
        }

        debug!("Deribit returned {} {} instruments", instruments.len(), currency);
        Ok(instruments)
    }
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    result: Option<Vec<DeribitInstrument>>,
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

/// One entry of `public/get_instruments`
#[derive(Debug, Deserialize)]
struct DeribitInstrument {
    instrument_id: u32,
    instrument_name: String,
    kind: String,
    #[serde(default)]
    state: Option<String>,
    #[serde(default)]
    is_active: bool,
    #[serde(default)]
    instrument_type: Option<String>,
    #[serde(default)]
    future_type: Option<String>,
    #[serde(default)]
    option_type: Option<String>,
    #[serde(default)]
    rfq: bool,
    #[serde(default)]
    settlement_period: Option<String>,
    base_currency: String,
    #[serde(default)]
    quote_currency: String,
    #[serde(default)]
    counter_currency: String,
    #[serde(default)]
    settlement_currency: Option<String>,
    #[serde(default)]
    size_currency: Option<String>,
    #[serde(default)]
    creation_timestamp: u64,
    #[serde(default)]
    expiration_timestamp: u64,
    #[serde(default)]
    strike: Option<f64>,
    #[serde(default)]
    contract_size: f64,
    #[serde(default)]
    min_trade_amount: f64,
    #[serde(default)]
    tick_size: f64,
    #[serde(default)]
    maker_commission: f64,
    #[serde(default)]
    taker_commission: f64,
    #[serde(default)]
    block_trade_commission: Option<f64>,
    #[serde(default)]
    max_liquidation_commission: Option<f64>,
    #[serde(default)]
    max_leverage: Option<f64>,
}

impl DeribitInstrument {
    fn state(&self) -> InstrumentState {
        self.state
            .as_deref()
            .and_then(InstrumentState::from_label)
            .unwrap_or(if self.is_active {
                InstrumentState::Open
            } else {
                InstrumentState::Closed
            })
    }
}

impl TryFrom<DeribitInstrument> for Instrument {
    type Error = anyhow::Error;

    fn try_from(raw: DeribitInstrument) -> Result<Self> {
        let state = raw.state();
        let kind = InstrumentKind::from_label(&raw.kind)
            .ok_or_else(|| anyhow!("unknown kind '{}'", raw.kind))?;

        let instrument_type = match raw.instrument_type.as_deref().or(raw.future_type.as_deref()) {
            None => InstrumentType::NotApplicable,
            Some(label) => InstrumentType::from_label(label)
                .ok_or_else(|| anyhow!("unknown instrument type '{}'", label))?,
        };
        let option_type = match raw.option_type.as_deref() {
            None => OptionType::NotApplicable,
            Some(label) => OptionType::from_label(label)
                .ok_or_else(|| anyhow!("unknown option type '{}'", label))?,
        };
        let settlement_period = match raw.settlement_period.as_deref() {
            None => SettlementPeriod::Perpetual,
            Some(label) => SettlementPeriod::from_label(label)
                .ok_or_else(|| anyhow!("unknown settlement period '{}'", label))?,
        };

        Ok(Instrument {
            instrument_id: raw.instrument_id,
            state,
            kind,
            instrument_type,
            option_type,
            rfq: raw.rfq,
            settlement_period,
            settlement_period_count: 1,
            settlement_currency: raw
                .settlement_currency
                .unwrap_or_else(|| raw.base_currency.clone()),
            size_currency: raw.size_currency.unwrap_or_else(|| raw.base_currency.clone()),
            base_currency: raw.base_currency,
            quote_currency: raw.quote_currency,
            counter_currency: raw.counter_currency,
            creation_timestamp_ms: raw.creation_timestamp,
            expiration_timestamp_ms: raw.expiration_timestamp,
            strike_price: raw.strike.unwrap_or(f64::NAN),
            contract_size: raw.contract_size,
            min_trade_amount: raw.min_trade_amount,
            tick_size: raw.tick_size,
            maker_commission: raw.maker_commission,
            taker_commission: raw.taker_commission,
            block_trade_commission: raw.block_trade_commission.unwrap_or(f64::NAN),
            max_liquidation_commission: raw.max_liquidation_commission.unwrap_or(f64::NAN),
            max_leverage: raw.max_leverage.unwrap_or(f64::NAN),
            instrument_name: raw.instrument_name,
        })
    }
}
