//! Deribit multicast listener
//!
//! Joins the configured multicast groups, keeps the instrument registry in
//! sync and logs instrument, trade, book and ticker events.

use anyhow::Result;
use deribit_multicast::{DeribitClient, MulticastClient, UdpMulticastFactory};
use dotenv::dotenv;
use multicast_listener_rust::{spawn_stats_logger, subscribe_logging, ListenerConfig};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    info!("Starting Multicast Listener Service...");

    let config = ListenerConfig::from_env()?;
    info!(
        "Groups {:?} port {} on {}, currencies {:?}",
        config.multicast.addresses,
        config.multicast.port,
        config.multicast.interface,
        config.multicast.currencies
    );

    let lister = Arc::new(DeribitClient::new(&config.multicast.api_url)?);
    let factory = Arc::new(UdpMulticastFactory::new(config.multicast.recv_buffer_bytes));
    let client = MulticastClient::new(config.multicast.clone(), factory, lister);

    let subscriptions = subscribe_logging(client.bus(), &config);
    info!("Registered {} logging listeners", subscriptions.len());

    client.start().await?;
    info!("Instrument registry holds {} instruments", client.registry().len());

    let stats_task = spawn_stats_logger(client.stats().clone(), config.stats_interval());

    tokio::signal::ctrl_c().await?;
    info!("Shutdown requested");

    stats_task.abort();
    client.stop().await;
    info!("Final stats: {:?}", client.stats().snapshot());

    Ok(())
}
