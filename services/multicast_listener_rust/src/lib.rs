//! multicast_listener_rust - Deribit multicast feed with logging listeners

pub mod config;
pub mod monitoring;
pub mod subscriptions;

pub use config::ListenerConfig;
pub use monitoring::spawn_stats_logger;
pub use subscriptions::subscribe_logging;
