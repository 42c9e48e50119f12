pub mod deribit;
pub mod instrument_lister;

// Re-export commonly used types
pub use deribit::DeribitClient;
pub use instrument_lister::InstrumentLister;
