//! Brokerage gateway: capability trait, wire types, HTTP client and dry-run broker.

mod client;
mod gateway;
mod paper;
mod types;

pub use client::BrokerClient;
pub use gateway::BrokerGateway;
pub use paper::PaperBroker;
pub use types::*;
