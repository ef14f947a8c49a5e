//! Broker implementations.
//!
//! [`PaperBroker`] simulates a venue in memory: a seeded price walk per
//! asset, an order book that fills against it and a cash/position ledger.
//! It satisfies the same [`trading_core::Broker`] contract a live broker
//! would, so the agent can be driven end to end without network access.

mod market;
mod paper;

pub use paper::{ListedAsset, PaperBroker, PaperBrokerBuilder, PaperBrokerConfig};
