//! Whale Vault relay: gasless voucher redemption against a fixed pool of
//! signing identities, reward dispensing, and reconciliation of on-chain
//! mint activity into the shared state store.

#![forbid(unsafe_code)]
#![warn(clippy::all)]

pub mod api;
pub mod config;
pub mod indexer;
pub mod ledger;
pub mod metrics;
pub mod receipts;
pub mod relayer;
pub mod reward;
pub mod shutdown;
pub mod store;
pub mod voucher;

#[cfg(test)]
mod testing;
