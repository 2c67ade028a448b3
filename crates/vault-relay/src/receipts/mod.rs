//! Status of relayed transactions, resolved from ledger receipts. The first
//! successful lookup of a mint records the minted token for its reader.

mod tracker;

pub use tracker::{MintedToken, TxState, TxStatus, TxTracker};
