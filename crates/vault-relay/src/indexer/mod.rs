//! Chain event indexer: per-contract scans of mint `Transfer` logs into
//! checkpointed aggregates, plus a manager that starts one scanner per
//! registered contract.

mod manager;
mod scanner;
mod stats;

pub use manager::IndexerManager;
pub use scanner::{ContractIndexer, ScanOutcome};
pub use stats::ContractStats;

#[cfg(test)]
mod tests;
