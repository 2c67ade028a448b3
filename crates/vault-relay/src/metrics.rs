use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

pub struct RelayMetrics {
    pub submissions: AtomicU64,
    pub submission_failures: AtomicU64,
    pub unconfirmed_submissions: AtomicU64,
    pub nonce_resyncs: AtomicU64,
    pub redemptions_accepted: AtomicU64,
    pub redemptions_rejected: AtomicU64,
    pub compensations: AtomicU64,
    pub rewards_dispensed: AtomicU64,
    pub scans_completed: AtomicU64,
    pub scans_failed: AtomicU64,
}

impl RelayMetrics {
    pub fn new() -> Self {
        Self {
            submissions: AtomicU64::new(0),
            submission_failures: AtomicU64::new(0),
            unconfirmed_submissions: AtomicU64::new(0),
            nonce_resyncs: AtomicU64::new(0),
            redemptions_accepted: AtomicU64::new(0),
            redemptions_rejected: AtomicU64::new(0),
            compensations: AtomicU64::new(0),
            rewards_dispensed: AtomicU64::new(0),
            scans_completed: AtomicU64::new(0),
            scans_failed: AtomicU64::new(0),
        }
    }

    pub fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> RelayMetricsSnapshot {
        RelayMetricsSnapshot {
            submissions: self.submissions.load(Ordering::Relaxed),
            submission_failures: self.submission_failures.load(Ordering::Relaxed),
            unconfirmed_submissions: self.unconfirmed_submissions.load(Ordering::Relaxed),
            nonce_resyncs: self.nonce_resyncs.load(Ordering::Relaxed),
            redemptions_accepted: self.redemptions_accepted.load(Ordering::Relaxed),
            redemptions_rejected: self.redemptions_rejected.load(Ordering::Relaxed),
            compensations: self.compensations.load(Ordering::Relaxed),
            rewards_dispensed: self.rewards_dispensed.load(Ordering::Relaxed),
            scans_completed: self.scans_completed.load(Ordering::Relaxed),
            scans_failed: self.scans_failed.load(Ordering::Relaxed),
        }
    }
}

impl Default for RelayMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayMetricsSnapshot {
    pub submissions: u64,
    pub submission_failures: u64,
    pub unconfirmed_submissions: u64,
    pub nonce_resyncs: u64,
    pub redemptions_accepted: u64,
    pub redemptions_rejected: u64,
    pub compensations: u64,
    pub rewards_dispensed: u64,
    pub scans_completed: u64,
    pub scans_failed: u64,
}
