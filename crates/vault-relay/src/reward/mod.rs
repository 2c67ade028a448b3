//! Referral rewards: five distinct issued codes buy one on-ledger dispense
//! for one recipient.

mod business;
mod dispenser;
mod records;

pub use business::business_id;
pub use dispenser::RewardDispenser;
pub use records::{DispenseReceipt, ReferrerStats, RewardRecord, RewardStatus};
