//! Voucher codes and everything that hangs off them.
//!
//! Codes live in exactly one of the `valid` / `used` sets. Redemption moves
//! a code between them with one guarded commit and relays a mint; bindings
//! attach an account to a code once and are never replaced.

mod issuance;
mod records;
mod roles;
mod service;

pub use issuance::{generate_raw_code, issue_codes};
pub use records::{
    BindingRecord, BindingSource, BindingView, DailySales, IssuedCode, MintRecord,
    PendingRedemption, ReconcileReport, Redemption, SavedCode, Verification, VerifyStatus,
};
pub use roles::{AccessReport, AllowList, RoleResolver};
pub use service::VoucherService;

#[cfg(test)]
mod tests;
