//! Pool of relayer keys that pay fees on behalf of end users.
//!
//! Identities are picked round-robin. Each identity owns a cached nonce that
//! is only read and advanced under its own lock, so two submissions never
//! reuse a nonce. A nonce conflict reported by the node triggers a resync
//! from the pending nonce before the next attempt.

mod identity;
mod pool;

pub use identity::{IdentityStatus, SigningIdentity};
pub use pool::{RelayerPool, Submission};
