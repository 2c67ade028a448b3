#![forbid(unsafe_code)]
#![warn(clippy::all)]

mod address;
mod code;
mod error;
mod role;

pub use address::EthAddress;
pub use code::{CodeHash, REWARD_GROUP_SIZE};
pub use error::{VaultError, VaultResult};
pub use role::{CodeClass, Role};

pub const ETH_ADDRESS_SIZE: usize = 20;

pub const CODE_HASH_SIZE: usize = 32;
