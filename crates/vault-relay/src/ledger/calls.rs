use ethers::abi::Token;
use ethers::types::{Address, Bytes, H256};
use ethers::utils::{id, keccak256};
use vault_types::{EthAddress, VaultError, VaultResult};

/// ERC-721 / ERC-20 `Transfer(address,address,uint256)` event topic.
pub fn transfer_topic() -> H256 {
    H256::from(keccak256(b"Transfer(address,address,uint256)"))
}

pub fn to_address(address: &EthAddress) -> Address {
    Address::from(address.0)
}

pub fn from_address(address: Address) -> EthAddress {
    EthAddress::from_bytes(address.0)
}

/// Full `0x`-prefixed lowercase hex of a transaction hash.
pub fn hash_hex(hash: &H256) -> String {
    format!("{:?}", hash)
}

/// Parses a `0x`-prefixed 32-byte transaction hash.
pub fn parse_hash(raw: &str) -> VaultResult<H256> {
    let trimmed = raw.trim();
    let body = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    if body.len() != 64 {
        return Err(VaultError::InvalidInput(format!("Invalid transaction hash: {}", raw)));
    }
    let bytes = hex::decode(body)
        .map_err(|_| VaultError::InvalidInput(format!("Invalid transaction hash: {}", raw)))?;
    Ok(H256::from_slice(&bytes))
}

/// The low 20 bytes of an indexed address topic.
pub fn address_from_topic(topic: &H256) -> Address {
    Address::from_slice(&topic.as_bytes()[12..])
}

/// A contract function identified by its canonical signature, e.g.
/// `mintToReader(address)`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CallSignature {
    signature: String,
    selector: [u8; 4],
}

impl CallSignature {
    pub fn parse(signature: &str) -> VaultResult<Self> {
        let signature = signature.trim();
        let open = signature.find('(');
        let valid = match open {
            Some(i) => i > 0 && signature.ends_with(')') && !signature.contains(' '),
            None => false,
        };
        if !valid {
            return Err(VaultError::Config(format!(
                "Invalid call signature: {:?}",
                signature
            )));
        }

        Ok(Self {
            signature: signature.to_string(),
            selector: id(signature),
        })
    }

    pub fn selector(&self) -> [u8; 4] {
        self.selector
    }

    pub fn signature(&self) -> &str {
        &self.signature
    }

    pub fn encode(&self, args: &[Token]) -> Bytes {
        let mut data = self.selector.to_vec();
        data.extend(ethers::abi::encode(args));
        Bytes::from(data)
    }
}
