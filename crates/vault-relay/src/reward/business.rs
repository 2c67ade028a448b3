use ethers::types::H256;
use ethers::utils::keccak256;
use vault_types::CodeHash;

/// Replay-proof identifier of a group of codes: keccak256 over the 32-byte
/// code hashes in ascending order. Presentation order does not matter.
pub fn business_id(codes: &[CodeHash]) -> H256 {
    let mut sorted = codes.to_vec();
    sorted.sort();

    let mut combined = Vec::with_capacity(sorted.len() * 32);
    for code in &sorted {
        combined.extend_from_slice(code.as_bytes());
    }
    H256::from(keccak256(combined))
}
