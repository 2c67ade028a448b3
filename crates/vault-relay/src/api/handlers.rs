use vault_types::{CodeHash, EthAddress, VaultError, VaultResult};

pub(super) fn parse_address(raw: &str, field: &str) -> VaultResult<EthAddress> {
    EthAddress::from_hex(raw)
        .map_err(|_| VaultError::InvalidInput(format!("Malformed {}: {:?}", field, raw)))
}

pub(super) fn parse_optional_address(raw: Option<&str>, field: &str) -> VaultResult<Option<EthAddress>> {
    match raw.map(str::trim) {
        Some(raw) if !raw.is_empty() => parse_address(raw, field).map(Some),
        _ => Ok(None),
    }
}

pub(super) fn parse_code(raw: &str) -> VaultResult<CodeHash> {
    CodeHash::parse(raw)
}
