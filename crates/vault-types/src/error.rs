use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VaultError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid code: {0}")]
    InvalidCode(String),

    #[error("Code already used: {0}")]
    AlreadyUsed(String),

    #[error("Recipient already rewarded: {0}")]
    AlreadyRewarded(String),

    #[error("Business identifier already used: {0}")]
    BusinessIdCollision(String),

    #[error("Code already claimed by another reward: {0}")]
    CodeAlreadyClaimed(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("No funded relayer available: {0}")]
    NoFundedRelayer(String),

    #[error("Nonce conflict: {0}")]
    NonceConflict(String),

    #[error("Insufficient gas funds: {0}")]
    InsufficientGas(String),

    #[error("Transaction reverted: {0}")]
    Reverted(String),

    #[error("Service busy: {0}")]
    Busy(String),

    #[error("Ledger unavailable: {0}")]
    LedgerUnavailable(String),

    /// The transaction may have been broadcast; the hash is known but its fate is not.
    #[error("Submission unconfirmed (tx {tx_hash}): {message}")]
    SubmissionUnconfirmed { tx_hash: String, message: String },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl VaultError {
    /// Stable machine-readable code carried in every error response.
    pub fn code(&self) -> &'static str {
        match self {
            VaultError::InvalidInput(_) => "INVALID_INPUT",
            VaultError::InvalidCode(_) => "INVALID_CODE",
            VaultError::AlreadyUsed(_) => "ALREADY_USED",
            VaultError::AlreadyRewarded(_) => "ALREADY_REWARDED",
            VaultError::BusinessIdCollision(_) => "BUSINESS_ID_USED",
            VaultError::CodeAlreadyClaimed(_) => "CODE_ALREADY_CLAIMED",
            VaultError::NotFound(_) => "NOT_FOUND",
            VaultError::NoFundedRelayer(_) => "NO_FUNDED_RELAYER",
            VaultError::NonceConflict(_) => "NONCE_CONFLICT",
            VaultError::InsufficientGas(_) => "INSUFFICIENT_GAS",
            VaultError::Reverted(_) => "REVERTED",
            VaultError::Busy(_) => "BUSY",
            VaultError::LedgerUnavailable(_) => "LEDGER_UNAVAILABLE",
            VaultError::SubmissionUnconfirmed { .. } => "SUBMISSION_UNCONFIRMED",
            VaultError::Storage(_) => "STORE_UNAVAILABLE",
            VaultError::Timeout(_) => "TIMEOUT",
            VaultError::Config(_) => "CONFIG",
            VaultError::Internal(_) => "INTERNAL",
        }
    }

    /// Input and state-conflict errors: caused by the request, nothing was mutated.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            VaultError::InvalidInput(_)
                | VaultError::InvalidCode(_)
                | VaultError::AlreadyUsed(_)
                | VaultError::AlreadyRewarded(_)
                | VaultError::BusinessIdCollision(_)
                | VaultError::CodeAlreadyClaimed(_)
                | VaultError::NotFound(_)
        )
    }

    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            VaultError::NoFundedRelayer(_)
                | VaultError::NonceConflict(_)
                | VaultError::InsufficientGas(_)
                | VaultError::Busy(_)
                | VaultError::LedgerUnavailable(_)
                | VaultError::Storage(_)
                | VaultError::Timeout(_)
        )
    }

    pub fn tx_hash(&self) -> Option<&str> {
        match self {
            VaultError::SubmissionUnconfirmed { tx_hash, .. } => Some(tx_hash),
            _ => None,
        }
    }
}

pub type VaultResult<T> = Result<T, VaultError>;
