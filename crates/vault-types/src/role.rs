use serde::{Deserialize, Serialize};
use std::fmt;

/// Resolved role of a presented code or account.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Publisher,
    Author,
    Reader,
    #[default]
    Unknown,
}

impl Role {
    pub fn is_authorized(&self) -> bool {
        !matches!(self, Role::Unknown)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Publisher => write!(f, "publisher"),
            Role::Author => write!(f, "author"),
            Role::Reader => write!(f, "reader"),
            Role::Unknown => write!(f, "unknown"),
        }
    }
}

/// Issuance class of a code batch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CodeClass {
    Publisher,
    Author,
    #[default]
    Reader,
}

impl CodeClass {
    pub fn role(&self) -> Role {
        match self {
            CodeClass::Publisher => Role::Publisher,
            CodeClass::Author => Role::Author,
            CodeClass::Reader => Role::Reader,
        }
    }
}

impl fmt::Display for CodeClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.role().fmt(f)
    }
}

impl std::str::FromStr for CodeClass {
    type Err = crate::VaultError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "publisher" => Ok(CodeClass::Publisher),
            "author" => Ok(CodeClass::Author),
            "reader" => Ok(CodeClass::Reader),
            other => Err(crate::VaultError::InvalidInput(format!(
                "Unknown code class: {}",
                other
            ))),
        }
    }
}
