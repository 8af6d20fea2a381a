use thiserror::Error;

use crate::common::error::DomainError;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DosError {
    #[error("invalid policy: {0}")]
    InvalidPolicy(String),

    #[error("tcp flag requires protocol tcp, got {protocol}")]
    FlagWithoutTcp { protocol: String },

    #[error("policy not found: {id}")]
    PolicyNotFound { id: u32 },
}

impl From<DosError> for DomainError {
    fn from(e: DosError) -> Self {
        match e {
            DosError::PolicyNotFound { id } => Self::RuleNotFound(id.to_string()),
            DosError::InvalidPolicy(msg) => Self::InvalidRule(msg),
            DosError::FlagWithoutTcp { .. } => Self::InvalidRule(e.to_string()),
        }
    }
}
