use thiserror::Error;

use crate::common::error::DomainError;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LbError {
    #[error("backend not found: {id}")]
    BackendNotFound { id: u32 },

    #[error("no neighbor entry for {addr}")]
    NeighborNotFound { addr: String },

    #[error("backend {id} must be drained before delete")]
    NotDrained { id: u32 },

    #[error("round-robin table is full ({capacity} slots)")]
    RotationFull { capacity: u32 },

    #[error("invalid backend: {0}")]
    InvalidBackend(String),

    #[error("invalid upstream: {0}")]
    InvalidUpstream(String),
}

impl From<LbError> for DomainError {
    fn from(e: LbError) -> Self {
        match e {
            LbError::BackendNotFound { id } => Self::RuleNotFound(id.to_string()),
            LbError::NeighborNotFound { addr } => Self::RuleNotFound(addr),
            LbError::NotDrained { .. } => Self::PreconditionFailed(e.to_string()),
            LbError::RotationFull { .. } => Self::EngineError(e.to_string()),
            LbError::InvalidBackend(msg) => Self::InvalidRule(msg),
            LbError::InvalidUpstream(msg) => Self::InvalidConfig(msg),
        }
    }
}
