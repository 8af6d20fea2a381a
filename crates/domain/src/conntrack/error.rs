use thiserror::Error;

use crate::common::error::{DomainError, ProtocolError};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConntrackError {
    #[error("invalid setting: {field} must be > 0")]
    InvalidSetting { field: &'static str },

    #[error("unknown connection state: {0}")]
    UnknownState(u8),

    #[error("malformed conntrack entry: {0}")]
    Malformed(#[from] ProtocolError),
}

impl From<ConntrackError> for DomainError {
    fn from(e: ConntrackError) -> Self {
        match e {
            ConntrackError::InvalidSetting { .. } => Self::InvalidConfig(e.to_string()),
            ConntrackError::UnknownState(_) | ConntrackError::Malformed(_) => {
                Self::EngineError(e.to_string())
            }
        }
    }
}
