use thiserror::Error;

use crate::common::error::DomainError;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FirewallError {
    #[error("invalid port range: {start}..{end}")]
    InvalidPortRange { start: u16, end: u16 },

    #[error("invalid CIDR prefix length: {prefix_len}")]
    InvalidCidr { prefix_len: u8 },

    #[error("a rule matches either a source or a destination port range, not both")]
    ConflictingPortRanges,

    #[error("ICMP rules cannot specify port ranges")]
    IcmpWithPorts,

    #[error("rule id space exhausted at {last}")]
    IdSpaceExhausted { last: u32 },

    #[error("rule not found: {id}")]
    RuleNotFound { id: u32 },
}

impl From<FirewallError> for DomainError {
    fn from(e: FirewallError) -> Self {
        match e {
            FirewallError::RuleNotFound { id } => Self::RuleNotFound(id.to_string()),
            FirewallError::IdSpaceExhausted { .. } => Self::EngineError(e.to_string()),
            FirewallError::InvalidPortRange { .. }
            | FirewallError::InvalidCidr { .. }
            | FirewallError::ConflictingPortRanges
            | FirewallError::IcmpWithPorts => Self::InvalidRule(e.to_string()),
        }
    }
}
