use thiserror::Error;

#[derive(Debug, Error)]
pub enum DomainError {
    #[error("rule not found: {0}")]
    RuleNotFound(String),

    #[error("duplicate rule: {0}")]
    DuplicateRule(String),

    #[error("invalid rule: {0}")]
    InvalidRule(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("precondition failed: {0}")]
    PreconditionFailed(String),

    #[error("engine error: {0}")]
    EngineError(String),
}

/// Malformed protocol-level input: protocol names, TCP flags, addresses.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("unknown protocol: {0}")]
    UnknownProtocol(String),

    #[error("unknown tcp flag: {0}")]
    UnknownTcpFlag(String),

    #[error("invalid MAC address: {0}")]
    InvalidMac(String),

    #[error("invalid network: {0}")]
    InvalidNetwork(String),

    #[error("invalid port range: {0}")]
    InvalidPortRange(String),
}

impl From<ProtocolError> for DomainError {
    fn from(err: ProtocolError) -> Self {
        Self::InvalidRule(err.to_string())
    }
}

impl DomainError {
    /// Fold a list of failures into a single engine error, one message per
    /// failure joined with `"; "`. Returns `None` when the list is empty.
    pub fn aggregate(errors: Vec<DomainError>) -> Option<DomainError> {
        if errors.is_empty() {
            return None;
        }
        let joined = errors
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ");
        Some(Self::EngineError(joined))
    }
}
