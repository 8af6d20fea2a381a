use std::collections::BTreeSet;
use std::fmt;
use std::net::Ipv4Addr;

use ebpf_common::ddos::DosIdentifier;
use serde::{Deserialize, Serialize};

use crate::common::entity::{TcpFlag, TransportProtocol};
use crate::firewall::entity::FwRule;

use super::error::DosError;

/// Lifecycle of a policy. `Triggered` is terminal until the policy is
/// deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyStatus {
    #[default]
    NotTriggered,
    Triggered,
}

impl PolicyStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotTriggered => "not triggered",
            Self::Triggered => "triggered",
        }
    }
}

impl fmt::Display for PolicyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A rate policy: more than `limit` packets of `protocol` (and `flag` for
/// TCP) from one source within a poll interval blocks that source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DosPolicy {
    #[serde(default)]
    pub id: u32,
    pub protocol: TransportProtocol,
    #[serde(default)]
    pub flag: Option<TcpFlag>,
    /// Packets allowed per poll interval.
    pub limit: u64,
    #[serde(default)]
    pub status: PolicyStatus,
    /// Firewall rules installed by this policy, in installation order.
    #[serde(default)]
    pub fw_rule_ids: Vec<u32>,
    /// Sources already blocked by this policy.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub blocked: BTreeSet<Ipv4Addr>,
}

impl DosPolicy {
    pub fn new(protocol: TransportProtocol, flag: Option<TcpFlag>, limit: u64) -> Self {
        Self {
            id: 0,
            protocol,
            flag,
            limit,
            status: PolicyStatus::NotTriggered,
            fw_rule_ids: Vec::new(),
            blocked: BTreeSet::new(),
        }
    }

    pub fn validate(&self) -> Result<(), DosError> {
        if self.protocol == TransportProtocol::Any {
            return Err(DosError::InvalidPolicy(
                "protocol must be one of icmp, tcp, udp".to_string(),
            ));
        }
        if self.flag.is_some() && self.protocol != TransportProtocol::Tcp {
            return Err(DosError::FlagWithoutTcp {
                protocol: self.protocol.to_string(),
            });
        }
        Ok(())
    }

    /// Value of the identifier `flag` byte this policy counts against.
    pub fn flag_bits(&self) -> u8 {
        self.flag.map_or(0, TcpFlag::bits)
    }

    /// Whether a counter identifier of the given (already decoded) protocol
    /// falls under this policy.
    pub fn matches(&self, protocol: TransportProtocol, key: &DosIdentifier) -> bool {
        self.protocol == protocol && self.flag_bits() == key.flag
    }
}

/// A firewall rule the engine wants installed on behalf of a policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mitigation {
    pub policy_id: u32,
    pub source: Ipv4Addr,
    pub rule: FwRule,
}

/// Result of evaluating one full read of the counter table.
#[derive(Debug, Default)]
pub struct Evaluation {
    pub mitigations: Vec<Mitigation>,
    /// Identifiers whose protocol byte is not a known protocol.
    pub skipped: Vec<DosIdentifier>,
}
