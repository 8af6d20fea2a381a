use std::fmt;
use std::net::Ipv4Addr;

use ebpf_common::loadbalancer::{
    BACKEND_STATUS_AVAILABLE, BACKEND_STATUS_UNAVAILABLE, BackendInfo, UpstreamInfo,
};
use serde::{Deserialize, Serialize};

use crate::common::entity::{MacAddr, ipv4_to_le};

use super::error::LbError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendStatus {
    #[default]
    Available,
    Unavailable,
}

impl BackendStatus {
    /// Value of the `status` field in `backend_info`.
    pub const fn to_u32(self) -> u32 {
        match self {
            Self::Available => BACKEND_STATUS_AVAILABLE,
            Self::Unavailable => BACKEND_STATUS_UNAVAILABLE,
        }
    }

    /// Anything other than the unavailable marker reads as available,
    /// which is how the data plane treats it.
    pub const fn from_u32(value: u32) -> Self {
        if value == BACKEND_STATUS_UNAVAILABLE {
            Self::Unavailable
        } else {
            Self::Available
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Available => "Available",
            Self::Unavailable => "Unavailable",
        }
    }
}

impl fmt::Display for BackendStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the operator supplies to register a backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendSpec {
    pub name: String,
    pub addr: Ipv4Addr,
    #[serde(default)]
    pub health_check: String,
}

impl BackendSpec {
    pub fn validate(&self) -> Result<(), LbError> {
        if self.name.trim().is_empty() {
            return Err(LbError::InvalidBackend(
                "backend name must not be empty".to_string(),
            ));
        }
        if self.addr.is_unspecified() || self.addr.is_broadcast() || self.addr.is_multicast() {
            return Err(LbError::InvalidBackend(format!(
                "backend address {} is not a unicast address",
                self.addr
            )));
        }
        Ok(())
    }
}

/// Host neighbor-table entry for a backend address, completed with the
/// index and MAC of the device it was learned on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NeighborEntry {
    pub mac: MacAddr,
    pub device: String,
    pub ifindex: u32,
    pub device_mac: MacAddr,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Backend {
    pub id: u32,
    pub name: String,
    pub addr: Ipv4Addr,
    /// Resolved MAC of the backend itself.
    pub mac: MacAddr,
    /// Device the backend is reachable through.
    pub device: String,
    pub ifindex: u32,
    pub device_mac: MacAddr,
    pub health_check: String,
    pub status: BackendStatus,
}

impl Backend {
    pub fn new(id: u32, spec: BackendSpec, neighbor: NeighborEntry) -> Self {
        Self {
            id,
            name: spec.name,
            addr: spec.addr,
            mac: neighbor.mac,
            device: neighbor.device,
            ifindex: neighbor.ifindex,
            device_mac: neighbor.device_mac,
            health_check: spec.health_check,
            status: BackendStatus::Available,
        }
    }

    pub fn to_backend_info(&self) -> BackendInfo {
        BackendInfo {
            id: self.id,
            ifindex: self.ifindex,
            status: self.status.to_u32(),
            src_mac: self.device_mac.octets(),
            dst_mac: self.mac.octets(),
            dst_ip: ipv4_to_le(self.addr),
        }
    }
}

/// The device facing clients, carrying the virtual IP.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Upstream {
    pub vip: Ipv4Addr,
    pub ifindex: u32,
    pub mac: MacAddr,
}

impl Upstream {
    pub fn to_upstream_info(&self) -> Result<UpstreamInfo, LbError> {
        let ifindex = u16::try_from(self.ifindex).map_err(|_| {
            LbError::InvalidUpstream(format!("ifindex {} does not fit in 16 bits", self.ifindex))
        })?;
        Ok(UpstreamInfo {
            ip: ipv4_to_le(self.vip),
            ifindex,
            mac: self.mac.octets(),
        })
    }
}
