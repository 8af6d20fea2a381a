use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

use ebpf_common::firewall::{FwRuleEntry, NetworkKey};
use serde::{Deserialize, Serialize};

use crate::common::entity::{TransportProtocol, ipv4_to_le};
use crate::common::error::ProtocolError;

use super::error::FirewallError;

// ── IPv4 network ────────────────────────────────────────────────────

/// IPv4 prefix. The address is kept masked to the prefix so two spellings
/// of the same network map to the same kernel key: `10.1.2.3/16` is stored,
/// displayed and reported back as `10.1.0.0/16`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct Ipv4Network {
    addr: Ipv4Addr,
    prefix_len: u8,
}

impl Ipv4Network {
    /// Bits of `addr` past the first `prefix_len` are cleared.
    pub fn new(addr: Ipv4Addr, prefix_len: u8) -> Result<Self, FirewallError> {
        if prefix_len > 32 {
            return Err(FirewallError::InvalidCidr { prefix_len });
        }
        let mask = if prefix_len == 0 {
            0
        } else {
            u32::MAX << (32 - u32::from(prefix_len))
        };
        Ok(Self {
            addr: Ipv4Addr::from(u32::from(addr) & mask),
            prefix_len,
        })
    }

    /// Single-host `/32` network.
    pub fn host(addr: Ipv4Addr) -> Self {
        Self {
            addr,
            prefix_len: 32,
        }
    }

    pub fn addr(&self) -> Ipv4Addr {
        self.addr
    }

    pub fn prefix_len(&self) -> u8 {
        self.prefix_len
    }

    /// Key shared by the `rules` and `adv_rulematcher` LPM tries.
    pub fn to_ebpf_key(&self) -> NetworkKey {
        NetworkKey {
            prefix_len: u32::from(self.prefix_len),
            address: ipv4_to_le(self.addr),
        }
    }
}

impl fmt::Display for Ipv4Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.addr, self.prefix_len)
    }
}

impl FromStr for Ipv4Network {
    type Err = ProtocolError;

    /// Accepts `a.b.c.d/n` or a bare address, read as `/32`. Host bits are
    /// masked away as in [`Ipv4Network::new`].
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ProtocolError::InvalidNetwork(s.to_string());
        let (addr, prefix_len) = match s.split_once('/') {
            Some((addr, len)) => (addr, len.parse::<u8>().map_err(|_| invalid())?),
            None => (s, 32),
        };
        let addr = addr.parse::<Ipv4Addr>().map_err(|_| invalid())?;
        Self::new(addr, prefix_len).map_err(|_| invalid())
    }
}

impl From<Ipv4Network> for String {
    fn from(network: Ipv4Network) -> Self {
        network.to_string()
    }
}

impl TryFrom<String> for Ipv4Network {
    type Error = ProtocolError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

// ── Port range ──────────────────────────────────────────────────────

/// Inclusive port range. `0-0` is the wildcard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct PortRange {
    pub start: u16,
    pub end: u16,
}

impl PortRange {
    pub const ANY: Self = Self { start: 0, end: 0 };

    pub const fn single(port: u16) -> Self {
        Self {
            start: port,
            end: port,
        }
    }

    pub fn is_any(&self) -> bool {
        *self == Self::ANY
    }

    pub fn contains(&self, port: u16) -> bool {
        self.is_any() || (port >= self.start && port <= self.end)
    }

    pub fn validate(&self) -> Result<(), FirewallError> {
        if self.start > self.end {
            return Err(FirewallError::InvalidPortRange {
                start: self.start,
                end: self.end,
            });
        }
        Ok(())
    }
}

impl fmt::Display for PortRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_any() {
            f.write_str("any")
        } else if self.start == self.end {
            write!(f, "{}", self.start)
        } else {
            write!(f, "{}-{}", self.start, self.end)
        }
    }
}

impl FromStr for PortRange {
    type Err = ProtocolError;

    /// Accepts `N`, `N-M` or `any`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ProtocolError::InvalidPortRange(s.to_string());
        let s = s.trim();
        if s.eq_ignore_ascii_case("any") {
            return Ok(Self::ANY);
        }
        let (start, end) = match s.split_once('-') {
            Some((start, end)) => (
                start.trim().parse().map_err(|_| invalid())?,
                end.trim().parse().map_err(|_| invalid())?,
            ),
            None => {
                let port = s.parse().map_err(|_| invalid())?;
                (port, port)
            }
        };
        let range = Self { start, end };
        range.validate().map_err(|_| invalid())?;
        Ok(range)
    }
}

impl From<PortRange> for String {
    fn from(range: PortRange) -> Self {
        range.to_string()
    }
}

impl TryFrom<String> for PortRange {
    type Error = ProtocolError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

// ── Firewall rule ───────────────────────────────────────────────────

/// Deny rule for traffic from or to a network.
///
/// The kernel record carries a single port range that is matched against
/// either the source or the destination port of a packet, so at most one of
/// `src_ports` and `dst_ports` may be set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FwRule {
    /// Assigned by the engine; 0 until the rule is installed.
    #[serde(default)]
    pub id: u32,
    pub network: Ipv4Network,
    #[serde(default)]
    pub src_ports: PortRange,
    #[serde(default)]
    pub dst_ports: PortRange,
    #[serde(default)]
    pub protocol: TransportProtocol,
    /// Packets dropped by this rule, refreshed from the kernel on read.
    #[serde(default)]
    pub drop_count: u64,
}

impl FwRule {
    pub fn new(
        network: Ipv4Network,
        src_ports: PortRange,
        dst_ports: PortRange,
        protocol: TransportProtocol,
    ) -> Self {
        Self {
            id: 0,
            network,
            src_ports,
            dst_ports,
            protocol,
            drop_count: 0,
        }
    }

    /// Block every packet of `protocol` from a single host.
    pub fn block_host(addr: Ipv4Addr, protocol: TransportProtocol) -> Self {
        Self::new(
            Ipv4Network::host(addr),
            PortRange::ANY,
            PortRange::ANY,
            protocol,
        )
    }

    pub fn validate(&self) -> Result<(), FirewallError> {
        self.src_ports.validate()?;
        self.dst_ports.validate()?;
        if !self.src_ports.is_any() && !self.dst_ports.is_any() {
            return Err(FirewallError::ConflictingPortRanges);
        }
        if self.protocol == TransportProtocol::Icmp && !self.ports().is_any() {
            return Err(FirewallError::IcmpWithPorts);
        }
        Ok(())
    }

    /// The range written to the kernel record.
    pub fn ports(&self) -> PortRange {
        if self.dst_ports.is_any() {
            self.src_ports
        } else {
            self.dst_ports
        }
    }

    pub fn to_ebpf_key(&self) -> NetworkKey {
        self.network.to_ebpf_key()
    }

    pub fn to_ebpf_entry(&self) -> FwRuleEntry {
        let ports = self.ports();
        FwRuleEntry {
            id: self.id,
            from_port: ports.start,
            to_port: ports.end,
            protocol: self.protocol.as_u32(),
        }
    }
}
