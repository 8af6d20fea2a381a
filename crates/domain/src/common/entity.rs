use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::error::ProtocolError;

// ── Transport protocol ──────────────────────────────────────────────

/// L4 protocol as understood by the data plane. `Any` is the wildcard
/// value 0 used by firewall rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportProtocol {
    #[default]
    Any,
    Icmp,
    Tcp,
    Udp,
}

impl TransportProtocol {
    /// IP protocol number written into kernel maps.
    pub const fn as_u32(self) -> u32 {
        match self {
            Self::Any => 0,
            Self::Icmp => 1,
            Self::Tcp => 6,
            Self::Udp => 17,
        }
    }

    /// Parse a raw protocol number read back from a kernel map.
    /// Unknown numbers are an error rather than a catch-all variant.
    pub fn from_u32(value: u32) -> Result<Self, ProtocolError> {
        match value {
            0 => Ok(Self::Any),
            1 => Ok(Self::Icmp),
            6 => Ok(Self::Tcp),
            17 => Ok(Self::Udp),
            other => Err(ProtocolError::UnknownProtocol(other.to_string())),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Any => "any",
            Self::Icmp => "icmp",
            Self::Tcp => "tcp",
            Self::Udp => "udp",
        }
    }
}

impl fmt::Display for TransportProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransportProtocol {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "any" => Ok(Self::Any),
            "icmp" => Ok(Self::Icmp),
            "tcp" => Ok(Self::Tcp),
            "udp" => Ok(Self::Udp),
            _ => Err(ProtocolError::UnknownProtocol(s.to_string())),
        }
    }
}

// ── TCP flag ────────────────────────────────────────────────────────

/// Single TCP control flag, matched against the `type` byte of DoS
/// counter identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TcpFlag {
    Fin,
    Syn,
    Rst,
    Psh,
    Ack,
    Urg,
    Ece,
    Cwr,
}

impl TcpFlag {
    /// Bit of this flag in the TCP header flags byte.
    pub const fn bits(self) -> u8 {
        match self {
            Self::Fin => 0x01,
            Self::Syn => 0x02,
            Self::Rst => 0x04,
            Self::Psh => 0x08,
            Self::Ack => 0x10,
            Self::Urg => 0x20,
            Self::Ece => 0x40,
            Self::Cwr => 0x80,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Fin => "fin",
            Self::Syn => "syn",
            Self::Rst => "rst",
            Self::Psh => "psh",
            Self::Ack => "ack",
            Self::Urg => "urg",
            Self::Ece => "ece",
            Self::Cwr => "cwr",
        }
    }
}

impl fmt::Display for TcpFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TcpFlag {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "fin" => Ok(Self::Fin),
            "syn" => Ok(Self::Syn),
            "rst" => Ok(Self::Rst),
            "psh" => Ok(Self::Psh),
            "ack" => Ok(Self::Ack),
            "urg" => Ok(Self::Urg),
            "ece" => Ok(Self::Ece),
            "cwr" => Ok(Self::Cwr),
            _ => Err(ProtocolError::UnknownTcpFlag(s.to_string())),
        }
    }
}

// ── MAC address ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct MacAddr(pub [u8; 6]);

impl MacAddr {
    /// The kernel neighbor table reports unresolved entries as all zeros.
    pub fn is_zero(&self) -> bool {
        self.0 == [0; 6]
    }

    pub const fn octets(&self) -> [u8; 6] {
        self.0
    }
}

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02x}:{b:02x}:{c:02x}:{d:02x}:{e:02x}:{g:02x}")
    }
}

impl FromStr for MacAddr {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut octets = [0u8; 6];
        let mut parts = s.split([':', '-']);
        for octet in &mut octets {
            let part = parts
                .next()
                .ok_or_else(|| ProtocolError::InvalidMac(s.to_string()))?;
            if part.len() != 2 {
                return Err(ProtocolError::InvalidMac(s.to_string()));
            }
            *octet = u8::from_str_radix(part, 16)
                .map_err(|_| ProtocolError::InvalidMac(s.to_string()))?;
        }
        if parts.next().is_some() {
            return Err(ProtocolError::InvalidMac(s.to_string()));
        }
        Ok(Self(octets))
    }
}

impl From<MacAddr> for String {
    fn from(mac: MacAddr) -> Self {
        mac.to_string()
    }
}

impl TryFrom<String> for MacAddr {
    type Error = ProtocolError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

// ── Byte-order helpers ──────────────────────────────────────────────

/// Encode an IPv4 address the way the data plane stores it: the four
/// octets in wire order read as a little-endian `u32`.
pub fn ipv4_to_le(addr: Ipv4Addr) -> u32 {
    u32::from_le_bytes(addr.octets())
}

/// Inverse of [`ipv4_to_le`].
pub fn ipv4_from_le(value: u32) -> Ipv4Addr {
    Ipv4Addr::from(value.to_le_bytes())
}

/// Ports in conntrack keys are kept in network byte order.
pub fn port_from_be(value: u16) -> u16 {
    u16::from_be(value)
}
