use std::net::Ipv4Addr;
use std::time::{Duration, SystemTime};

use ebpf_common::conntrack::{
    CT_STATE_CLOSED, CT_STATE_CLOSING, CT_STATE_ESTABLISHED, CT_STATE_NOT_TCP, CT_STATE_OPENING,
    ConntrackInfo, ConntrackKey,
};
use serde::{Deserialize, Serialize};

use crate::common::entity::{TransportProtocol, ipv4_from_le, port_from_be};

use super::error::ConntrackError;

/// Per-flow state byte maintained by the data plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    NotTcp,
    Opening,
    Established,
    Closing,
    Closed,
}

impl ConnectionState {
    pub fn from_u8(val: u8) -> Result<Self, ConntrackError> {
        match val {
            CT_STATE_NOT_TCP => Ok(Self::NotTcp),
            CT_STATE_OPENING => Ok(Self::Opening),
            CT_STATE_ESTABLISHED => Ok(Self::Established),
            CT_STATE_CLOSING => Ok(Self::Closing),
            CT_STATE_CLOSED => Ok(Self::Closed),
            other => Err(ConntrackError::UnknownState(other)),
        }
    }

    pub fn to_u8(self) -> u8 {
        match self {
            Self::NotTcp => CT_STATE_NOT_TCP,
            Self::Opening => CT_STATE_OPENING,
            Self::Established => CT_STATE_ESTABLISHED,
            Self::Closing => CT_STATE_CLOSING,
            Self::Closed => CT_STATE_CLOSED,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotTcp => "not_tcp",
            Self::Opening => "opening",
            Self::Established => "established",
            Self::Closing => "closing",
            Self::Closed => "closed",
        }
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Userspace view of one tracked flow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConntrackEntry {
    pub src_addr: Ipv4Addr,
    pub dst_addr: Ipv4Addr,
    pub src_port: u16,
    pub dst_port: u16,
    pub protocol: TransportProtocol,
    pub state: ConnectionState,
    /// Last time the packet counter was seen to grow.
    pub last_seen: SystemTime,
    pub backend_id: u32,
    pub counter: u64,
}

impl ConntrackEntry {
    pub fn from_kernel(
        key: &ConntrackKey,
        info: &ConntrackInfo,
        now: SystemTime,
    ) -> Result<Self, ConntrackError> {
        Ok(Self {
            src_addr: ipv4_from_le(key.src_addr),
            dst_addr: ipv4_from_le(key.dst_addr),
            src_port: port_from_be(key.src_port),
            dst_port: port_from_be(key.dst_port),
            protocol: TransportProtocol::from_u32(key.protocol)?,
            state: ConnectionState::from_u8(info.status)?,
            last_seen: now,
            backend_id: info.id,
            counter: info.counter,
        })
    }

    /// Closed flows, and UDP flows idle for longer than `lifetime`.
    pub fn is_gc_eligible(&self, now: SystemTime, lifetime: Duration) -> bool {
        if self.state == ConnectionState::Closed {
            return true;
        }
        self.protocol == TransportProtocol::Udp
            && now.duration_since(self.last_seen).unwrap_or_default() > lifetime
    }
}

/// Conntrack reconciliation settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConntrackSettings {
    /// Seconds between two passes over the kernel table.
    pub interval_secs: u64,
    /// Enables the second pass that drops mirror entries the kernel no
    /// longer reports.
    pub gc_enabled: bool,
    /// Idle time after which a UDP flow is purged.
    pub gc_lifetime_secs: u64,
}

impl Default for ConntrackSettings {
    fn default() -> Self {
        Self {
            interval_secs: 1,
            gc_enabled: false,
            gc_lifetime_secs: 3600,
        }
    }
}

impl ConntrackSettings {
    pub fn validate(&self) -> Result<(), ConntrackError> {
        if self.interval_secs == 0 {
            return Err(ConntrackError::InvalidSetting {
                field: "interval_secs",
            });
        }
        if self.gc_lifetime_secs == 0 {
            return Err(ConntrackError::InvalidSetting {
                field: "gc_lifetime_secs",
            });
        }
        Ok(())
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn gc_lifetime(&self) -> Duration {
        Duration::from_secs(self.gc_lifetime_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::entity::ipv4_to_le;

    fn make_key(protocol: u32) -> ConntrackKey {
        ConntrackKey {
            src_addr: ipv4_to_le(Ipv4Addr::new(198, 51, 100, 7)),
            dst_addr: ipv4_to_le(Ipv4Addr::new(203, 0, 113, 10)),
            src_port: 40_000u16.to_be(),
            dst_port: 80u16.to_be(),
            protocol,
        }
    }

    fn make_info(status: u8, counter: u64) -> ConntrackInfo {
        ConntrackInfo {
            id: 2,
            ifindex: 9,
            status,
            src_mac: [0; 6],
            _pad: 0,
            counter,
        }
    }

    #[test]
    fn state_values() {
        for v in 0..=4 {
            assert_eq!(ConnectionState::from_u8(v).unwrap().to_u8(), v);
        }
        assert_eq!(
            ConnectionState::from_u8(9),
            Err(ConntrackError::UnknownState(9))
        );
    }

    #[test]
    fn entry_decodes_kernel_record() {
        let now = SystemTime::UNIX_EPOCH + Duration::from_secs(100);
        let e = ConntrackEntry::from_kernel(&make_key(6), &make_info(2, 12), now).unwrap();
        assert_eq!(e.src_addr, Ipv4Addr::new(198, 51, 100, 7));
        assert_eq!(e.dst_addr, Ipv4Addr::new(203, 0, 113, 10));
        assert_eq!(e.src_port, 40_000);
        assert_eq!(e.dst_port, 80);
        assert_eq!(e.protocol, TransportProtocol::Tcp);
        assert_eq!(e.state, ConnectionState::Established);
        assert_eq!(e.backend_id, 2);
        assert_eq!(e.counter, 12);
        assert_eq!(e.last_seen, now);
    }

    #[test]
    fn entry_rejects_unknown_protocol() {
        let now = SystemTime::UNIX_EPOCH;
        assert!(matches!(
            ConntrackEntry::from_kernel(&make_key(47), &make_info(0, 1), now),
            Err(ConntrackError::Malformed(_))
        ));
    }

    #[test]
    fn closed_is_always_eligible() {
        let now = SystemTime::UNIX_EPOCH + Duration::from_secs(10);
        let e = ConntrackEntry::from_kernel(&make_key(6), &make_info(4, 1), now).unwrap();
        assert!(e.is_gc_eligible(now, Duration::from_secs(3600)));
    }

    #[test]
    fn idle_udp_is_eligible_after_lifetime() {
        let start = SystemTime::UNIX_EPOCH + Duration::from_secs(10);
        let e = ConntrackEntry::from_kernel(&make_key(17), &make_info(0, 1), start).unwrap();
        let lifetime = Duration::from_secs(60);
        assert!(!e.is_gc_eligible(start + Duration::from_secs(60), lifetime));
        assert!(e.is_gc_eligible(start + Duration::from_secs(61), lifetime));
    }

    #[test]
    fn idle_tcp_is_never_eligible() {
        let start = SystemTime::UNIX_EPOCH;
        let e = ConntrackEntry::from_kernel(&make_key(6), &make_info(2, 1), start).unwrap();
        assert!(!e.is_gc_eligible(start + Duration::from_secs(86_400), Duration::from_secs(1)));
    }

    #[test]
    fn settings_defaults_and_validation() {
        let s = ConntrackSettings::default();
        assert_eq!(s.interval(), Duration::from_secs(1));
        assert!(!s.gc_enabled);
        assert_eq!(s.gc_lifetime(), Duration::from_secs(3600));
        assert!(s.validate().is_ok());

        let bad = ConntrackSettings {
            interval_secs: 0,
            ..ConntrackSettings::default()
        };
        assert_eq!(
            bad.validate(),
            Err(ConntrackError::InvalidSetting {
                field: "interval_secs"
            })
        );
    }
}
