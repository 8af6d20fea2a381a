//! Connection tracking records shared with the `lb_ingress`/`lb_egress`
//! programs. The kernel owns state transitions; userspace mirrors the table
//! and deletes finished flows.

/// Maximum entries in the `conntrack` map.
pub const CT_MAX_ENTRIES: u32 = 65_536;

// ── Connection states (ConntrackInfo.status) ─────────────────────────

pub const CT_STATE_NOT_TCP: u8 = 0;
pub const CT_STATE_OPENING: u8 = 1;
pub const CT_STATE_ESTABLISHED: u8 = 2;
pub const CT_STATE_CLOSING: u8 = 3;
pub const CT_STATE_CLOSED: u8 = 4;

// ── Conntrack key — 16 bytes ─────────────────────────────────────────

/// 5-tuple key of the `conntrack` map.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConntrackKey {
    /// Octets stored little-endian.
    pub src_addr: u32,
    /// Octets stored little-endian.
    pub dst_addr: u32,
    /// Network byte order.
    pub src_port: u16,
    /// Network byte order.
    pub dst_port: u16,
    pub protocol: u32,
}

// ── Conntrack value — 24 bytes ───────────────────────────────────────

/// Per-flow state written by the kernel program.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConntrackInfo {
    /// Backend id the flow is pinned to.
    pub id: u32,
    /// Device index of that backend.
    pub ifindex: u32,
    /// One of the `CT_STATE_*` values.
    pub status: u8,
    pub src_mac: [u8; 6],
    pub _pad: u8,
    /// Cumulative packets seen on this flow.
    pub counter: u64,
}

// SAFETY: #[repr(C)], Copy, 'static, explicit padding.
#[cfg(feature = "userspace")]
unsafe impl aya::Pod for ConntrackKey {}
#[cfg(feature = "userspace")]
unsafe impl aya::Pod for ConntrackInfo {}
