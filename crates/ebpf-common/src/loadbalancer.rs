//! Load balancer map records.

/// Backend status values stored in `BackendInfo.status`.
pub const BACKEND_STATUS_AVAILABLE: u32 = 0;
pub const BACKEND_STATUS_UNAVAILABLE: u32 = 1;

/// Round-robin slot value meaning "no backend".
pub const RR_SLOT_EMPTY: u32 = 0;

/// Capacity of the `rr_table` array.
pub const RR_TABLE_MAX_ENTRIES: u32 = 64;

/// `upstream_info` is a single-slot array.
pub const UPSTREAM_INFO_INDEX: u32 = 0;

// ── Backend info ───────────────────────────────────────────────

/// Value of the `backend_info` `HashMap`, keyed by backend id.
/// Written by userspace, read by eBPF to rewrite and redirect frames.
///
/// Size: 28 bytes.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackendInfo {
    pub id: u32,
    /// Index of the device the backend is reached through.
    pub ifindex: u32,
    /// `BACKEND_STATUS_AVAILABLE` or `BACKEND_STATUS_UNAVAILABLE`.
    pub status: u32,
    /// MAC of the local device (frame source).
    pub src_mac: [u8; 6],
    /// MAC of the backend (frame destination).
    pub dst_mac: [u8; 6],
    /// Backend IPv4 address, octets stored little-endian.
    pub dst_ip: u32,
}

// ── Upstream info ──────────────────────────────────────────────

/// Value of the `upstream_info` array (slot [`UPSTREAM_INFO_INDEX`]).
///
/// Size: 12 bytes.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpstreamInfo {
    /// Virtual IPv4 address, octets stored little-endian.
    pub ip: u32,
    pub ifindex: u16,
    pub mac: [u8; 6],
}

// SAFETY: All types are #[repr(C)], Copy, 'static, and contain only primitive
// types with no implicit padding. Safe for zero-copy eBPF map operations.
#[cfg(feature = "userspace")]
unsafe impl aya::Pod for BackendInfo {}
#[cfg(feature = "userspace")]
unsafe impl aya::Pod for UpstreamInfo {}

#[cfg(test)]
mod tests {
    use super::*;
    use core::mem;

    #[test]
    fn backend_info_size() {
        assert_eq!(mem::size_of::<BackendInfo>(), 28);
    }

    #[test]
    fn backend_info_alignment() {
        assert_eq!(mem::align_of::<BackendInfo>(), 4);
    }

    #[test]
    fn backend_info_offsets() {
        assert_eq!(mem::offset_of!(BackendInfo, id), 0);
        assert_eq!(mem::offset_of!(BackendInfo, ifindex), 4);
        assert_eq!(mem::offset_of!(BackendInfo, status), 8);
        assert_eq!(mem::offset_of!(BackendInfo, src_mac), 12);
        assert_eq!(mem::offset_of!(BackendInfo, dst_mac), 18);
        assert_eq!(mem::offset_of!(BackendInfo, dst_ip), 24);
    }

    #[test]
    fn upstream_info_size() {
        assert_eq!(mem::size_of::<UpstreamInfo>(), 12);
    }

    #[test]
    fn upstream_info_offsets() {
        assert_eq!(mem::offset_of!(UpstreamInfo, ip), 0);
        assert_eq!(mem::offset_of!(UpstreamInfo, ifindex), 4);
        assert_eq!(mem::offset_of!(UpstreamInfo, mac), 6);
    }

    #[test]
    fn status_values_are_distinct() {
        assert_ne!(BACKEND_STATUS_AVAILABLE, BACKEND_STATUS_UNAVAILABLE);
    }
}
