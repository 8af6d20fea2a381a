/// Maximum entries in the `dosp_counter` map.
pub const DOSP_COUNTER_MAX_ENTRIES: u32 = 65_536;

// ── Flow identifier ────────────────────────────────────────────

/// Key of the `dosp_counter` map, value is a cumulative `u64` packet count.
///
/// `flag` carries the TCP flag bit the packet was counted under, or 0 for
/// non-TCP traffic.
///
/// Size: 8 bytes.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DosIdentifier {
    /// Source IPv4 address, octets stored little-endian.
    pub address: u32,
    /// IP protocol number.
    pub protocol: u8,
    pub flag: u8,
    pub _pad: [u8; 2],
}

impl DosIdentifier {
    pub const fn new(address: u32, protocol: u8, flag: u8) -> Self {
        Self {
            address,
            protocol,
            flag,
            _pad: [0; 2],
        }
    }
}

// SAFETY: #[repr(C)], Copy, 'static, explicit padding.
#[cfg(feature = "userspace")]
unsafe impl aya::Pod for DosIdentifier {}

#[cfg(test)]
mod tests {
    use super::*;
    use core::mem;

    #[test]
    fn dos_identifier_size() {
        assert_eq!(mem::size_of::<DosIdentifier>(), 8);
    }

    #[test]
    fn dos_identifier_offsets() {
        assert_eq!(mem::offset_of!(DosIdentifier, address), 0);
        assert_eq!(mem::offset_of!(DosIdentifier, protocol), 4);
        assert_eq!(mem::offset_of!(DosIdentifier, flag), 5);
        assert_eq!(mem::offset_of!(DosIdentifier, _pad), 6);
    }

    #[test]
    fn new_zeroes_padding() {
        let id = DosIdentifier::new(0x0100_000a, 6, 2);
        assert_eq!(id._pad, [0, 0]);
    }
}
