//! Firewall map records.
//!
//! Two-level match: `rules` is keyed by network and answers "is this source
//! inside a blocked prefix", then `adv_rulematcher` lists up to
//! [`ADV_RULES_PER_NETWORK`] rule ids for that network, each resolved through
//! `adv_rules` to a port/protocol qualifier.

/// Capacity of the per-network rule id array in `adv_rulematcher`.
pub const ADV_RULES_PER_NETWORK: usize = 16;

/// Protocol value meaning "any transport protocol".
pub const FW_PROTO_ANY: u32 = 0;

// ── Network key ────────────────────────────────────────────────

/// Key of the `rules` and `adv_rulematcher` maps.
///
/// Laid out as an LPM trie key: prefix length first, then the address bytes
/// in wire order (the `u32` holds them little-endian).
///
/// Size: 8 bytes.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NetworkKey {
    pub prefix_len: u32,
    /// IPv4 address, octets stored little-endian.
    pub address: u32,
}

// ── Rule record ────────────────────────────────────────────────

/// Value of `rules` (keyed by network) and `adv_rules` (keyed by rule id).
///
/// A `from_port`/`to_port` pair of 0/0 matches every port.
///
/// Size: 12 bytes.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FwRuleEntry {
    pub id: u32,
    pub from_port: u16,
    pub to_port: u16,
    /// IP protocol number, [`FW_PROTO_ANY`] for any.
    pub protocol: u32,
}

// ── Advanced matcher ───────────────────────────────────────────

/// Value of `adv_rulematcher`: the ids of every rule sharing a network.
///
/// Slot value 0 means empty. Ids are truncated to 16 bits.
///
/// Size: 32 bytes.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AdvRuleMatcher {
    pub ids: [u16; ADV_RULES_PER_NETWORK],
}

// SAFETY: All types are #[repr(C)], Copy, 'static, and contain only primitive
// types with no implicit padding. Safe for zero-copy eBPF map operations.
#[cfg(feature = "userspace")]
unsafe impl aya::Pod for NetworkKey {}
#[cfg(feature = "userspace")]
unsafe impl aya::Pod for FwRuleEntry {}
#[cfg(feature = "userspace")]
unsafe impl aya::Pod for AdvRuleMatcher {}
