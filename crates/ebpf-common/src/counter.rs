//! Per-protocol packet counter maintained by the `count` program.
//!
//! `counter` is a `HashMap<u32, u64>` keyed by IP protocol number. A protocol
//! that has not been seen yet has no entry.

pub const COUNTER_PROTO_ICMP: u32 = 1;
pub const COUNTER_PROTO_TCP: u32 = 6;
pub const COUNTER_PROTO_UDP: u32 = 17;

/// Maximum entries in the `counter` map (icmp, tcp, udp).
pub const COUNTER_MAX_ENTRIES: u32 = 3;
