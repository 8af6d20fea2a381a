use domain::common::error::DomainError;

/// Secondary port for the per-protocol `counter` map fed by the `count`
/// program.
pub trait PacketCounterPort: Send + Sync {
    /// Packets seen for an IP protocol number. A protocol the kernel has not
    /// counted yet reads as 0.
    fn packet_count(&self, protocol: u32) -> Result<u64, DomainError>;
}
