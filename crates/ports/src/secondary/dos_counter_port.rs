use domain::common::error::DomainError;
use ebpf_common::ddos::DosIdentifier;

/// Secondary port for reading the `dosp_counter` eBPF map.
pub trait DosCounterPort: Send + Sync {
    /// Read every `(identifier, cumulative count)` pair currently in the
    /// map. Entries that fail to read are skipped by the implementation.
    fn counters(&self) -> Result<Vec<(DosIdentifier, u64)>, DomainError>;
}
