use domain::common::error::DomainError;
use ebpf_common::conntrack::{ConntrackInfo, ConntrackKey};

/// Secondary port for the kernel `conntrack` table.
///
/// Implemented by `ConntrackMapManager` in the adapter layer.
pub trait ConntrackMapPort: Send + Sync {
    /// Read the whole table. Each entry is read independently so one
    /// failure does not hide the others.
    fn entries(&self) -> Vec<Result<(ConntrackKey, ConntrackInfo), DomainError>>;

    /// Delete one flow.
    fn remove(&mut self, key: &ConntrackKey) -> Result<(), DomainError>;
}
