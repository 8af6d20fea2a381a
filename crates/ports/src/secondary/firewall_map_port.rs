use domain::common::error::DomainError;
use ebpf_common::firewall::{AdvRuleMatcher, FwRuleEntry, NetworkKey};

/// Secondary port for the firewall eBPF maps.
///
/// Covers the `rules` and `adv_rulematcher` LPM tries keyed by network, the
/// `adv_rules` table keyed by rule id, and the kernel-maintained
/// `drop_counter`. Implemented by `FirewallMapManager` in the adapter layer.
pub trait FirewallMapPort: Send + Sync {
    /// Insert or replace the `rules` entry for a network.
    fn insert_rule(&mut self, key: &NetworkKey, entry: &FwRuleEntry) -> Result<(), DomainError>;

    /// Remove the `rules` entry for a network.
    fn remove_rule(&mut self, key: &NetworkKey) -> Result<(), DomainError>;

    /// Read the matcher array of a network. `None` when the network has no
    /// matcher yet.
    fn matcher(&self, key: &NetworkKey) -> Result<Option<AdvRuleMatcher>, DomainError>;

    /// Insert or replace the matcher array of a network.
    fn set_matcher(&mut self, key: &NetworkKey, matcher: &AdvRuleMatcher)
    -> Result<(), DomainError>;

    /// Insert or replace the per-id record in `adv_rules`.
    fn insert_adv_rule(&mut self, id: u32, entry: &FwRuleEntry) -> Result<(), DomainError>;

    /// Remove the per-id record from `adv_rules`.
    fn remove_adv_rule(&mut self, id: u32) -> Result<(), DomainError>;

    /// Packets dropped by rule `id`. `None` when the kernel has not counted
    /// any yet.
    fn drop_count(&self, id: u32) -> Result<Option<u64>, DomainError>;

    /// Remove the `drop_counter` entry of rule `id`.
    fn remove_drop_counter(&mut self, id: u32) -> Result<(), DomainError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn firewall_map_port_is_object_safe() {
        fn _check(port: &dyn FirewallMapPort) {
            let _ = port.drop_count(1);
        }
    }
}
