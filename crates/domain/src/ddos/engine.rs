use std::collections::{BTreeMap, HashMap};
use std::net::Ipv4Addr;

use ebpf_common::ddos::DosIdentifier;

use crate::common::entity::{TransportProtocol, ipv4_from_le};
use crate::firewall::entity::FwRule;

use super::entity::{DosPolicy, Evaluation, Mitigation, PolicyStatus};
use super::error::DosError;

/// DoS policy engine.
///
/// Keeps the policy set and a mirror of the last cumulative count seen for
/// each counter identifier. Each [`evaluate`](Self::evaluate) call turns one
/// full read of the kernel counter table into the firewall rules that should
/// be installed; installing them is the caller's job, which then reports back
/// through [`record_mitigation`](Self::record_mitigation).
#[derive(Debug)]
pub struct DosEngine {
    policies: BTreeMap<u32, DosPolicy>,
    counters: HashMap<DosIdentifier, u64>,
    next_id: u32,
}

impl Default for DosEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl DosEngine {
    pub fn new() -> Self {
        Self {
            policies: BTreeMap::new(),
            counters: HashMap::new(),
            next_id: 1,
        }
    }

    // ── Policy CRUD ───────────────────────────────────────────────

    /// Register a policy and return its id. Status and installed rules are
    /// reset regardless of what the caller passed.
    pub fn add_policy(&mut self, mut policy: DosPolicy) -> Result<u32, DosError> {
        policy.validate()?;
        policy.id = self.next_id;
        policy.status = PolicyStatus::NotTriggered;
        policy.fw_rule_ids.clear();
        policy.blocked.clear();
        self.next_id += 1;
        let id = policy.id;
        self.policies.insert(id, policy);
        Ok(id)
    }

    pub fn policy(&self, id: u32) -> Option<&DosPolicy> {
        self.policies.get(&id)
    }

    /// Snapshot copies ordered by id.
    pub fn policies(&self) -> Vec<DosPolicy> {
        self.policies.values().cloned().collect()
    }

    pub fn remove_policy(&mut self, id: u32) -> Option<DosPolicy> {
        self.policies.remove(&id)
    }

    pub fn policy_count(&self) -> usize {
        self.policies.len()
    }

    // ── Evaluation ────────────────────────────────────────────────

    /// Fold one read of the counter table into the mirror and collect the
    /// rules to install.
    ///
    /// The delta for an identifier is its count minus the previous count
    /// (0 when first seen). A counter that went backwards yields 0. A policy
    /// fires when its protocol and flag match and the delta exceeds its
    /// limit, unless it already blocks that source.
    pub fn evaluate(&mut self, observations: &[(DosIdentifier, u64)]) -> Evaluation {
        let mut out = Evaluation::default();

        for (key, count) in observations {
            let previous = self.counters.insert(*key, *count).unwrap_or(0);
            let delta = count.saturating_sub(previous);

            let Ok(protocol) = TransportProtocol::from_u32(u32::from(key.protocol)) else {
                out.skipped.push(*key);
                continue;
            };
            let source = ipv4_from_le(key.address);

            for policy in self.policies.values() {
                if !policy.matches(protocol, key) || delta <= policy.limit {
                    continue;
                }
                if policy.blocked.contains(&source) {
                    continue;
                }
                out.mitigations.push(Mitigation {
                    policy_id: policy.id,
                    source,
                    rule: FwRule::block_host(source, protocol),
                });
            }
        }

        out
    }

    /// Attach an installed firewall rule to its policy and mark the policy
    /// triggered.
    pub fn record_mitigation(
        &mut self,
        policy_id: u32,
        rule_id: u32,
        source: Ipv4Addr,
    ) -> Result<(), DosError> {
        let policy = self
            .policies
            .get_mut(&policy_id)
            .ok_or(DosError::PolicyNotFound { id: policy_id })?;
        policy.fw_rule_ids.push(rule_id);
        policy.blocked.insert(source);
        policy.status = PolicyStatus::Triggered;
        Ok(())
    }

    /// Last cumulative count seen for `key`.
    pub fn last_count(&self, key: &DosIdentifier) -> Option<u64> {
        self.counters.get(key).copied()
    }
}
