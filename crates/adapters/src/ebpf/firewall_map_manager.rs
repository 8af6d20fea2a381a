use aya::Ebpf;
use aya::maps::lpm_trie::{Key, LpmTrie};
use aya::maps::{HashMap, MapData};
use domain::common::error::DomainError;
use ebpf_common::firewall::{AdvRuleMatcher, FwRuleEntry, NetworkKey};
use ebpf_common::programs::{MAP_ADV_RULE_MATCHER, MAP_ADV_RULES, MAP_DROP_COUNTER, MAP_RULES};
use ports::secondary::firewall_map_port::FirewallMapPort;
use tracing::info;

use super::optional;

/// Manages the firewall eBPF maps.
///
/// Uses 4 maps:
/// - `rules`: `LpmTrie<u32, FwRuleEntry>` (network -> rule)
/// - `adv_rulematcher`: `LpmTrie<u32, AdvRuleMatcher>` (network -> rule ids)
/// - `adv_rules`: `HashMap<u32, FwRuleEntry>` (rule id -> rule)
/// - `drop_counter`: `HashMap<u32, u64>` (rule id -> dropped packets, kernel-written)
pub struct FirewallMapManager {
    rules: LpmTrie<MapData, u32, FwRuleEntry>,
    matchers: LpmTrie<MapData, u32, AdvRuleMatcher>,
    adv_rules: HashMap<MapData, u32, FwRuleEntry>,
    drop_counter: HashMap<MapData, u32, u64>,
}

impl FirewallMapManager {
    /// Create a new `FirewallMapManager` by taking ownership of the firewall
    /// maps from the loaded eBPF object.
    pub fn new(ebpf: &mut Ebpf) -> Result<Self, anyhow::Error> {
        let rules = LpmTrie::try_from(
            ebpf.take_map(MAP_RULES)
                .ok_or_else(|| anyhow::anyhow!("map '{MAP_RULES}' not found in eBPF object"))?,
        )?;
        let matchers = LpmTrie::try_from(ebpf.take_map(MAP_ADV_RULE_MATCHER).ok_or_else(|| {
            anyhow::anyhow!("map '{MAP_ADV_RULE_MATCHER}' not found in eBPF object")
        })?)?;
        let adv_rules = HashMap::try_from(
            ebpf.take_map(MAP_ADV_RULES)
                .ok_or_else(|| anyhow::anyhow!("map '{MAP_ADV_RULES}' not found in eBPF object"))?,
        )?;
        let drop_counter = HashMap::try_from(ebpf.take_map(MAP_DROP_COUNTER).ok_or_else(
            || anyhow::anyhow!("map '{MAP_DROP_COUNTER}' not found in eBPF object"),
        )?)?;

        info!("firewall maps acquired (rules, adv_rulematcher, adv_rules, drop_counter)");
        Ok(Self {
            rules,
            matchers,
            adv_rules,
            drop_counter,
        })
    }
}

fn lpm_key(key: &NetworkKey) -> Key<u32> {
    Key::new(key.prefix_len, key.address)
}

impl FirewallMapPort for FirewallMapManager {
    fn insert_rule(&mut self, key: &NetworkKey, entry: &FwRuleEntry) -> Result<(), DomainError> {
        self.rules
            .insert(&lpm_key(key), *entry, 0)
            .map_err(|e| DomainError::EngineError(format!("rules insert failed: {e}")))
    }

    fn remove_rule(&mut self, key: &NetworkKey) -> Result<(), DomainError> {
        self.rules
            .remove(&lpm_key(key))
            .map_err(|e| DomainError::EngineError(format!("rules remove failed: {e}")))
    }

    fn matcher(&self, key: &NetworkKey) -> Result<Option<AdvRuleMatcher>, DomainError> {
        optional(self.matchers.get(&lpm_key(key), 0))
            .map_err(|e| DomainError::EngineError(format!("adv_rulematcher get failed: {e}")))
    }

    fn set_matcher(
        &mut self,
        key: &NetworkKey,
        matcher: &AdvRuleMatcher,
    ) -> Result<(), DomainError> {
        self.matchers
            .insert(&lpm_key(key), *matcher, 0)
            .map_err(|e| DomainError::EngineError(format!("adv_rulematcher insert failed: {e}")))
    }

    fn insert_adv_rule(&mut self, id: u32, entry: &FwRuleEntry) -> Result<(), DomainError> {
        self.adv_rules
            .insert(id, *entry, 0)
            .map_err(|e| DomainError::EngineError(format!("adv_rules insert failed: {e}")))
    }

    fn remove_adv_rule(&mut self, id: u32) -> Result<(), DomainError> {
        self.adv_rules
            .remove(&id)
            .map_err(|e| DomainError::EngineError(format!("adv_rules remove failed: {e}")))
    }

    fn drop_count(&self, id: u32) -> Result<Option<u64>, DomainError> {
        optional(self.drop_counter.get(&id, 0))
            .map_err(|e| DomainError::EngineError(format!("drop_counter get failed: {e}")))
    }

    fn remove_drop_counter(&mut self, id: u32) -> Result<(), DomainError> {
        self.drop_counter
            .remove(&id)
            .map_err(|e| DomainError::EngineError(format!("drop_counter remove failed: {e}")))
    }
}
