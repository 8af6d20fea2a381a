use std::collections::BTreeMap;

use ebpf_common::firewall::AdvRuleMatcher;

use super::entity::FwRule;
use super::error::FirewallError;

/// Ids travel through the matcher arrays as `u16`, which bounds the id
/// space for the process lifetime.
const MAX_RULE_ID: u32 = u16::MAX as u32;

/// In-memory side of the firewall: installed rules and id allocation.
///
/// Ids start at 1 and are never reused, even when installation of the rule
/// that consumed an id fails half way.
#[derive(Debug)]
pub struct FirewallEngine {
    rules: BTreeMap<u32, FwRule>,
    next_id: u32,
}

impl Default for FirewallEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl FirewallEngine {
    pub fn new() -> Self {
        Self {
            rules: BTreeMap::new(),
            next_id: 1,
        }
    }

    /// Validate `rule` and stamp it with the next id. The rule is not
    /// tracked until [`insert`](Self::insert) is called.
    pub fn prepare(&mut self, mut rule: FwRule) -> Result<FwRule, FirewallError> {
        rule.validate()?;
        if self.next_id > MAX_RULE_ID {
            return Err(FirewallError::IdSpaceExhausted { last: MAX_RULE_ID });
        }
        rule.id = self.next_id;
        rule.drop_count = 0;
        self.next_id += 1;
        Ok(rule)
    }

    pub fn insert(&mut self, rule: FwRule) {
        self.rules.insert(rule.id, rule);
    }

    pub fn get(&self, id: u32) -> Option<&FwRule> {
        self.rules.get(&id)
    }

    pub fn remove(&mut self, id: u32) -> Option<FwRule> {
        self.rules.remove(&id)
    }

    /// Installed rules ordered by id.
    pub fn rules(&self) -> impl Iterator<Item = &FwRule> {
        self.rules.values()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// Append `id` into the first free slot of a network's matcher.
///
/// Returns `false` when every slot is taken; the id is then dropped and the
/// matcher is left as is.
pub fn matcher_insert(matcher: &mut AdvRuleMatcher, id: u32) -> bool {
    let Ok(id) = u16::try_from(id) else {
        return false;
    };
    match matcher.ids.iter_mut().find(|slot| **slot == 0) {
        Some(slot) => {
            *slot = id;
            true
        }
        None => false,
    }
}

/// Matcher with `id` filtered out and the remaining ids packed to the front.
pub fn matcher_without(matcher: &AdvRuleMatcher, id: u32) -> AdvRuleMatcher {
    let mut out = AdvRuleMatcher::default();
    let kept = matcher
        .ids
        .iter()
        .copied()
        .filter(|&slot| slot != 0 && u32::from(slot) != id);
    for (dst, slot) in out.ids.iter_mut().zip(kept) {
        *dst = slot;
    }
    out
}

/// Number of occupied slots.
pub fn matcher_len(matcher: &AdvRuleMatcher) -> usize {
    matcher.ids.iter().filter(|&&slot| slot != 0).count()
}
