//! In-memory port implementations that simulate the kernel maps.
//!
//! Every fake is `Clone` and shares its state, so a test keeps one handle
//! while the service under test owns another behind a `Box<dyn Port>`.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::net::Ipv4Addr;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use domain::common::error::DomainError;
use domain::loadbalancer::entity::NeighborEntry;
use ebpf_common::conntrack::{ConntrackInfo, ConntrackKey};
use ebpf_common::ddos::DosIdentifier;
use ebpf_common::firewall::{AdvRuleMatcher, FwRuleEntry, NetworkKey};
use ebpf_common::loadbalancer::{BackendInfo, RR_TABLE_MAX_ENTRIES, UpstreamInfo};

use crate::secondary::conntrack_map_port::ConntrackMapPort;
use crate::secondary::dos_counter_port::DosCounterPort;
use crate::secondary::firewall_map_port::FirewallMapPort;
use crate::secondary::loadbalancer_map_port::LoadBalancerMapPort;
use crate::secondary::neighbor_port::NeighborResolver;
use crate::secondary::packet_counter_port::PacketCounterPort;
use crate::secondary::xdp_attach_port::{XdpAttachPort, XdpAttachment};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

fn missing(what: &str) -> DomainError {
    DomainError::EngineError(format!("{what}: key not found"))
}

/// Named operations that should fail. Shared between clones.
#[derive(Debug, Clone, Default)]
pub struct FailureSwitch(Arc<Mutex<HashSet<&'static str>>>);

impl FailureSwitch {
    pub fn fail(&self, op: &'static str) {
        lock(&self.0).insert(op);
    }

    pub fn heal(&self, op: &'static str) {
        lock(&self.0).remove(op);
    }

    fn check(&self, op: &'static str) -> Result<(), DomainError> {
        if lock(&self.0).contains(op) {
            return Err(DomainError::EngineError(format!("{op} failed (injected)")));
        }
        Ok(())
    }
}

// ── Firewall ────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct FirewallMapState {
    pub rules: HashMap<NetworkKey, FwRuleEntry>,
    pub matchers: HashMap<NetworkKey, AdvRuleMatcher>,
    pub adv_rules: HashMap<u32, FwRuleEntry>,
    pub drop_counters: HashMap<u32, u64>,
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryFirewallMaps {
    state: Arc<Mutex<FirewallMapState>>,
    pub failures: FailureSwitch,
}

impl InMemoryFirewallMaps {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> MutexGuard<'_, FirewallMapState> {
        lock(&self.state)
    }
}

impl FirewallMapPort for InMemoryFirewallMaps {
    fn insert_rule(&mut self, key: &NetworkKey, entry: &FwRuleEntry) -> Result<(), DomainError> {
        self.failures.check("insert_rule")?;
        self.state().rules.insert(*key, *entry);
        Ok(())
    }

    fn remove_rule(&mut self, key: &NetworkKey) -> Result<(), DomainError> {
        self.failures.check("remove_rule")?;
        self.state()
            .rules
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| missing("rules"))
    }

    fn matcher(&self, key: &NetworkKey) -> Result<Option<AdvRuleMatcher>, DomainError> {
        self.failures.check("matcher")?;
        Ok(self.state().matchers.get(key).copied())
    }

    fn set_matcher(
        &mut self,
        key: &NetworkKey,
        matcher: &AdvRuleMatcher,
    ) -> Result<(), DomainError> {
        self.failures.check("set_matcher")?;
        self.state().matchers.insert(*key, *matcher);
        Ok(())
    }

    fn insert_adv_rule(&mut self, id: u32, entry: &FwRuleEntry) -> Result<(), DomainError> {
        self.failures.check("insert_adv_rule")?;
        self.state().adv_rules.insert(id, *entry);
        Ok(())
    }

    fn remove_adv_rule(&mut self, id: u32) -> Result<(), DomainError> {
        self.failures.check("remove_adv_rule")?;
        self.state()
            .adv_rules
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| missing("adv_rules"))
    }

    fn drop_count(&self, id: u32) -> Result<Option<u64>, DomainError> {
        self.failures.check("drop_count")?;
        Ok(self.state().drop_counters.get(&id).copied())
    }

    fn remove_drop_counter(&mut self, id: u32) -> Result<(), DomainError> {
        self.failures.check("remove_drop_counter")?;
        self.state()
            .drop_counters
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| missing("drop_counter"))
    }
}

// ── DoS counters ────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct InMemoryDosCounters {
    counters: Arc<Mutex<HashMap<DosIdentifier, u64>>>,
    pub failures: FailureSwitch,
}

impl InMemoryDosCounters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the cumulative count the kernel reports for `key`.
    pub fn set(&self, key: DosIdentifier, count: u64) {
        lock(&self.counters).insert(key, count);
    }
}

impl DosCounterPort for InMemoryDosCounters {
    fn counters(&self) -> Result<Vec<(DosIdentifier, u64)>, DomainError> {
        self.failures.check("counters")?;
        Ok(lock(&self.counters).iter().map(|(k, v)| (*k, *v)).collect())
    }
}

// ── Load balancer ───────────────────────────────────────────────────

#[derive(Debug)]
pub struct LbMapState {
    pub upstream: Option<UpstreamInfo>,
    pub redirect: HashSet<u32>,
    pub backend_info: HashMap<u32, BackendInfo>,
    pub backend_ifindex: HashMap<u32, u32>,
    pub rr_table: Vec<u32>,
}

impl Default for LbMapState {
    fn default() -> Self {
        Self {
            upstream: None,
            redirect: HashSet::new(),
            backend_info: HashMap::new(),
            backend_ifindex: HashMap::new(),
            rr_table: vec![0; RR_TABLE_MAX_ENTRIES as usize],
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryLbMaps {
    state: Arc<Mutex<LbMapState>>,
    pub failures: FailureSwitch,
}

impl InMemoryLbMaps {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> MutexGuard<'_, LbMapState> {
        lock(&self.state)
    }
}

impl LoadBalancerMapPort for InMemoryLbMaps {
    fn set_upstream(&mut self, info: &UpstreamInfo) -> Result<(), DomainError> {
        self.failures.check("set_upstream")?;
        self.state().upstream = Some(*info);
        Ok(())
    }

    fn allow_redirect(&mut self, ifindex: u32) -> Result<(), DomainError> {
        self.failures.check("allow_redirect")?;
        self.state().redirect.insert(ifindex);
        Ok(())
    }

    fn revoke_redirect(&mut self, ifindex: u32) -> Result<(), DomainError> {
        self.failures.check("revoke_redirect")?;
        if self.state().redirect.remove(&ifindex) {
            Ok(())
        } else {
            Err(missing("redirect_dev_map"))
        }
    }

    fn backend_info(&self, id: u32) -> Result<Option<BackendInfo>, DomainError> {
        self.failures.check("backend_info")?;
        Ok(self.state().backend_info.get(&id).copied())
    }

    fn set_backend_info(&mut self, id: u32, info: &BackendInfo) -> Result<(), DomainError> {
        self.failures.check("set_backend_info")?;
        self.state().backend_info.insert(id, *info);
        Ok(())
    }

    fn remove_backend_info(&mut self, id: u32) -> Result<(), DomainError> {
        self.failures.check("remove_backend_info")?;
        self.state()
            .backend_info
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| missing("backend_info"))
    }

    fn set_backend_ifindex(&mut self, ifindex: u32, id: u32) -> Result<(), DomainError> {
        self.failures.check("set_backend_ifindex")?;
        self.state().backend_ifindex.insert(ifindex, id);
        Ok(())
    }

    fn remove_backend_ifindex(&mut self, ifindex: u32) -> Result<(), DomainError> {
        self.failures.check("remove_backend_ifindex")?;
        self.state()
            .backend_ifindex
            .remove(&ifindex)
            .map(|_| ())
            .ok_or_else(|| missing("backend_ifindex"))
    }

    fn set_rr_slot(&mut self, slot: u32, backend_id: u32) -> Result<(), DomainError> {
        self.failures.check("set_rr_slot")?;
        let mut state = self.state();
        let cell = state
            .rr_table
            .get_mut(slot as usize)
            .ok_or_else(|| DomainError::EngineError(format!("rr_table: slot {slot} out of range")))?;
        *cell = backend_id;
        Ok(())
    }
}

// ── Conntrack ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct InMemoryConntrack {
    entries: Arc<Mutex<HashMap<ConntrackKey, ConntrackInfo>>>,
    /// Read errors reported after the readable entries.
    unreadable: Arc<Mutex<Vec<String>>>,
    pub failures: FailureSwitch,
}

impl InMemoryConntrack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, key: ConntrackKey, info: ConntrackInfo) {
        lock(&self.entries).insert(key, info);
    }

    pub fn contains(&self, key: &ConntrackKey) -> bool {
        lock(&self.entries).contains_key(key)
    }

    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Make every following read report one extra failed entry.
    pub fn add_unreadable(&self, reason: &str) {
        lock(&self.unreadable).push(reason.to_string());
    }
}

impl ConntrackMapPort for InMemoryConntrack {
    fn entries(&self) -> Vec<Result<(ConntrackKey, ConntrackInfo), DomainError>> {
        let mut out: Vec<_> = lock(&self.entries)
            .iter()
            .map(|(k, v)| Ok((*k, *v)))
            .collect();
        out.extend(
            lock(&self.unreadable)
                .iter()
                .map(|reason| Err(DomainError::EngineError(reason.clone()))),
        );
        out
    }

    fn remove(&mut self, key: &ConntrackKey) -> Result<(), DomainError> {
        self.failures.check("remove")?;
        lock(&self.entries)
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| missing("conntrack"))
    }
}

// ── Packet counters ─────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct InMemoryPacketCounters {
    counts: Arc<Mutex<HashMap<u32, u64>>>,
}

impl InMemoryPacketCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, protocol: u32, count: u64) {
        lock(&self.counts).insert(protocol, count);
    }
}

impl PacketCounterPort for InMemoryPacketCounters {
    fn packet_count(&self, protocol: u32) -> Result<u64, DomainError> {
        Ok(lock(&self.counts).get(&protocol).copied().unwrap_or(0))
    }
}

// ── Neighbors ───────────────────────────────────────────────────────

/// Fixed neighbor table. Records every probed address.
#[derive(Debug, Clone, Default)]
pub struct StaticNeighbors {
    table: Arc<Mutex<HashMap<Ipv4Addr, NeighborEntry>>>,
    probed: Arc<Mutex<Vec<Ipv4Addr>>>,
    pub failures: FailureSwitch,
}

impl StaticNeighbors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, addr: Ipv4Addr, entry: NeighborEntry) {
        lock(&self.table).insert(addr, entry);
    }

    pub fn probed(&self) -> Vec<Ipv4Addr> {
        lock(&self.probed).clone()
    }
}

impl NeighborResolver for StaticNeighbors {
    fn probe<'a>(
        &'a self,
        addr: Ipv4Addr,
    ) -> Pin<Box<dyn Future<Output = Result<(), DomainError>> + Send + 'a>> {
        Box::pin(async move {
            lock(&self.probed).push(addr);
            self.failures.check("probe")
        })
    }

    fn resolve<'a>(
        &'a self,
        addr: Ipv4Addr,
    ) -> Pin<Box<dyn Future<Output = Result<Option<NeighborEntry>, DomainError>> + Send + 'a>> {
        Box::pin(async move {
            self.failures.check("resolve")?;
            Ok(lock(&self.table).get(&addr).cloned())
        })
    }
}

// ── XDP attachments ─────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct AttachState {
    pub attached: HashSet<u32>,
    pub detached: Vec<u32>,
}

/// Attach port that only records which devices carry the program.
#[derive(Debug, Clone, Default)]
pub struct RecordingAttacher {
    state: Arc<Mutex<AttachState>>,
    pub failures: FailureSwitch,
}

impl RecordingAttacher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> MutexGuard<'_, AttachState> {
        lock(&self.state)
    }
}

struct RecordedAttachment {
    ifindex: u32,
    state: Arc<Mutex<AttachState>>,
    failures: FailureSwitch,
}

impl XdpAttachment for RecordedAttachment {
    fn ifindex(&self) -> u32 {
        self.ifindex
    }

    fn detach(self: Box<Self>) -> Result<(), DomainError> {
        self.failures.check("detach")?;
        let mut state = lock(&self.state);
        state.attached.remove(&self.ifindex);
        state.detached.push(self.ifindex);
        Ok(())
    }
}

impl XdpAttachPort for RecordingAttacher {
    fn attach_entrypoint(&mut self, ifindex: u32) -> Result<Box<dyn XdpAttachment>, DomainError> {
        self.failures.check("attach")?;
        self.state().attached.insert(ifindex);
        Ok(Box::new(RecordedAttachment {
            ifindex,
            state: Arc::clone(&self.state),
            failures: self.failures.clone(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn firewall_fake_reports_missing_keys() {
        let mut maps = InMemoryFirewallMaps::new();
        let key = NetworkKey {
            prefix_len: 32,
            address: 1,
        };
        assert!(maps.remove_rule(&key).is_err());
        assert_eq!(maps.matcher(&key).unwrap(), None);
        assert_eq!(maps.drop_count(1).unwrap(), None);
    }

    #[test]
    fn failure_switch_injects_and_heals() {
        let mut maps = InMemoryLbMaps::new();
        maps.failures.fail("allow_redirect");
        assert!(maps.allow_redirect(3).is_err());
        maps.failures.heal("allow_redirect");
        assert!(maps.allow_redirect(3).is_ok());
        assert!(maps.state().redirect.contains(&3));
    }

    #[test]
    fn rr_slot_bounds() {
        let mut maps = InMemoryLbMaps::new();
        assert!(maps.set_rr_slot(RR_TABLE_MAX_ENTRIES, 1).is_err());
        assert!(maps.set_rr_slot(0, 1).is_ok());
    }

    #[test]
    fn clones_share_state() {
        let counters = InMemoryPacketCounters::new();
        let handle = counters.clone();
        handle.set(6, 10);
        assert_eq!(counters.packet_count(6).unwrap(), 10);
        assert_eq!(counters.packet_count(17).unwrap(), 0);
    }

    #[test]
    fn recorded_attachment_detaches() {
        let mut attacher = RecordingAttacher::new();
        let attachment = attacher.attach_entrypoint(5).unwrap();
        assert!(attacher.state().attached.contains(&5));
        attachment.detach().unwrap();
        assert!(attacher.state().attached.is_empty());
        assert_eq!(attacher.state().detached, vec![5]);
    }

    #[tokio::test]
    async fn static_neighbors_record_probes() {
        let neighbors = StaticNeighbors::new();
        neighbors.probe(Ipv4Addr::new(10, 0, 0, 2)).await.unwrap();
        assert_eq!(neighbors.probed(), vec![Ipv4Addr::new(10, 0, 0, 2)]);
        assert!(
            neighbors
                .resolve(Ipv4Addr::new(10, 0, 0, 2))
                .await
                .unwrap()
                .is_none()
        );
    }
}
