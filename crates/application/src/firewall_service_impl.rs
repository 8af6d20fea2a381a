use domain::common::error::DomainError;
use domain::firewall::engine::{FirewallEngine, matcher_insert, matcher_without};
use domain::firewall::entity::FwRule;
use ebpf_common::firewall::AdvRuleMatcher;
use ports::secondary::firewall_map_port::FirewallMapPort;
use tracing::{debug, info, warn};

/// Application-level firewall service.
///
/// Owns the rule set and keeps the `rules`, `adv_rulematcher` and
/// `adv_rules` maps in step with it. Kernel writes are not rolled back on
/// failure. Designed to be wrapped in `RwLock` for shared access; the DoS
/// service installs its blocking rules through the same lock.
pub struct FirewallAppService {
    engine: FirewallEngine,
    maps: Box<dyn FirewallMapPort + Send>,
}

impl FirewallAppService {
    pub fn new(maps: Box<dyn FirewallMapPort + Send>) -> Self {
        Self {
            engine: FirewallEngine::new(),
            maps,
        }
    }

    /// Install a deny rule and return its id.
    ///
    /// The id is consumed even when a kernel write fails.
    pub fn set_rule(&mut self, rule: FwRule) -> Result<u32, DomainError> {
        let rule = self.engine.prepare(rule)?;
        let key = rule.to_ebpf_key();
        let entry = rule.to_ebpf_entry();

        self.maps.insert_rule(&key, &entry).inspect_err(|e| {
            warn!(id = rule.id, network = %rule.network, error = %e, "rules update failed");
        })?;

        let mut matcher = match self.maps.matcher(&key) {
            Ok(found) => found.unwrap_or_default(),
            Err(e) => {
                warn!(id = rule.id, network = %rule.network, error = %e, "matcher lookup failed, starting empty");
                AdvRuleMatcher::default()
            }
        };
        if !matcher_insert(&mut matcher, rule.id) {
            warn!(id = rule.id, network = %rule.network, "matcher full, rule id not registered");
        }
        debug!(network = %rule.network, ids = ?matcher.ids, "update rule matcher");
        self.maps.set_matcher(&key, &matcher).inspect_err(|e| {
            warn!(id = rule.id, network = %rule.network, error = %e, "matcher update failed");
        })?;

        self.maps.insert_adv_rule(rule.id, &entry).inspect_err(|e| {
            warn!(id = rule.id, network = %rule.network, error = %e, "adv_rules update failed");
        })?;

        let id = rule.id;
        info!(
            id,
            network = %rule.network,
            protocol = %rule.protocol,
            ports = %rule.ports(),
            "firewall rule installed"
        );
        self.engine.insert(rule);
        Ok(id)
    }

    /// Every rule with its drop counter read from the kernel. A missing or
    /// unreadable counter reads as 0.
    pub fn rules(&self) -> Vec<FwRule> {
        self.engine
            .rules()
            .map(|rule| {
                let drop_count = match self.maps.drop_count(rule.id) {
                    Ok(count) => count.unwrap_or(0),
                    Err(e) => {
                        warn!(id = rule.id, error = %e, "drop counter lookup failed");
                        0
                    }
                };
                FwRule {
                    drop_count,
                    ..rule.clone()
                }
            })
            .collect()
    }

    /// Remove rule `id`. Unknown ids are a no-op.
    ///
    /// The network's `rules` entry is shared by every rule on that network.
    /// It is only removed with the last of them; otherwise it is handed to
    /// the newest remaining rule.
    pub fn delete_rule(&mut self, id: u32) -> Result<(), DomainError> {
        let Some(rule) = self.engine.get(id) else {
            return Ok(());
        };
        let key = rule.to_ebpf_key();
        let network = rule.network;
        let survivor = self
            .engine
            .rules()
            .filter(|other| other.id != id && other.to_ebpf_key() == key)
            .max_by_key(|other| other.id)
            .map(FwRule::to_ebpf_entry);

        match survivor {
            Some(entry) => {
                debug!(id, %network, kept_for = entry.id, "rules entry kept for remaining rules");
                self.maps.insert_rule(&key, &entry)?;
            }
            None => self.maps.remove_rule(&key)?,
        }
        if let Err(e) = self.maps.remove_drop_counter(id) {
            debug!(id, error = %e, "drop counter entry not removed");
        }

        let current = match self.maps.matcher(&key) {
            Ok(found) => found.unwrap_or_default(),
            Err(e) => {
                warn!(id, %network, error = %e, "matcher lookup failed, starting empty");
                AdvRuleMatcher::default()
            }
        };
        let matcher = matcher_without(&current, id);
        debug!(%network, ids = ?matcher.ids, "update rule matcher");
        self.maps.set_matcher(&key, &matcher)?;

        self.maps.remove_adv_rule(id)?;
        self.engine.remove(id);
        info!(id, %network, "firewall rule deleted");
        Ok(())
    }

    pub fn rule_count(&self) -> usize {
        self.engine.len()
    }
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use domain::common::entity::TransportProtocol;
    use domain::firewall::entity::{Ipv4Network, PortRange};
    use ports::test_utils::InMemoryFirewallMaps;

    use super::*;

    fn make_service() -> (FirewallAppService, InMemoryFirewallMaps) {
        let maps = InMemoryFirewallMaps::new();
        (FirewallAppService::new(Box::new(maps.clone())), maps)
    }

    fn make_rule(net: &str, dst: PortRange, protocol: TransportProtocol) -> FwRule {
        FwRule::new(net.parse().unwrap(), PortRange::ANY, dst, protocol)
    }

    #[test]
    fn ids_strictly_increase() {
        let (mut svc, _) = make_service();
        let a = svc
            .set_rule(make_rule("10.0.0.0/24", PortRange::ANY, TransportProtocol::Tcp))
            .unwrap();
        let b = svc
            .set_rule(make_rule("10.0.1.0/24", PortRange::ANY, TransportProtocol::Tcp))
            .unwrap();
        svc.delete_rule(b).unwrap();
        let c = svc
            .set_rule(make_rule("10.0.1.0/24", PortRange::ANY, TransportProtocol::Tcp))
            .unwrap();
        assert_eq!((a, b, c), (1, 2, 3));
    }

    #[test]
    fn set_writes_every_map() {
        let (mut svc, maps) = make_service();
        let rule = make_rule(
            "192.168.0.0/16",
            PortRange { start: 80, end: 443 },
            TransportProtocol::Tcp,
        );
        let key = rule.to_ebpf_key();
        let id = svc.set_rule(rule).unwrap();

        let state = maps.state();
        let entry = state.rules[&key];
        assert_eq!(entry.id, id);
        assert_eq!((entry.from_port, entry.to_port), (80, 443));
        assert_eq!(entry.protocol, 6);
        assert_eq!(state.adv_rules[&id], entry);
        assert_eq!(state.matchers[&key].ids[0], 1);
    }

    #[test]
    fn set_then_get_roundtrips() {
        let (mut svc, _) = make_service();
        let rule = make_rule("10.1.0.0/16", PortRange::single(53), TransportProtocol::Udp);
        let id = svc.set_rule(rule.clone()).unwrap();
        let rules = svc.rules();
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].id, id);
        assert_eq!(rules[0].network, rule.network);
        assert_eq!(rules[0].dst_ports, rule.dst_ports);
        assert_eq!(rules[0].src_ports, rule.src_ports);
        assert_eq!(rules[0].protocol, rule.protocol);
        assert_eq!(rules[0].drop_count, 0);
    }

    #[test]
    fn get_reads_drop_counters() {
        let (mut svc, maps) = make_service();
        let id = svc
            .set_rule(FwRule::block_host(Ipv4Addr::new(198, 51, 100, 7), TransportProtocol::Any))
            .unwrap();
        maps.state().drop_counters.insert(id, 42);
        assert_eq!(svc.rules()[0].drop_count, 42);

        maps.failures.fail("drop_count");
        assert_eq!(svc.rules()[0].drop_count, 0);
    }

    #[test]
    fn rules_on_same_network_share_matcher() {
        let (mut svc, maps) = make_service();
        let net = "10.0.0.0/8";
        svc.set_rule(make_rule(net, PortRange::single(22), TransportProtocol::Tcp))
            .unwrap();
        svc.set_rule(make_rule(net, PortRange::single(53), TransportProtocol::Udp))
            .unwrap();
        svc.set_rule(make_rule(net, PortRange::single(80), TransportProtocol::Tcp))
            .unwrap();
        let key = Ipv4Network::new(Ipv4Addr::new(10, 0, 0, 0), 8)
            .unwrap()
            .to_ebpf_key();
        assert_eq!(&maps.state().matchers[&key].ids[..4], &[1, 2, 3, 0]);

        svc.delete_rule(2).unwrap();
        assert_eq!(&maps.state().matchers[&key].ids[..3], &[1, 3, 0]);
    }

    #[test]
    fn matcher_lookup_failure_starts_empty() {
        let (mut svc, maps) = make_service();
        maps.failures.fail("matcher");
        let id = svc
            .set_rule(make_rule("10.0.0.0/24", PortRange::ANY, TransportProtocol::Tcp))
            .unwrap();
        let key = Ipv4Network::new(Ipv4Addr::new(10, 0, 0, 0), 24)
            .unwrap()
            .to_ebpf_key();
        assert_eq!(u32::from(maps.state().matchers[&key].ids[0]), id);
    }

    #[test]
    fn full_matcher_drops_id_silently() {
        let (mut svc, maps) = make_service();
        for port in 1..=17 {
            svc.set_rule(make_rule(
                "10.0.0.0/24",
                PortRange::single(port),
                TransportProtocol::Tcp,
            ))
            .unwrap();
        }
        let key = Ipv4Network::new(Ipv4Addr::new(10, 0, 0, 0), 24)
            .unwrap()
            .to_ebpf_key();
        let ids = maps.state().matchers[&key].ids;
        assert_eq!(ids[15], 16);
        assert!(!ids.contains(&17));
        assert_eq!(svc.rule_count(), 17);
    }

    #[test]
    fn kernel_failure_is_returned_and_rule_not_kept() {
        let (mut svc, maps) = make_service();
        maps.failures.fail("insert_adv_rule");
        assert!(
            svc.set_rule(make_rule("10.0.0.0/24", PortRange::ANY, TransportProtocol::Tcp))
                .is_err()
        );
        assert_eq!(svc.rule_count(), 0);
        // no rollback of the earlier writes
        assert_eq!(maps.state().rules.len(), 1);

        maps.failures.heal("insert_adv_rule");
        let id = svc
            .set_rule(make_rule("10.0.0.0/24", PortRange::ANY, TransportProtocol::Tcp))
            .unwrap();
        assert_eq!(id, 2);
    }

    #[test]
    fn invalid_rule_is_rejected_before_any_write() {
        let (mut svc, maps) = make_service();
        let rule = FwRule::new(
            "10.0.0.0/24".parse().unwrap(),
            PortRange::single(1),
            PortRange::single(2),
            TransportProtocol::Tcp,
        );
        assert!(matches!(svc.set_rule(rule), Err(DomainError::InvalidRule(_))));
        assert!(maps.state().rules.is_empty());
    }

    #[test]
    fn delete_unknown_is_noop() {
        let (mut svc, maps) = make_service();
        maps.failures.fail("remove_rule");
        assert!(svc.delete_rule(99).is_ok());
    }

    #[test]
    fn delete_removes_every_entry() {
        let (mut svc, maps) = make_service();
        let rule = make_rule("10.0.0.0/24", PortRange::ANY, TransportProtocol::Tcp);
        let key = rule.to_ebpf_key();
        let id = svc.set_rule(rule).unwrap();
        maps.state().drop_counters.insert(id, 3);

        svc.delete_rule(id).unwrap();
        let state = maps.state();
        assert!(state.rules.is_empty());
        assert!(state.adv_rules.is_empty());
        assert!(state.drop_counters.is_empty());
        assert!(state.matchers[&key].ids.iter().all(|&s| s == 0));
        drop(state);
        assert!(svc.rules().is_empty());
    }

    #[test]
    fn delete_tolerates_missing_drop_counter() {
        let (mut svc, _) = make_service();
        let id = svc
            .set_rule(make_rule("10.0.0.0/24", PortRange::ANY, TransportProtocol::Tcp))
            .unwrap();
        assert!(svc.delete_rule(id).is_ok());
    }

    #[test]
    fn get_reports_canonical_network() {
        let (mut svc, maps) = make_service();
        svc.set_rule(make_rule("10.1.2.3/16", PortRange::ANY, TransportProtocol::Tcp))
            .unwrap();
        assert_eq!(svc.rules()[0].network.to_string(), "10.1.0.0/16");

        // both spellings land on one kernel key
        svc.set_rule(make_rule("10.1.9.9/16", PortRange::ANY, TransportProtocol::Udp))
            .unwrap();
        assert_eq!(maps.state().rules.len(), 1);
    }

    #[test]
    fn shared_network_entry_outlives_first_delete() {
        let (mut svc, maps) = make_service();
        let net = "192.0.2.7/32";
        let syn = svc
            .set_rule(make_rule(net, PortRange::ANY, TransportProtocol::Tcp))
            .unwrap();
        let udp = svc
            .set_rule(make_rule(net, PortRange::ANY, TransportProtocol::Udp))
            .unwrap();
        let key = make_rule(net, PortRange::ANY, TransportProtocol::Tcp).to_ebpf_key();

        svc.delete_rule(udp).unwrap();
        {
            let state = maps.state();
            assert_eq!(state.rules[&key].id, syn);
            assert_eq!(state.matchers[&key].ids[0], u16::try_from(syn).unwrap());
            assert_eq!(state.matchers[&key].ids[1], 0);
        }

        svc.delete_rule(syn).unwrap();
        assert!(maps.state().rules.is_empty());
        assert_eq!(svc.rule_count(), 0);
    }

    #[test]
    fn delete_failure_keeps_rule() {
        let (mut svc, maps) = make_service();
        let id = svc
            .set_rule(make_rule("10.0.0.0/24", PortRange::ANY, TransportProtocol::Tcp))
            .unwrap();
        maps.failures.fail("remove_adv_rule");
        assert!(svc.delete_rule(id).is_err());
        assert_eq!(svc.rule_count(), 1);
    }
}
