use std::sync::Arc;
use std::time::Duration;

use domain::common::error::DomainError;
use domain::ddos::engine::DosEngine;
use domain::ddos::entity::DosPolicy;
use ports::secondary::dos_counter_port::DosCounterPort;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::firewall_service_impl::FirewallAppService;

/// Period of the counter poll. Policy limits are expressed per period.
pub const DOS_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Application-level DoS protection service.
///
/// Polls `dosp_counter`, evaluates the policies against the per-period
/// deltas and installs a `/32` firewall rule for every source that exceeds
/// a policy limit. Designed to be wrapped in `RwLock` for shared access.
pub struct DosAppService {
    engine: DosEngine,
    counters: Box<dyn DosCounterPort + Send>,
    firewall: Arc<RwLock<FirewallAppService>>,
}

impl DosAppService {
    pub fn new(
        counters: Box<dyn DosCounterPort + Send>,
        firewall: Arc<RwLock<FirewallAppService>>,
    ) -> Self {
        Self {
            engine: DosEngine::new(),
            counters,
            firewall,
        }
    }

    // ── Policy Management ─────────────────────────────────────────

    pub fn set_policy(&mut self, policy: DosPolicy) -> Result<u32, DomainError> {
        let protocol = policy.protocol;
        let limit = policy.limit;
        let id = self.engine.add_policy(policy)?;
        info!(id, %protocol, limit, "DoS protection policy registered");
        Ok(id)
    }

    /// Snapshot copies of every policy.
    pub fn policies(&self) -> Vec<DosPolicy> {
        self.engine.policies()
    }

    /// Remove policy `id` and every firewall rule it installed. Unknown ids
    /// are a no-op. On a firewall failure the policy is kept.
    pub async fn delete_policy(&mut self, id: u32) -> Result<(), DomainError> {
        let Some(policy) = self.engine.policy(id) else {
            return Ok(());
        };

        {
            let mut firewall = self.firewall.write().await;
            for &rule_id in &policy.fw_rule_ids {
                firewall.delete_rule(rule_id)?;
            }
        }

        self.engine.remove_policy(id);
        info!(id, "DoS protection policy deleted");
        Ok(())
    }

    pub fn policy_count(&self) -> usize {
        self.engine.policy_count()
    }

    // ── Reconciliation ────────────────────────────────────────────

    /// One pass over the counter table. Returns the number of firewall
    /// rules installed.
    pub async fn tick(&mut self) -> usize {
        let observations = match self.counters.counters() {
            Ok(observations) => observations,
            Err(e) => {
                warn!(error = %e, "failed to read dosp_counter, retrying next tick");
                return 0;
            }
        };
        debug!(entries = observations.len(), "dosp_counter read");

        let evaluation = self.engine.evaluate(&observations);
        for key in &evaluation.skipped {
            warn!(
                protocol = key.protocol,
                flag = key.flag,
                "invalid transport protocol in dosp_counter, identifier skipped"
            );
        }
        if evaluation.mitigations.is_empty() {
            return 0;
        }

        let mut firewall = self.firewall.write().await;
        let mut installed = 0;
        for mitigation in evaluation.mitigations {
            let protocol = mitigation.rule.protocol;
            match firewall.set_rule(mitigation.rule) {
                Ok(rule_id) => {
                    if let Err(e) =
                        self.engine
                            .record_mitigation(mitigation.policy_id, rule_id, mitigation.source)
                    {
                        warn!(policy_id = mitigation.policy_id, error = %e, "mitigation not recorded");
                        continue;
                    }
                    installed += 1;
                    info!(
                        policy_id = mitigation.policy_id,
                        source = %mitigation.source,
                        %protocol,
                        rule_id,
                        "limit exceeded, DoS protection triggered"
                    );
                }
                Err(e) => {
                    warn!(
                        policy_id = mitigation.policy_id,
                        source = %mitigation.source,
                        error = %e,
                        "failed to install blocking rule"
                    );
                }
            }
        }
        installed
    }
}

/// Run the DoS reconciliation loop until `cancel` fires.
///
/// The first pass runs one `interval` after start. Cancellation stops the
/// loop without a final pass.
pub async fn run_dos_loop(
    service: Arc<RwLock<DosAppService>>,
    interval: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    ticker.tick().await;

    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }
        service.write().await.tick().await;
    }
    info!("DoS protection loop stopped");
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use domain::common::entity::{TcpFlag, TransportProtocol, ipv4_to_le};
    use domain::ddos::entity::PolicyStatus;
    use ebpf_common::ddos::DosIdentifier;
    use ports::test_utils::{InMemoryDosCounters, InMemoryFirewallMaps};

    use super::*;

    struct Harness {
        svc: DosAppService,
        counters: InMemoryDosCounters,
        fw_maps: InMemoryFirewallMaps,
        firewall: Arc<RwLock<FirewallAppService>>,
    }

    fn harness() -> Harness {
        let counters = InMemoryDosCounters::new();
        let fw_maps = InMemoryFirewallMaps::new();
        let firewall = Arc::new(RwLock::new(FirewallAppService::new(Box::new(
            fw_maps.clone(),
        ))));
        let svc = DosAppService::new(Box::new(counters.clone()), Arc::clone(&firewall));
        Harness {
            svc,
            counters,
            fw_maps,
            firewall,
        }
    }

    fn syn_from(addr: Ipv4Addr) -> DosIdentifier {
        DosIdentifier::new(ipv4_to_le(addr), 6, TcpFlag::Syn.bits())
    }

    const ATTACKER: Ipv4Addr = Ipv4Addr::new(198, 51, 100, 7);

    #[tokio::test]
    async fn exceeding_limit_installs_one_host_rule() {
        let mut h = harness();
        let id = h
            .svc
            .set_policy(DosPolicy::new(
                TransportProtocol::Tcp,
                Some(TcpFlag::Syn),
                100,
            ))
            .unwrap();

        h.counters.set(syn_from(ATTACKER), 50);
        assert_eq!(h.svc.tick().await, 0);
        h.counters.set(syn_from(ATTACKER), 151);
        assert_eq!(h.svc.tick().await, 1);

        let policy = &h.svc.policies()[0];
        assert_eq!(policy.id, id);
        assert_eq!(policy.status, PolicyStatus::Triggered);
        assert_eq!(policy.fw_rule_ids.len(), 1);

        let rules = h.firewall.read().await.rules();
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].network.to_string(), "198.51.100.7/32");
        assert_eq!(rules[0].protocol, TransportProtocol::Tcp);
        assert!(rules[0].ports().is_any());
    }

    #[tokio::test]
    async fn first_sighting_counts_from_zero() {
        let mut h = harness();
        h.svc
            .set_policy(DosPolicy::new(TransportProtocol::Udp, None, 10))
            .unwrap();
        h.counters
            .set(DosIdentifier::new(ipv4_to_le(ATTACKER), 17, 0), 11);
        assert_eq!(h.svc.tick().await, 1);
    }

    #[tokio::test]
    async fn delta_at_limit_does_not_trigger() {
        let mut h = harness();
        h.svc
            .set_policy(DosPolicy::new(TransportProtocol::Udp, None, 10))
            .unwrap();
        h.counters
            .set(DosIdentifier::new(ipv4_to_le(ATTACKER), 17, 0), 10);
        assert_eq!(h.svc.tick().await, 0);
        assert_eq!(h.svc.policies()[0].status, PolicyStatus::NotTriggered);
    }

    #[tokio::test]
    async fn blocked_source_is_not_blocked_twice() {
        let mut h = harness();
        h.svc
            .set_policy(DosPolicy::new(TransportProtocol::Tcp, Some(TcpFlag::Syn), 1))
            .unwrap();
        h.counters.set(syn_from(ATTACKER), 10);
        assert_eq!(h.svc.tick().await, 1);
        h.counters.set(syn_from(ATTACKER), 20);
        assert_eq!(h.svc.tick().await, 0);
        assert_eq!(h.firewall.read().await.rule_count(), 1);
    }

    #[tokio::test]
    async fn failed_install_is_retried() {
        let mut h = harness();
        h.svc
            .set_policy(DosPolicy::new(TransportProtocol::Tcp, Some(TcpFlag::Syn), 1))
            .unwrap();
        h.fw_maps.failures.fail("insert_rule");
        h.counters.set(syn_from(ATTACKER), 10);
        assert_eq!(h.svc.tick().await, 0);
        assert_eq!(h.svc.policies()[0].status, PolicyStatus::NotTriggered);

        h.fw_maps.failures.heal("insert_rule");
        h.counters.set(syn_from(ATTACKER), 20);
        assert_eq!(h.svc.tick().await, 1);
    }

    #[tokio::test]
    async fn unknown_protocol_is_skipped() {
        let mut h = harness();
        h.svc
            .set_policy(DosPolicy::new(TransportProtocol::Udp, None, 0))
            .unwrap();
        h.counters
            .set(DosIdentifier::new(ipv4_to_le(ATTACKER), 47, 0), 1000);
        assert_eq!(h.svc.tick().await, 0);
    }

    #[tokio::test]
    async fn read_failure_is_tolerated() {
        let mut h = harness();
        h.svc
            .set_policy(DosPolicy::new(TransportProtocol::Udp, None, 0))
            .unwrap();
        h.counters.failures.fail("counters");
        assert_eq!(h.svc.tick().await, 0);
    }

    #[tokio::test]
    async fn delete_removes_installed_rules() {
        let mut h = harness();
        let id = h
            .svc
            .set_policy(DosPolicy::new(TransportProtocol::Tcp, Some(TcpFlag::Syn), 1))
            .unwrap();
        h.counters.set(syn_from(ATTACKER), 10);
        h.counters.set(syn_from(Ipv4Addr::new(198, 51, 100, 8)), 10);
        assert_eq!(h.svc.tick().await, 2);

        h.svc.delete_policy(id).await.unwrap();
        assert_eq!(h.svc.policy_count(), 0);
        assert_eq!(h.firewall.read().await.rule_count(), 0);
        assert!(h.fw_maps.state().adv_rules.is_empty());
    }

    #[tokio::test]
    async fn delete_unknown_is_noop() {
        let mut h = harness();
        assert!(h.svc.delete_policy(7).await.is_ok());
    }

    #[tokio::test]
    async fn any_protocol_policy_is_rejected() {
        let mut h = harness();
        assert!(
            h.svc
                .set_policy(DosPolicy::new(TransportProtocol::Any, None, 1))
                .is_err()
        );
    }

    #[tokio::test]
    async fn loop_stops_on_cancel() {
        let h = harness();
        let svc = Arc::new(RwLock::new(h.svc));
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_dos_loop(
            Arc::clone(&svc),
            Duration::from_millis(10),
            cancel.clone(),
        ));
        tokio::time::sleep(Duration::from_millis(30)).await;
        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
