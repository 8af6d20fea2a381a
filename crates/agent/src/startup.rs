use std::path::Path;
use std::sync::Arc;

use adapters::ebpf::conntrack_map_manager::ConntrackMapManager;
use adapters::ebpf::counter_reader::PacketCounterReader;
use adapters::ebpf::dos_counter_reader::DosCounterReader;
use adapters::ebpf::firewall_map_manager::FirewallMapManager;
use adapters::ebpf::lb_map_manager::LbMapManager;
use adapters::ebpf::loader::EbpfLoader;
use adapters::net::arp::ArpNeighborResolver;
use adapters::net::link;
use anyhow::Context;
use application::ddos_service_impl::{DOS_POLL_INTERVAL, DosAppService, run_dos_loop};
use application::firewall_service_impl::FirewallAppService;
use application::lb_service_impl::{LbAppService, LbPorts, run_conntrack_loop};
use application::stat_service_impl::{StatAppService, run_stats_loop};
use domain::loadbalancer::entity::Upstream;
use infrastructure::config::AgentConfig;
use infrastructure::constants::{GRACEFUL_SHUTDOWN_TIMEOUT, STATS_LOG_INTERVAL};
use infrastructure::logging::{init_logging, service_span};
use tokio::sync::RwLock;
use tracing::{Instrument, info, warn};

use crate::cli::Cli;
use crate::shutdown::create_shutdown_token;

/// Load config, initialize logging, then run the agent until shutdown.
pub async fn run(cli: &Cli) -> anyhow::Result<()> {
    // ── 1. Load config ──────────────────────────────────────────────
    let config = AgentConfig::load(Path::new(&cli.config))?;

    // ── 2. Initialize logging ───────────────────────────────────────
    // CLI flags take precedence over config file
    let log_level = cli.log_level.unwrap_or(config.agent.log_level);
    let log_format = cli.log_format.unwrap_or(config.agent.log_format);
    init_logging(log_level, log_format)?;

    info!(
        config_path = %cli.config,
        log_level = log_level.as_str(),
        log_format = log_format.as_str(),
        "xdplb agent starting"
    );

    serve(config)
        .instrument(service_span("xdplb", env!("CARGO_PKG_VERSION")))
        .await
}

#[allow(clippy::too_many_lines)] // startup is sequential
async fn serve(config: AgentConfig) -> anyhow::Result<()> {
    // ── 3. Resolve the upstream device ──────────────────────────────
    let device = config.agent.upstream.clone();
    let ifindex = link::ifindex(&device)?;
    let mac = link::mac_address(&device)?;
    let upstream = Upstream {
        vip: config.agent.vip,
        ifindex,
        mac,
    };
    info!(device = %device, ifindex, %mac, vip = %upstream.vip, "upstream device resolved");

    // ── 4. Load the eBPF object ─────────────────────────────────────
    let program_path = config.ebpf_program_path();
    let bytes = tokio::fs::read(&program_path)
        .await
        .with_context(|| format!("failed to read eBPF object {}", program_path.display()))?;
    let mut loader = EbpfLoader::load(&bytes)?;
    loader.load_programs()?;
    loader.register_tail_calls()?;

    let firewall_maps = FirewallMapManager::new(loader.ebpf_mut())?;
    let dos_counters = DosCounterReader::new(loader.ebpf_mut())?;
    let packet_counters = PacketCounterReader::new(loader.ebpf_mut())?;
    let lb_maps = LbMapManager::new(loader.ebpf_mut())?;
    let conntrack_maps = ConntrackMapManager::new(loader.ebpf_mut())?;

    // ── 5. Build services ───────────────────────────────────────────
    let stat_svc = Arc::new(StatAppService::new(
        Box::new(packet_counters),
        device.clone(),
        ifindex,
    ));

    let firewall_svc = Arc::new(RwLock::new(FirewallAppService::new(Box::new(
        firewall_maps,
    ))));
    let dos_svc = Arc::new(RwLock::new(DosAppService::new(
        Box::new(dos_counters),
        Arc::clone(&firewall_svc),
    )));

    // The loader moves into the load balancer, which attaches the
    // entrypoint to backend devices at runtime.
    let lb_svc = Arc::new(RwLock::new(LbAppService::new(
        upstream,
        config.loadbalancer.conntrack_settings(),
        LbPorts {
            maps: Box::new(lb_maps),
            conntrack: Box::new(conntrack_maps),
            neighbors: Box::new(ArpNeighborResolver::new(
                config.loadbalancer.neighbor_probe_timeout(),
            )),
            attacher: Box::new(loader),
        },
    )));

    // ── 6. Populate the maps ────────────────────────────────────────
    lb_svc.write().await.start()?;

    for rule in &config.firewall.rules {
        let rule = rule.to_domain_rule()?;
        firewall_svc.write().await.set_rule(rule)?;
    }
    for policy in &config.dos_protection.policies {
        let policy = policy.to_domain_policy()?;
        dos_svc.write().await.set_policy(policy)?;
    }
    info!(
        rule_count = firewall_svc.read().await.rule_count(),
        policy_count = dos_svc.read().await.policy_count(),
        "firewall and DoS protection initialized"
    );

    for backend in &config.loadbalancer.backends {
        if let Err(e) = lb_svc.write().await.set_backend(backend.to_spec()).await {
            warn!(name = %backend.name, addr = %backend.addr, error = %e, "startup backend not registered (non-fatal)");
        }
    }

    // ── 7. Attach to the upstream device ────────────────────────────
    let attached = lb_svc.write().await.attach_upstream();
    let upstream_link = match attached {
        Ok(link) => link,
        Err(e) => {
            lb_svc.write().await.shutdown();
            return Err(e.into());
        }
    };

    // ── 8. Spawn background loops ───────────────────────────────────
    let cancel_token = create_shutdown_token();

    let dos_handle = tokio::spawn(
        run_dos_loop(Arc::clone(&dos_svc), DOS_POLL_INTERVAL, cancel_token.clone())
            .in_current_span(),
    );
    let conntrack_handle = tokio::spawn(
        run_conntrack_loop(Arc::clone(&lb_svc), cancel_token.clone()).in_current_span(),
    );
    let stats_handle = tokio::spawn(
        run_stats_loop(stat_svc, STATS_LOG_INTERVAL, cancel_token.clone()).in_current_span(),
    );

    info!("agent ready, waiting for shutdown signal");
    cancel_token.cancelled().await;

    // ── 9. Shutdown ─────────────────────────────────────────────────
    info!("shutdown phase 1: stopping loops");
    let loops = async {
        let _ = tokio::join!(dos_handle, conntrack_handle, stats_handle);
    };
    if tokio::time::timeout(GRACEFUL_SHUTDOWN_TIMEOUT, loops)
        .await
        .is_err()
    {
        warn!("background loops did not stop in time");
    }

    info!("shutdown phase 2: deleting backends");
    let mut lb = lb_svc.write().await;
    lb.shutdown();

    info!("shutdown phase 3: detaching upstream");
    if let Err(e) = upstream_link.detach() {
        warn!(error = %e, "failed to detach entrypoint from upstream");
    }
    drop(lb);

    info!("shutdown phase 4: unloading programs");
    drop(lb_svc);

    info!("agent stopped");
    Ok(())
}
