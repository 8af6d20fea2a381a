use std::sync::Arc;
use std::time::Duration;

use domain::common::entity::TransportProtocol;
use domain::common::error::DomainError;
use ports::secondary::packet_counter_port::PacketCounterPort;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Packets seen on the upstream device, per protocol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PacketStats {
    pub device: String,
    pub ifindex: u32,
    pub icmp: u64,
    pub tcp: u64,
    pub udp: u64,
}

/// Reads the upstream packet counters maintained by the `count` program.
pub struct StatAppService {
    counters: Box<dyn PacketCounterPort + Send>,
    device: String,
    ifindex: u32,
}

impl StatAppService {
    pub fn new(counters: Box<dyn PacketCounterPort + Send>, device: String, ifindex: u32) -> Self {
        Self {
            counters,
            device,
            ifindex,
        }
    }

    pub fn stats(&self) -> Result<PacketStats, DomainError> {
        Ok(PacketStats {
            device: self.device.clone(),
            ifindex: self.ifindex,
            icmp: self.count(TransportProtocol::Icmp)?,
            tcp: self.count(TransportProtocol::Tcp)?,
            udp: self.count(TransportProtocol::Udp)?,
        })
    }

    fn count(&self, protocol: TransportProtocol) -> Result<u64, DomainError> {
        self.counters.packet_count(protocol.as_u32())
    }
}

/// Log the upstream packet counters every `interval` until `cancel` fires.
pub async fn run_stats_loop(
    service: Arc<StatAppService>,
    interval: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.tick().await;

    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }
        match service.stats() {
            Ok(stats) => info!(
                device = %stats.device,
                ifindex = stats.ifindex,
                icmp = stats.icmp,
                tcp = stats.tcp,
                udp = stats.udp,
                "upstream packet counters"
            ),
            Err(e) => warn!(error = %e, "failed to read packet counters"),
        }
    }
}
