use std::future::Future;
use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::pin::Pin;
use std::process::Stdio;
use std::time::Duration;

use anyhow::Context;
use domain::common::entity::MacAddr;
use domain::common::error::DomainError;
use domain::loadbalancer::entity::NeighborEntry;
use ports::secondary::neighbor_port::NeighborResolver;
use tokio::process::Command;
use tracing::debug;

use super::link;

pub const ARP_TABLE_PATH: &str = "/proc/net/arp";

/// One row of the host neighbor table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArpEntry {
    pub ip: Ipv4Addr,
    pub mac: MacAddr,
    pub device: String,
}

impl ArpEntry {
    /// Incomplete entries carry an all-zero MAC.
    pub fn is_resolved(&self) -> bool {
        !self.mac.is_zero()
    }
}

/// Parse the contents of `/proc/net/arp`.
///
/// ```text
/// IP address       HW type     Flags       HW address            Mask     Device
/// 10.0.0.2         0x1         0x2         6a:ad:44:35:5d:78     *        h0
/// ```
///
/// The first line is the header. Blank lines are skipped; any other row
/// with fewer than six columns fails the whole parse.
pub fn parse_arp_table(content: &str) -> Result<Vec<ArpEntry>, anyhow::Error> {
    let mut entries = Vec::new();
    for (lineno, line) in content.lines().enumerate().skip(1) {
        if line.trim().is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split_whitespace().collect();
        let [ip, _hw_type, _flags, mac, _mask, device, ..] = fields.as_slice() else {
            anyhow::bail!(
                "arp table line {}: expected 6 columns, got {}",
                lineno + 1,
                fields.len()
            );
        };
        let ip: Ipv4Addr = ip
            .parse()
            .with_context(|| format!("arp table line {}: invalid address '{ip}'", lineno + 1))?;
        let mac: MacAddr = mac
            .parse()
            .with_context(|| format!("arp table line {}: invalid MAC '{mac}'", lineno + 1))?;
        entries.push(ArpEntry {
            ip,
            mac,
            device: (*device).to_string(),
        });
    }
    Ok(entries)
}

/// Resolves backends through the kernel neighbor table.
///
/// `probe` pings the address once so the kernel learns it; `resolve` reads
/// the table file and completes the entry with the device's index and MAC.
pub struct ArpNeighborResolver {
    table_path: PathBuf,
    probe_timeout: Duration,
}

impl ArpNeighborResolver {
    pub fn new(probe_timeout: Duration) -> Self {
        Self::with_table_path(ARP_TABLE_PATH, probe_timeout)
    }

    pub fn with_table_path(table_path: impl Into<PathBuf>, probe_timeout: Duration) -> Self {
        Self {
            table_path: table_path.into(),
            probe_timeout,
        }
    }

    /// The probe timeout is the only bound; the child is killed when the
    /// timeout drops the pending `status` future.
    async fn ping(&self, addr: Ipv4Addr) -> Result<(), anyhow::Error> {
        let mut cmd = ping_command(addr);
        let status = tokio::time::timeout(self.probe_timeout, cmd.status())
            .await
            .map_err(|_| anyhow::anyhow!("ping {addr} timed out after {:?}", self.probe_timeout))?
            .context("failed to run ping")?;
        if !status.success() {
            anyhow::bail!("ping {addr} exited with {status}");
        }
        Ok(())
    }

    async fn lookup(&self, addr: Ipv4Addr) -> Result<Option<NeighborEntry>, anyhow::Error> {
        let content = tokio::fs::read_to_string(&self.table_path)
            .await
            .with_context(|| format!("failed to read {}", self.table_path.display()))?;
        let Some(entry) = parse_arp_table(&content)?
            .into_iter()
            .find(|e| e.ip == addr && e.is_resolved())
        else {
            return Ok(None);
        };

        let ifindex = link::ifindex(&entry.device)?;
        let device_mac = link::mac_address(&entry.device)?;
        debug!(%addr, device = %entry.device, ifindex, "neighbor resolved");
        Ok(Some(NeighborEntry {
            mac: entry.mac,
            device: entry.device,
            ifindex,
            device_mac,
        }))
    }
}

fn ping_command(addr: Ipv4Addr) -> Command {
    let mut cmd = Command::new("ping");
    cmd.args(["-c", "1", "-n", "-q", &addr.to_string()])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true);
    cmd
}

impl NeighborResolver for ArpNeighborResolver {
    fn probe<'a>(
        &'a self,
        addr: Ipv4Addr,
    ) -> Pin<Box<dyn Future<Output = Result<(), DomainError>> + Send + 'a>> {
        Box::pin(async move {
            self.ping(addr)
                .await
                .map_err(|e| DomainError::EngineError(format!("neighbor probe failed: {e:#}")))
        })
    }

    fn resolve<'a>(
        &'a self,
        addr: Ipv4Addr,
    ) -> Pin<Box<dyn Future<Output = Result<Option<NeighborEntry>, DomainError>> + Send + 'a>> {
        Box::pin(async move {
            self.lookup(addr).await.map_err(|e| {
                DomainError::EngineError(format!("neighbor resolution failed: {e:#}"))
            })
        })
    }
}
