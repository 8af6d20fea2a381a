use aya::Ebpf;
use aya::maps::{HashMap, MapData};
use domain::common::error::DomainError;
use ebpf_common::conntrack::{ConntrackInfo, ConntrackKey};
use ebpf_common::programs::MAP_CONNTRACK;
use ports::secondary::conntrack_map_port::ConntrackMapPort;
use tracing::info;

/// Manages the `conntrack` map (`HashMap<ConntrackKey, ConntrackInfo>`).
///
/// The data plane creates and updates entries; userspace reads them and
/// deletes the ones that are due for collection.
pub struct ConntrackMapManager {
    table: HashMap<MapData, ConntrackKey, ConntrackInfo>,
}

impl ConntrackMapManager {
    pub fn new(ebpf: &mut Ebpf) -> Result<Self, anyhow::Error> {
        let map = ebpf
            .take_map(MAP_CONNTRACK)
            .ok_or_else(|| anyhow::anyhow!("map '{MAP_CONNTRACK}' not found in eBPF object"))?;
        let table = HashMap::try_from(map)?;
        info!("conntrack map acquired");
        Ok(Self { table })
    }
}

impl ConntrackMapPort for ConntrackMapManager {
    fn entries(&self) -> Vec<Result<(ConntrackKey, ConntrackInfo), DomainError>> {
        self.table
            .iter()
            .map(|item| {
                item.map_err(|e| DomainError::EngineError(format!("conntrack read failed: {e}")))
            })
            .collect()
    }

    fn remove(&mut self, key: &ConntrackKey) -> Result<(), DomainError> {
        self.table
            .remove(key)
            .map_err(|e| DomainError::EngineError(format!("conntrack remove failed: {e}")))
    }
}
