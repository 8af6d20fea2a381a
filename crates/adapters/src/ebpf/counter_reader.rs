use aya::Ebpf;
use aya::maps::{HashMap, MapData};
use domain::common::error::DomainError;
use ebpf_common::programs::MAP_COUNTER;
use ports::secondary::packet_counter_port::PacketCounterPort;
use tracing::info;

use super::optional;

/// Reads the per-protocol packet counters of the upstream device from the
/// `counter` map (`HashMap<u32, u64>`, IP protocol number -> packets).
pub struct PacketCounterReader {
    counter: HashMap<MapData, u32, u64>,
}

impl PacketCounterReader {
    pub fn new(ebpf: &mut Ebpf) -> Result<Self, anyhow::Error> {
        let map = ebpf
            .take_map(MAP_COUNTER)
            .ok_or_else(|| anyhow::anyhow!("map '{MAP_COUNTER}' not found in eBPF object"))?;
        let counter = HashMap::try_from(map)?;
        info!("counter map acquired");
        Ok(Self { counter })
    }
}

impl PacketCounterPort for PacketCounterReader {
    fn packet_count(&self, protocol: u32) -> Result<u64, DomainError> {
        optional(self.counter.get(&protocol, 0))
            .map(Option::unwrap_or_default)
            .map_err(|e| DomainError::EngineError(format!("counter get failed: {e}")))
    }
}
