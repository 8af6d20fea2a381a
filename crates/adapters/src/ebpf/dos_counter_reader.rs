use aya::Ebpf;
use aya::maps::{HashMap, MapData};
use domain::common::error::DomainError;
use ebpf_common::ddos::DosIdentifier;
use ebpf_common::programs::MAP_DOSP_COUNTER;
use ports::secondary::dos_counter_port::DosCounterPort;
use tracing::{info, warn};

/// Reads the kernel-maintained `dosp_counter` map
/// (`HashMap<DosIdentifier, u64>`, cumulative packets per flow identifier).
pub struct DosCounterReader {
    counters: HashMap<MapData, DosIdentifier, u64>,
}

impl DosCounterReader {
    pub fn new(ebpf: &mut Ebpf) -> Result<Self, anyhow::Error> {
        let map = ebpf
            .take_map(MAP_DOSP_COUNTER)
            .ok_or_else(|| anyhow::anyhow!("map '{MAP_DOSP_COUNTER}' not found in eBPF object"))?;
        let counters = HashMap::try_from(map)?;
        info!("dosp_counter map acquired");
        Ok(Self { counters })
    }
}

impl DosCounterPort for DosCounterReader {
    fn counters(&self) -> Result<Vec<(DosIdentifier, u64)>, DomainError> {
        let entries = self
            .counters
            .iter()
            .filter_map(|item| {
                item.inspect_err(|e| warn!(error = %e, "dosp_counter entry unreadable, skipped"))
                    .ok()
            })
            .collect();
        Ok(entries)
    }
}
