use aya::Ebpf;
use aya::maps::{Array, DevMapHash, HashMap, MapData};
use domain::common::error::DomainError;
use ebpf_common::loadbalancer::{BackendInfo, UPSTREAM_INFO_INDEX, UpstreamInfo};
use ebpf_common::programs::{
    MAP_BACKEND_IFINDEX, MAP_BACKEND_INFO, MAP_REDIRECT_DEV, MAP_RR_TABLE, MAP_UPSTREAM_INFO,
};
use ports::secondary::loadbalancer_map_port::LoadBalancerMapPort;
use tracing::info;

use super::optional;

/// Manages the load balancer eBPF maps.
///
/// Uses 5 maps:
/// - `upstream_info`: `Array<UpstreamInfo>` (single element: the VIP device)
/// - `redirect_dev_map`: `DevMapHash` (ifindex -> ifindex, redirect targets)
/// - `backend_info`: `HashMap<u32, BackendInfo>` (backend id -> backend)
/// - `backend_ifindex`: `HashMap<u32, u32>` (ifindex -> backend id)
/// - `rr_table`: `Array<u32>` (round-robin slot -> backend id)
pub struct LbMapManager {
    upstream: Array<MapData, UpstreamInfo>,
    redirect: DevMapHash<MapData>,
    backend_info: HashMap<MapData, u32, BackendInfo>,
    backend_ifindex: HashMap<MapData, u32, u32>,
    rr_table: Array<MapData, u32>,
}

impl LbMapManager {
    /// Create a new `LbMapManager` by taking ownership of the load balancer
    /// maps from the loaded eBPF object.
    pub fn new(ebpf: &mut Ebpf) -> Result<Self, anyhow::Error> {
        let upstream = Array::try_from(ebpf.take_map(MAP_UPSTREAM_INFO).ok_or_else(|| {
            anyhow::anyhow!("map '{MAP_UPSTREAM_INFO}' not found in eBPF object")
        })?)?;
        let redirect = DevMapHash::try_from(ebpf.take_map(MAP_REDIRECT_DEV).ok_or_else(|| {
            anyhow::anyhow!("map '{MAP_REDIRECT_DEV}' not found in eBPF object")
        })?)?;
        let backend_info = HashMap::try_from(ebpf.take_map(MAP_BACKEND_INFO).ok_or_else(
            || anyhow::anyhow!("map '{MAP_BACKEND_INFO}' not found in eBPF object"),
        )?)?;
        let backend_ifindex = HashMap::try_from(ebpf.take_map(MAP_BACKEND_IFINDEX).ok_or_else(
            || anyhow::anyhow!("map '{MAP_BACKEND_IFINDEX}' not found in eBPF object"),
        )?)?;
        let rr_table = Array::try_from(
            ebpf.take_map(MAP_RR_TABLE)
                .ok_or_else(|| anyhow::anyhow!("map '{MAP_RR_TABLE}' not found in eBPF object"))?,
        )?;

        info!(
            "load balancer maps acquired (upstream_info, redirect_dev_map, backend_info, backend_ifindex, rr_table)"
        );
        Ok(Self {
            upstream,
            redirect,
            backend_info,
            backend_ifindex,
            rr_table,
        })
    }
}

impl LoadBalancerMapPort for LbMapManager {
    fn set_upstream(&mut self, info: &UpstreamInfo) -> Result<(), DomainError> {
        self.upstream
            .set(UPSTREAM_INFO_INDEX, *info, 0)
            .map_err(|e| DomainError::EngineError(format!("upstream_info set failed: {e}")))
    }

    fn allow_redirect(&mut self, ifindex: u32) -> Result<(), DomainError> {
        self.redirect
            .insert(ifindex, ifindex, None, 0)
            .map_err(|e| DomainError::EngineError(format!("redirect_dev_map insert failed: {e}")))
    }

    fn revoke_redirect(&mut self, ifindex: u32) -> Result<(), DomainError> {
        self.redirect
            .remove(ifindex)
            .map_err(|e| DomainError::EngineError(format!("redirect_dev_map remove failed: {e}")))
    }

    fn backend_info(&self, id: u32) -> Result<Option<BackendInfo>, DomainError> {
        optional(self.backend_info.get(&id, 0))
            .map_err(|e| DomainError::EngineError(format!("backend_info get failed: {e}")))
    }

    fn set_backend_info(&mut self, id: u32, info: &BackendInfo) -> Result<(), DomainError> {
        self.backend_info
            .insert(id, *info, 0)
            .map_err(|e| DomainError::EngineError(format!("backend_info insert failed: {e}")))
    }

    fn remove_backend_info(&mut self, id: u32) -> Result<(), DomainError> {
        self.backend_info
            .remove(&id)
            .map_err(|e| DomainError::EngineError(format!("backend_info remove failed: {e}")))
    }

    fn set_backend_ifindex(&mut self, ifindex: u32, id: u32) -> Result<(), DomainError> {
        self.backend_ifindex
            .insert(ifindex, id, 0)
            .map_err(|e| DomainError::EngineError(format!("backend_ifindex insert failed: {e}")))
    }

    fn remove_backend_ifindex(&mut self, ifindex: u32) -> Result<(), DomainError> {
        self.backend_ifindex
            .remove(&ifindex)
            .map_err(|e| DomainError::EngineError(format!("backend_ifindex remove failed: {e}")))
    }

    fn set_rr_slot(&mut self, slot: u32, backend_id: u32) -> Result<(), DomainError> {
        self.rr_table
            .set(slot, backend_id, 0)
            .map_err(|e| DomainError::EngineError(format!("rr_table set slot {slot} failed: {e}")))
    }
}
