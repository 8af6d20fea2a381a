use domain::common::error::DomainError;
use ebpf_common::loadbalancer::{BackendInfo, UpstreamInfo};

/// Secondary port for load balancer eBPF map operations.
///
/// Provides a typed interface to the kernel `upstream_info`,
/// `redirect_dev_map`, `backend_info`, `backend_ifindex` and `rr_table`
/// maps. Implemented by `LbMapManager` in the adapter layer.
pub trait LoadBalancerMapPort: Send + Sync {
    /// Write the upstream record into its single slot.
    fn set_upstream(&mut self, info: &UpstreamInfo) -> Result<(), DomainError>;

    /// Allow the data plane to redirect packets to `ifindex`.
    fn allow_redirect(&mut self, ifindex: u32) -> Result<(), DomainError>;

    /// Withdraw a redirect authorization.
    fn revoke_redirect(&mut self, ifindex: u32) -> Result<(), DomainError>;

    /// Read a backend record. `None` when no record exists for `id`.
    fn backend_info(&self, id: u32) -> Result<Option<BackendInfo>, DomainError>;

    /// Insert or replace a backend record.
    fn set_backend_info(&mut self, id: u32, info: &BackendInfo) -> Result<(), DomainError>;

    fn remove_backend_info(&mut self, id: u32) -> Result<(), DomainError>;

    /// Map a backend device index to its backend id.
    fn set_backend_ifindex(&mut self, ifindex: u32, id: u32) -> Result<(), DomainError>;

    fn remove_backend_ifindex(&mut self, ifindex: u32) -> Result<(), DomainError>;

    /// Write one round-robin slot.
    fn set_rr_slot(&mut self, slot: u32, backend_id: u32) -> Result<(), DomainError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loadbalancer_map_port_is_object_safe() {
        fn _check(port: &dyn LoadBalancerMapPort) {
            let _ = port.backend_info(1);
        }
    }
}
