use std::future::Future;
use std::net::Ipv4Addr;
use std::pin::Pin;

use domain::common::error::DomainError;
use domain::loadbalancer::entity::NeighborEntry;

/// Secondary port for host neighbor (ARP) resolution.
///
/// Uses `Pin<Box<dyn Future>>` return types so the trait stays
/// dyn-compatible behind a `Box<dyn NeighborResolver>`.
pub trait NeighborResolver: Send + Sync {
    /// Send a bounded reachability probe so the kernel learns the
    /// neighbor.
    fn probe<'a>(
        &'a self,
        addr: Ipv4Addr,
    ) -> Pin<Box<dyn Future<Output = Result<(), DomainError>> + Send + 'a>>;

    /// Look `addr` up in the host neighbor table. `None` when the address
    /// has no resolved entry.
    fn resolve<'a>(
        &'a self,
        addr: Ipv4Addr,
    ) -> Pin<Box<dyn Future<Output = Result<Option<NeighborEntry>, DomainError>> + Send + 'a>>;
}
