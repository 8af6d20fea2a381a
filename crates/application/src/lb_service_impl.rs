use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::SystemTime;

use domain::common::error::DomainError;
use domain::conntrack::engine::ConntrackTable;
use domain::conntrack::entity::{ConntrackEntry, ConntrackSettings};
use domain::loadbalancer::engine::LbEngine;
use domain::loadbalancer::entity::{Backend, BackendSpec, BackendStatus, Upstream};
use domain::loadbalancer::error::LbError;
use ports::secondary::conntrack_map_port::ConntrackMapPort;
use ports::secondary::loadbalancer_map_port::LoadBalancerMapPort;
use ports::secondary::neighbor_port::NeighborResolver;
use ports::secondary::xdp_attach_port::{XdpAttachPort, XdpAttachment};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// The secondary ports the load balancer service drives.
pub struct LbPorts {
    pub maps: Box<dyn LoadBalancerMapPort + Send>,
    pub conntrack: Box<dyn ConntrackMapPort + Send>,
    pub neighbors: Box<dyn NeighborResolver>,
    pub attacher: Box<dyn XdpAttachPort + Send>,
}

/// Application-level load balancer service.
///
/// Owns the backend registry, the round-robin rotation and the conntrack
/// mirror, and is the only writer of the load balancer maps. Designed to be
/// wrapped in `RwLock` for shared access: the conntrack loop and the
/// backend operations serialize on the same lock.
pub struct LbAppService {
    engine: LbEngine,
    conntrack: ConntrackTable,
    settings: ConntrackSettings,
    upstream: Upstream,
    ports: LbPorts,
    /// `entrypoint` links keyed by device index, shared by every backend
    /// behind the same device.
    attachments: HashMap<u32, Box<dyn XdpAttachment>>,
}

impl LbAppService {
    pub fn new(upstream: Upstream, settings: ConntrackSettings, ports: LbPorts) -> Self {
        Self {
            engine: LbEngine::new(),
            conntrack: ConntrackTable::new(),
            settings,
            upstream,
            ports,
            attachments: HashMap::new(),
        }
    }

    /// Publish the upstream device to the data plane and authorize it as a
    /// redirect target.
    pub fn start(&mut self) -> Result<(), DomainError> {
        let info = self.upstream.to_upstream_info()?;
        debug!(vip = %self.upstream.vip, ifindex = self.upstream.ifindex, "write upstream_info");
        self.ports.maps.set_upstream(&info)?;
        self.ports.maps.allow_redirect(self.upstream.ifindex)?;
        info!(
            vip = %self.upstream.vip,
            ifindex = self.upstream.ifindex,
            mac = %self.upstream.mac,
            "load balancer upstream registered"
        );
        Ok(())
    }

    pub fn settings(&self) -> &ConntrackSettings {
        &self.settings
    }

    /// Attach `entrypoint` to the upstream device. The caller owns the link
    /// and detaches it after [`shutdown`](Self::shutdown).
    pub fn attach_upstream(&mut self) -> Result<Box<dyn XdpAttachment>, DomainError> {
        let attachment = self
            .ports
            .attacher
            .attach_entrypoint(self.upstream.ifindex)?;
        info!(ifindex = self.upstream.ifindex, "entrypoint attached to upstream");
        Ok(attachment)
    }

    // ── Backends ──────────────────────────────────────────────────

    /// Register a backend and put it into rotation. Returns its id.
    ///
    /// Kernel writes are not unwound on failure. The backend is registered
    /// as soon as its `backend_info` record exists, so a later failure
    /// leaves it visible and removable through drain and delete.
    pub async fn set_backend(&mut self, spec: BackendSpec) -> Result<u32, DomainError> {
        spec.validate()?;
        let addr = spec.addr;

        if let Err(e) = self.ports.neighbors.probe(addr).await {
            warn!(%addr, error = %e, "neighbor probe failed, trying the neighbor table anyway");
        }
        let neighbor = self
            .ports
            .neighbors
            .resolve(addr)
            .await?
            .ok_or_else(|| LbError::NeighborNotFound {
                addr: addr.to_string(),
            })?;

        let slot = self.engine.next_slot()?;
        let id = self.engine.allocate_id();
        let backend = Backend::new(id, spec, neighbor);
        let ifindex = backend.ifindex;
        let name = backend.name.clone();
        let device = backend.device.clone();

        self.ports
            .maps
            .set_backend_info(id, &backend.to_backend_info())?;
        self.engine.register(backend);

        self.ports.maps.set_backend_ifindex(ifindex, id)?;
        self.ports.maps.allow_redirect(ifindex)?;

        self.ports.maps.set_rr_slot(slot, id)?;
        self.engine.push_rotation(id);
        debug!(id, slot, "rr_table slot assigned");

        if self.attachments.contains_key(&ifindex) {
            debug!(id, ifindex, "entrypoint already attached to device");
        } else {
            let attachment = self.ports.attacher.attach_entrypoint(ifindex)?;
            self.attachments.insert(ifindex, attachment);
        }

        info!(id, name = %name, %addr, device = %device, ifindex, "backend registered");
        Ok(id)
    }

    /// Snapshot of every backend, ordered by id.
    pub fn backends(&self) -> Vec<Backend> {
        self.engine.backends()
    }

    /// Stop sending new connections to backend `id`.
    ///
    /// The rotation is rewritten first, then the kernel status. Memory
    /// changes only once both landed, so a failed drain can be retried and
    /// replays the same slot writes.
    pub fn drain(&mut self, id: u32) -> Result<(), DomainError> {
        let writes = self.engine.drain_writes(id)?;
        let backend = self
            .engine
            .backend(id)
            .ok_or(LbError::BackendNotFound { id })?;
        let mut info = backend.to_backend_info();
        info.status = BackendStatus::Unavailable.to_u32();

        for write in &writes {
            self.ports.maps.set_rr_slot(write.slot, write.backend_id)?;
        }
        self.ports.maps.set_backend_info(id, &info)?;

        self.engine.commit_drain(id)?;
        info!(
            id,
            rotation = ?self.engine.rotation(),
            "backend drained"
        );
        Ok(())
    }

    /// Remove a drained backend. Unknown ids are a no-op.
    ///
    /// Fails with a precondition error, without touching any map, when the
    /// kernel does not report the backend as unavailable. A retry after a
    /// partial delete finds `backend_info` already gone and carries on.
    pub fn delete(&mut self, id: u32) -> Result<(), DomainError> {
        let Some(backend) = self.engine.backend(id) else {
            return Ok(());
        };
        let ifindex = backend.ifindex;
        let drained = backend.status == BackendStatus::Unavailable;

        let info = self.ports.maps.backend_info(id)?;
        match info {
            Some(info) if BackendStatus::from_u32(info.status) == BackendStatus::Unavailable => {}
            Some(_) => {
                warn!(id, "drain before deleting backend");
                return Err(LbError::NotDrained { id }.into());
            }
            None if drained => {
                debug!(id, "backend_info already removed, resuming delete");
            }
            None => {
                return Err(DomainError::EngineError(format!(
                    "backend_info entry for backend {id} is missing"
                )));
            }
        }

        let sibling = self
            .engine
            .backends()
            .into_iter()
            .find(|b| b.id != id && b.ifindex == ifindex)
            .map(|b| b.id);

        if sibling.is_none()
            && let Some(attachment) = self.attachments.remove(&ifindex)
        {
            attachment.detach()?;
        }

        if info.is_some() {
            self.ports.maps.remove_backend_info(id)?;
        }

        match sibling {
            Some(other) => {
                self.ports.maps.set_backend_ifindex(ifindex, other)?;
            }
            None => {
                self.ports.maps.remove_backend_ifindex(ifindex)?;
                if ifindex != self.upstream.ifindex {
                    self.ports.maps.revoke_redirect(ifindex)?;
                }
            }
        }

        self.engine.remove(id);
        info!(id, ifindex, "backend deleted");
        Ok(())
    }

    /// Delete every backend, continuing past failures. The failures are
    /// reported together.
    pub fn delete_all(&mut self) -> Result<(), DomainError> {
        let errors: Vec<DomainError> = self
            .engine
            .ids()
            .into_iter()
            .filter_map(|id| self.delete(id).err())
            .collect();
        DomainError::aggregate(errors).map_or(Ok(()), Err)
    }

    /// Delete every backend, then detach the program from any device that
    /// still carries it.
    pub fn shutdown(&mut self) {
        if let Err(e) = self.delete_all() {
            warn!(error = %e, "not every backend could be deleted");
        }
        for (ifindex, attachment) in self.attachments.drain() {
            match attachment.detach() {
                Ok(()) => debug!(ifindex, "entrypoint detached from backend device"),
                Err(e) => warn!(ifindex, error = %e, "failed to detach entrypoint"),
            }
        }
    }

    // ── Conntrack ─────────────────────────────────────────────────

    /// Snapshot of the conntrack mirror.
    pub fn conntrack_entries(&self) -> Vec<ConntrackEntry> {
        self.conntrack.entries()
    }

    /// One reconciliation pass over the `conntrack` map.
    pub fn sync_conntrack(&mut self) -> Result<usize, DomainError> {
        self.sync_conntrack_at(SystemTime::now())
    }

    /// [`sync_conntrack`](Self::sync_conntrack) with an explicit clock.
    ///
    /// Returns the number of flows purged. Closed flows and idle UDP flows
    /// are removed from the kernel table, then from the mirror. With GC
    /// enabled, mirror entries the kernel no longer reports are dropped as
    /// well, provided the read was complete. Read, decode and delete
    /// failures are reported together after the pass.
    pub fn sync_conntrack_at(&mut self, now: SystemTime) -> Result<usize, DomainError> {
        let mut errors = Vec::new();
        let mut observed = Vec::new();
        for item in self.ports.conntrack.entries() {
            match item {
                Ok(entry) => observed.push(entry),
                Err(e) => errors.push(e),
            }
        }
        let read_complete = errors.is_empty();

        let outcome = self
            .conntrack
            .sync(&observed, now, self.settings.gc_lifetime());
        errors.extend(outcome.errors.into_iter().map(DomainError::from));

        let mut purged = HashSet::new();
        for key in outcome.purge {
            match self.ports.conntrack.remove(&key) {
                Ok(()) => {
                    self.conntrack.forget(&key);
                    purged.insert(key);
                }
                Err(e) => errors.push(e),
            }
        }
        if !purged.is_empty() {
            debug!(count = purged.len(), "conntrack entries purged");
        }

        if self.settings.gc_enabled && read_complete {
            let live: HashSet<_> = observed
                .iter()
                .map(|(key, _)| *key)
                .filter(|key| !purged.contains(key))
                .collect();
            let dropped = self.conntrack.retain_live(&live);
            if dropped > 0 {
                debug!(count = dropped, "stale conntrack mirror entries dropped");
            }
        }

        DomainError::aggregate(errors).map_or(Ok(purged.len()), Err)
    }
}

/// Run the conntrack reconciliation loop until `cancel` fires.
pub async fn run_conntrack_loop(service: Arc<RwLock<LbAppService>>, cancel: CancellationToken) {
    let interval = service.read().await.settings().interval();
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    ticker.tick().await;

    info!(interval_secs = interval.as_secs(), "conntrack loop started");
    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }
        if let Err(e) = service.write().await.sync_conntrack() {
            warn!(error = %e, "conntrack sync failed");
        }
    }
    info!("conntrack loop stopped");
}
