use std::collections::BTreeMap;

use ebpf_common::loadbalancer::{RR_SLOT_EMPTY, RR_TABLE_MAX_ENTRIES};

use super::entity::{Backend, BackendStatus};
use super::error::LbError;

/// One `rr_table` slot assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RotationWrite {
    pub slot: u32,
    /// [`RR_SLOT_EMPTY`] clears the slot.
    pub backend_id: u32,
}

/// Backend registry and round-robin rotation.
///
/// `rotation` mirrors `rr_table[0..len)`: the ids of backends still taking
/// new connections, in ascending id order. Ids only grow, so appending on
/// registration keeps the order.
#[derive(Debug)]
pub struct LbEngine {
    backends: BTreeMap<u32, Backend>,
    rotation: Vec<u32>,
    next_id: u32,
}

impl Default for LbEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl LbEngine {
    pub fn new() -> Self {
        Self {
            backends: BTreeMap::new(),
            rotation: Vec::new(),
            next_id: 1,
        }
    }

    /// Consume the next backend id. Ids are never handed out twice.
    pub fn allocate_id(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Slot the next registered backend goes into.
    pub fn next_slot(&self) -> Result<u32, LbError> {
        let len = self.rotation_len();
        if len >= RR_TABLE_MAX_ENTRIES {
            return Err(LbError::RotationFull {
                capacity: RR_TABLE_MAX_ENTRIES,
            });
        }
        Ok(len)
    }

    /// Record that `id` now occupies slot [`next_slot`](Self::next_slot).
    pub fn push_rotation(&mut self, id: u32) {
        self.rotation.push(id);
    }

    pub fn register(&mut self, backend: Backend) {
        self.backends.insert(backend.id, backend);
    }

    pub fn backend(&self, id: u32) -> Option<&Backend> {
        self.backends.get(&id)
    }

    /// Snapshot ordered by id.
    pub fn backends(&self) -> Vec<Backend> {
        self.backends.values().cloned().collect()
    }

    pub fn ids(&self) -> Vec<u32> {
        self.backends.keys().copied().collect()
    }

    pub fn remove(&mut self, id: u32) -> Option<Backend> {
        self.backends.remove(&id)
    }

    pub fn rotation(&self) -> &[u32] {
        &self.rotation
    }

    pub fn rotation_len(&self) -> u32 {
        // bounded by RR_TABLE_MAX_ENTRIES through next_slot
        u32::try_from(self.rotation.len()).unwrap_or(u32::MAX)
    }

    /// Slot writes that take `id` out of rotation.
    ///
    /// Every slot from the backend's index up to the new length gets the id
    /// that shifts into it, and the old last slot is cleared. Nothing is
    /// changed in memory, so the same writes come back until
    /// [`commit_drain`](Self::commit_drain) runs; replaying them is
    /// harmless. A backend already out of rotation needs no writes.
    pub fn drain_writes(&self, id: u32) -> Result<Vec<RotationWrite>, LbError> {
        if !self.backends.contains_key(&id) {
            return Err(LbError::BackendNotFound { id });
        }
        let Some(index) = self.rotation.iter().position(|&b| b == id) else {
            return Ok(Vec::new());
        };

        let mut writes: Vec<RotationWrite> = self.rotation[index + 1..]
            .iter()
            .zip(index..)
            .map(|(&backend_id, slot)| RotationWrite {
                slot: slot_index(slot),
                backend_id,
            })
            .collect();
        writes.push(RotationWrite {
            slot: slot_index(self.rotation.len() - 1),
            backend_id: RR_SLOT_EMPTY,
        });
        Ok(writes)
    }

    /// Mark `id` unavailable and drop it from the rotation. Call once the
    /// writes from [`drain_writes`](Self::drain_writes) reached the kernel.
    pub fn commit_drain(&mut self, id: u32) -> Result<(), LbError> {
        let backend = self
            .backends
            .get_mut(&id)
            .ok_or(LbError::BackendNotFound { id })?;
        backend.status = BackendStatus::Unavailable;
        self.rotation.retain(|&b| b != id);
        Ok(())
    }
}

fn slot_index(slot: usize) -> u32 {
    u32::try_from(slot).unwrap_or(u32::MAX)
}
