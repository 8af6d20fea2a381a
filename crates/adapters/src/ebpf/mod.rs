use aya::maps::MapError;

pub mod conntrack_map_manager;
pub mod counter_reader;
pub mod dos_counter_reader;
pub mod firewall_map_manager;
pub mod lb_map_manager;
pub mod loader;

/// Map a lookup result so that a missing key reads as `None`.
pub(crate) fn optional<V>(result: Result<V, MapError>) -> Result<Option<V>, MapError> {
    match result {
        Ok(v) => Ok(Some(v)),
        Err(MapError::KeyNotFound) => Ok(None),
        Err(e) => Err(e),
    }
}
