use std::collections::{HashMap, HashSet};
use std::time::{Duration, SystemTime};

use ebpf_common::conntrack::{ConntrackInfo, ConntrackKey};

use super::entity::{ConnectionState, ConntrackEntry};
use super::error::ConntrackError;

/// Outcome of folding one read of the kernel table into the mirror.
#[derive(Debug, Default)]
pub struct SyncOutcome {
    /// Keys to delete from the kernel table, then [`ConntrackTable::forget`].
    pub purge: Vec<ConntrackKey>,
    /// Entries that could not be decoded; they are left out of the mirror.
    /// A key is reported on the pass it first fails and stays quiet while
    /// it keeps failing.
    pub errors: Vec<ConntrackError>,
}

/// Mirror of the kernel `conntrack` table.
#[derive(Debug, Default)]
pub struct ConntrackTable {
    entries: HashMap<ConntrackKey, ConntrackEntry>,
    /// Keys that failed to decode on the previous pass.
    undecodable: HashSet<ConntrackKey>,
}

impl ConntrackTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold `observed` into the mirror.
    ///
    /// New flows get `now` as their timestamp. Known flows take the kernel
    /// state and counter, and the timestamp moves to `now` only when the
    /// counter grew. Flows that are closed, or UDP flows idle for longer
    /// than `gc_lifetime`, are returned for purging; new flows included.
    pub fn sync(
        &mut self,
        observed: &[(ConntrackKey, ConntrackInfo)],
        now: SystemTime,
        gc_lifetime: Duration,
    ) -> SyncOutcome {
        let mut out = SyncOutcome::default();
        let mut undecodable = HashSet::new();
        let mut reject = |key: &ConntrackKey, e: ConntrackError, out: &mut SyncOutcome| {
            if !self.undecodable.contains(key) {
                out.errors.push(e);
            }
            undecodable.insert(*key);
        };

        for (key, info) in observed {
            let eligible = match self.entries.get_mut(key) {
                Some(entry) => {
                    let state = match ConnectionState::from_u8(info.status) {
                        Ok(state) => state,
                        Err(e) => {
                            reject(key, e, &mut out);
                            continue;
                        }
                    };
                    entry.state = state;
                    if info.counter > entry.counter {
                        entry.last_seen = now;
                    }
                    entry.counter = info.counter;
                    entry.backend_id = info.id;
                    entry.is_gc_eligible(now, gc_lifetime)
                }
                None => match ConntrackEntry::from_kernel(key, info, now) {
                    Ok(entry) => {
                        let eligible = entry.is_gc_eligible(now, gc_lifetime);
                        self.entries.insert(*key, entry);
                        eligible
                    }
                    Err(e) => {
                        reject(key, e, &mut out);
                        continue;
                    }
                },
            };

            if eligible {
                out.purge.push(*key);
            }
        }

        self.undecodable = undecodable;
        out
    }

    /// Drop a purged flow from the mirror.
    pub fn forget(&mut self, key: &ConntrackKey) -> bool {
        self.entries.remove(key).is_some()
    }

    /// Drop every mirror entry whose key is not in `live`. Returns how many
    /// entries were removed.
    pub fn retain_live(&mut self, live: &HashSet<ConntrackKey>) -> usize {
        let before = self.entries.len();
        self.entries.retain(|key, _| live.contains(key));
        before - self.entries.len()
    }

    /// Snapshot of the mirror.
    pub fn entries(&self) -> Vec<ConntrackEntry> {
        self.entries.values().cloned().collect()
    }

    pub fn get(&self, key: &ConntrackKey) -> Option<&ConntrackEntry> {
        self.entries.get(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use super::*;
    use crate::common::entity::ipv4_to_le;

    const HOUR: Duration = Duration::from_secs(3600);

    fn t(secs: u64) -> SystemTime {
        SystemTime::UNIX_EPOCH + Duration::from_secs(secs)
    }

    fn key(src_port: u16, protocol: u32) -> ConntrackKey {
        ConntrackKey {
            src_addr: ipv4_to_le(Ipv4Addr::new(198, 51, 100, 7)),
            dst_addr: ipv4_to_le(Ipv4Addr::new(203, 0, 113, 10)),
            src_port: src_port.to_be(),
            dst_port: 53u16.to_be(),
            protocol,
        }
    }

    fn info(status: u8, counter: u64) -> ConntrackInfo {
        ConntrackInfo {
            id: 1,
            ifindex: 4,
            status,
            src_mac: [0; 6],
            _pad: 0,
            counter,
        }
    }

    #[test]
    fn new_flows_are_mirrored() {
        let mut table = ConntrackTable::new();
        let out = table.sync(&[(key(1000, 6), info(1, 1))], t(10), HOUR);
        assert!(out.purge.is_empty());
        assert!(out.errors.is_empty());
        let e = table.get(&key(1000, 6)).unwrap();
        assert_eq!(e.state, ConnectionState::Opening);
        assert_eq!(e.last_seen, t(10));
    }

    #[test]
    fn timestamp_moves_only_when_counter_grows() {
        let mut table = ConntrackTable::new();
        let k = key(1000, 17);
        table.sync(&[(k, info(0, 5))], t(10), HOUR);
        table.sync(&[(k, info(0, 5))], t(20), HOUR);
        assert_eq!(table.get(&k).unwrap().last_seen, t(10));
        table.sync(&[(k, info(0, 6))], t(30), HOUR);
        assert_eq!(table.get(&k).unwrap().last_seen, t(30));
        assert_eq!(table.get(&k).unwrap().counter, 6);
    }

    #[test]
    fn state_follows_kernel() {
        let mut table = ConntrackTable::new();
        let k = key(1000, 6);
        table.sync(&[(k, info(1, 1))], t(0), HOUR);
        table.sync(&[(k, info(2, 3))], t(1), HOUR);
        assert_eq!(table.get(&k).unwrap().state, ConnectionState::Established);
    }

    #[test]
    fn closed_flow_is_purged_even_on_first_sight() {
        let mut table = ConntrackTable::new();
        let k = key(1000, 6);
        let out = table.sync(&[(k, info(4, 9))], t(0), HOUR);
        assert_eq!(out.purge, vec![k]);
        assert!(table.forget(&k));
        assert!(table.is_empty());
    }

    #[test]
    fn idle_udp_flow_is_purged() {
        let mut table = ConntrackTable::new();
        let k = key(2000, 17);
        table.sync(&[(k, info(0, 1))], t(0), Duration::from_secs(60));
        let out = table.sync(&[(k, info(0, 1))], t(61), Duration::from_secs(60));
        assert_eq!(out.purge, vec![k]);
    }

    #[test]
    fn active_udp_flow_is_kept() {
        let mut table = ConntrackTable::new();
        let k = key(2000, 17);
        table.sync(&[(k, info(0, 1))], t(0), Duration::from_secs(60));
        let out = table.sync(&[(k, info(0, 2))], t(61), Duration::from_secs(60));
        assert!(out.purge.is_empty());
    }

    #[test]
    fn malformed_entries_are_reported_and_skipped() {
        let mut table = ConntrackTable::new();
        let out = table.sync(
            &[(key(1, 47), info(0, 1)), (key(2, 6), info(9, 1)), (key(3, 6), info(2, 1))],
            t(0),
            HOUR,
        );
        assert_eq!(out.errors.len(), 2);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn undecodable_key_is_reported_once() {
        let mut table = ConntrackTable::new();
        let gre = key(0, 47);
        let out = table.sync(&[(gre, info(0, 1))], t(0), HOUR);
        assert_eq!(out.errors.len(), 1);

        for secs in 1..4 {
            let out = table.sync(&[(gre, info(0, secs))], t(secs), HOUR);
            assert!(out.errors.is_empty());
        }
        assert!(table.is_empty());

        // gone for a pass, then back: reported again
        table.sync(&[], t(5), HOUR);
        let out = table.sync(&[(gre, info(0, 9))], t(6), HOUR);
        assert_eq!(out.errors.len(), 1);
    }

    #[test]
    fn unknown_state_on_known_flow_keeps_entry() {
        let mut table = ConntrackTable::new();
        let k = key(1000, 6);
        table.sync(&[(k, info(2, 1))], t(0), HOUR);
        let out = table.sync(&[(k, info(200, 5))], t(1), HOUR);
        assert_eq!(out.errors, vec![ConntrackError::UnknownState(200)]);
        assert_eq!(table.get(&k).unwrap().counter, 1);
    }

    #[test]
    fn retain_live_drops_vanished_flows() {
        let mut table = ConntrackTable::new();
        let a = key(1, 6);
        let b = key(2, 6);
        table.sync(&[(a, info(2, 1)), (b, info(2, 1))], t(0), HOUR);
        let live: HashSet<_> = [a].into_iter().collect();
        assert_eq!(table.retain_live(&live), 1);
        assert!(table.get(&a).is_some());
        assert!(table.get(&b).is_none());
    }

    #[test]
    fn snapshot_lists_every_entry() {
        let mut table = ConntrackTable::new();
        table.sync(&[(key(1, 6), info(2, 1)), (key(2, 17), info(0, 1))], t(0), HOUR);
        assert_eq!(table.entries().len(), 2);
    }
}
