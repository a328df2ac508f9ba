//! The neighbor (peering) state machine, §4.5, and the index-and-generation
//! arena (§9 "Cyclic graphs") that lets routes reference neighbors by a
//! small stable integer without risking a stale reference after the slot is
//! recycled.

pub mod probe;

use std::net::IpAddr;
use std::time::Instant;

pub use probe::Probe;

/// Matches §3/§5: "Neighbor indices are drawn from a fixed pool (MAXNBRS =
/// 128)".
pub const MAX_NEIGHBORS: usize = 128;

/// Modern peers (DVMRP 3.255 through 9.x) use the 35 s expire time; legacy
/// peers use 140 s (§4.5 state 5, §3 Neighbor).
const EXPIRE_TIME_MODERN: i64 = 35;
const EXPIRE_TIME_LEGACY: i64 = 140;
/// One-way detection window (§4.5 state 3).
const ONE_WAY_GRACE: i64 = 20;

fn is_legacy_version(major: u8, minor: u8) -> bool {
    major < 3 || (major == 3 && minor < 255)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NeighborState {
    Waiting,
    Active,
    OneWay,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NeighborFlags {
    pub have_genid: bool,
    pub waiting_for_bidirectional_probe: bool,
    pub one_way: bool,
    pub too_old: bool,
    pub too_many_routes: bool,
    pub not_pruning: bool,
    pub leaf: bool,
    pub do_not_peer: bool,
}

#[derive(Debug, Clone)]
pub struct Neighbor {
    pub addr: IpAddr,
    pub vif: usize,
    pub major_version: u8,
    pub minor_version: u8,
    pub genid: Option<u32>,
    pub state: NeighborState,
    pub flags: NeighborFlags,
    pub created_at: Instant,
    /// Seconds since the last probe/report was heard from this neighbor;
    /// advanced by [`crate::timer`]-driven aging, not by `Instant::elapsed`.
    pub age_secs: i64,
    generation: u32,
}

impl Neighbor {
    fn expire_time(&self) -> i64 {
        if is_legacy_version(self.major_version, self.minor_version) {
            EXPIRE_TIME_LEGACY
        } else {
            EXPIRE_TIME_MODERN
        }
    }

    pub fn is_peered(&self) -> bool {
        !self.flags.do_not_peer && matches!(self.state, NeighborState::Active | NeighborState::OneWay)
    }
}

/// A handle into the [`NeighborTable`] arena. Stale handles (slot recycled
/// since) are detected via the generation counter rather than trusted
/// blindly, per §9.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NeighborHandle {
    pub index: usize,
    generation: u32,
}

struct Slot {
    neighbor: Neighbor,
    generation: u32,
}

/// Outcomes a caller (the packet dispatcher, or slow-tick aging) must act on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NeighborEvent {
    /// Neighbor just went Active for the first time on its vif.
    ActivatedFirstOnVif,
    /// Neighbor went Active but other neighbors were already active on the vif.
    Activated,
    /// Neighbor flipped to one-way; our bit must be cleared from the vif map
    /// and all routes re-evaluated for dominance/subordinateness.
    WentOneWay,
    /// Genid changed: reset cascade, but keep the entry and resend full table.
    GenidChanged,
    /// Neighbor aged out entirely; index freed, routes must be walked via
    /// `delete_neighbor_from_routes`.
    Expired,
}

#[derive(Debug, Default)]
pub struct NeighborTable {
    slots: Vec<Option<Slot>>,
    free: Vec<usize>,
}

impl NeighborTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, handle: NeighborHandle) -> Option<&Neighbor> {
        self.slots.get(handle.index).and_then(|s| s.as_ref()).and_then(|s| {
            if s.generation == handle.generation {
                Some(&s.neighbor)
            } else {
                None
            }
        })
    }

    pub fn get_mut(&mut self, handle: NeighborHandle) -> Option<&mut Neighbor> {
        match self.slots.get_mut(handle.index).and_then(|s| s.as_mut()) {
            Some(s) if s.generation == handle.generation => Some(&mut s.neighbor),
            _ => None,
        }
    }

    pub fn find_by_addr(&self, vif: usize, addr: IpAddr) -> Option<NeighborHandle> {
        self.slots.iter().enumerate().find_map(|(index, slot)| {
            slot.as_ref().and_then(|s| {
                if s.neighbor.vif == vif && s.neighbor.addr == addr {
                    Some(NeighborHandle { index, generation: s.generation })
                } else {
                    None
                }
            })
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = (NeighborHandle, &Neighbor)> {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.as_ref().map(|s| (NeighborHandle { index, generation: s.generation }, &s.neighbor))
        })
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (NeighborHandle, &mut Neighbor)> {
        self.slots.iter_mut().enumerate().filter_map(|(index, slot)| {
            slot.as_mut().map(|s| (NeighborHandle { index, generation: s.generation }, &mut s.neighbor))
        })
    }

    /// §4.5 state 1: allocate a new Absent→Waiting/Active neighbor. Returns
    /// `None` if the index pool is exhausted (§5 "Bounded resources").
    pub fn create(
        &mut self,
        addr: IpAddr,
        vif: usize,
        major_version: u8,
        minor_version: u8,
        from_report_only: bool,
    ) -> Option<NeighborHandle> {
        let index = self.free.pop().or_else(|| {
            if self.slots.len() < MAX_NEIGHBORS {
                self.slots.push(None);
                Some(self.slots.len() - 1)
            } else {
                None
            }
        })?;
        let legacy = is_legacy_version(major_version, minor_version);
        // Legacy peers skip the bidirectional-probe handshake and go
        // straight to Active (§4.5 state 1).
        let state = if legacy || from_report_only {
            NeighborState::Active
        } else {
            NeighborState::Waiting
        };
        let generation = self.slots[index].as_ref().map(|s| s.generation + 1).unwrap_or(1);
        let neighbor = Neighbor {
            addr,
            vif,
            major_version,
            minor_version,
            genid: None,
            state,
            flags: NeighborFlags::default(),
            created_at: Instant::now(),
            age_secs: 0,
            generation,
        };
        self.slots[index] = Some(Slot { neighbor, generation });
        Some(NeighborHandle { index, generation })
    }

    /// Free the slot, bumping its generation so stale handles are detected.
    pub fn remove(&mut self, handle: NeighborHandle) -> Option<Neighbor> {
        match self.slots.get_mut(handle.index) {
            Some(slot @ Some(_)) if slot.as_ref().unwrap().generation == handle.generation => {
                let removed = slot.take().unwrap();
                self.free.push(handle.index);
                Some(removed.neighbor)
            }
            _ => None,
        }
    }

    /// Record receipt of a probe listing `lists_us` (whether our local
    /// address appeared in the probe's neighbor list) and `genid`. Returns
    /// the state-machine event the caller must react to, if any.
    pub fn on_probe(
        &mut self,
        handle: NeighborHandle,
        genid: u32,
        lists_us: bool,
    ) -> Option<NeighborEvent> {
        let was_first = {
            let n = self.get_mut(handle)?;
            n.age_secs = 0;
            let genid_changed = n.flags.have_genid && n.genid != Some(genid);
            n.genid = Some(genid);
            n.flags.have_genid = true;
            if genid_changed {
                return Some(NeighborEvent::GenidChanged);
            }
            match n.state {
                NeighborState::Waiting => {
                    if lists_us {
                        n.state = NeighborState::Active;
                        true
                    } else {
                        return None;
                    }
                }
                NeighborState::Active => {
                    if !lists_us {
                        // Caller enforces the 20s grace window using
                        // `created_at`/age bookkeeping before invoking this
                        // with a one-way probe; by the time we're here the
                        // grace period has elapsed.
                        n.state = NeighborState::OneWay;
                        n.flags.one_way = true;
                        return Some(NeighborEvent::WentOneWay);
                    }
                    return None;
                }
                NeighborState::OneWay => {
                    if lists_us {
                        n.state = NeighborState::Active;
                        n.flags.one_way = false;
                        true
                    } else {
                        return None;
                    }
                }
            }
        };
        if was_first {
            let is_first_on_vif = !self
                .iter()
                .any(|(h, n)| h != handle && n.vif == self.get(handle).unwrap().vif && n.state == NeighborState::Active);
            Some(if is_first_on_vif {
                NeighborEvent::ActivatedFirstOnVif
            } else {
                NeighborEvent::Activated
            })
        } else {
            None
        }
    }

    /// §4.5 state 3: within `ONE_WAY_GRACE` seconds of creation, an
    /// address-omitting probe from an Active neighbor is tolerated.
    pub fn within_one_way_grace(&self, handle: NeighborHandle) -> bool {
        self.get(handle)
            .map(|n| n.age_secs < ONE_WAY_GRACE)
            .unwrap_or(false)
    }

    /// Slow-tick aging: advance every neighbor's age and expire those past
    /// their version-dependent expire time. Returns the handles that just
    /// expired so the caller can run `delete_neighbor_from_routes` and clear
    /// vif bitmaps before the slots are actually freed.
    pub fn age(&mut self, elapsed_sec: i64) -> Vec<NeighborHandle> {
        let mut expired = Vec::new();
        for (handle, n) in self.iter_mut() {
            n.age_secs += elapsed_sec;
            if n.age_secs > n.expire_time() {
                expired.push(handle);
            }
        }
        expired
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn addr(o: u8) -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(10, 0, 0, o))
    }

    #[test]
    fn test_modern_peer_starts_waiting_legacy_starts_active() {
        let mut table = NeighborTable::new();
        let modern = table.create(addr(1), 0, 3, 255, false).unwrap();
        assert_eq!(table.get(modern).unwrap().state, NeighborState::Waiting);

        let legacy = table.create(addr(2), 0, 3, 0, false).unwrap();
        assert_eq!(table.get(legacy).unwrap().state, NeighborState::Active);
    }

    #[test]
    fn test_waiting_to_active_requires_our_address_listed() {
        let mut table = NeighborTable::new();
        let h = table.create(addr(1), 0, 3, 255, false).unwrap();
        assert_eq!(table.on_probe(h, 100, false), None);
        assert_eq!(table.get(h).unwrap().state, NeighborState::Waiting);
        let ev = table.on_probe(h, 100, true);
        assert_eq!(ev, Some(NeighborEvent::ActivatedFirstOnVif));
        assert_eq!(table.get(h).unwrap().state, NeighborState::Active);
    }

    #[test]
    fn test_second_neighbor_on_vif_is_not_first() {
        let mut table = NeighborTable::new();
        let h1 = table.create(addr(1), 0, 3, 0, false).unwrap(); // legacy, starts Active
        let h2 = table.create(addr(2), 0, 3, 255, false).unwrap();
        let ev = table.on_probe(h2, 5, true);
        assert_eq!(ev, Some(NeighborEvent::Activated));
        let _ = h1;
    }

    #[test]
    fn test_genid_change_reported_without_state_change() {
        let mut table = NeighborTable::new();
        let h = table.create(addr(1), 0, 3, 0, false).unwrap();
        table.on_probe(h, 100, true);
        let ev = table.on_probe(h, 200, true);
        assert_eq!(ev, Some(NeighborEvent::GenidChanged));
    }

    #[test]
    fn test_one_way_then_recovers() {
        let mut table = NeighborTable::new();
        let h = table.create(addr(1), 0, 3, 0, false).unwrap(); // Active immediately
        table.on_probe(h, 1, true);
        let ev = table.on_probe(h, 1, false);
        assert_eq!(ev, Some(NeighborEvent::WentOneWay));
        assert_eq!(table.get(h).unwrap().state, NeighborState::OneWay);
        let ev2 = table.on_probe(h, 1, true);
        assert_eq!(ev2, Some(NeighborEvent::Activated));
        assert_eq!(table.get(h).unwrap().state, NeighborState::Active);
    }

    #[test]
    fn test_stale_handle_after_remove() {
        let mut table = NeighborTable::new();
        let h = table.create(addr(1), 0, 3, 0, false).unwrap();
        table.remove(h);
        assert!(table.get(h).is_none());
        let h2 = table.create(addr(2), 0, 3, 0, false).unwrap();
        assert_eq!(h2.index, h.index);
        assert_ne!(h2.generation, h.generation);
        assert!(table.get(h).is_none());
    }

    #[test]
    fn test_expire_time_boundary() {
        let mut table = NeighborTable::new();
        let h = table.create(addr(1), 0, 3, 255, false).unwrap();
        table.age(34);
        assert!(table.age(1).is_empty()); // exactly 35s: still alive
        assert!(!table.age(1).is_empty()); // 36s: expired
        let _ = h;
    }

    #[test]
    fn test_pool_exhaustion() {
        let mut table = NeighborTable::new();
        for i in 0..MAX_NEIGHBORS {
            assert!(table.create(addr((i % 250) as u8), 0, 3, 0, false).is_some());
        }
        assert!(table.create(addr(1), 1, 3, 0, false).is_none());
    }
}
