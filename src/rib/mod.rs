//! The DVMRP routing table & distance vector, §4.2 — subsystem 1 of THE CORE.

pub mod report;
pub mod route;

use std::net::Ipv4Addr;

use crate::bitset::NeighborBitset;
use crate::neighbor::NeighborHandle;
use crate::utils::ipv4_to_u32;
use crate::vif::InterfaceTable;
use route::{Origin, RouteEntry, DISCARD_TIME, EXPIRE_TIME, ROUTE_SWITCH_TIME, UNREACHABLE};

/// Outcome of processing one (origin, mask, raw-metric) tuple from a report,
/// for the caller (packet dispatcher / forwarding cache) to react to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// No actionable change (e.g. a report with a worse metric than our
    /// existing route from a different neighbor).
    Unchanged,
    /// New route created.
    Created,
    /// Existing route's metric changed under its existing gateway.
    Refreshed,
    /// Parent/gateway changed ("steals" all source entries under the old
    /// route, per §4.3 "Source stealing").
    ParentChanged { old_parent: Option<usize> },
    /// This vif became dominant for the route (we are no longer child here).
    DominantOnVif { vif: usize },
    /// The neighbor reporting on a non-parent vif is now subordinate to us.
    SubordinateOnVif { vif: usize },
    /// Report carried an invalid (origin, mask) pair.
    Rejected,
}

#[derive(Debug, Default)]
pub struct RoutingTable {
    routes: Vec<RouteEntry>,
}

impl RoutingTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RouteEntry> {
        self.routes.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut RouteEntry> {
        self.routes.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    pub fn find(&self, origin: &Origin) -> Option<usize> {
        self.routes.iter().position(|r| &r.origin == origin)
    }

    /// Find the longest-match route covering `addr`, used for kernel-upcall
    /// source lookups (§4.3 step 2).
    pub fn find_covering(&self, addr: Ipv4Addr) -> Option<usize> {
        let target = ipv4_to_u32(addr);
        self.routes.iter().position(|r| {
            let mask = if r.origin.prefix_len == 0 {
                0
            } else {
                u32::MAX << (32 - r.origin.prefix_len as u32)
            };
            (target & mask) == (ipv4_to_u32(r.origin.network) & mask)
        })
    }

    pub fn get(&self, index: usize) -> Option<&RouteEntry> {
        self.routes.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut RouteEntry> {
        self.routes.get_mut(index)
    }

    /// Insert while preserving the (decreasing mask, decreasing origin)
    /// ordering invariant (§3). Returns the insertion index.
    fn insert_sorted(&mut self, route: RouteEntry) -> usize {
        let key = route.sort_key();
        let pos = self.routes.partition_point(|r| r.sort_key() < key);
        self.routes.insert(pos, route);
        pos
    }

    pub fn remove(&mut self, index: usize) -> RouteEntry {
        self.routes.remove(index)
    }

    /// §4.2 update rule: process one (origin, mask, raw-metric) tuple heard
    /// from neighbor `gateway` on vif `vif` whose link cost is `link_cost`.
    #[allow(clippy::too_many_arguments)]
    pub fn update(
        &mut self,
        origin: Origin,
        raw_metric: u8,
        gateway: Ipv4Addr,
        vif: usize,
        neighbor_index: usize,
        link_cost: u8,
        ifaces: &InterfaceTable,
    ) -> UpdateOutcome {
        if origin.prefix_len > 32 {
            return UpdateOutcome::Rejected;
        }

        // Metrics 33..63 are poison-reverse indications; decode to
        // UNREACHABLE after recording subordinateness below.
        let is_poisoned = raw_metric > UNREACHABLE;
        let adjusted = if is_poisoned {
            UNREACHABLE
        } else {
            raw_metric.saturating_add(link_cost).min(UNREACHABLE)
        };

        let existing = self.find(&origin);
        let num_vifs = ifaces.len();

        let Some(idx) = existing else {
            if adjusted >= UNREACHABLE {
                return UpdateOutcome::Unchanged;
            }
            let children = ifaces.all_up_except(vif);
            let mut subordinates = NeighborBitset::new();
            for v in ifaces.iter() {
                if v.index != vif && !v.flags.no_flood && !v.flags.no_transit {
                    subordinates.union_with(&v.neighbor_bitmap);
                }
            }
            let route = RouteEntry::new_learned(origin, vif, gateway, adjusted, children, subordinates, num_vifs);
            self.insert_sorted(route);
            return UpdateOutcome::Created;
        };

        let is_current_gateway = self.routes[idx].gateway == Some(gateway);

        if is_current_gateway {
            self.routes[idx].age_secs = 0;
            if self.routes[idx].metric != adjusted {
                self.routes[idx].metric = adjusted;
                self.routes[idx].changed = true;
                return UpdateOutcome::Refreshed;
            }
            return UpdateOutcome::Unchanged;
        }

        let route_vif = self.routes[idx].parent;

        if Some(vif) != route_vif {
            // §4.2 "If V != parent": per-vif designation adjustment.
            let current_metric = self.routes[idx].metric;
            let better = adjusted < current_metric
                || (adjusted == current_metric && ipv4_to_u32(gateway) < self.routes[idx].gateway.map(ipv4_to_u32).unwrap_or(u32::MAX));
            if better && !is_poisoned {
                self.routes[idx].dominants[vif] = Some(gateway);
                self.routes[idx].children.clear(vif);
                return UpdateOutcome::DominantOnVif { vif };
            }
            if is_poisoned {
                self.routes[idx].subordinate_advertised.set(neighbor_index);
                self.routes[idx].subordinates.set(neighbor_index);
                return UpdateOutcome::SubordinateOnVif { vif };
            }
            // No longer poisoned: clear this neighbor's subordinate bit.
            if self.routes[idx].subordinates.test(neighbor_index) {
                self.routes[idx].subordinates.clear(neighbor_index);
            }
            return UpdateOutcome::Unchanged;
        }

        // V == parent but gateway differs: evaluate adoption.
        let current_metric = self.routes[idx].metric;
        let current_gw = self.routes[idx].gateway;
        let stale_enough = self.routes[idx].age_secs >= ROUTE_SWITCH_TIME;
        let strictly_better = adjusted < current_metric;
        let tie_lower_addr = adjusted == current_metric
            && current_gw.map(|gw| ipv4_to_u32(gateway) < ipv4_to_u32(gw)).unwrap_or(true);
        if adjusted < UNREACHABLE && (strictly_better || tie_lower_addr || stale_enough) {
            let old_parent = self.routes[idx].parent;
            self.routes[idx].parent = Some(vif);
            self.routes[idx].gateway = Some(gateway);
            self.routes[idx].metric = adjusted;
            self.routes[idx].changed = true;
            self.routes[idx].age_secs = 0;
            return UpdateOutcome::ParentChanged { old_parent };
        }

        UpdateOutcome::Unchanged
    }

    /// Slow-tick aging (§4.2): advance age, expire at `EXPIRE_TIME`, discard
    /// at `DISCARD_TIME`. Directly-connected routes never expire. Returns
    /// indices discarded this tick, in descending order so callers can
    /// remove them without invalidating earlier indices.
    pub fn age(&mut self, elapsed_sec: i64) -> Vec<usize> {
        let mut discarded = Vec::new();
        for (i, route) in self.routes.iter_mut().enumerate() {
            if route.is_directly_connected() {
                route.age_secs = 0;
                continue;
            }
            route.age_secs += elapsed_sec;
            if route.age_secs >= EXPIRE_TIME && route.metric < UNREACHABLE {
                route.metric = UNREACHABLE;
                route.changed = true;
            }
            if route.age_secs >= DISCARD_TIME {
                discarded.push(i);
            }
        }
        discarded
    }

    /// Time out subordinateness not reaffirmed within two report intervals
    /// (§4.2 `subordadv` shadow bitmap), called once every two slow ticks
    /// by the caller's own scheduling.
    pub fn timeout_stale_subordinates(&mut self) {
        for route in self.routes.iter_mut() {
            let stale = route.subordinates.difference(&route.subordinate_advertised);
            route.subordinates = route.subordinates.difference(&stale);
            route.subordinate_advertised.clear_all();
        }
    }

    /// All routes whose `changed` flag is set, for the next outgoing chunk;
    /// clears the flags as a side effect (§4.2 "delay_change_reports").
    pub fn take_changed(&mut self) -> Vec<usize> {
        let mut changed = Vec::new();
        for (i, route) in self.routes.iter_mut().enumerate() {
            if route.changed {
                changed.push(i);
                route.changed = false;
            }
        }
        changed
    }
}

/// Remove every reference to `handle`'s vif-local neighbor from the routing
/// table on neighbor expiry or one-way detection (§4.5 state 5): routes
/// whose gateway was this neighbor are marked unreachable, and vifs on
/// which it was dominant restore us as child.
pub fn delete_neighbor_from_routes(
    table: &mut RoutingTable,
    neighbor_addr: std::net::IpAddr,
    vif: usize,
    neighbor_index: usize,
    _handle: NeighborHandle,
) {
    for route in table.routes.iter_mut() {
        if route.gateway.map(|g| std::net::IpAddr::V4(g)) == Some(neighbor_addr) && route.parent == Some(vif) {
            route.metric = UNREACHABLE;
            route.changed = true;
        }
        if let Some(dominant) = route.dominants.get(vif).copied().flatten() {
            if std::net::IpAddr::V4(dominant) == neighbor_addr {
                route.dominants[vif] = None;
                route.children.set(vif);
            }
        }
        route.subordinates.clear(neighbor_index);
        route.subordinate_advertised.clear(neighbor_index);
    }
}
