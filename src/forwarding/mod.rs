//! Prune/graft state machine & forwarding cache ("group table"), §4.3 —
//! subsystem 2 of THE CORE.

use std::net::Ipv4Addr;

use crate::bitset::NeighborBitset;
use crate::vif::InterfaceTable;

/// §4.3 "skip generation if <= MIN_PRUNE_LIFE".
pub const MIN_PRUNE_LIFE: u32 = 60;
pub const DEFAULT_PRUNE_LIFETIME: u32 = 7200;
pub const CACHE_LIFETIME: i64 = 300;
/// §4.3 "an exponentially-backing-off timer (initial PRUNE_REXMIT_VAL)".
pub const PRUNE_REXMIT_VAL: i64 = 60;

/// A source actually seen sending traffic for a group-table entry (§3
/// "Source entry").
#[derive(Debug, Clone)]
pub struct SourceEntry {
    pub origin: Ipv4Addr,
    /// Sticky packet count, retained across kernel-entry deletions for
    /// traceroute accuracy.
    pub packet_count: u64,
    /// Zero means "not currently installed in the kernel".
    pub installed: bool,
}

impl SourceEntry {
    pub fn new(origin: Ipv4Addr) -> Self {
        Self { origin, packet_count: 0, installed: true }
    }
}

/// Downstream prune record (§3 "Prune record").
#[derive(Debug, Clone)]
pub struct PruneRecord {
    pub neighbor_index: usize,
    pub vif: usize,
    pub lifetime_remaining: i64,
}

/// Result of a prune-receipt or aging step that the caller (the routing
/// table / packet dispatcher) must act on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ForwardingEvent {
    SendUpstreamPrune { lifetime: u32 },
    SendGraft,
    SendGraftAck,
    KernelInstall,
    KernelClear,
}

/// A (source-host, multicast-group) forwarding-cache row (§3 "Group-table
/// (forwarding cache) entry").
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub group: Ipv4Addr,
    pub outgoing_vifs: NeighborBitset,
    pub scope: NeighborBitset,
    /// Remaining seconds until our upstream prune expires; 0 = none sent;
    /// -1 = just expired (about to clear kernel state).
    pub upstream_prune_timer: i64,
    /// Exponential-backoff counter for graft retransmission; `None` when no
    /// graft is in flight.
    pub graft_sent_counter: Option<u32>,
    pub downstream_prunes: NeighborBitset,
    pub prune_records: Vec<PruneRecord>,
    pub sources: Vec<SourceEntry>,
    pub cache_refresh_timer: i64,
    pub prune_retransmit_timer: i64,
    pub prune_retransmit_interval: i64,
}

impl CacheEntry {
    pub fn new(group: Ipv4Addr) -> Self {
        Self {
            group,
            outgoing_vifs: NeighborBitset::new(),
            scope: NeighborBitset::new(),
            upstream_prune_timer: 0,
            graft_sent_counter: None,
            downstream_prunes: NeighborBitset::new(),
            prune_records: Vec::new(),
            sources: Vec::new(),
            cache_refresh_timer: CACHE_LIFETIME,
            prune_retransmit_timer: 0,
            prune_retransmit_interval: PRUNE_REXMIT_VAL,
        }
    }

    /// §4.3 outgoing-vif recomputation: a vif is an output iff it is a child
    /// of the route AND (has a subordinate not yet pruned OR has a local
    /// group member), minus anything in scope.
    pub fn recompute_outgoing_vifs(
        &mut self,
        route_children: &NeighborBitset,
        route_subordinates: &NeighborBitset,
        local_members: &NeighborBitset,
    ) {
        let has_unpruned_subordinate = route_subordinates.difference(&self.downstream_prunes);
        let wants_traffic = has_unpruned_subordinate.union(local_members);
        let outgoing = route_children.intersection(&wants_traffic);
        self.outgoing_vifs = outgoing.difference(&self.scope);
    }

    pub fn is_empty_outgoing(&self) -> bool {
        self.outgoing_vifs.is_empty()
    }

    /// §4.3 prune generation. `directly_connected` and `parent_too_old`
    /// suppress generation entirely.
    pub fn maybe_generate_prune(
        &mut self,
        configured_lifetime: u32,
        directly_connected: bool,
        parent_too_old: bool,
    ) -> Option<ForwardingEvent> {
        if !self.is_empty_outgoing() || directly_connected || parent_too_old {
            return None;
        }
        let held_downstream_min = self.prune_records.iter().map(|p| p.lifetime_remaining).min();
        let mut lifetime = configured_lifetime as i64;
        if let Some(held) = held_downstream_min {
            lifetime = lifetime.min(held);
        }
        if lifetime <= MIN_PRUNE_LIFE as i64 {
            return None;
        }
        self.upstream_prune_timer = lifetime;
        self.graft_sent_counter = None;
        Some(ForwardingEvent::SendUpstreamPrune { lifetime: lifetime as u32 })
    }

    /// §4.3 prune receipt. Caller has already validated `lifetime >
    /// MIN_PRUNE_LIFE`, that `vif` is not scoped, and that `neighbor_index`
    /// is a child on the owning route.
    pub fn receive_prune(&mut self, neighbor_index: usize, vif: usize, lifetime: i64) {
        if let Some(existing) = self.prune_records.iter_mut().find(|p| p.neighbor_index == neighbor_index) {
            existing.lifetime_remaining = lifetime;
            return;
        }
        self.prune_records.push(PruneRecord { neighbor_index, vif, lifetime_remaining: lifetime });
        self.downstream_prunes.set(neighbor_index);
    }

    /// §4.3 graft receipt: restore state for `neighbor_index` on `vif` if a
    /// prune record is held. Returns true if one was removed (and so the
    /// caller must reinstall the kernel entry).
    pub fn receive_graft(&mut self, neighbor_index: usize) -> bool {
        let before = self.prune_records.len();
        self.prune_records.retain(|p| p.neighbor_index != neighbor_index);
        self.downstream_prunes.clear(neighbor_index);
        self.prune_records.len() != before
    }

    pub fn receive_graft_ack(&mut self) {
        self.graft_sent_counter = None;
    }

    /// Per-slow-tick aging. `configured_lifetime` re-arms the cache-refresh
    /// window; `has_downstream_state` covers "downstream prunes, flowing
    /// sources, or in-flight prune/graft".
    pub fn age(&mut self, elapsed_sec: i64) -> Vec<ForwardingEvent> {
        let mut events = Vec::new();

        if self.upstream_prune_timer > 0 {
            self.upstream_prune_timer -= elapsed_sec;
            if self.upstream_prune_timer <= 0 {
                self.upstream_prune_timer = -1;
                events.push(ForwardingEvent::KernelClear);
            }
        }

        let mut expired_indices = Vec::new();
        for (i, record) in self.prune_records.iter_mut().enumerate() {
            record.lifetime_remaining -= elapsed_sec;
            if record.lifetime_remaining <= 0 {
                expired_indices.push(i);
            }
        }
        for i in expired_indices.into_iter().rev() {
            let record = self.prune_records.remove(i);
            self.downstream_prunes.clear(record.neighbor_index);
        }

        if let Some(counter) = self.graft_sent_counter.as_mut() {
            *counter += 1;
            if counter.is_power_of_two() {
                events.push(ForwardingEvent::SendGraft);
            }
        }

        self.cache_refresh_timer -= elapsed_sec;
        if self.cache_refresh_timer <= 0 {
            let has_state = !self.downstream_prunes.is_empty()
                || self.sources.iter().any(|s| s.installed)
                || self.upstream_prune_timer != 0
                || self.graft_sent_counter.is_some();
            if has_state {
                self.cache_refresh_timer = CACHE_LIFETIME;
                if self.upstream_prune_timer == -1 {
                    for s in self.sources.iter_mut() {
                        s.installed = false;
                    }
                    events.push(ForwardingEvent::KernelClear);
                }
            } else {
                events.push(ForwardingEvent::KernelClear);
            }
        }

        events
    }

    pub fn should_delete(&self) -> bool {
        self.sources.iter().all(|s| !s.installed)
            && self.downstream_prunes.is_empty()
            && self.upstream_prune_timer <= 0
            && self.graft_sent_counter.is_none()
    }
}

/// §4.3 kernel-upcall handling. Returns the cache entry to install/refresh
/// along with the events the caller must act on, given the owning route's
/// current `children`/`subordinates` bitmaps and per-vif local members.
pub fn handle_upcall(
    entry: &mut CacheEntry,
    source: Ipv4Addr,
    route_children: &NeighborBitset,
    route_subordinates: &NeighborBitset,
    local_members: &NeighborBitset,
    directly_connected: bool,
    configured_prune_lifetime: u32,
) -> Vec<ForwardingEvent> {
    let mut events = Vec::new();
    if let Some(existing) = entry.sources.iter_mut().find(|s| s.origin == source) {
        existing.installed = true;
        events.push(ForwardingEvent::KernelInstall);
        return events;
    }
    entry.sources.push(SourceEntry::new(source));
    entry.recompute_outgoing_vifs(route_children, route_subordinates, local_members);
    events.push(ForwardingEvent::KernelInstall);
    if entry.is_empty_outgoing() {
        if let Some(ev) = entry.maybe_generate_prune(configured_prune_lifetime, directly_connected, false) {
            events.push(ev);
        }
    }
    events
}

pub fn validate_vif_exists(ifaces: &InterfaceTable, vif: usize) -> bool {
    ifaces.get(vif).is_some()
}
