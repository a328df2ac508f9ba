//! Virtual interfaces ("vifs"), §3. The interface table is a fixed-capacity
//! ordered sequence; each vif owns its neighbor list and local-group list
//! (owned lists live in [`crate::neighbor::NeighborTable`] and
//! [`crate::igmp`] respectively, back-referenced by vif index, matching the
//! ownership summary in §3).

use std::net::{IpAddr, Ipv4Addr};
use std::time::Instant;

use ipnetwork::Ipv4Network;

use crate::bitset::NeighborBitset;
use crate::config::VifConfig;
use crate::igmp::IgmpMode;

/// Hard cap on installed vifs (§5 "Bounded resources": "typically 32").
pub const MAX_VIFS: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VifKind {
    Subnet { network: Ipv4Network },
    Tunnel { remote_addr: IpAddr },
}

/// The mutable flag set of §3. Kept as individual bools (mirroring the
/// teacher's `PeerConfig`-style flat boolean fields) rather than a bitflags
/// crate, since each flag has distinct semantics rather than forming a
/// single wire bitmask.
#[derive(Debug, Clone, Copy, Default)]
pub struct VifFlags {
    pub disabled: bool,
    pub down: bool,
    pub querier: bool,
    pub one_way_peering: bool,
    pub leaf: bool,
    pub igmp_v1_mode: bool,
    pub igmp_v2_mode: bool,
    pub retransmit_prunes: bool,
    pub passive: bool,
    pub allow_non_pruners: bool,
    pub no_flood: bool,
    pub no_transit: bool,
    pub force_leaf: bool,
}

/// The currently-elected querier on a subnet vif (§4.4).
#[derive(Debug, Clone)]
pub enum Querier {
    /// We are the querier.
    Us,
    /// Another router is; `since` drives the other-querier-present aging.
    Other { addr: IpAddr, since: Instant },
}

#[derive(Debug, Clone)]
pub struct Vif {
    pub index: usize,
    pub kind: VifKind,
    pub local_addr: IpAddr,
    pub metric: u8,
    pub threshold: u8,
    pub advertised_cost_adjustment: i8,
    pub prune_lifetime: u32,
    pub igmp_mode: IgmpMode,
    pub flags: VifFlags,
    /// Bitmap of neighbor indices (into [`crate::neighbor::NeighborTable`])
    /// currently peered on this vif.
    pub neighbor_bitmap: NeighborBitset,
    pub querier: Querier,
    pub scope: Vec<Ipv4Network>,
    pub accept_filters: Vec<crate::config::RouteFilter>,
    /// Number of Active neighbors currently on this vif; reaching 1 clears
    /// leaf status (§4.5 "Activation side-effects").
    pub active_neighbor_count: u32,
}

impl Vif {
    fn new(index: usize, cfg: &VifConfig) -> Self {
        let kind = match cfg.remote_addr {
            Some(remote_addr) => VifKind::Tunnel { remote_addr },
            None => VifKind::Subnet {
                network: Ipv4Network::new(
                    match cfg.local_addr {
                        IpAddr::V4(v4) => v4,
                        IpAddr::V6(_) => Ipv4Addr::UNSPECIFIED,
                    },
                    32,
                )
                .expect("host /32 is always a valid network"),
            },
        };
        let flags = VifFlags {
            disabled: !cfg.enabled,
            down: false,
            querier: true, // §4.4: "on startup each vif assumes querier"
            one_way_peering: false,
            leaf: true, // cleared once the first neighbor goes Active
            igmp_v1_mode: matches!(cfg.igmp_mode, IgmpMode::V1),
            igmp_v2_mode: matches!(cfg.igmp_mode, IgmpMode::V2),
            retransmit_prunes: cfg.retransmit_prunes,
            passive: cfg.passive,
            allow_non_pruners: cfg.allow_non_pruners,
            no_flood: cfg.no_flood,
            no_transit: cfg.no_transit,
            force_leaf: cfg.leaf,
        };
        Self {
            index,
            kind,
            local_addr: cfg.local_addr,
            metric: cfg.metric,
            threshold: cfg.threshold,
            advertised_cost_adjustment: cfg.advertised_cost_adjustment,
            prune_lifetime: cfg.prune_lifetime,
            igmp_mode: cfg.igmp_mode,
            flags,
            neighbor_bitmap: NeighborBitset::new(),
            querier: Querier::Us,
            scope: cfg.scope.clone(),
            accept_filters: cfg.accept_filters.clone(),
            active_neighbor_count: 0,
        }
    }

    pub fn is_tunnel(&self) -> bool {
        matches!(self.kind, VifKind::Tunnel { .. })
    }

    pub fn is_up(&self) -> bool {
        !self.flags.disabled && !self.flags.down
    }

    pub fn is_leaf(&self) -> bool {
        self.flags.force_leaf || self.active_neighbor_count == 0
    }

    pub fn is_querier(&self) -> bool {
        matches!(self.querier, Querier::Us)
    }

    pub fn remote_addr(&self) -> Option<IpAddr> {
        match self.kind {
            VifKind::Tunnel { remote_addr } => Some(remote_addr),
            VifKind::Subnet { .. } => None,
        }
    }
}

/// Fixed-capacity ordered sequence of vifs (§2 "interface table").
#[derive(Debug, Default)]
pub struct InterfaceTable {
    vifs: Vec<Vif>,
}

impl InterfaceTable {
    pub fn new() -> Self {
        Self { vifs: Vec::new() }
    }

    /// Install candidate vifs from the resolved configuration (§6.3):
    /// "the core installs only those candidates whose subnets are disjoint
    /// from already-installed vifs' subnets; duplicates are skipped with a
    /// warning." Local-address collisions are already rejected one layer up
    /// in [`crate::config::Config::from_spec`]; here we additionally bound
    /// by [`MAX_VIFS`].
    pub fn install(&mut self, configs: &[VifConfig]) {
        for cfg in configs {
            if self.vifs.len() >= MAX_VIFS {
                log::warn!("vif table full ({} entries), skipping {}", MAX_VIFS, cfg.local_addr);
                continue;
            }
            let index = self.vifs.len();
            self.vifs.push(Vif::new(index, cfg));
        }
    }

    pub fn get(&self, index: usize) -> Option<&Vif> {
        self.vifs.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut Vif> {
        self.vifs.get_mut(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Vif> {
        self.vifs.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Vif> {
        self.vifs.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.vifs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vifs.is_empty()
    }

    pub fn find_by_addr(&self, addr: IpAddr) -> Option<usize> {
        self.vifs.iter().find(|v| v.local_addr == addr).map(|v| v.index)
    }

    /// Bitmap of all up, non-disabled vif indices except `except`, used to
    /// seed a new route's children set (§4.2 "Initialize children=all
    /// up-vifs-except-V").
    pub fn all_up_except(&self, except: usize) -> NeighborBitset {
        self.vifs
            .iter()
            .filter(|v| v.index != except && v.is_up() && !v.flags.no_flood && !v.flags.no_transit)
            .map(|v| v.index)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn cfg(addr: &str) -> VifConfig {
        VifConfig {
            local_addr: addr.parse().unwrap(),
            remote_addr: None,
            metric: 1,
            threshold: 1,
            advertised_cost_adjustment: 0,
            prune_lifetime: 7200,
            igmp_mode: IgmpMode::V3,
            enabled: true,
            passive: false,
            leaf: false,
            no_flood: false,
            no_transit: false,
            allow_non_pruners: false,
            retransmit_prunes: false,
            accept_filters: Vec::new(),
            scope: Vec::new(),
        }
    }

    #[test]
    fn test_install_respects_max_vifs() {
        let mut table = InterfaceTable::new();
        let configs: Vec<VifConfig> = (0..40)
            .map(|i| cfg(&Ipv4Addr::new(10, 0, 0, i as u8).to_string()))
            .collect();
        table.install(&configs);
        assert_eq!(table.len(), MAX_VIFS);
    }

    #[test]
    fn test_new_vif_starts_as_querier_and_leaf() {
        let mut table = InterfaceTable::new();
        table.install(&[cfg("10.0.0.1")]);
        let vif = table.get(0).unwrap();
        assert!(vif.is_querier());
        assert!(vif.is_leaf());
    }

    #[test]
    fn test_all_up_except_excludes_no_flood() {
        let mut table = InterfaceTable::new();
        let c0 = cfg("10.0.0.1");
        let c1 = cfg("10.0.0.2");
        let mut c2 = cfg("10.0.0.3");
        c2.no_flood = true;
        table.install(&[c0, c1, c2]);
        let bitmap = table.all_up_except(0);
        assert!(!bitmap.test(0));
        assert!(bitmap.test(1));
        assert!(!bitmap.test(2));
    }
}
