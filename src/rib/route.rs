//! Route entry (§3 "Route entry") and the ordering invariant the routing
//! table is built around: decreasing mask, then decreasing origin.

use std::net::Ipv4Addr;

use crate::bitset::NeighborBitset;
use crate::forwarding::CacheEntry;
use crate::utils::ipv4_to_u32;

pub const UNREACHABLE: u8 = 32;
pub const EXPIRE_TIME: i64 = 200;
pub const DISCARD_TIME: i64 = 280;
/// §4.2 "adopt N's route iff ... current-gateway has not been heard from in
/// ROUTE_SWITCH_TIME".
pub const ROUTE_SWITCH_TIME: i64 = 140;

/// (origin, mask) expressed as a prefix, matching the wire's 3-mask-byte +
/// variable-length-origin encoding (§6.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Origin {
    pub network: Ipv4Addr,
    pub prefix_len: u8,
}

impl Origin {
    pub fn new(network: Ipv4Addr, prefix_len: u8) -> Self {
        let masked = u32::from(network) & mask_for(prefix_len);
        Self { network: Ipv4Addr::from(masked), prefix_len }
    }

    /// Ordering key: decreasing mask (more specific first), then decreasing
    /// origin address, matching §3's route-table ordering invariant.
    fn sort_key(&self) -> (std::cmp::Reverse<u8>, std::cmp::Reverse<u32>) {
        (std::cmp::Reverse(self.prefix_len), std::cmp::Reverse(ipv4_to_u32(self.network)))
    }
}

fn mask_for(prefix_len: u8) -> u32 {
    if prefix_len == 0 {
        0
    } else {
        u32::MAX << (32 - prefix_len as u32)
    }
}

#[derive(Debug, Clone)]
pub struct RouteEntry {
    pub origin: Origin,
    pub metric: u8,
    /// `None` for directly-connected routes (§3: "gateway=0").
    pub parent: Option<usize>,
    pub gateway: Option<Ipv4Addr>,
    /// Vifs on which we are the designated forwarder for this origin.
    pub children: NeighborBitset,
    /// Per-vif address of a router that beats us on that (non-parent) vif.
    pub dominants: Vec<Option<Ipv4Addr>>,
    /// Downstream neighbor indices that depend on us for this origin.
    pub subordinates: NeighborBitset,
    /// Reaffirmed-this-cycle shadow of `subordinates`, used to time out
    /// subordinateness not reaffirmed within two report intervals (§4.2).
    pub subordinate_advertised: NeighborBitset,
    pub age_secs: i64,
    pub changed: bool,
    pub groups: Vec<CacheEntry>,
}

impl RouteEntry {
    pub fn new_directly_connected(origin: Origin, num_vifs: usize) -> Self {
        Self {
            origin,
            metric: 1,
            parent: None,
            gateway: None,
            children: NeighborBitset::new(),
            dominants: vec![None; num_vifs],
            subordinates: NeighborBitset::new(),
            subordinate_advertised: NeighborBitset::new(),
            age_secs: 0,
            changed: true,
            groups: Vec::new(),
        }
    }

    pub fn new_learned(
        origin: Origin,
        parent: usize,
        gateway: Ipv4Addr,
        metric: u8,
        children: NeighborBitset,
        subordinates: NeighborBitset,
        num_vifs: usize,
    ) -> Self {
        Self {
            origin,
            metric,
            parent: Some(parent),
            gateway: Some(gateway),
            children,
            dominants: vec![None; num_vifs],
            subordinates,
            subordinate_advertised: NeighborBitset::new(),
            age_secs: 0,
            changed: true,
            groups: Vec::new(),
        }
    }

    pub fn is_reachable(&self) -> bool {
        self.metric < UNREACHABLE
    }

    pub fn is_directly_connected(&self) -> bool {
        self.parent.is_none()
    }

    pub fn sort_key(&self) -> (std::cmp::Reverse<u8>, std::cmp::Reverse<u32>) {
        self.origin.sort_key()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_origin_masks_on_construction() {
        let o = Origin::new(Ipv4Addr::new(192, 168, 1, 37), 24);
        assert_eq!(o.network, Ipv4Addr::new(192, 168, 1, 0));
    }

    #[test]
    fn test_ordering_decreasing_mask_then_origin() {
        let mut origins = vec![
            Origin::new(Ipv4Addr::new(10, 0, 0, 0), 8),
            Origin::new(Ipv4Addr::new(192, 168, 1, 0), 24),
            Origin::new(Ipv4Addr::new(192, 168, 0, 0), 24),
        ];
        origins.sort_by_key(|o| o.sort_key());
        assert_eq!(origins[0].prefix_len, 24);
        assert_eq!(origins[0].network, Ipv4Addr::new(192, 168, 1, 0));
        assert_eq!(origins[1].network, Ipv4Addr::new(192, 168, 0, 0));
        assert_eq!(origins[2].prefix_len, 8);
    }
}
