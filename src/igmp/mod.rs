//! IGMP querier & group-membership state machine, §4.4 — subsystem 3 of
//! THE CORE.

pub mod query;

use std::net::IpAddr;

pub use query::{decode_floating, encode_floating, Query, QueryV3Fields};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgmpMode {
    V1,
    V2,
    V3,
}

/// §4.4: "robustness·query_interval + response_interval/2".
pub const ROBUSTNESS: i64 = 2;
pub const QUERY_INTERVAL: i64 = 125;
pub const QUERY_RESPONSE_INTERVAL: i64 = 10;
pub const OTHER_QUERIER_PRESENT_INTERVAL: i64 = ROBUSTNESS * QUERY_INTERVAL + QUERY_RESPONSE_INTERVAL / 2;
/// §3 "Local group record": "expiry timer (130 s default)".
pub const GROUP_TIMEOUT: i64 = 130;
/// §4.4: "robustness·query_interval + response_interval, ≈260 s".
pub const GROUP_MEMBERSHIP_INTERVAL: i64 = ROBUSTNESS * QUERY_INTERVAL + QUERY_RESPONSE_INTERVAL;
pub const LAST_MEMBER_QUERY_INTERVAL: i64 = 1;
pub const LAST_MEMBER_QUERY_COUNT: i64 = 2;
/// How many query intervals IGMPv1-compatibility is held after the last v1
/// report for a group (§3 "old-host-present").
pub const OLD_HOST_PRESENT_INTERVALS: i64 = ROBUSTNESS;

#[derive(Debug, Clone)]
pub enum QuerierState {
    Us,
    Other { addr: IpAddr, age_secs: i64 },
}

/// §3 "Local group record" (per vif).
#[derive(Debug, Clone)]
pub struct LocalGroupRecord {
    pub group: std::net::Ipv4Addr,
    pub last_reporter: IpAddr,
    pub expiry_secs: i64,
    pub old_host_present_secs: i64,
    pub query_in_flight: bool,
    pub query_response_secs: i64,
}

impl LocalGroupRecord {
    fn new(group: std::net::Ipv4Addr, reporter: IpAddr) -> Self {
        Self {
            group,
            last_reporter: reporter,
            expiry_secs: GROUP_TIMEOUT,
            old_host_present_secs: 0,
            query_in_flight: false,
            query_response_secs: 0,
        }
    }

    pub fn is_old_host_present(&self) -> bool {
        self.old_host_present_secs > 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MembershipEvent {
    Joined(std::net::Ipv4Addr),
    Left(std::net::Ipv4Addr),
}

/// Per-vif membership table plus querier bookkeeping.
#[derive(Debug, Clone, Default)]
pub struct VifMembership {
    pub records: Vec<LocalGroupRecord>,
}

impl VifMembership {
    pub fn new() -> Self {
        Self::default()
    }

    fn find_mut(&mut self, group: std::net::Ipv4Addr) -> Option<&mut LocalGroupRecord> {
        self.records.iter_mut().find(|r| r.group == group)
    }

    /// §4.4 "Report handling" for v1/v2 reports.
    pub fn handle_v1_v2_report(&mut self, group: std::net::Ipv4Addr, reporter: IpAddr, is_v1: bool) -> MembershipEvent {
        let record = if let Some(r) = self.find_mut(group) {
            r
        } else {
            self.records.push(LocalGroupRecord::new(group, reporter));
            self.records.last_mut().unwrap()
        };
        record.last_reporter = reporter;
        record.expiry_secs = GROUP_MEMBERSHIP_INTERVAL;
        record.query_in_flight = false;
        if is_v1 {
            record.old_host_present_secs = OLD_HOST_PRESENT_INTERVALS * QUERY_INTERVAL;
        }
        MembershipEvent::Joined(group)
    }

    /// §4.4 v2-leave handling. Returns `Some(Query)` when a group-specific
    /// query must be sent, or `None` when the leave is ignored per the
    /// listed suppression conditions.
    pub fn handle_v2_leave(
        &mut self,
        group: std::net::Ipv4Addr,
        is_querier: bool,
        vif_is_v1_mode: bool,
    ) -> Option<Query> {
        if !is_querier || vif_is_v1_mode {
            return None;
        }
        let record = self.find_mut(group)?;
        if record.is_old_host_present() || record.query_in_flight {
            return None;
        }
        record.query_in_flight = true;
        record.query_response_secs = LAST_MEMBER_QUERY_COUNT * LAST_MEMBER_QUERY_INTERVAL + 1;
        Some(Query {
            max_resp_code: encode_floating((LAST_MEMBER_QUERY_INTERVAL * 10) as u32),
            group,
            v3: None,
        })
    }

    /// §4.4 v3 `grec` handling. MODE_IS_EXCLUDE/CHANGE_TO_EXCLUDE are always
    /// joins (DVMRP is ASM, so source-list semantics are ignored);
    /// MODE_IS_INCLUDE/CHANGE_TO_INCLUDE with an empty source list are
    /// leaves. ALLOW/BLOCK are silently ignored.
    pub fn handle_v3_grec(&mut self, record_type: u8, group: std::net::Ipv4Addr, source_count: u16, reporter: IpAddr) -> Option<MembershipEvent> {
        const MODE_IS_INCLUDE: u8 = 1;
        const MODE_IS_EXCLUDE: u8 = 2;
        const CHANGE_TO_INCLUDE: u8 = 3;
        const CHANGE_TO_EXCLUDE: u8 = 4;
        match record_type {
            MODE_IS_EXCLUDE | CHANGE_TO_EXCLUDE => {
                Some(self.handle_v1_v2_report(group, reporter, false))
            }
            MODE_IS_INCLUDE | CHANGE_TO_INCLUDE if source_count == 0 => {
                self.records.retain(|r| r.group != group);
                Some(MembershipEvent::Left(group))
            }
            _ => None,
        }
    }

    /// Slow-tick aging (§3, §4.4). Returns groups that expired this tick.
    pub fn age(&mut self, elapsed_sec: i64) -> Vec<std::net::Ipv4Addr> {
        let mut left = Vec::new();
        self.records.retain_mut(|r| {
            r.old_host_present_secs = (r.old_host_present_secs - elapsed_sec).max(0);
            if r.query_in_flight {
                r.query_response_secs -= elapsed_sec;
                if r.query_response_secs <= 0 {
                    left.push(r.group);
                    return false;
                }
            } else {
                r.expiry_secs -= elapsed_sec;
                if r.expiry_secs <= 0 {
                    left.push(r.group);
                    return false;
                }
            }
            true
        });
        left
    }

    pub fn contains(&self, group: std::net::Ipv4Addr) -> bool {
        self.records.iter().any(|r| r.group == group)
    }
}

/// §4.4 querier election / aging, modeled as a free function over the
/// per-vif state stored in [`crate::vif::Vif::querier`].
pub fn on_query_received(current: &crate::vif::Querier, local_addr: IpAddr, source: IpAddr) -> Option<crate::vif::Querier> {
    use crate::utils::ipv4_to_u32;
    let current_addr = match current {
        crate::vif::Querier::Us => local_addr,
        crate::vif::Querier::Other { addr, .. } => *addr,
    };
    let (IpAddr::V4(src4), IpAddr::V4(cur4)) = (source, current_addr) else {
        return None;
    };
    if ipv4_to_u32(src4) < ipv4_to_u32(cur4) {
        Some(crate::vif::Querier::Other { addr: source, since: std::time::Instant::now() })
    } else {
        None
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
    fn test_v2_report_creates_and_refreshes() {
        let mut vm = VifMembership::new();
        let g: std::net::Ipv4Addr = "239.1.2.3".parse().unwrap();
        vm.handle_v1_v2_report(g, addr(1), false);
        assert!(vm.contains(g));
        assert_eq!(vm.records[0].expiry_secs, GROUP_MEMBERSHIP_INTERVAL);
    }

    #[test]
    fn test_v1_report_sets_old_host_present() {
        let mut vm = VifMembership::new();
        let g: std::net::Ipv4Addr = "239.1.2.3".parse().unwrap();
        vm.handle_v1_v2_report(g, addr(1), true);
        assert!(vm.records[0].is_old_host_present());
    }

    #[test]
    fn test_v3_empty_ngrec_noop() {
        let mut vm = VifMembership::new();
        // no grec handling call at all is itself the no-op; nothing to assert
        // beyond an empty table remaining empty.
        assert!(vm.records.is_empty());
    }

    #[test]
    fn test_v3_exclude_is_join_include_empty_is_leave() {
        let mut vm = VifMembership::new();
        let g: std::net::Ipv4Addr = "239.1.2.3".parse().unwrap();
        let ev = vm.handle_v3_grec(2 /* MODE_IS_EXCLUDE */, g, 3, addr(1));
        assert_eq!(ev, Some(MembershipEvent::Joined(g)));
        let ev2 = vm.handle_v3_grec(1 /* MODE_IS_INCLUDE */, g, 0, addr(1));
        assert_eq!(ev2, Some(MembershipEvent::Left(g)));
        assert!(!vm.contains(g));
    }

    #[test]
    fn test_v3_allow_block_ignored() {
        let mut vm = VifMembership::new();
        let g: std::net::Ipv4Addr = "239.1.2.3".parse().unwrap();
        let ev = vm.handle_v3_grec(5 /* ALLOW_NEW_SOURCES */, g, 1, addr(1));
        assert_eq!(ev, None);
    }

    #[test]
    fn test_leave_ignored_when_not_querier() {
        let mut vm = VifMembership::new();
        let g: std::net::Ipv4Addr = "239.1.2.3".parse().unwrap();
        vm.handle_v1_v2_report(g, addr(1), false);
        assert!(vm.handle_v2_leave(g, false, false).is_none());
    }

    #[test]
    fn test_leave_last_member_query_then_expires() {
        // §8 scenario 6.
        let mut vm = VifMembership::new();
        let g: std::net::Ipv4Addr = "239.1.2.3".parse().unwrap();
        vm.handle_v1_v2_report(g, addr(1), false);
        let q = vm.handle_v2_leave(g, true, false);
        assert!(q.is_some());
        let left = vm.age(2 * LAST_MEMBER_QUERY_INTERVAL + 1);
        assert_eq!(left, vec![g]);
        assert!(!vm.contains(g));
    }

    #[test]
    fn test_leave_suppressed_during_old_host_present() {
        let mut vm = VifMembership::new();
        let g: std::net::Ipv4Addr = "239.1.2.3".parse().unwrap();
        vm.handle_v1_v2_report(g, addr(1), true); // v1 report sets old-host-present
        assert!(vm.handle_v2_leave(g, true, false).is_none());
    }
}
