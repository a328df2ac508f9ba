//! Packet I/O dispatcher, §4.6 — classifies one inbound datagram by IGMP
//! type and DVMRP sub-code and hands it to the right subsystem. This module
//! only classifies; each handler lives in its owning subsystem module
//! (`rib`, `forwarding`, `igmp`, `neighbor`).

pub mod wire;

use std::net::Ipv4Addr;

use crate::error::DvmrpError;
use crate::igmp::query::{IGMP_MEMBERSHIP_QUERY, IGMP_V1_MEMBERSHIP_REPORT, IGMP_V2_LEAVE_GROUP, IGMP_V2_MEMBERSHIP_REPORT, IGMP_V3_MEMBERSHIP_REPORT};
use wire::{dvmrp_code, GraftMessage, PruneMessage, IGMP_TYPE_DVMRP};

pub const MTRACE_QUERY: u8 = 0x1e;
pub const MTRACE_RESPONSE: u8 = 0x1f;
/// Not a real IGMP/DVMRP type byte — PIM shares the protocol number in some
/// deployments; the core always ignores it (§4.6 "PIM → ignored").
pub const PIM_TYPE: u8 = 0x14;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClassifiedMessage {
    MembershipQuery { src: Ipv4Addr, group: Ipv4Addr, max_resp_code: u8 },
    V1Report { src: Ipv4Addr, group: Ipv4Addr },
    V2Report { src: Ipv4Addr, group: Ipv4Addr },
    V3Report { src: Ipv4Addr, body: Vec<u8> },
    V2Leave { src: Ipv4Addr, group: Ipv4Addr },
    DvmrpProbe { src: Ipv4Addr, body: Vec<u8> },
    DvmrpReport { src: Ipv4Addr, body: Vec<u8> },
    DvmrpPrune { src: Ipv4Addr, message: PruneMessage },
    DvmrpGraft { src: Ipv4Addr, message: GraftMessage },
    DvmrpGraftAck { src: Ipv4Addr, message: GraftMessage },
    DvmrpAskNeighbors { src: Ipv4Addr },
    DvmrpNeighbors { src: Ipv4Addr, body: Vec<u8> },
    DvmrpAskNeighbors2 { src: Ipv4Addr },
    DvmrpNeighbors2 { src: Ipv4Addr, body: Vec<u8> },
    DvmrpInfoRequest { src: Ipv4Addr },
    DvmrpInfoReply { src: Ipv4Addr, body: Vec<u8> },
    /// Logged at info and discarded (§4.6 "Unknown codes").
    DvmrpUnknownCode { code: u8 },
    MtraceQuery { src: Ipv4Addr, body: Vec<u8> },
    MtraceResponseIgnored,
    PimIgnored,
}

/// Classify one IGMP-layer body (the bytes *after* the IP header). `src` is
/// the datagram's source address, already extracted by
/// [`wire::parse_datagram`].
pub fn classify(src: Ipv4Addr, body: &[u8]) -> Result<ClassifiedMessage, DvmrpError> {
    if body.len() < wire::MIN_IGMP_LEN {
        return Err(DvmrpError::MalformedPacket("body shorter than MIN_IGMP_LEN".into()));
    }
    let igmp_type = body[0];
    let code = body[1];
    let group = Ipv4Addr::new(body[4], body[5], body[6], body[7]);

    match igmp_type {
        IGMP_MEMBERSHIP_QUERY => Ok(ClassifiedMessage::MembershipQuery { src, group, max_resp_code: code }),
        IGMP_V1_MEMBERSHIP_REPORT => Ok(ClassifiedMessage::V1Report { src, group }),
        IGMP_V2_MEMBERSHIP_REPORT => Ok(ClassifiedMessage::V2Report { src, group }),
        IGMP_V3_MEMBERSHIP_REPORT => Ok(ClassifiedMessage::V3Report { src, body: body.to_vec() }),
        IGMP_V2_LEAVE_GROUP => Ok(ClassifiedMessage::V2Leave { src, group }),
        IGMP_TYPE_DVMRP => classify_dvmrp(src, code, &body[4..]),
        MTRACE_QUERY => Ok(ClassifiedMessage::MtraceQuery { src, body: body.to_vec() }),
        MTRACE_RESPONSE => Ok(ClassifiedMessage::MtraceResponseIgnored),
        PIM_TYPE => Ok(ClassifiedMessage::PimIgnored),
        _ => Err(DvmrpError::MalformedPacket(format!("unknown IGMP type {igmp_type:#x}"))),
    }
}

fn classify_dvmrp(src: Ipv4Addr, code: u8, body: &[u8]) -> Result<ClassifiedMessage, DvmrpError> {
    use dvmrp_code::*;
    Ok(match code {
        PROBE => ClassifiedMessage::DvmrpProbe { src, body: body.to_vec() },
        REPORT => ClassifiedMessage::DvmrpReport { src, body: body.to_vec() },
        ASK_NEIGHBORS => ClassifiedMessage::DvmrpAskNeighbors { src },
        NEIGHBORS => ClassifiedMessage::DvmrpNeighbors { src, body: body.to_vec() },
        ASK_NEIGHBORS2 => ClassifiedMessage::DvmrpAskNeighbors2 { src },
        NEIGHBORS2 => ClassifiedMessage::DvmrpNeighbors2 { src, body: body.to_vec() },
        PRUNE => ClassifiedMessage::DvmrpPrune { src, message: PruneMessage::decode(body)? },
        GRAFT => ClassifiedMessage::DvmrpGraft { src, message: GraftMessage::decode(body)? },
        GRAFT_ACK => ClassifiedMessage::DvmrpGraftAck { src, message: GraftMessage::decode(body)? },
        INFO_REQUEST => ClassifiedMessage::DvmrpInfoRequest { src },
        INFO_REPLY => ClassifiedMessage::DvmrpInfoReply { src, body: body.to_vec() },
        other => ClassifiedMessage::DvmrpUnknownCode { code: other },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn igmp_body(igmp_type: u8, code: u8, group: [u8; 4], rest: &[u8]) -> Vec<u8> {
        let mut buf = vec![igmp_type, code, 0, 0];
        buf.extend_from_slice(&group);
        buf.extend_from_slice(rest);
        buf
    }

    #[test]
    fn test_classify_membership_query() {
        let body = igmp_body(IGMP_MEMBERSHIP_QUERY, 100, [0, 0, 0, 0], &[]);
        let msg = classify("10.0.0.1".parse().unwrap(), &body).unwrap();
        assert_eq!(msg, ClassifiedMessage::MembershipQuery { src: "10.0.0.1".parse().unwrap(), group: "0.0.0.0".parse().unwrap(), max_resp_code: 100 });
    }

    #[test]
    fn test_classify_dvmrp_prune() {
        let prune = PruneMessage { origin: "10.0.0.5".parse().unwrap(), group: "239.1.2.3".parse().unwrap(), lifetime: 3600 };
        let body = igmp_body(IGMP_TYPE_DVMRP, dvmrp_code::PRUNE, [239, 1, 2, 3], &prune.encode());
        let msg = classify("10.0.0.1".parse().unwrap(), &body).unwrap();
        assert_eq!(msg, ClassifiedMessage::DvmrpPrune { src: "10.0.0.1".parse().unwrap(), message: prune });
    }

    #[test]
    fn test_classify_unknown_dvmrp_code_logged_not_rejected() {
        let body = igmp_body(IGMP_TYPE_DVMRP, 200, [0, 0, 0, 0], &[]);
        let msg = classify("10.0.0.1".parse().unwrap(), &body).unwrap();
        assert_eq!(msg, ClassifiedMessage::DvmrpUnknownCode { code: 200 });
    }

    #[test]
    fn test_classify_pim_ignored() {
        let body = igmp_body(PIM_TYPE, 0, [0, 0, 0, 0], &[]);
        assert_eq!(classify("10.0.0.1".parse().unwrap(), &body).unwrap(), ClassifiedMessage::PimIgnored);
    }

    #[test]
    fn test_classify_too_short_rejected() {
        let body = [0x11, 0, 0];
        assert!(classify("10.0.0.1".parse().unwrap(), &body).is_err());
    }
}
