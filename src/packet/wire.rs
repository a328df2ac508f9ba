//! Wire-level structs for the pieces not already covered by
//! [`crate::neighbor::probe`], [`crate::rib::report`], and
//! [`crate::igmp::query`]: the IP header skin every packet arrives in, and
//! the small fixed-length DVMRP prune/graft/graft-ack bodies (§6.1, §9
//! "Kernel-shaped structs": explicit byte-by-byte codecs, not native
//! aggregates, to avoid endianness/padding hazards).

use std::net::Ipv4Addr;

use crate::error::DvmrpError;
use crate::utils::{ipv4_to_u32, u32_to_ipv4};

pub const IGMP_TYPE_DVMRP: u8 = 0x13;
pub const ROUTER_ALERT_OPTION: [u8; 4] = [0x94, 0x04, 0x00, 0x00];

pub mod dvmrp_code {
    pub const PROBE: u8 = 1;
    pub const REPORT: u8 = 2;
    pub const ASK_NEIGHBORS: u8 = 3;
    pub const NEIGHBORS: u8 = 4;
    pub const ASK_NEIGHBORS2: u8 = 5;
    pub const NEIGHBORS2: u8 = 6;
    pub const PRUNE: u8 = 7;
    pub const GRAFT: u8 = 8;
    pub const GRAFT_ACK: u8 = 9;
    pub const INFO_REQUEST: u8 = 10;
    pub const INFO_REPLY: u8 = 11;
}

/// The minimal parse of an inbound IP datagram the dispatcher needs: a
/// genuine IGMP packet (protocol 2) or a kernel "no-matching-cache-entry"
/// upcall, which the kernel signals by delivering protocol 0 with the
/// pseudo-header's (src, dst) standing in for (source, group) (§4.6).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedDatagram {
    Upcall { source: Ipv4Addr, group: Ipv4Addr },
    Igmp { src: Ipv4Addr, dst: Ipv4Addr, body: Vec<u8> },
}

/// Whether this host's raw-socket delivery reports `ip_len`/`ip_off` in
/// host order (some BSD kernels) rather than network order (§9 "IP header
/// length handling"). Detected once at startup, not per-packet.
#[derive(Debug, Clone, Copy)]
pub struct IpHeaderByteOrder {
    pub host_order_lengths: bool,
}

pub const MIN_IGMP_LEN: usize = 8;

/// Parse one raw datagram off the socket (§4.6 "Packet validation").
pub fn parse_datagram(raw: &[u8], byte_order: IpHeaderByteOrder) -> Result<ParsedDatagram, DvmrpError> {
    if raw.len() < 20 {
        return Err(DvmrpError::MalformedPacket("shorter than a minimal IP header".into()));
    }
    let ihl = (raw[0] & 0x0F) as usize * 4;
    if raw.len() < ihl {
        return Err(DvmrpError::MalformedPacket("IHL exceeds datagram length".into()));
    }
    let total_len = if byte_order.host_order_lengths {
        u16::from_le_bytes([raw[2], raw[3]]) as usize
    } else {
        u16::from_be_bytes([raw[2], raw[3]]) as usize
    };
    if total_len > raw.len() {
        return Err(DvmrpError::MalformedPacket("IP total length exceeds buffer".into()));
    }
    let protocol = raw[9];
    let src = Ipv4Addr::new(raw[12], raw[13], raw[14], raw[15]);
    let dst = Ipv4Addr::new(raw[16], raw[17], raw[18], raw[19]);

    if protocol == 0 {
        // Kernel upcall: pseudo-header carries (source, group) directly.
        return Ok(ParsedDatagram::Upcall { source: src, group: dst });
    }

    let payload = &raw[ihl..total_len];
    if payload.len() < MIN_IGMP_LEN {
        return Err(DvmrpError::MalformedPacket("IGMP payload shorter than minimum".into()));
    }
    Ok(ParsedDatagram::Igmp { src, dst, body: payload.to_vec() })
}

/// DVMRP prune body: origin(4) | group(4) | lifetime-seconds(4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PruneMessage {
    pub origin: Ipv4Addr,
    pub group: Ipv4Addr,
    pub lifetime: u32,
}

impl PruneMessage {
    pub fn encode(&self) -> [u8; 12] {
        let mut buf = [0u8; 12];
        buf[0..4].copy_from_slice(&ipv4_to_u32(self.origin).to_be_bytes());
        buf[4..8].copy_from_slice(&ipv4_to_u32(self.group).to_be_bytes());
        buf[8..12].copy_from_slice(&self.lifetime.to_be_bytes());
        buf
    }

    pub fn decode(body: &[u8]) -> Result<Self, DvmrpError> {
        if body.len() < 12 {
            return Err(DvmrpError::MalformedPacket("prune shorter than 12 bytes".into()));
        }
        Ok(Self {
            origin: u32_to_ipv4(u32::from_be_bytes([body[0], body[1], body[2], body[3]])),
            group: u32_to_ipv4(u32::from_be_bytes([body[4], body[5], body[6], body[7]])),
            lifetime: u32::from_be_bytes([body[8], body[9], body[10], body[11]]),
        })
    }
}

/// DVMRP graft/graft-ack body: origin(4) | group(4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GraftMessage {
    pub origin: Ipv4Addr,
    pub group: Ipv4Addr,
}

impl GraftMessage {
    pub fn encode(&self) -> [u8; 8] {
        let mut buf = [0u8; 8];
        buf[0..4].copy_from_slice(&ipv4_to_u32(self.origin).to_be_bytes());
        buf[4..8].copy_from_slice(&ipv4_to_u32(self.group).to_be_bytes());
        buf
    }

    pub fn decode(body: &[u8]) -> Result<Self, DvmrpError> {
        if body.len() < 8 {
            return Err(DvmrpError::MalformedPacket("graft shorter than 8 bytes".into()));
        }
        Ok(Self {
            origin: u32_to_ipv4(u32::from_be_bytes([body[0], body[1], body[2], body[3]])),
            group: u32_to_ipv4(u32::from_be_bytes([body[4], body[5], body[6], body[7]])),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip_header(total_len: u16, protocol: u8, src: [u8; 4], dst: [u8; 4]) -> Vec<u8> {
        let mut buf = vec![0u8; 20];
        buf[0] = 0x45; // version 4, IHL 5
        buf[2..4].copy_from_slice(&total_len.to_be_bytes());
        buf[9] = protocol;
        buf[12..16].copy_from_slice(&src);
        buf[16..20].copy_from_slice(&dst);
        buf
    }

    #[test]
    fn test_upcall_protocol_zero() {
        let raw = ip_header(20, 0, [10, 0, 0, 5], [239, 1, 2, 3]);
        let parsed = parse_datagram(&raw, IpHeaderByteOrder { host_order_lengths: false }).unwrap();
        assert_eq!(parsed, ParsedDatagram::Upcall { source: Ipv4Addr::new(10, 0, 0, 5), group: Ipv4Addr::new(239, 1, 2, 3) });
    }

    #[test]
    fn test_igmp_payload_too_short_rejected() {
        let mut raw = ip_header(24, 2, [10, 0, 0, 1], [224, 0, 0, 1]);
        raw.extend_from_slice(&[0, 0, 0]); // 3-byte IGMP payload, below MIN_IGMP_LEN
        let result = parse_datagram(&raw, IpHeaderByteOrder { host_order_lengths: false });
        assert!(result.is_err());
    }

    #[test]
    fn test_prune_roundtrip() {
        let msg = PruneMessage { origin: "10.0.0.1".parse().unwrap(), group: "239.1.2.3".parse().unwrap(), lifetime: 3600 };
        assert_eq!(PruneMessage::decode(&msg.encode()).unwrap(), msg);
    }

    #[test]
    fn test_prune_lifetime_boundary() {
        use crate::forwarding::MIN_PRUNE_LIFE;
        let rejected = PruneMessage { origin: "10.0.0.1".parse().unwrap(), group: "239.1.2.3".parse().unwrap(), lifetime: MIN_PRUNE_LIFE };
        let accepted = PruneMessage { origin: "10.0.0.1".parse().unwrap(), group: "239.1.2.3".parse().unwrap(), lifetime: MIN_PRUNE_LIFE + 1 };
        assert!(rejected.lifetime <= MIN_PRUNE_LIFE);
        assert!(accepted.lifetime > MIN_PRUNE_LIFE);
    }

    #[test]
    fn test_graft_roundtrip() {
        let msg = GraftMessage { origin: "10.0.0.1".parse().unwrap(), group: "239.1.2.3".parse().unwrap() };
        assert_eq!(GraftMessage::decode(&msg.encode()).unwrap(), msg);
    }
}
