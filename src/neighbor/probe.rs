//! DVMRP probe wire format (§4.5, §6.1): 4-byte generation-id followed by
//! zero or more 4-byte neighbor addresses — the sender's current neighbor
//! list on this vif.

use std::net::Ipv4Addr;

use crate::error::DvmrpError;
use crate::utils::{ipv4_to_u32, u32_to_ipv4};

pub const NEIGHBOR_PROBE_INTERVAL: i64 = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Probe {
    pub genid: u32,
    pub neighbors: Vec<Ipv4Addr>,
}

impl Probe {
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(4 + self.neighbors.len() * 4);
        buf.extend_from_slice(&self.genid.to_be_bytes());
        for n in &self.neighbors {
            buf.extend_from_slice(&ipv4_to_u32(*n).to_be_bytes());
        }
        buf
    }

    pub fn decode(body: &[u8]) -> Result<Self, DvmrpError> {
        if body.len() < 4 {
            return Err(DvmrpError::MalformedPacket("probe shorter than genid field".into()));
        }
        if (body.len() - 4) % 4 != 0 {
            return Err(DvmrpError::MalformedPacket("probe neighbor list not word-aligned".into()));
        }
        let genid = u32::from_be_bytes([body[0], body[1], body[2], body[3]]);
        let neighbors = body[4..]
            .chunks_exact(4)
            .map(|c| u32_to_ipv4(u32::from_be_bytes([c[0], c[1], c[2], c[3]])))
            .collect();
        Ok(Probe { genid, neighbors })
    }

    pub fn lists(&self, addr: Ipv4Addr) -> bool {
        self.neighbors.contains(&addr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip() {
        let probe = Probe {
            genid: 0xdeadbeef,
            neighbors: vec!["10.0.0.1".parse().unwrap(), "10.0.0.2".parse().unwrap()],
        };
        let encoded = probe.encode();
        let decoded = Probe::decode(&encoded).unwrap();
        assert_eq!(probe, decoded);
    }

    #[test]
    fn test_empty_neighbor_list() {
        let probe = Probe { genid: 1, neighbors: vec![] };
        let decoded = Probe::decode(&probe.encode()).unwrap();
        assert_eq!(decoded.neighbors.len(), 0);
    }

    #[test]
    fn test_rejects_unaligned_body() {
        let body = [0u8; 7];
        assert!(Probe::decode(&body).is_err());
    }

    #[test]
    fn test_lists_address() {
        let probe = Probe { genid: 1, neighbors: vec!["10.0.0.1".parse().unwrap()] };
        assert!(probe.lists("10.0.0.1".parse().unwrap()));
        assert!(!probe.lists("10.0.0.2".parse().unwrap()));
    }
}
