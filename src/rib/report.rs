//! DVMRP report wire format (§6.1) and the paced "chunk" advertiser (§4.2,
//! §2 "fast timer").
//!
//! A report is a sequence of sections, each beginning with 3 mask bytes
//! (octets 2,3,4 of the network-order mask; octet 1 is implied `0xff`),
//! followed by one or more `(origin-prefix, metric)` pairs. The origin
//! prefix is 1..4 bytes depending on which mask bytes are non-zero. The
//! last pair of a section has the metric's high bit set; if no further
//! section follows, that same bit also ends the message.

use std::net::Ipv4Addr;

use crate::error::DvmrpError;
use crate::rib::route::Origin;

/// §4.2: "The fast timer every second emits a 'chunk' of at most ~20 KB of
/// routes".
pub const CHUNK_SIZE_BYTES: usize = 20 * 1024;
/// §4.2: report interval over which the full table is transmitted.
pub const REPORT_INTERVAL: i64 = 35;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportEntry {
    pub origin: Origin,
    /// Wire metric: 1..32 normal, 33..63 poison-reverse. Never the
    /// terminator bit itself.
    pub metric: u8,
}

fn mask_octets(prefix_len: u8) -> [u8; 3] {
    let mask = if prefix_len == 0 { 0u32 } else { u32::MAX << (32 - prefix_len as u32) };
    let bytes = mask.to_be_bytes();
    [bytes[1], bytes[2], bytes[3]]
}

/// Number of origin-address bytes to send for a section with the given mask
/// octets: the index (1-based, counting the implied leading 0xff) of the
/// last non-zero mask byte.
fn origin_width(octets: [u8; 3]) -> usize {
    if octets[2] != 0 {
        4
    } else if octets[1] != 0 {
        3
    } else if octets[0] != 0 {
        2
    } else {
        1
    }
}

/// Encode `entries`, which must already be grouped contiguously by
/// `prefix_len` (the routing table's natural order guarantees this).
pub fn encode_report(entries: &[ReportEntry]) -> Vec<u8> {
    let mut buf = Vec::new();
    let mut i = 0;
    while i < entries.len() {
        let prefix_len = entries[i].origin.prefix_len;
        let octets = mask_octets(prefix_len);
        let width = origin_width(octets);
        buf.extend_from_slice(&octets);
        let mut j = i;
        while j < entries.len() && entries[j].origin.prefix_len == prefix_len {
            j += 1;
        }
        let section = &entries[i..j];
        for (k, entry) in section.iter().enumerate() {
            let origin_bytes = entry.origin.network.octets();
            buf.extend_from_slice(&origin_bytes[..width]);
            let is_last_in_section = k == section.len() - 1;
            let byte = if is_last_in_section { entry.metric | 0x80 } else { entry.metric & 0x7f };
            buf.push(byte);
        }
        i = j;
    }
    buf
}

/// Decode a full report message into its entries.
pub fn decode_report(body: &[u8]) -> Result<Vec<ReportEntry>, DvmrpError> {
    let mut entries = Vec::new();
    let mut pos = 0;
    while pos < body.len() {
        if pos + 3 > body.len() {
            return Err(DvmrpError::InvalidReport("truncated mask header".into()));
        }
        let octets = [body[pos], body[pos + 1], body[pos + 2]];
        pos += 3;
        let width = origin_width(octets);
        let prefix_len = prefix_len_from_octets(octets);
        loop {
            if pos + width + 1 > body.len() {
                return Err(DvmrpError::InvalidReport("truncated (origin, metric) pair".into()));
            }
            let mut origin_bytes = [0u8; 4];
            origin_bytes[..width].copy_from_slice(&body[pos..pos + width]);
            pos += width;
            let wire_metric = body[pos];
            pos += 1;
            let is_last = wire_metric & 0x80 != 0;
            let metric = wire_metric & 0x7f;
            entries.push(ReportEntry {
                origin: Origin::new(Ipv4Addr::from(origin_bytes), prefix_len),
                metric,
            });
            if is_last {
                break;
            }
        }
    }
    Ok(entries)
}

fn prefix_len_from_octets(octets: [u8; 3]) -> u8 {
    let mask = u32::from_be_bytes([0xff, octets[0], octets[1], octets[2]]);
    mask.count_ones() as u8
}

/// Apply poison-reverse (§4.2): a route whose parent is the vif we're
/// advertising on has its metric rewritten to `metric + 32` so downstream
/// neighbors record us as subordinate rather than re-adopting us.
pub fn poison_reverse_metric(metric: u8, is_parent_vif: bool) -> u8 {
    if is_parent_vif {
        (metric + 32).min(63)
    } else {
        metric
    }
}

/// Split `entries` into chunks no larger than [`CHUNK_SIZE_BYTES`] once
/// encoded, preserving section grouping. §5 "Ordering guarantees": chunks
/// are built from the tail of the table forward, so callers should already
/// have reversed `entries` before calling this if that ordering matters.
pub fn chunk_entries(entries: &[ReportEntry]) -> Vec<Vec<ReportEntry>> {
    let mut chunks = Vec::new();
    let mut current: Vec<ReportEntry> = Vec::new();
    let mut current_len = 0usize;
    let mut i = 0;
    while i < entries.len() {
        let prefix_len = entries[i].origin.prefix_len;
        let mut j = i;
        while j < entries.len() && entries[j].origin.prefix_len == prefix_len {
            j += 1;
        }
        let section_len = 3 + (j - i) * (origin_width(mask_octets(prefix_len)) + 1);
        if !current.is_empty() && current_len + section_len > CHUNK_SIZE_BYTES {
            chunks.push(std::mem::take(&mut current));
            current_len = 0;
        }
        current.extend_from_slice(&entries[i..j]);
        current_len += section_len;
        i = j;
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(net: [u8; 4], prefix_len: u8, metric: u8) -> ReportEntry {
        ReportEntry { origin: Origin::new(Ipv4Addr::from(net), prefix_len), metric }
    }

    #[test]
    fn test_roundtrip_single_section() {
        let entries = vec![
            entry([192, 168, 1, 0], 24, 1),
            entry([192, 168, 2, 0], 24, 5),
        ];
        let encoded = encode_report(&entries);
        let decoded = decode_report(&encoded).unwrap();
        assert_eq!(entries, decoded);
    }

    #[test]
    fn test_roundtrip_multiple_sections_mixed_widths() {
        let entries = vec![
            entry([10, 0, 0, 0], 8, 1),
            entry([172, 16, 0, 0], 16, 2),
            entry([192, 168, 1, 0], 24, 3),
        ];
        let encoded = encode_report(&entries);
        let decoded = decode_report(&encoded).unwrap();
        assert_eq!(entries, decoded);
    }

    #[test]
    fn test_metric_63_poison_reverse_decodes_to_unreachable_after_subtract() {
        // Wire value 63 = 32 (UNREACHABLE) + 31 (max poisoned reachable metric).
        let wire_metric = 63;
        assert_eq!(wire_metric - 32, 31);
    }

    #[test]
    fn test_poison_reverse_only_applied_on_parent_vif() {
        assert_eq!(poison_reverse_metric(5, false), 5);
        assert_eq!(poison_reverse_metric(5, true), 37);
    }

    #[test]
    fn test_truncated_pair_rejected() {
        let mut encoded = encode_report(&[entry([10, 0, 0, 0], 8, 1)]);
        encoded.pop();
        assert!(decode_report(&encoded).is_err());
    }

    #[test]
    fn test_chunking_splits_on_size() {
        let entries: Vec<ReportEntry> = (0..4000u32)
            .map(|i| entry([10, (i >> 8) as u8, i as u8, 0], 24, 1))
            .collect();
        let chunks = chunk_entries(&entries);
        assert!(chunks.len() > 1);
        let total: usize = chunks.iter().map(|c| c.len()).sum();
        assert_eq!(total, entries.len());
    }
}
