//! Kernel multicast forwarding cache, §6.2 — the boundary between THE CORE's
//! software state and the host's actual packet-forwarding fast path. An
//! `async_trait` collaborator, mirroring how the teacher keeps its transport
//! (raw socket read/write) behind a trait so the state machines stay
//! testable without a live kernel.

pub mod interfaces;

use std::net::Ipv4Addr;

use async_trait::async_trait;

use crate::error::StartupError;

/// A `(source, group)` multicast forwarding cache entry as installed into
/// the kernel (§6.2 `add_mfc`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MfcEntry {
    pub source: Ipv4Addr,
    pub group: Ipv4Addr,
    pub parent_vif: u16,
    /// Bitmask of vif indices packets for this `(S,G)` should be copied to.
    pub output_vifs: u64,
}

/// §6.2: the kernel's own per-`(S,G)` packet/byte counters, used to decide
/// whether a cache entry has gone quiet enough to prune upstream.
#[derive(Debug, Clone, Copy, Default)]
pub struct SgCount {
    pub packets: u64,
    pub bytes: u64,
}

/// Collaborator wrapping the raw `IP_HDRINCL` multicast socket and the
/// kernel's `ip_mroute` control plane. §6.2 lists the exact operation set;
/// implementations talk to `setsockopt(IPPROTO_IP, MRT_*, ...)` on Unix.
#[async_trait]
pub trait ForwardingCache: Send + Sync {
    async fn init(&mut self) -> Result<(), StartupError>;
    async fn done(&mut self) -> Result<(), StartupError>;
    /// The kernel multicast-routing API version, used to detect a
    /// mismatched kernel (§6.2 `KernelVersionMismatch`).
    fn version(&self) -> u32;

    async fn add_vif(&mut self, vif_index: u16, local_addr: Ipv4Addr, threshold: u8, is_tunnel: bool, remote_addr: Option<Ipv4Addr>) -> Result<(), StartupError>;
    async fn del_vif(&mut self, vif_index: u16) -> Result<(), StartupError>;

    async fn add_mfc(&mut self, entry: MfcEntry) -> Result<(), StartupError>;
    async fn del_mfc(&mut self, source: Ipv4Addr, group: Ipv4Addr) -> Result<(), StartupError>;

    async fn join(&mut self, vif_index: u16, group: Ipv4Addr) -> Result<(), StartupError>;
    async fn leave(&mut self, vif_index: u16, group: Ipv4Addr) -> Result<(), StartupError>;

    fn set_ttl(&mut self, ttl: u8);
    fn set_loop(&mut self, enable: bool);
    fn set_if(&mut self, local_addr: Ipv4Addr) -> Result<(), StartupError>;

    /// §6.2 `get_sg_count` — read the kernel's live packet/byte counters
    /// for one cache entry, used by the cache-refresh and upcall logic.
    async fn get_sg_count(&self, source: Ipv4Addr, group: Ipv4Addr) -> Result<SgCount, StartupError>;
    async fn get_vif_count(&self, vif_index: u16) -> Result<SgCount, StartupError>;
}

/// Development/test stand-in that records calls instead of touching a real
/// socket, mirroring the teacher's pattern of an in-memory transport used
/// under `#[cfg(test)]` (see `session::codec` tests).
#[derive(Debug, Default)]
pub struct NullForwardingCache {
    pub initialized: bool,
    pub mfc_entries: Vec<MfcEntry>,
    pub vifs: Vec<u16>,
}

impl NullForwardingCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ForwardingCache for NullForwardingCache {
    async fn init(&mut self) -> Result<(), StartupError> {
        self.initialized = true;
        Ok(())
    }

    async fn done(&mut self) -> Result<(), StartupError> {
        self.initialized = false;
        Ok(())
    }

    fn version(&self) -> u32 {
        0x0305
    }

    async fn add_vif(&mut self, vif_index: u16, _local_addr: Ipv4Addr, _threshold: u8, _is_tunnel: bool, _remote_addr: Option<Ipv4Addr>) -> Result<(), StartupError> {
        self.vifs.push(vif_index);
        Ok(())
    }

    async fn del_vif(&mut self, vif_index: u16) -> Result<(), StartupError> {
        self.vifs.retain(|v| *v != vif_index);
        Ok(())
    }

    async fn add_mfc(&mut self, entry: MfcEntry) -> Result<(), StartupError> {
        self.mfc_entries.retain(|e| !(e.source == entry.source && e.group == entry.group));
        self.mfc_entries.push(entry);
        Ok(())
    }

    async fn del_mfc(&mut self, source: Ipv4Addr, group: Ipv4Addr) -> Result<(), StartupError> {
        self.mfc_entries.retain(|e| !(e.source == source && e.group == group));
        Ok(())
    }

    async fn join(&mut self, _vif_index: u16, _group: Ipv4Addr) -> Result<(), StartupError> {
        Ok(())
    }

    async fn leave(&mut self, _vif_index: u16, _group: Ipv4Addr) -> Result<(), StartupError> {
        Ok(())
    }

    fn set_ttl(&mut self, _ttl: u8) {}
    fn set_loop(&mut self, _enable: bool) {}
    fn set_if(&mut self, _local_addr: Ipv4Addr) -> Result<(), StartupError> {
        Ok(())
    }

    async fn get_sg_count(&self, _source: Ipv4Addr, _group: Ipv4Addr) -> Result<SgCount, StartupError> {
        Ok(SgCount::default())
    }

    async fn get_vif_count(&self, _vif_index: u16) -> Result<SgCount, StartupError> {
        Ok(SgCount::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_null_cache_tracks_mfc_entries() {
        let mut cache = NullForwardingCache::new();
        cache.init().await.unwrap();
        let entry = MfcEntry { source: "10.0.0.1".parse().unwrap(), group: "239.1.2.3".parse().unwrap(), parent_vif: 0, output_vifs: 0b10 };
        cache.add_mfc(entry).await.unwrap();
        assert_eq!(cache.mfc_entries.len(), 1);
        cache.del_mfc(entry.source, entry.group).await.unwrap();
        assert!(cache.mfc_entries.is_empty());
    }

    #[tokio::test]
    async fn test_add_mfc_replaces_existing_entry_for_same_sg() {
        let mut cache = NullForwardingCache::new();
        let entry = MfcEntry { source: "10.0.0.1".parse().unwrap(), group: "239.1.2.3".parse().unwrap(), parent_vif: 0, output_vifs: 0b10 };
        cache.add_mfc(entry).await.unwrap();
        let updated = MfcEntry { output_vifs: 0b110, ..entry };
        cache.add_mfc(updated).await.unwrap();
        assert_eq!(cache.mfc_entries.len(), 1);
        assert_eq!(cache.mfc_entries[0].output_vifs, 0b110);
    }
}
