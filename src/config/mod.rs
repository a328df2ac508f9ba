mod file;

pub use file::{FilterSpec, IgmpModeSpec};

use std::net::IpAddr;

use ipnetwork::Ipv4Network;

use crate::error::StartupError;
use crate::igmp::IgmpMode;

/// Parse a TOML config file and return a resolved [`Config`].
pub fn from_file(path: &str) -> Result<Config, StartupError> {
    let spec = file::ServerConfigSpec::from_file(path)?;
    Config::from_spec(spec)
}

#[derive(Debug)]
pub struct Config {
    pub router_id: IpAddr,
    pub vifs: Vec<VifConfig>,
}

/// Resolved route filter: server-config-level defaults already applied.
#[derive(Debug, Clone)]
pub struct RouteFilter {
    pub network: Ipv4Network,
    pub exact: bool,
    pub deny: bool,
    pub bidirectional: bool,
}

impl From<FilterSpec> for RouteFilter {
    fn from(spec: FilterSpec) -> Self {
        Self {
            network: spec.network,
            exact: spec.exact,
            deny: spec.deny,
            bidirectional: spec.bidirectional,
        }
    }
}

/// In-memory, server-default-resolved representation of a vif's
/// configuration (§3, §6.3).
#[derive(Debug, Clone)]
pub struct VifConfig {
    pub local_addr: IpAddr,
    pub remote_addr: Option<IpAddr>,
    pub metric: u8,
    pub threshold: u8,
    pub advertised_cost_adjustment: i8,
    pub prune_lifetime: u32,
    pub igmp_mode: IgmpMode,
    pub enabled: bool,
    pub passive: bool,
    pub leaf: bool,
    pub no_flood: bool,
    pub no_transit: bool,
    pub allow_non_pruners: bool,
    pub retransmit_prunes: bool,
    pub accept_filters: Vec<RouteFilter>,
    pub scope: Vec<Ipv4Network>,
}

impl VifConfig {
    pub fn is_tunnel(&self) -> bool {
        self.remote_addr.is_some()
    }
}

impl Config {
    fn from_spec(spec: file::ServerConfigSpec) -> Result<Self, StartupError> {
        let mut seen: Vec<IpAddr> = Vec::new();
        let mut vifs = Vec::with_capacity(spec.vifs.len());
        for v in spec.vifs {
            // §6.3: duplicates (subnets not disjoint from already-installed
            // vifs) are skipped with a warning, not a hard failure.
            if seen.contains(&v.local_addr) {
                log::warn!(
                    "skipping vif {}: local address already installed on another vif",
                    v.local_addr
                );
                continue;
            }
            seen.push(v.local_addr);
            let is_tunnel = v.remote_addr.is_some();
            vifs.push(VifConfig {
                local_addr: v.local_addr,
                remote_addr: v.remote_addr,
                metric: v.metric,
                threshold: v.threshold,
                advertised_cost_adjustment: v.advertised_cost_adjustment,
                prune_lifetime: v.prune_lifetime,
                igmp_mode: match v.igmp_mode {
                    IgmpModeSpec::V1 => IgmpMode::V1,
                    IgmpModeSpec::V2 => IgmpMode::V2,
                    IgmpModeSpec::V3 => IgmpMode::V3,
                },
                enabled: v.enabled,
                passive: v.passive,
                leaf: v.leaf,
                no_flood: v.no_flood,
                no_transit: v.no_transit,
                allow_non_pruners: v.allow_non_pruners,
                // Automatically true for tunnels unless explicitly set (§9
                // Open Questions).
                retransmit_prunes: v.retransmit_prunes.unwrap_or(is_tunnel),
                accept_filters: v.accept_filters.into_iter().map(Into::into).collect(),
                scope: v.scope,
            });
        }
        Ok(Config {
            router_id: spec.router_id,
            vifs,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retransmit_prunes_defaults_for_tunnel() {
        let toml = r#"
            router_id = "10.0.0.1"

            [[vifs]]
            local_addr = "10.0.0.1"
            remote_addr = "192.0.2.1"

            [[vifs]]
            local_addr = "10.0.0.2"
        "#;
        let spec = file::ServerConfigSpec::from_file_str(toml).unwrap();
        let cfg = Config::from_spec(spec).unwrap();
        assert!(cfg.vifs[0].retransmit_prunes);
        assert!(!cfg.vifs[1].retransmit_prunes);
    }

    #[test]
    fn test_duplicate_local_addr_skipped() {
        let toml = r#"
            router_id = "10.0.0.1"

            [[vifs]]
            local_addr = "10.0.0.1"

            [[vifs]]
            local_addr = "10.0.0.1"
        "#;
        let spec = file::ServerConfigSpec::from_file_str(toml).unwrap();
        let cfg = Config::from_spec(spec).unwrap();
        assert_eq!(cfg.vifs.len(), 1);
    }
}
