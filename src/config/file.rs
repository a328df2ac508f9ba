//! TOML representation of the configuration source (§6.3): an ordered list
//! of candidate vifs plus per-vif filter/scope/mode settings. Two-layer
//! shape (this `*Spec` layer plus the resolved [`super::Config`]) follows
//! the teacher's own config module: `serde` defaults here, server-level
//! fallback resolution in the parent.

use std::fs::File;
use std::io::{self, Read};
use std::net::IpAddr;

use ipnetwork::Ipv4Network;
use serde::{Deserialize, Serialize};

fn default_metric() -> u8 {
    1
}
fn default_threshold() -> u8 {
    1
}
fn default_prune_lifetime() -> u32 {
    7200
}
fn default_mode() -> IgmpModeSpec {
    IgmpModeSpec::V3
}
fn default_false() -> bool {
    false
}
fn default_true() -> bool {
    true
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IgmpModeSpec {
    V1,
    V2,
    V3,
}

/// A single accept/deny route filter entry (§3 vif "route filter").
#[derive(Clone, Debug, Deserialize)]
pub struct FilterSpec {
    pub network: Ipv4Network,
    #[serde(default = "default_false")]
    pub exact: bool,
    #[serde(default = "default_false")]
    pub deny: bool,
    #[serde(default = "default_false")]
    pub bidirectional: bool,
}

#[derive(Clone, Debug, Deserialize)]
pub struct VifConfigSpec {
    pub local_addr: IpAddr,
    /// Present only for point-to-point tunnel vifs; absent means a
    /// physical subnet vif deriving its subnet from the interface
    /// enumerator collaborator.
    pub remote_addr: Option<IpAddr>,

    #[serde(default = "default_metric")]
    pub metric: u8,
    #[serde(default = "default_threshold")]
    pub threshold: u8,
    #[serde(default)]
    pub advertised_cost_adjustment: i8,
    #[serde(default = "default_prune_lifetime")]
    pub prune_lifetime: u32,
    #[serde(default = "default_mode")]
    pub igmp_mode: IgmpModeSpec,

    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_false")]
    pub passive: bool,
    #[serde(default = "default_false")]
    pub leaf: bool,
    #[serde(default = "default_false")]
    pub no_flood: bool,
    #[serde(default = "default_false")]
    pub no_transit: bool,
    #[serde(default = "default_false")]
    pub allow_non_pruners: bool,
    /// Automatically implied `true` for tunnels (§9 Open Questions:
    /// "appears automatically set on point-to-point interfaces but
    /// configurable elsewhere") unless explicitly overridden here.
    pub retransmit_prunes: Option<bool>,

    #[serde(default = "Vec::new")]
    pub accept_filters: Vec<FilterSpec>,
    #[serde(default = "Vec::new")]
    pub scope: Vec<Ipv4Network>,
}

#[derive(Debug, Deserialize)]
pub struct ServerConfigSpec {
    pub router_id: IpAddr,
    #[serde(default = "Vec::new")]
    pub vifs: Vec<VifConfigSpec>,
}

impl ServerConfigSpec {
    pub fn from_file(path: &str) -> io::Result<Self> {
        let mut file = File::open(path)?;
        let mut contents = String::new();
        file.read_to_string(&mut contents)?;
        Self::from_file_str(&contents)
    }

    pub fn from_file_str(contents: &str) -> io::Result<Self> {
        toml::from_str(contents)
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn test_parse_minimal() {
        let toml = r#"
            router_id = "10.0.0.1"

            [[vifs]]
            local_addr = "10.0.0.1"
        "#;
        let spec: ServerConfigSpec = toml::from_str(toml).unwrap();
        assert_eq!(spec.router_id, IpAddr::from(Ipv4Addr::new(10, 0, 0, 1)));
        assert_eq!(spec.vifs.len(), 1);
        assert_eq!(spec.vifs[0].metric, 1);
        assert_eq!(spec.vifs[0].igmp_mode, IgmpModeSpec::V3);
        assert!(spec.vifs[0].enabled);
    }

    #[test]
    fn test_parse_tunnel_vif_with_filters() {
        let toml = r#"
            router_id = "10.0.0.1"

            [[vifs]]
            local_addr = "10.0.0.1"
            remote_addr = "192.0.2.5"
            metric = 3
            leaf = true
            igmp_mode = "v2"

            [[vifs.accept_filters]]
            network = "172.16.0.0/16"
            deny = true
        "#;
        let spec: ServerConfigSpec = toml::from_str(toml).unwrap();
        let vif = &spec.vifs[0];
        assert_eq!(vif.remote_addr, Some(IpAddr::from(Ipv4Addr::new(192, 0, 2, 5))));
        assert_eq!(vif.metric, 3);
        assert!(vif.leaf);
        assert_eq!(vif.igmp_mode, IgmpModeSpec::V2);
        assert_eq!(vif.accept_filters.len(), 1);
        assert!(vif.accept_filters[0].deny);
    }
}
