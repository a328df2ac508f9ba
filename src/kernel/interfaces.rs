//! Interface enumeration collaborator (§6.1): discovers the host's network
//! interfaces at startup so [`crate::config`] can resolve a vif's
//! configured local address down to a concrete, currently-up interface.

use std::net::Ipv4Addr;

use ipnetwork::Ipv4Network;

/// One host interface as reported by the OS.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostInterface {
    pub name: String,
    pub addr: Ipv4Addr,
    pub network: Ipv4Network,
    pub is_up: bool,
    pub is_loopback: bool,
}

/// Collaborator over the host's interface list, kept behind a trait so
/// config resolution can be unit tested without reading `/proc/net` or
/// calling `getifaddrs` (§6.1 "non-goals: runtime interface changes" means
/// this list is read once, at startup, and never re-polled).
pub trait InterfaceEnumerator {
    fn enumerate(&self) -> std::io::Result<Vec<HostInterface>>;
}

/// Stand-in enumerator backed by a fixed list, used by `config` tests and as
/// documentation for what a real `getifaddrs`-backed implementation returns.
#[derive(Debug, Clone, Default)]
pub struct StaticInterfaceEnumerator {
    pub interfaces: Vec<HostInterface>,
}

impl StaticInterfaceEnumerator {
    pub fn new(interfaces: Vec<HostInterface>) -> Self {
        Self { interfaces }
    }
}

impl InterfaceEnumerator for StaticInterfaceEnumerator {
    fn enumerate(&self) -> std::io::Result<Vec<HostInterface>> {
        Ok(self.interfaces.clone())
    }
}

/// Find the first up, non-loopback interface whose network contains `addr`.
pub fn find_owning_interface<'a>(interfaces: &'a [HostInterface], addr: Ipv4Addr) -> Option<&'a HostInterface> {
    interfaces.iter().find(|i| i.is_up && !i.is_loopback && i.network.contains(addr))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn iface(name: &str, addr: &str, cidr: &str, up: bool) -> HostInterface {
        HostInterface {
            name: name.into(),
            addr: addr.parse().unwrap(),
            network: cidr.parse().unwrap(),
            is_up: up,
            is_loopback: false,
        }
    }

    #[test]
    fn test_find_owning_interface() {
        let interfaces = vec![
            iface("eth0", "10.0.0.1", "10.0.0.0/24", true),
            iface("eth1", "192.168.1.1", "192.168.1.0/24", true),
        ];
        let found = find_owning_interface(&interfaces, "10.0.0.5".parse().unwrap());
        assert_eq!(found.unwrap().name, "eth0");
    }

    #[test]
    fn test_down_interface_excluded() {
        let interfaces = vec![iface("eth0", "10.0.0.1", "10.0.0.0/24", false)];
        assert!(find_owning_interface(&interfaces, "10.0.0.5".parse().unwrap()).is_none());
    }
}
