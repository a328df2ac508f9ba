//! Raw IGMP socket (§6.1, §6.2): the one piece of transport the teacher
//! never needed (BGP runs over TCP). `socket2` gives us the `IP_HDRINCL`,
//! multicast-join, and TTL knobs a raw IP socket needs without hand-rolling
//! the `setsockopt` calls, the same way the teacher reaches for `net2` for
//! its TCP listener options.

use std::io;
use std::mem::MaybeUninit;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use tokio::io::unix::AsyncFd;

use crate::error::StartupError;

/// All DVMRP routers (224.0.0.4) and all IGMP routers (224.0.0.2), joined at
/// startup on every subnet vif so probes/reports/prunes/grafts are received
/// without per-group joins (§4.5, §4.3).
pub const ALL_DVMRP_ROUTERS: Ipv4Addr = Ipv4Addr::new(224, 0, 0, 4);
pub const ALL_IGMP_ROUTERS: Ipv4Addr = Ipv4Addr::new(224, 0, 0, 2);

/// Wraps one `IPPROTO_IGMP`, `IP_HDRINCL` raw socket shared by every vif
/// (§6.1 "one shared raw socket, not one per interface").
pub struct RawIgmpSocket {
    inner: AsyncFd<Socket>,
}

impl RawIgmpSocket {
    /// Open and configure the shared raw socket. Requires `CAP_NET_RAW`
    /// (root) — failure here is a [`StartupError::RawSocket`], not a
    /// retryable condition (§7).
    pub fn open() -> Result<Self, StartupError> {
        let socket = Socket::new(Domain::IPV4, Type::RAW, Some(Protocol::from(libc_igmp_proto())))
            .map_err(|e| StartupError::RawSocket(e.to_string()))?;
        socket.set_header_included(true).map_err(|e| StartupError::RawSocket(e.to_string()))?;
        socket.set_nonblocking(true).map_err(|e| StartupError::RawSocket(e.to_string()))?;
        socket.set_multicast_ttl_v4(1).map_err(|e| StartupError::RawSocket(e.to_string()))?;
        let inner = AsyncFd::new(socket).map_err(|e| StartupError::RawSocket(e.to_string()))?;
        Ok(Self { inner })
    }

    pub fn join_multicast(&self, group: Ipv4Addr, iface: Ipv4Addr) -> io::Result<()> {
        self.inner.get_ref().join_multicast_v4(&group, &iface)
    }

    pub fn set_multicast_if(&self, iface: Ipv4Addr) -> io::Result<()> {
        self.inner.get_ref().set_multicast_if_v4(&iface)
    }

    /// Receive one datagram, including its IP header (`IP_HDRINCL` applies
    /// to both directions on a raw socket).
    pub async fn recv(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        loop {
            let mut guard = self.inner.readable().await?;
            let uninit = unsafe { &mut *(buf as *mut [u8] as *mut [MaybeUninit<u8>]) };
            match guard.try_io(|inner| {
                let (n, addr) = inner.get_ref().recv_from(uninit)?;
                Ok((n, addr.as_socket().expect("raw IPv4 socket always yields a SocketAddr")))
            }) {
                Ok(result) => return result,
                Err(_would_block) => continue,
            }
        }
    }

    /// Send a fully-framed IP+IGMP datagram (caller has already prepended
    /// the IP header with the Router Alert option, §6.1).
    pub async fn send_to(&self, buf: &[u8], dst: Ipv4Addr) -> io::Result<usize> {
        let addr = SockAddr::from(SocketAddr::V4(SocketAddrV4::new(dst, 0)));
        loop {
            let mut guard = self.inner.writable().await?;
            match guard.try_io(|inner| inner.get_ref().send_to(buf, &addr)) {
                Ok(result) => return result,
                Err(_would_block) => continue,
            }
        }
    }
}

/// `IPPROTO_IGMP` (2), named via a helper rather than pulling in `libc` for
/// a single constant.
fn libc_igmp_proto() -> i32 {
    2
}
