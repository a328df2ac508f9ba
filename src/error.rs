use std::error;
use std::fmt;
use std::io;

/// Errors surfaced by the packet dispatcher and the subsystems it calls into.
///
/// This is the non-fatal half of the error taxonomy: every variant here is
/// absorbed by the dispatcher into a rate-limited log line, never propagated
/// to the point of aborting the process. Fatal startup conditions use
/// [`StartupError`] instead.
#[derive(Debug)]
pub enum DvmrpError {
    /// Packet shorter than its declared header, or otherwise truncated.
    MalformedPacket(String),
    /// Report, prune, graft, or probe received from a router we don't peer with.
    NonNeighbor(std::net::IpAddr),
    /// Prune/graft referencing a vif that isn't a child on the relevant route.
    InvalidPrune(String),
    /// Report carrying an (origin, mask) pair that doesn't describe a subnet.
    InvalidReport(String),
    /// Neighbor index pool (MAXNBRS) exhausted.
    TooManyNeighbors,
    /// Socket/IO failure talking to a peer or the kernel.
    Transport(String),
    Other(String),
}

impl fmt::Display for DvmrpError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use DvmrpError::*;
        match self {
            MalformedPacket(reason) => write!(f, "malformed packet: {}", reason),
            NonNeighbor(addr) => write!(f, "message from non-neighbor {}", addr),
            InvalidPrune(reason) => write!(f, "invalid prune/graft: {}", reason),
            InvalidReport(reason) => write!(f, "invalid report: {}", reason),
            TooManyNeighbors => write!(f, "neighbor index pool exhausted"),
            Transport(reason) => write!(f, "transport error: {}", reason),
            Other(reason) => write!(f, "{}", reason),
        }
    }
}

impl error::Error for DvmrpError {}

impl From<io::Error> for DvmrpError {
    fn from(err: io::Error) -> Self {
        DvmrpError::Transport(err.to_string())
    }
}

/// Fatal conditions detected at startup (§7). The only caller that should
/// match on these is `main`, which logs and exits with status 1.
#[derive(Debug)]
pub enum StartupError {
    RawSocket(String),
    KernelVersionMismatch { expected: (u8, u8), found: (u8, u8) },
    AlreadyRunning,
    NotRoot,
    Config(String),
}

impl fmt::Display for StartupError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use StartupError::*;
        match self {
            RawSocket(reason) => write!(f, "failed to open raw IGMP socket: {}", reason),
            KernelVersionMismatch { expected, found } => write!(
                f,
                "kernel forwarding version mismatch: expected {}.{}, found {}.{}",
                expected.0, expected.1, found.0, found.1
            ),
            AlreadyRunning => write!(f, "another multicast router is already running"),
            NotRoot => write!(f, "must run as root (geteuid != 0)"),
            Config(reason) => write!(f, "configuration error: {}", reason),
        }
    }
}

impl error::Error for StartupError {}

impl From<io::Error> for StartupError {
    fn from(err: io::Error) -> Self {
        StartupError::Config(err.to_string())
    }
}
