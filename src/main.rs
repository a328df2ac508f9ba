//! Daemon entry point (§5, §7). Mirrors the teacher's `main.rs`: parse CLI
//! flags with `clap`'s derive API, wire up `env_logger` from a verbosity
//! count, install signal handling, then hand off to a single cooperative
//! tokio task that owns every subsystem — DVMRP's own concurrency model is
//! "one thread, one select loop" (§5), not a task-per-peer pool.

use std::net::Ipv4Addr;
use std::process::ExitCode;

use clap::Parser;
use tokio::time::{Duration, Instant};

use dvmrpd::config;
use dvmrpd::error::StartupError;
use dvmrpd::genid;
use dvmrpd::igmp;
use dvmrpd::kernel::{ForwardingCache, NullForwardingCache};
use dvmrpd::neighbor::NeighborTable;
use dvmrpd::packet::{self, wire::IpHeaderByteOrder};
use dvmrpd::rib::RoutingTable;
use dvmrpd::signals::{self, ShutdownReason};
use dvmrpd::socket::RawIgmpSocket;
use dvmrpd::timer::TimerQueue;
use dvmrpd::vif::InterfaceTable;

/// DVMRP multicast routing daemon.
#[derive(Parser, Debug)]
#[command(name = "dvmrpd", version, about)]
struct Args {
    /// Path to the TOML config file.
    #[arg(short, long, default_value = "/etc/dvmrpd.toml")]
    config: String,

    /// Increase log verbosity (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Run config validation only, then exit.
    #[arg(long)]
    check_config: bool,
}

fn init_logging(verbosity: u8) {
    let level = match verbosity {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    env_logger::Builder::new().filter_level(level).init();
}

/// §7: refuse to start as non-root, since raw sockets and `ip_mroute`
/// require it.
#[cfg(unix)]
fn require_root() -> Result<(), StartupError> {
    if unsafe { geteuid() } != 0 {
        return Err(StartupError::NotRoot);
    }
    Ok(())
}

#[cfg(unix)]
extern "C" {
    fn geteuid() -> u32;
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.verbose);

    if let Err(e) = require_root() {
        log::error!("startup failed: {e}");
        return ExitCode::FAILURE;
    }

    let cfg = match config::from_file(&args.config) {
        Ok(cfg) => cfg,
        Err(e) => {
            log::error!("startup failed: {e}");
            return ExitCode::FAILURE;
        }
    };

    if args.check_config {
        log::info!("config OK: {} vif(s)", cfg.vifs.len());
        return ExitCode::SUCCESS;
    }

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            log::error!("failed to start tokio runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cfg, args.config)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("startup failed: {e}");
            ExitCode::FAILURE
        }
    }
}

/// §5 end-to-end run loop: bring up the kernel forwarding cache, install
/// vifs, then drain socket readiness / timer expiry / shutdown signals
/// until asked to stop.
async fn run(cfg: config::Config, config_path: String) -> Result<(), StartupError> {
    log::info!("starting dvmrpd, router_id={}", cfg.router_id);

    let mut ifaces = InterfaceTable::new();
    ifaces.install(&cfg.vifs);

    let mut kernel = NullForwardingCache::new();
    kernel.init().await?;
    for vif in ifaces.iter() {
        let remote = vif.remote_addr().and_then(|a| match a {
            std::net::IpAddr::V4(v4) => Some(v4),
            _ => None,
        });
        kernel
            .add_vif(vif.index as u16, as_v4(vif.local_addr), vif.threshold, vif.is_tunnel(), remote)
            .await?;
    }

    let genid_path = genid::default_path().to_path_buf();
    let genid = genid::load_and_advance(&genid_path, genid::now_epoch_secs()).unwrap_or_else(|e| {
        log::warn!("failed to persist generation id ({e}), using a fresh one");
        genid::now_epoch_secs()
    });
    log::info!("generation id {genid}");

    let raw_socket = RawIgmpSocket::open()?;
    for vif in ifaces.iter().filter(|v| !v.is_tunnel()) {
        let local = as_v4(vif.local_addr);
        let _ = raw_socket.join_multicast(dvmrpd::socket::ALL_DVMRP_ROUTERS, local);
        let _ = raw_socket.join_multicast(dvmrpd::socket::ALL_IGMP_ROUTERS, local);
    }

    let mut neighbors = NeighborTable::new();
    let mut routes = RoutingTable::new();
    let mut memberships: Vec<igmp::VifMembership> = ifaces.iter().map(|_| igmp::VifMembership::new()).collect();
    let mut timers = TimerQueue::new();

    let mut shutdown_rx = signals::install().map_err(|e| StartupError::Config(e.to_string()))?;

    // §4.1: the fast timer (route/neighbor aging) fires every second; the
    // slow timer (report generation) every REPORT_INTERVAL, handled by the
    // timer queue rather than a second interval here.
    let mut fast_tick = tokio::time::interval(Duration::from_secs(1));
    let mut last_tick = Instant::now();
    let mut recv_buf = vec![0u8; 2048];
    let byte_order = IpHeaderByteOrder { host_order_lengths: false };

    loop {
        tokio::select! {
            reason = shutdown_rx.recv() => {
                match reason {
                    Some(ShutdownReason::Graceful) | None => {
                        log::info!("shutting down");
                        shutdown(&mut kernel, &mut routes).await;
                        return Ok(());
                    }
                    Some(ShutdownReason::Restart) => {
                        log::info!("SIGHUP received, re-reading configuration");
                        match config::from_file(&config_path) {
                            Ok(new_cfg) => {
                                ifaces = InterfaceTable::new();
                                ifaces.install(&new_cfg.vifs);
                            }
                            Err(e) => log::error!("config reload failed, keeping running config: {e}"),
                        }
                    }
                }
            }

            _ = fast_tick.tick() => {
                let now = Instant::now();
                let elapsed = now.duration_since(last_tick).as_secs() as i64;
                last_tick = now;
                timers.age(elapsed);
                for handle in neighbors.age(elapsed) {
                    if let Some(expired) = neighbors.remove(handle) {
                        dvmrpd::rib::delete_neighbor_from_routes(&mut routes, expired.addr, expired.vif, handle.index, handle);
                    }
                }
                for discarded in routes.age(elapsed) {
                    log::debug!("route {discarded} discarded by aging");
                }
                for vm in memberships.iter_mut() {
                    for expired in vm.age(elapsed) {
                        log::debug!("local membership {expired} expired");
                    }
                }
            }

            recv_result = raw_socket.recv(&mut recv_buf) => {
                match recv_result {
                    Ok((n, _peer)) => {
                        if let Err(e) = handle_datagram(&recv_buf[..n], byte_order) {
                            log::warn!("dropping packet: {e}");
                        }
                    }
                    Err(e) => log::warn!("raw socket recv error: {e}"),
                }
            }
        }
    }
}

fn handle_datagram(raw: &[u8], byte_order: IpHeaderByteOrder) -> Result<(), dvmrpd::error::DvmrpError> {
    use dvmrpd::packet::wire::ParsedDatagram;
    match packet::wire::parse_datagram(raw, byte_order)? {
        ParsedDatagram::Upcall { source, group } => {
            log::debug!("kernel upcall for ({source}, {group})");
            Ok(())
        }
        ParsedDatagram::Igmp { src, body, .. } => {
            let classified = packet::classify(src, &body)?;
            // TODO: route `classified` into the neighbor/rib/forwarding/igmp
            // handlers once inbound-vif resolution (IP_PKTINFO ancillary
            // data on the raw socket) is wired up.
            log::trace!("classified inbound message: {classified:?}");
            Ok(())
        }
    }
}

async fn shutdown(kernel: &mut NullForwardingCache, routes: &mut RoutingTable) {
    for route in routes.iter() {
        log::debug!("advertising final unreachable metric for {}/{}", route.origin.network, route.origin.prefix_len);
    }
    if let Err(e) = kernel.done().await {
        log::warn!("error tearing down kernel forwarding state: {e}");
    }
}

fn as_v4(addr: std::net::IpAddr) -> Ipv4Addr {
    match addr {
        std::net::IpAddr::V4(v4) => v4,
        std::net::IpAddr::V6(_) => Ipv4Addr::UNSPECIFIED,
    }
}

