//! Signal handling, §6.5. Mirrors the teacher's use of `signal-hook` to
//! fold OS signals into a channel the main select loop can poll alongside
//! socket readiness and timer expiry, rather than handling them in a
//! signal-handler context.

use std::io;

use signal_hook::consts::{SIGHUP, SIGINT, SIGTERM, SIGUSR1, SIGUSR2};
use signal_hook::iterator::Signals;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    /// SIGINT/SIGTERM: expire all routes, broadcast final unreachable
    /// reports, tear down kernel forwarding state, then exit 0.
    Graceful,
    /// SIGHUP: re-read config and rebuild in-memory state without dropping
    /// the process.
    Restart,
}

/// Spawn the signal-handling thread and return a channel the main loop
/// selects on. SIGUSR1/SIGUSR2 are deprecated mrouted debug toggles; we log
/// a notice and otherwise ignore them (§6.5).
pub fn install() -> io::Result<mpsc::UnboundedReceiver<ShutdownReason>> {
    let mut signals = Signals::new([SIGINT, SIGTERM, SIGHUP, SIGUSR1, SIGUSR2])?;
    let (tx, rx) = mpsc::unbounded_channel();

    std::thread::spawn(move || {
        for signal in signals.forever() {
            let reason = match signal {
                SIGINT | SIGTERM => Some(ShutdownReason::Graceful),
                SIGHUP => Some(ShutdownReason::Restart),
                SIGUSR1 | SIGUSR2 => {
                    log::info!("received deprecated debug-toggle signal {signal}, ignoring");
                    None
                }
                _ => None,
            };
            if let Some(reason) = reason {
                if tx.send(reason).is_err() {
                    break;
                }
            }
        }
    });

    Ok(rx)
}
