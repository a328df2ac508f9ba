//! Small helpers shared across modules: IPv4 <-> integer conversions and
//! elapsed-time formatting, in the vein of the small free functions the
//! teacher keeps in its own `utils` module rather than scattering them.

use std::net::Ipv4Addr;

use chrono::{DateTime, Duration, Utc};

pub fn ipv4_to_u32(addr: Ipv4Addr) -> u32 {
    u32::from_be_bytes(addr.octets())
}

pub fn u32_to_ipv4(value: u32) -> Ipv4Addr {
    Ipv4Addr::from(value.to_be_bytes())
}

/// How long ago `since` was, floored at zero.
pub fn get_elapsed_time(since: DateTime<Utc>) -> Duration {
    let elapsed = Utc::now() - since;
    if elapsed < Duration::zero() {
        Duration::zero()
    } else {
        elapsed
    }
}

/// Render a [`Duration`] as `HH:MM:SS`, matching the uptime/age formatting
/// convention used throughout the daemon's logs.
pub fn format_elapsed_time(duration: Duration) -> String {
    let total_seconds = duration.num_seconds().max(0);
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;
    format!("{:02}:{:02}:{:02}", hours, minutes, seconds)
}

pub fn format_time_as_elapsed(since: DateTime<Utc>) -> String {
    format_elapsed_time(get_elapsed_time(since))
}
