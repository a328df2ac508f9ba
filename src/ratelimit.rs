//! Log rate limiter (§7): at most ~20 warnings per minute; once exceeded,
//! further warnings are suppressed for 10 minutes, then re-enabled. Modeled
//! as a plain countdown struct in the style of the teacher's `HoldTimer`,
//! advanced by the caller rather than ticking on its own clock.

use chrono::{DateTime, Duration, Utc};

use crate::utils::get_elapsed_time;

const WARNINGS_PER_WINDOW: u32 = 20;
const WINDOW: i64 = 60;
const SUPPRESS_FOR: i64 = 600;

#[derive(Debug)]
pub struct RateLimiter {
    window_start: DateTime<Utc>,
    count_in_window: u32,
    suppressed_until: Option<DateTime<Utc>>,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self {
            window_start: Utc::now(),
            count_in_window: 0,
            suppressed_until: None,
        }
    }
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Call at each would-be log line. Returns `true` if the line should
    /// actually be emitted.
    pub fn allow(&mut self) -> bool {
        let now = Utc::now();
        if let Some(until) = self.suppressed_until {
            if now < until {
                return false;
            }
            self.suppressed_until = None;
            self.count_in_window = 0;
            self.window_start = now;
        }
        if get_elapsed_time(self.window_start) > Duration::seconds(WINDOW) {
            self.window_start = now;
            self.count_in_window = 0;
        }
        self.count_in_window += 1;
        if self.count_in_window > WARNINGS_PER_WINDOW {
            self.suppressed_until = Some(now + Duration::seconds(SUPPRESS_FOR));
            return false;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allows_under_threshold() {
        let mut rl = RateLimiter::new();
        for _ in 0..WARNINGS_PER_WINDOW {
            assert!(rl.allow());
        }
    }

    #[test]
    fn test_suppresses_over_threshold() {
        let mut rl = RateLimiter::new();
        for _ in 0..WARNINGS_PER_WINDOW {
            rl.allow();
        }
        assert!(!rl.allow());
        assert!(!rl.allow());
    }
}
