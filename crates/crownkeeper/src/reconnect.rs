use std::time::Duration;

const RECONNECT_BACKOFF_BASE: Duration = Duration::from_secs(1);
const RECONNECT_BACKOFF_MAX: Duration = Duration::from_secs(60);
pub const RECONNECT_MAX_ATTEMPTS: u32 = 12;

fn backoff_delay(failures: u32) -> Duration {
    // 1s, 2s, 4s, ... capped.
    let pow = failures.saturating_sub(1).min(16);
    let mult: u32 = 1u32.checked_shl(pow).unwrap_or(u32::MAX);
    RECONNECT_BACKOFF_BASE
        .checked_mul(mult)
        .unwrap_or(RECONNECT_BACKOFF_MAX)
        .min(RECONNECT_BACKOFF_MAX)
}

/// Consecutive failed connection attempts for one room.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Backoff {
    failures: u32,
}

impl Backoff {
    pub fn failures(&self) -> u32 {
        self.failures
    }

    /// Records a lost or failed connection. `None` means give up.
    pub fn next_delay(&mut self) -> Option<Duration> {
        self.failures = self.failures.saturating_add(1);
        if self.failures > RECONNECT_MAX_ATTEMPTS {
            return None;
        }
        Some(backoff_delay(self.failures))
    }

    pub fn reset(&mut self) {
        self.failures = 0;
    }
}
