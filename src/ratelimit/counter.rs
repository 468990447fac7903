//! Fixed-window counter entry.

use super::backend::Decision;
use super::policy::Policy;

/// A counter tracking admissions for one key within a fixed window.
///
/// Not synchronised on its own: the owning table serialises access per key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CounterEntry {
    /// Admissions counted in the current window
    count: u64,
    /// When the current window ends, in epoch milliseconds
    window_reset_at: u64,
}

impl CounterEntry {
    /// Open a window at `now_ms` with the first admission already counted.
    pub fn open(policy: &Policy, now_ms: u64) -> Self {
        Self {
            count: 1,
            window_reset_at: now_ms.saturating_add(policy.window_ms()),
        }
    }

    /// Count one request and decide it.
    ///
    /// An expired window is replaced by a fresh one opened at `now_ms`. A
    /// full window denies without incrementing.
    pub fn admit(&mut self, policy: &Policy, now_ms: u64) -> Decision {
        if self.is_expired(now_ms) {
            *self = Self::open(policy, now_ms);
        } else if self.count >= policy.quota {
            return Decision::denied(policy.quota, self.window_reset_at);
        } else {
            self.count += 1;
        }

        Decision::admitted(policy.quota, self.count, self.window_reset_at)
    }

    /// Whether the window has ended at `now_ms`.
    pub fn is_expired(&self, now_ms: u64) -> bool {
        now_ms >= self.window_reset_at
    }

    /// Get the current count.
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Get the reset time of the current window.
    pub fn window_reset_at(&self) -> u64 {
        self.window_reset_at
    }
}
