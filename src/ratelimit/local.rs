//! Process-local counter backend.

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::time::Duration;
use tracing::{debug, info, trace};

use super::backend::{BackendKind, CounterBackend, Decision};
use super::counter::CounterEntry;
use super::key::CounterKey;
use super::policy::Policy;
use crate::error::Result;

/// Default minimum time between two eviction sweeps.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// In-memory fixed-window counters keyed by `(category, identifier)`.
///
/// Each check holds the key's shard lock for the whole read-modify-write, so
/// concurrent callers on one key are serialised. Expired entries are swept
/// inline, at most once per sweep interval.
#[derive(Debug)]
pub struct LocalBackend {
    /// Counters indexed by key
    counters: DashMap<CounterKey, CounterEntry>,
    /// Minimum time between sweeps
    sweep_interval_ms: u64,
    /// Time of the last sweep, in epoch milliseconds
    last_sweep_ms: Mutex<u64>,
}

impl LocalBackend {
    /// Create a backend with the default sweep interval.
    pub fn new() -> Self {
        Self::with_sweep_interval(DEFAULT_SWEEP_INTERVAL)
    }

    /// Create a backend with a custom sweep interval.
    pub fn with_sweep_interval(sweep_interval: Duration) -> Self {
        Self {
            counters: DashMap::new(),
            sweep_interval_ms: sweep_interval.as_millis() as u64,
            last_sweep_ms: Mutex::new(0),
        }
    }

    /// Count one request for `key` and decide it.
    pub fn check_at(&self, key: &CounterKey, policy: &Policy, now_ms: u64) -> Decision {
        self.maybe_sweep(now_ms);

        trace!(key = %key, quota = policy.quota, "Checking local counter");

        let decision = match self.counters.entry(key.clone()) {
            Entry::Vacant(slot) => {
                let entry = CounterEntry::open(policy, now_ms);
                debug!(
                    key = %key,
                    quota = policy.quota,
                    reset_at = entry.window_reset_at(),
                    "Creating new counter"
                );
                let decision =
                    Decision::admitted(policy.quota, entry.count(), entry.window_reset_at());
                slot.insert(entry);
                decision
            }
            Entry::Occupied(mut slot) => slot.get_mut().admit(policy, now_ms),
        };

        if !decision.allowed {
            debug!(
                key = %key,
                limit = decision.limit,
                reset_at = decision.reset_at,
                "Quota exceeded"
            );
        }

        decision
    }

    /// Sweep expired counters if the sweep interval has passed since the last sweep.
    ///
    /// Returns the number of entries removed. Skips when another caller is
    /// already sweeping.
    pub fn maybe_sweep(&self, now_ms: u64) -> usize {
        {
            let Some(mut last) = self.last_sweep_ms.try_lock() else {
                return 0;
            };
            if now_ms.saturating_sub(*last) < self.sweep_interval_ms {
                return 0;
            }
            *last = now_ms;
        }

        self.sweep(now_ms)
    }

    /// Remove every counter whose window has ended at `now_ms`.
    pub fn sweep(&self, now_ms: u64) -> usize {
        let before = self.counters.len();
        self.counters.retain(|_, entry| !entry.is_expired(now_ms));
        let removed = before.saturating_sub(self.counters.len());

        if removed > 0 {
            info!(removed = removed, remaining = self.counters.len(), "Swept expired counters");
        }
        removed
    }

    /// Get the current count for a key, if a counter exists.
    pub fn count_for(&self, key: &CounterKey) -> Option<u64> {
        self.counters.get(key).map(|entry| entry.count())
    }

    /// Get the number of live counters.
    pub fn len(&self) -> usize {
        self.counters.len()
    }

    /// Whether no counters are held.
    pub fn is_empty(&self) -> bool {
        self.counters.is_empty()
    }

    /// Clear all counters.
    pub fn clear(&self) {
        self.counters.clear();
    }
}

impl Default for LocalBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CounterBackend for LocalBackend {
    async fn check(&self, key: &CounterKey, policy: &Policy, now_ms: u64) -> Result<Decision> {
        Ok(self.check_at(key, policy, now_ms))
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Local
    }
}
