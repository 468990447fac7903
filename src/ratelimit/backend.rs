//! Counter backend contract shared by the local and Redis implementations.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::key::CounterKey;
use super::policy::Policy;
use crate::error::Result;

/// Outcome of one admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Decision {
    /// Whether the request may proceed
    pub allowed: bool,
    /// Admissions left in the current window
    pub remaining: u64,
    /// When the current window ends, in epoch milliseconds
    pub reset_at: u64,
    /// The quota of the policy that produced this decision
    pub limit: u64,
}

impl Decision {
    /// An admission that leaves `count` of `limit` used.
    pub fn admitted(limit: u64, count: u64, reset_at: u64) -> Self {
        Self {
            allowed: true,
            remaining: limit.saturating_sub(count),
            reset_at,
            limit,
        }
    }

    /// A denial; `remaining` is always zero.
    pub fn denied(limit: u64, reset_at: u64) -> Self {
        Self {
            allowed: false,
            remaining: 0,
            reset_at,
            limit,
        }
    }
}

/// Which backend produced a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Process-local counter table
    Local,
    /// Shared Redis counter store
    Redis,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Local => f.write_str("local"),
            BackendKind::Redis => f.write_str("redis"),
        }
    }
}

/// Trait for counter backends.
///
/// Implementations run the whole check-and-increment for one key as a
/// single atomic step, so concurrent callers can never push a counter past
/// the policy quota.
#[async_trait]
pub trait CounterBackend: Send + Sync {
    /// Count one request for `key` under `policy` at `now_ms` and decide it.
    async fn check(&self, key: &CounterKey, policy: &Policy, now_ms: u64) -> Result<Decision>;

    /// The kind of this backend.
    fn kind(&self) -> BackendKind;
}
