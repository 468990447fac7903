//! Redis-backed counter backend for multi-instance deployments.
//!
//! The fixed-window check runs server-side as a Lua script, so Redis'
//! single-threaded script execution gives the same per-key atomicity as the
//! local table. Counters live in a hash (`count`, `reset_at`) that expires
//! with its window.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{ConnectionInfo, IntoConnectionInfo, Script};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info, trace};

use super::backend::{BackendKind, CounterBackend, Decision};
use super::key::CounterKey;
use super::policy::Policy;
use crate::config::SharedSettings;
use crate::error::{QuotaError, Result};

/// Atomic fixed-window check.
///
/// KEYS[1] counter hash, ARGV = now_ms, window_ms, quota.
/// Returns `{allowed, count, reset_at}`.
const CHECK_SCRIPT: &str = r#"
local key = KEYS[1]
local now_ms = tonumber(ARGV[1])
local window_ms = tonumber(ARGV[2])
local quota = tonumber(ARGV[3])

local count = tonumber(redis.call('HGET', key, 'count'))
local reset_at = tonumber(redis.call('HGET', key, 'reset_at'))

if count == nil or reset_at == nil or now_ms >= reset_at then
    reset_at = now_ms + window_ms
    redis.call('HSET', key, 'count', 1, 'reset_at', reset_at)
    redis.call('PEXPIRE', key, window_ms)
    return {1, 1, reset_at}
end

if count >= quota then
    return {0, count, reset_at}
end

count = redis.call('HINCRBY', key, 'count', 1)
return {1, count, reset_at}
"#;

/// Counter backend shared by every instance pointing at the same Redis.
pub struct RedisBackend {
    conn: ConnectionManager,
    key_prefix: String,
    timeout: Duration,
    script: Script,
}

impl RedisBackend {
    /// Connect to Redis and verify it answers a `PING`.
    ///
    /// `settings.token`, when set, is used as the password unless the URL
    /// already carries one.
    pub async fn connect(settings: &SharedSettings) -> Result<Self> {
        let info = connection_info(settings)?;
        let timeout = settings.timeout();
        let client = redis::Client::open(info)?;
        let conn = with_timeout(timeout, async {
            ConnectionManager::new(client).await.map_err(QuotaError::from)
        })
        .await?;

        let backend = Self {
            conn,
            key_prefix: settings.key_prefix.clone(),
            timeout,
            script: Script::new(CHECK_SCRIPT),
        };
        backend.ping().await?;

        info!(
            key_prefix = %backend.key_prefix,
            timeout_ms = timeout.as_millis() as u64,
            "Connected to shared counter backend"
        );
        Ok(backend)
    }

    /// Round-trip a `PING`.
    pub async fn ping(&self) -> Result<()> {
        let mut conn = self.conn.clone();
        let reply: String = with_timeout(self.timeout, async {
            redis::cmd("PING")
                .query_async(&mut conn)
                .await
                .map_err(QuotaError::from)
        })
        .await?;

        if reply != "PONG" {
            return Err(QuotaError::Backend(format!("unexpected PING reply '{}'", reply)));
        }
        Ok(())
    }

    /// Get the Redis key for a counter.
    fn redis_key(&self, key: &CounterKey) -> String {
        format!("{}{}", self.key_prefix, key.to_string_key())
    }
}

#[async_trait]
impl CounterBackend for RedisBackend {
    async fn check(&self, key: &CounterKey, policy: &Policy, now_ms: u64) -> Result<Decision> {
        let mut conn = self.conn.clone();
        let redis_key = self.redis_key(key);

        trace!(key = %redis_key, quota = policy.quota, "Checking shared counter");

        let reply: Vec<i64> = with_timeout(self.timeout, async {
            self.script
                .key(&redis_key)
                .arg(now_ms)
                .arg(policy.window_ms())
                .arg(policy.quota)
                .invoke_async(&mut conn)
                .await
                .map_err(QuotaError::from)
        })
        .await?;

        let decision = decision_from_reply(&reply, policy.quota)?;
        if !decision.allowed {
            debug!(key = %redis_key, limit = decision.limit, reset_at = decision.reset_at, "Quota exceeded");
        }
        Ok(decision)
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Redis
    }
}

/// Resolve the configured URL and credential into connection parameters.
///
/// A password embedded in the URL takes precedence over `token`.
fn connection_info(settings: &SharedSettings) -> Result<ConnectionInfo> {
    let url = settings
        .url
        .as_deref()
        .ok_or_else(|| QuotaError::Config("shared backend URL is not set".to_string()))?;

    let mut info = url.into_connection_info()?;
    if info.redis.password.is_none() {
        info.redis.password = settings.token.clone();
    }
    Ok(info)
}

/// Map the script's `{allowed, count, reset_at}` reply onto a [`Decision`].
fn decision_from_reply(reply: &[i64], quota: u64) -> Result<Decision> {
    let [allowed, count, reset_at] = reply else {
        return Err(QuotaError::Backend(format!(
            "expected 3 values from check script, got {}",
            reply.len()
        )));
    };

    let reset_at = (*reset_at).max(0) as u64;
    if *allowed == 1 {
        Ok(Decision::admitted(quota, (*count).max(0) as u64, reset_at))
    } else {
        Ok(Decision::denied(quota, reset_at))
    }
}

/// Bound a Redis round trip; an elapsed timeout is a backend failure.
async fn with_timeout<T, F>(timeout: Duration, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::time::timeout(timeout, fut)
        .await
        .map_err(|_| QuotaError::Timeout(timeout))?
}
