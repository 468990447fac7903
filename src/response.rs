//! Transport-facing rendering of decisions.
//!
//! Every gated response carries the rate limit headers, whatever the
//! outcome. A denial additionally becomes a `429 Too Many Requests` with a
//! `Retry-After` header and a JSON body. Nothing here decides anything.

use http::header::{HeaderName, HeaderValue, RETRY_AFTER};
use http::{HeaderMap, StatusCode};
use serde::{Deserialize, Serialize};

use crate::ratelimit::Decision;

/// Quota of the applied policy.
pub const LIMIT_HEADER: HeaderName = HeaderName::from_static("x-ratelimit-limit");
/// Admissions left in the current window.
pub const REMAINING_HEADER: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
/// End of the current window, epoch milliseconds.
pub const RESET_HEADER: HeaderName = HeaderName::from_static("x-ratelimit-reset");

/// Body of a rejected request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExceededBody {
    /// Short error label
    pub error: String,
    /// Human-readable explanation
    pub message: String,
    /// Whole seconds until the window resets
    pub retry_after_seconds: u64,
    /// Quota of the applied policy
    pub limit: u64,
    /// Always zero on a rejection
    pub remaining: u64,
    /// End of the current window, epoch milliseconds
    pub reset_at: u64,
}

/// Everything a transport needs to reject a request.
#[derive(Debug, Clone)]
pub struct Rejection {
    /// Always `429 Too Many Requests`
    pub status: StatusCode,
    /// Rate limit headers plus `Retry-After`
    pub headers: HeaderMap,
    /// JSON payload
    pub body: ExceededBody,
}

impl Rejection {
    /// Serialize the body.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!(self.body)
    }
}

/// Headers describing a decision: limit, remaining and reset time.
pub fn rate_limit_headers(decision: &Decision) -> HeaderMap {
    let mut headers = HeaderMap::with_capacity(4);
    headers.insert(LIMIT_HEADER, HeaderValue::from(decision.limit));
    headers.insert(REMAINING_HEADER, HeaderValue::from(decision.remaining));
    headers.insert(RESET_HEADER, HeaderValue::from(decision.reset_at));
    headers
}

/// Whole seconds from `now_ms` until the decision's window resets.
///
/// Rounded up, and never below one: a client told to retry after zero
/// seconds would come straight back to a full window.
pub fn retry_after_seconds(decision: &Decision, now_ms: u64) -> u64 {
    decision.reset_at.saturating_sub(now_ms).div_ceil(1000).max(1)
}

/// Build the rejection for a denied decision; `None` when it was allowed.
pub fn exceeded(decision: &Decision, now_ms: u64) -> Option<Rejection> {
    if decision.allowed {
        return None;
    }

    let retry_after = retry_after_seconds(decision, now_ms);
    let mut headers = rate_limit_headers(decision);
    headers.insert(RETRY_AFTER, HeaderValue::from(retry_after));

    Some(Rejection {
        status: StatusCode::TOO_MANY_REQUESTS,
        headers,
        body: ExceededBody {
            error: "Too many requests".to_string(),
            message: format!(
                "Rate limit exceeded. Try again in {} seconds.",
                retry_after
            ),
            retry_after_seconds: retry_after,
            limit: decision.limit,
            remaining: 0,
            reset_at: decision.reset_at,
        },
    })
}
