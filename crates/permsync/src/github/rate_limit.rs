use std::num::NonZeroU32;
use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};

use crate::http::HttpResponse;

type GovernorRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// GitHub allows 5000 requests/hour per token; 10/sec leaves room for bursts.
pub const GITHUB_DEFAULT_RPS: u32 = 10;

/// Client-side request pacing shared by every clone of a client.
#[derive(Clone)]
pub struct ApiRateLimiter {
    inner: Arc<GovernorRateLimiter>,
}

impl ApiRateLimiter {
    /// `requests_per_second` of 0 is treated as 1.
    pub fn new(requests_per_second: u32) -> Self {
        let rps = NonZeroU32::new(requests_per_second).unwrap_or(NonZeroU32::MIN);
        Self {
            inner: Arc::new(RateLimiter::direct(Quota::per_second(rps))),
        }
    }

    pub async fn wait(&self) {
        self.inner.until_ready().await;
    }
}

impl Default for ApiRateLimiter {
    fn default() -> Self {
        Self::new(GITHUB_DEFAULT_RPS)
    }
}

/// If `resp` reports an exhausted primary rate limit, the instant it resets.
///
/// GitHub answers 403 (or 429) with `x-ratelimit-remaining: 0`; a 429 without
/// headers is treated as exhausted until now.
pub fn exhausted_until(resp: &HttpResponse) -> Option<DateTime<Utc>> {
    if resp.status != 403 && resp.status != 429 {
        return None;
    }
    let remaining = resp
        .header("x-ratelimit-remaining")
        .and_then(|v| v.trim().parse::<u64>().ok());
    match remaining {
        Some(0) => {}
        None if resp.status == 429 => {}
        _ => return None,
    }
    let reset_at = resp
        .header("x-ratelimit-reset")
        .and_then(|v| v.trim().parse::<i64>().ok())
        .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
        .unwrap_or_else(Utc::now);
    Some(reset_at)
}
