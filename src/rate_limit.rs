//! Sliding-window request limiters.
//!
//! One instance guards login (every attempt counts, successful or not), a
//! second one the authenticated user routes. A key is a client address (see
//! [`client_key`]).

use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use http::HeaderMap;
use tokio::sync::Mutex;

use crate::config::AuthConfig;

/// Prune idle keys once the table grows past this many entries.
const PRUNE_THRESHOLD: usize = 1024;

/// Key used when no client address is known.
pub const UNKNOWN_CLIENT: &str = "unknown";

/// Outcome of a rate limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    /// Attempt allowed; this many remain in the current window.
    Allowed { remaining: u32 },
    /// Attempt refused until the oldest attempt leaves the window.
    Limited { retry_after: Duration },
}

impl RateDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed { .. })
    }
}

/// Per-key sliding-window counter. Cheap to clone; clones share state.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    limit: u32,
    window: Duration,
    attempts: Arc<Mutex<HashMap<String, VecDeque<Instant>>>>,
}

impl RateLimiter {
    pub fn new(limit: u32, window: Duration) -> Self {
        Self {
            limit,
            window,
            attempts: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Limiter for login attempts.
    pub fn for_logins(config: &AuthConfig) -> Self {
        Self::new(config.login_rate_limit, config.login_rate_window())
    }

    /// Limiter for the authenticated `/api/v1/user` routes.
    pub fn for_api(config: &AuthConfig) -> Self {
        Self::new(config.api_rate_limit, config.api_rate_window())
    }

    /// Record an attempt for `key` and decide whether it may proceed.
    pub async fn check(&self, key: &str) -> RateDecision {
        self.check_at(key, Instant::now()).await
    }

    pub async fn check_at(&self, key: &str, now: Instant) -> RateDecision {
        let mut attempts = self.attempts.lock().await;

        if attempts.len() > PRUNE_THRESHOLD {
            let window = self.window;
            attempts.retain(|_, times| {
                times
                    .back()
                    .is_some_and(|last| now.saturating_duration_since(*last) < window)
            });
        }

        let times = attempts.entry(key.to_string()).or_default();
        while times
            .front()
            .is_some_and(|first| now.saturating_duration_since(*first) >= self.window)
        {
            times.pop_front();
        }

        if times.len() >= self.limit as usize {
            let retry_after = times
                .front()
                .map(|first| self.window.saturating_sub(now.saturating_duration_since(*first)))
                .unwrap_or(self.window);
            return RateDecision::Limited { retry_after };
        }

        times.push_back(now);
        RateDecision::Allowed {
            remaining: self.limit.saturating_sub(times.len() as u32),
        }
    }
}

/// Client key for rate limiting: first `X-Forwarded-For` entry, else the
/// peer address, else [`UNKNOWN_CLIENT`].
pub fn client_key(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .or_else(|| peer.map(|addr| addr.ip().to_string()))
        .unwrap_or_else(|| UNKNOWN_CLIENT.to_string())
}
