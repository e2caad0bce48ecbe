//! Fixed-window rate-limit quotas and decisions.

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DomainError;

/// Upper bound on a window length; keeps timestamp arithmetic in range.
const MAX_WINDOW: Duration = Duration::from_secs(366 * 24 * 60 * 60);

/// How many requests an identifier may make per fixed window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quota {
    limit: u32,
    window: Duration,
}

impl Quota {
    /// Build a quota, rejecting a zero limit, a zero window, or a window
    /// longer than a year.
    pub fn new(limit: u32, window: Duration) -> Result<Self, DomainError> {
        if limit == 0 {
            return Err(DomainError::Validation(
                "rate limit must be greater than zero".to_string(),
            ));
        }
        if window.is_zero() {
            return Err(DomainError::Validation(
                "rate limit window must be greater than zero".to_string(),
            ));
        }
        if window > MAX_WINDOW {
            return Err(DomainError::Validation(
                "rate limit window must not exceed one year".to_string(),
            ));
        }
        Ok(Self { limit, window })
    }

    /// Build a quota from a window given in milliseconds.
    pub fn from_millis(limit: u32, window_ms: u64) -> Result<Self, DomainError> {
        Self::new(limit, Duration::from_millis(window_ms))
    }

    /// `limit` requests per 60 seconds; a zero limit is clamped to one.
    pub fn per_minute(limit: u32) -> Self {
        Self {
            limit: limit.max(1),
            window: Duration::from_secs(60),
        }
    }

    /// General API traffic: 100 requests per minute.
    pub fn api() -> Self {
        Self::per_minute(100)
    }

    /// Authentication attempts: 5 per 15 minutes.
    pub fn auth() -> Self {
        Self {
            limit: 5,
            window: Duration::from_secs(15 * 60),
        }
    }

    /// Search endpoints: 30 per minute.
    pub fn search() -> Self {
        Self::per_minute(30)
    }

    /// Burst protection: 10 per 10 seconds.
    pub fn strict() -> Self {
        Self {
            limit: 10,
            window: Duration::from_secs(10),
        }
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// The window as a timestamp offset.
    pub fn span(&self) -> TimeDelta {
        TimeDelta::from_std(self.window).unwrap_or(TimeDelta::MAX)
    }
}

/// Outcome of a single rate-limit check.
///
/// Being rate limited is an expected outcome, so it is a value here rather
/// than an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    pub reset_at: DateTime<Utc>,
}

impl RateLimitDecision {
    /// Time to wait before retrying, rounded up to whole seconds.
    ///
    /// A denied decision always asks for at least one second.
    pub fn retry_after(&self, now: DateTime<Utc>) -> Duration {
        let millis = (self.reset_at - now).num_milliseconds().max(0) as u64;
        let secs = millis.div_ceil(1000);
        if self.allowed {
            Duration::from_secs(secs)
        } else {
            Duration::from_secs(secs.max(1))
        }
    }
}

/// Builders for rate-limit identifiers.
pub struct RateLimitKey;

impl RateLimitKey {
    /// Identifier for a client address.
    pub fn ip(addr: &str) -> String {
        format!("ip:{}", addr)
    }

    /// Identifier for an authenticated API key.
    pub fn api_key(key_id: Uuid) -> String {
        format!("key:{}", key_id)
    }
}

/// Snapshot of an in-memory limiter's state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitStats {
    pub active_keys: usize,
    pub blocked_keys: usize,
    pub total_requests: u64,
}
