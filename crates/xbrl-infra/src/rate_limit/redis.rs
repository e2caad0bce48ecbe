//! Redis rate limiter implementation using a shared fixed-window counter.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::TimeDelta;
use redis::aio::ConnectionManager;
use redis::{Client, Script};

use xbrl_core::domain::{Quota, RateLimitDecision};
use xbrl_core::ports::{Clock, RateLimitError, RateLimiter, SystemClock};

/// Redis rate limiter configuration.
#[derive(Debug, Clone)]
pub struct RedisRateLimitConfig {
    /// Redis connection URL.
    pub url: String,
    /// Give up connecting after this long.
    pub connect_timeout: Duration,
    /// Key prefix for rate limit keys.
    pub key_prefix: String,
}

impl Default for RedisRateLimitConfig {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1:6379".to_string(),
            connect_timeout: Duration::from_secs(5),
            key_prefix: "ratelimit".to_string(),
        }
    }
}

impl RedisRateLimitConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            url: std::env::var("REDIS_URL").unwrap_or(defaults.url),
            connect_timeout: std::env::var("REDIS_CONNECT_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.connect_timeout),
            key_prefix: std::env::var("RATE_LIMIT_KEY_PREFIX").unwrap_or(defaults.key_prefix),
        }
    }
}

// Returns {allowed, count, pttl}. A rejected request leaves the counter
// untouched, matching the in-memory limiter.
const FIXED_WINDOW_SCRIPT: &str = r#"
local key = KEYS[1]
local limit = tonumber(ARGV[1])
local window_ms = tonumber(ARGV[2])

local current = tonumber(redis.call('GET', key) or '0')
if current >= limit then
    return {0, current, redis.call('PTTL', key)}
end

current = redis.call('INCR', key)
if current == 1 then
    redis.call('PEXPIRE', key, window_ms)
end

return {1, current, redis.call('PTTL', key)}
"#;

/// Redis-backed fixed-window rate limiter shared by every instance that
/// points at the same Redis.
pub struct RedisRateLimiter {
    conn: ConnectionManager,
    config: RedisRateLimitConfig,
    script: Script,
    clock: Arc<dyn Clock>,
}

impl RedisRateLimiter {
    pub async fn new(config: RedisRateLimitConfig) -> Result<Self, RateLimitError> {
        Self::with_clock(config, Arc::new(SystemClock)).await
    }

    /// Connect with an explicit clock for the reported `reset_at`.
    pub async fn with_clock(
        config: RedisRateLimitConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, RateLimitError> {
        let client =
            Client::open(config.url.as_str()).map_err(|e| RateLimitError::Backend(e.to_string()))?;

        // Use timeout to prevent hanging if Redis is unreachable
        let conn = tokio::time::timeout(config.connect_timeout, ConnectionManager::new(client))
            .await
            .map_err(|_| RateLimitError::Backend("Connection timed out".to_string()))?
            .map_err(|e| RateLimitError::Backend(e.to_string()))?;

        tracing::info!(url = %config.url, "Connected to Redis rate limiter");

        Ok(Self {
            conn,
            config,
            script: Script::new(FIXED_WINDOW_SCRIPT),
            clock,
        })
    }

    /// Create from environment configuration.
    pub async fn from_env() -> Result<Self, RateLimitError> {
        Self::new(RedisRateLimitConfig::from_env()).await
    }

    fn make_key(&self, identifier: &str) -> String {
        format!("{}:{}", self.config.key_prefix, identifier)
    }
}

#[async_trait]
impl RateLimiter for RedisRateLimiter {
    async fn check(
        &self,
        identifier: &str,
        quota: &Quota,
    ) -> Result<RateLimitDecision, RateLimitError> {
        let key = self.make_key(identifier);
        let window_ms = quota.window().as_millis().max(1) as u64;
        let mut conn = self.conn.clone();

        let result: Vec<i64> = self
            .script
            .key(&key)
            .arg(quota.limit())
            .arg(window_ms)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| RateLimitError::Backend(e.to_string()))?;

        let allowed = result.first().copied().unwrap_or(1) == 1;
        let count = result.get(1).copied().unwrap_or(1).max(0) as u32;
        // PTTL is negative when the key has no expiry; treat that as a full window.
        let ttl_ms = match result.get(2).copied() {
            Some(ms) if ms > 0 => ms,
            _ => window_ms as i64,
        };

        let remaining = if allowed {
            quota.limit().saturating_sub(count)
        } else {
            tracing::debug!(identifier = %identifier, limit = quota.limit(), "Rate limit exceeded");
            0
        };

        Ok(RateLimitDecision {
            allowed,
            limit: quota.limit(),
            remaining,
            reset_at: self.clock.now() + TimeDelta::milliseconds(ttl_ms),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use xbrl_core::ports::ManualClock;

    fn test_config() -> RedisRateLimitConfig {
        RedisRateLimitConfig {
            url: std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string()),
            connect_timeout: Duration::from_secs(1),
            key_prefix: format!("test_ratelimit_{}", uuid::Uuid::new_v4()),
        }
    }

    async fn get_test_ratelimiter() -> Option<RedisRateLimiter> {
        RedisRateLimiter::new(test_config()).await.ok()
    }

    #[tokio::test]
    async fn test_redis_fixed_window() {
        let limiter = match get_test_ratelimiter().await {
            Some(l) => l,
            None => return,
        };

        let quota = Quota::new(2, Duration::from_secs(1)).unwrap();
        let key = "ip:1.2.3.4";

        let res = limiter.check(key, &quota).await.unwrap();
        assert!(res.allowed);
        assert_eq!(res.remaining, 1);

        let res = limiter.check(key, &quota).await.unwrap();
        assert!(res.allowed);
        assert_eq!(res.remaining, 0);

        let res = limiter.check(key, &quota).await.unwrap();
        assert!(!res.allowed);
        assert_eq!(res.remaining, 0);

        // Wait for reset
        tokio::time::sleep(Duration::from_millis(1500)).await;

        let res = limiter.check(key, &quota).await.unwrap();
        assert!(res.allowed);
        assert_eq!(res.remaining, 1);
    }

    #[tokio::test]
    async fn test_reset_at_follows_injected_clock() {
        let start = Utc::now() - TimeDelta::days(30);
        let clock = Arc::new(ManualClock::new(start));
        let limiter = match RedisRateLimiter::with_clock(test_config(), clock).await {
            Ok(l) => l,
            Err(_) => return,
        };

        let quota = Quota::new(5, Duration::from_secs(60)).unwrap();
        let res = limiter.check("key:clock", &quota).await.unwrap();

        assert!(res.reset_at > start);
        assert!(res.reset_at <= start + TimeDelta::seconds(60));
    }
}
