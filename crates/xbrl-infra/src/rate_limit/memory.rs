//! In-memory fixed-window rate limiter.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use xbrl_core::DomainError;
use xbrl_core::domain::{Quota, RateLimitDecision, RateLimitStats};
use xbrl_core::ports::{Clock, RateLimitError, RateLimiter, SystemClock};

/// In-memory rate limiter configuration.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Maximum requests per window.
    pub max_requests: u32,
    /// Window duration.
    pub window: Duration,
    /// How often the sweeper drops abandoned entries.
    pub sweep_interval: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 100,
            window: Duration::from_secs(60),
            sweep_interval: Duration::from_secs(60),
        }
    }
}

impl RateLimitConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_requests: std::env::var("RATE_LIMIT_MAX_REQUESTS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_requests),
            window: std::env::var("RATE_LIMIT_WINDOW_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.window),
            sweep_interval: std::env::var("RATE_LIMIT_SWEEP_INTERVAL_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.sweep_interval),
        }
    }

    /// The configured default quota.
    pub fn quota(&self) -> Result<Quota, DomainError> {
        Quota::new(self.max_requests, self.window)
    }
}

/// Counter for one identifier's current window.
#[derive(Debug, Clone)]
struct WindowEntry {
    count: u32,
    reset_at: DateTime<Utc>,
    window: TimeDelta,
    blocked: bool,
}

impl WindowEntry {
    fn open(now: DateTime<Utc>, window: TimeDelta) -> Self {
        Self {
            count: 1,
            reset_at: now + window,
            window,
            blocked: false,
        }
    }

    /// Abandoned for more than a full window past its reset.
    fn is_stale(&self, now: DateTime<Utc>) -> bool {
        self.reset_at + self.window < now
    }
}

/// In-memory fixed-window rate limiter.
///
/// Each identifier gets a counter that resets once its window has passed.
/// The check-then-increment for one identifier runs under that entry's shard
/// lock, so concurrent requests never over-admit.
///
/// Note: Limits are per-process, not distributed across instances. Use
/// the Redis limiter when several instances must share counters.
pub struct InMemoryRateLimiter {
    entries: DashMap<String, WindowEntry>,
    clock: Arc<dyn Clock>,
}

impl InMemoryRateLimiter {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            clock,
        }
    }

    /// Synchronous form of [`RateLimiter::check`]; never fails.
    pub fn check_now(&self, identifier: &str, quota: &Quota) -> RateLimitDecision {
        let now = self.clock.now();
        let limit = quota.limit();

        match self.entries.entry(identifier.to_string()) {
            Entry::Vacant(slot) => {
                let entry = slot.insert(WindowEntry::open(now, quota.span()));
                allowed(limit, limit - 1, entry.reset_at)
            }
            Entry::Occupied(mut slot) => {
                let entry = slot.get_mut();

                if now > entry.reset_at {
                    *entry = WindowEntry::open(now, quota.span());
                    return allowed(limit, limit - 1, entry.reset_at);
                }

                if entry.count >= limit {
                    entry.blocked = true;
                    tracing::debug!(identifier = %identifier, limit, "Rate limit exceeded");
                    return RateLimitDecision {
                        allowed: false,
                        limit,
                        remaining: 0,
                        reset_at: entry.reset_at,
                    };
                }

                entry.count += 1;
                allowed(limit, limit - entry.count, entry.reset_at)
            }
        }
    }

    /// Remove entries whose window ended more than one full window ago.
    /// Returns the number removed.
    pub fn sweep(&self) -> usize {
        let now = self.clock.now();
        let mut removed = 0;
        self.entries.retain(|_, entry| {
            let keep = !entry.is_stale(now);
            if !keep {
                removed += 1;
            }
            keep
        });
        removed
    }

    /// Spawn a background task that calls [`sweep`](Self::sweep) on a fixed
    /// interval until the returned handle is stopped or dropped.
    pub fn start_sweeper(self: &Arc<Self>, every: Duration) -> SweeperHandle {
        let every = every.max(Duration::from_millis(1));
        let limiter = Arc::clone(self);
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticker.tick().await;

            tracing::info!(interval_ms = every.as_millis() as u64, "Rate limit sweeper started");

            loop {
                tokio::select! {
                    _ = &mut stop_rx => break,
                    _ = ticker.tick() => {
                        let removed = limiter.sweep();
                        if removed > 0 {
                            tracing::debug!(
                                removed,
                                active = limiter.len(),
                                "Swept expired rate limit entries"
                            );
                        }
                    }
                }
            }

            tracing::info!("Rate limit sweeper stopped");
        });

        SweeperHandle {
            stop: Some(stop_tx),
            task: Some(task),
        }
    }

    pub fn stats(&self) -> RateLimitStats {
        self.entries
            .iter()
            .fold(RateLimitStats::default(), |mut stats, entry| {
                stats.active_keys += 1;
                if entry.blocked {
                    stats.blocked_keys += 1;
                }
                stats.total_requests += u64::from(entry.count);
                stats
            })
    }

    /// Forget one identifier. Returns whether it was tracked.
    pub fn reset_key(&self, identifier: &str) -> bool {
        self.entries.remove(identifier).is_some()
    }

    pub fn reset_all(&self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for InMemoryRateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

fn allowed(limit: u32, remaining: u32, reset_at: DateTime<Utc>) -> RateLimitDecision {
    RateLimitDecision {
        allowed: true,
        limit,
        remaining,
        reset_at,
    }
}

#[async_trait]
impl RateLimiter for InMemoryRateLimiter {
    async fn check(
        &self,
        identifier: &str,
        quota: &Quota,
    ) -> Result<RateLimitDecision, RateLimitError> {
        Ok(self.check_now(identifier, quota))
    }
}

/// Handle to a running sweeper task. Dropping it also stops the task.
pub struct SweeperHandle {
    stop: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl SweeperHandle {
    /// Signal the sweeper and wait for it to finish.
    pub async fn stop(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::error!("Rate limit sweeper task failed: {}", e);
            }
        }
    }
}

impl Drop for SweeperHandle {
    fn drop(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
    }
}
