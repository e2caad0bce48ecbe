//! Rate limiting port.

use async_trait::async_trait;

use crate::domain::{Quota, RateLimitDecision};

/// Rate limiter trait - abstraction over rate limiting backends.
#[async_trait]
pub trait RateLimiter: Send + Sync {
    /// Count one request from `identifier` against `quota`.
    ///
    /// A rejected request is `Ok` with `allowed == false`; `Err` means the
    /// backend itself failed.
    async fn check(
        &self,
        identifier: &str,
        quota: &Quota,
    ) -> Result<RateLimitDecision, RateLimitError>;
}

/// Rate limit errors.
#[derive(Debug, thiserror::Error)]
pub enum RateLimitError {
    #[error("Backend error: {0}")]
    Backend(String),
}
