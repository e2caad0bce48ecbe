//! # XBRL Infrastructure
//!
//! Concrete implementations of the ports defined in `xbrl-core`:
//! rate limiters, API-key hashing, session tokens, CSRF protection and
//! credential storage.
//!
//! ## Feature Flags
//!
//! - `full` (default) - All features enabled
//! - `minimal` - In-memory credential storage only
//! - `auth` - HMAC API keys, session JWTs and CSRF tokens
//! - `rate-limit` - In-memory fixed-window rate limiting
//! - `redis` - Redis-backed rate limiting shared across instances

pub mod repository;

#[cfg(feature = "auth")]
pub mod auth;

#[cfg(feature = "auth")]
pub mod csrf;

#[cfg(feature = "rate-limit")]
pub mod rate_limit;

// Re-exports - In-Memory
pub use repository::InMemoryApiKeyRepository;

#[cfg(feature = "auth")]
pub use auth::{
    ApiKeyAuthenticator, ApiKeyPrincipal, HmacApiKeyVerifier, IssuedApiKey, JwtSessionService,
    SessionConfig, Verification,
};

#[cfg(feature = "auth")]
pub use csrf::{CsrfConfig, CsrfGuard, InMemoryCsrfTokenStore};

#[cfg(feature = "rate-limit")]
pub use rate_limit::{InMemoryRateLimiter, RateLimitConfig, SweeperHandle};

// Re-exports - Redis
#[cfg(all(feature = "redis", feature = "rate-limit"))]
pub use rate_limit::{RedisRateLimitConfig, RedisRateLimiter};
