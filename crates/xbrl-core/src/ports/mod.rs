//! Ports - trait definitions for external dependencies.
//! These are the "interfaces" that infrastructure must implement.

mod auth;
mod clock;
mod csrf;
mod rate_limit;
mod repository;

pub use auth::{ApiKeyVerifier, AuthError, GeneratedApiKey, SessionClaims, SessionTokenService};
pub use clock::{Clock, ManualClock, SystemClock};
pub use csrf::{CsrfError, CsrfTokenStore};
pub use rate_limit::{RateLimitError, RateLimiter};
pub use repository::{ApiKeyRepository, BaseRepository};
