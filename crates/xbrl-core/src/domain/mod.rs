//! Domain entities - the core business objects.

pub mod api_key;
mod csrf;
pub mod rate_limit;

pub use api_key::{ApiKeyRecord, ApiKeyStatus, PlanTier, mask_api_key};
pub use csrf::{CsrfCheck, CsrfToken, CsrfTokenRecord};
pub use rate_limit::{Quota, RateLimitDecision, RateLimitKey, RateLimitStats};
