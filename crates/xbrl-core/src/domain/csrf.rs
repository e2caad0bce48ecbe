use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Server-side record of the CSRF token issued to a session.
///
/// Only the SHA-256 hex digest of the token is kept.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CsrfTokenRecord {
    pub session_id: String,
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl CsrfTokenRecord {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at < now
    }
}

/// Token handed to the client. The plaintext leaves the server only here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CsrfToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Everything a request presents for a CSRF check.
#[derive(Debug, Clone, Default)]
pub struct CsrfCheck {
    pub session_id: String,
    pub origin: Option<String>,
    pub referer: Option<String>,
    pub host: Option<String>,
    /// Token from the `X-CSRF-Token` header.
    pub header_token: Option<String>,
    /// Token from the `csrf-token` cookie.
    pub cookie_token: Option<String>,
}
