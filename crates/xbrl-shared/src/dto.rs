//! Data Transfer Objects - request/response types for the API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Request to issue a new API key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssueApiKeyRequest {
    pub name: String,
    /// Plan name (`free`, `standard`, `pro`, `enterprise`). Defaults to `free`.
    #[serde(default)]
    pub plan: Option<String>,
    /// Lifetime in days; omitted means the key never expires.
    #[serde(default)]
    pub expires_in_days: Option<u32>,
}

/// Returned once when a key is issued. `api_key` is never shown again.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssuedApiKeyResponse {
    pub id: Uuid,
    pub name: String,
    pub api_key: String,
    pub masked_key: String,
    pub plan: String,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Display-safe view of a stored key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKeySummary {
    pub id: Uuid,
    pub name: String,
    pub masked_key: String,
    pub status: String,
    pub plan: String,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub usage_count: u64,
    pub revoked_at: Option<DateTime<Utc>>,
}

/// CSRF token for the dashboard; also set as the `csrf-token` cookie.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CsrfTokenResponse {
    pub csrf_token: String,
    pub expires_at: DateTime<Utc>,
}

/// Identity behind the API key used for the request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyInfoResponse {
    pub key_id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub plan: String,
    pub requests_per_minute: u32,
}
