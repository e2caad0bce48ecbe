//! API-key management for dashboard users.

use actix_web::{HttpResponse, web};
use chrono::TimeDelta;
use uuid::Uuid;
use xbrl_core::domain::{ApiKeyRecord, PlanTier, RateLimitKey};
use xbrl_shared::ApiResponse;
use xbrl_shared::dto::{ApiKeySummary, IssueApiKeyRequest, IssuedApiKeyResponse};

use crate::middleware::auth::{CsrfProtected, SessionIdentity};
use crate::middleware::error::{AppError, AppResult};
use crate::state::AppState;

/// Longest lifetime a client may request for a key.
pub const MAX_KEY_LIFETIME_DAYS: u32 = 3650;

fn summary(record: &ApiKeyRecord) -> ApiKeySummary {
    ApiKeySummary {
        id: record.id,
        name: record.name.clone(),
        masked_key: record.masked(),
        status: record.status.to_string(),
        plan: record.plan.to_string(),
        expires_at: record.expires_at,
        created_at: record.created_at,
        last_used_at: record.last_used_at,
        usage_count: record.usage_count,
        revoked_at: record.revoked_at,
    }
}

/// GET /api/keys
pub async fn list_keys(
    state: web::Data<AppState>,
    identity: SessionIdentity,
) -> AppResult<HttpResponse> {
    let keys = state.authenticator.list(identity.user_id).await?;
    let body: Vec<ApiKeySummary> = keys.iter().map(summary).collect();

    Ok(HttpResponse::Ok().json(ApiResponse::ok(body)))
}

/// POST /api/keys
///
/// The plaintext key is in this response only.
pub async fn issue_key(
    state: web::Data<AppState>,
    CsrfProtected(identity): CsrfProtected,
    body: web::Json<IssueApiKeyRequest>,
) -> AppResult<HttpResponse> {
    let req = body.into_inner();

    let plan = req
        .plan
        .as_deref()
        .map(str::parse::<PlanTier>)
        .transpose()?
        .unwrap_or_default();
    if req
        .expires_in_days
        .is_some_and(|days| days > MAX_KEY_LIFETIME_DAYS)
    {
        return Err(AppError::BadRequest(format!(
            "expires_in_days must be at most {}",
            MAX_KEY_LIFETIME_DAYS
        )));
    }
    let ttl = req
        .expires_in_days
        .map(|days| TimeDelta::days(i64::from(days)));

    let issued = state
        .authenticator
        .issue(identity.user_id, &req.name, plan, ttl)
        .await?;

    let record = &issued.record;
    Ok(HttpResponse::Created().json(ApiResponse::ok_with_message(
        IssuedApiKeyResponse {
            id: record.id,
            name: record.name.clone(),
            api_key: issued.plaintext.clone(),
            masked_key: record.masked(),
            plan: record.plan.to_string(),
            expires_at: record.expires_at,
            created_at: record.created_at,
        },
        "Store this key now; it will not be shown again.",
    )))
}

/// POST /api/keys/{id}/revoke
pub async fn revoke_key(
    state: web::Data<AppState>,
    CsrfProtected(identity): CsrfProtected,
    path: web::Path<Uuid>,
) -> AppResult<HttpResponse> {
    let key_id = path.into_inner();
    let record = state.authenticator.revoke(identity.user_id, key_id).await?;

    if let Some(local) = &state.local_limiter {
        local.reset_key(&RateLimitKey::api_key(key_id));
    }

    Ok(HttpResponse::Ok().json(ApiResponse::ok(summary(&record))))
}
