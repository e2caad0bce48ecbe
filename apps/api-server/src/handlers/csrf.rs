//! CSRF token endpoint.

use actix_web::{HttpResponse, web};
use xbrl_shared::dto::CsrfTokenResponse;

use crate::middleware::auth::SessionIdentity;
use crate::middleware::csrf::token_cookie;
use crate::middleware::error::AppResult;
use crate::state::AppState;

/// GET /api/csrf
pub async fn issue_token(
    state: web::Data<AppState>,
    identity: SessionIdentity,
) -> AppResult<HttpResponse> {
    let token = state.csrf.issue(&identity.session_id()).await?;
    let max_age = state.csrf.token_ttl().as_secs() as i64;

    tracing::debug!(user_id = %identity.user_id, role = %identity.role, "CSRF token issued");

    Ok(HttpResponse::Ok()
        .cookie(token_cookie(&token, max_age))
        .json(CsrfTokenResponse {
            csrf_token: token.token,
            expires_at: token.expires_at,
        }))
}
