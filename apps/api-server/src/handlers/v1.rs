//! Routes authenticated by API key.

use actix_web::HttpResponse;
use xbrl_shared::dto::KeyInfoResponse;

use crate::middleware::auth::ApiKeyIdentity;

/// GET /api/v1/me
pub async fn me(identity: ApiKeyIdentity) -> HttpResponse {
    let principal = &identity.principal;
    let mut response = HttpResponse::Ok().json(KeyInfoResponse {
        key_id: principal.key_id,
        user_id: principal.user_id,
        name: principal.name.clone(),
        plan: principal.plan.to_string(),
        requests_per_minute: principal.plan.requests_per_minute(),
    });
    identity.decorate(&mut response);
    response
}
