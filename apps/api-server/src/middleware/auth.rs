//! Authentication extractors: dashboard sessions and API keys.

use actix_web::{
    FromRequest, HttpRequest, HttpResponse, dev::Payload, http::StatusCode, http::header, web,
};
use chrono::Utc;
use std::future::{Future, Ready, ready};
use std::pin::Pin;
use uuid::Uuid;
use xbrl_core::domain::{RateLimitDecision, RateLimitKey};
use xbrl_core::ports::{AuthError, SessionClaims};
use xbrl_infra::{ApiKeyPrincipal, Verification};
use xbrl_shared::ErrorResponse;

use super::csrf;
use super::rate_limit::{apply_rate_limit_headers, too_many_requests};
use crate::state::AppState;

/// Header carrying an API key.
pub const API_KEY_HEADER: &str = "x-api-key";

/// Authenticated dashboard user.
///
/// ```ignore
/// async fn list(identity: SessionIdentity) -> impl Responder { ... }
/// ```
#[derive(Debug, Clone)]
pub struct SessionIdentity {
    pub user_id: Uuid,
    pub role: String,
}

impl SessionIdentity {
    /// Key for per-session server state such as the CSRF token.
    pub fn session_id(&self) -> String {
        self.user_id.to_string()
    }
}

impl From<SessionClaims> for SessionIdentity {
    fn from(claims: SessionClaims) -> Self {
        Self {
            user_id: claims.user_id,
            role: claims.role,
        }
    }
}

/// Rejections raised by the extractors in this module.
#[derive(Debug)]
pub enum AuthRejection {
    /// Any failed credential; the body never says which check failed.
    Unauthorized,
    CsrfFailed,
    RateLimited(RateLimitDecision),
    Internal(String),
}

impl std::fmt::Display for AuthRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthRejection::Unauthorized => write!(f, "Unauthorized"),
            AuthRejection::CsrfFailed => write!(f, "CSRF validation failed"),
            AuthRejection::RateLimited(_) => write!(f, "Rate limit exceeded"),
            AuthRejection::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl From<AuthError> for AuthRejection {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::Storage(e) => AuthRejection::Internal(e.to_string()),
            AuthError::Configuration(msg) => AuthRejection::Internal(msg),
            other => {
                tracing::debug!(reason = %other, "Authentication failed");
                AuthRejection::Unauthorized
            }
        }
    }
}

impl actix_web::ResponseError for AuthRejection {
    fn status_code(&self) -> StatusCode {
        match self {
            AuthRejection::Unauthorized => StatusCode::UNAUTHORIZED,
            AuthRejection::CsrfFailed => StatusCode::FORBIDDEN,
            AuthRejection::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            AuthRejection::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        match self {
            AuthRejection::Unauthorized => HttpResponse::Unauthorized().json(
                ErrorResponse::unauthorized().with_detail("Valid credentials are required."),
            ),
            AuthRejection::CsrfFailed => HttpResponse::Forbidden()
                .json(ErrorResponse::forbidden().with_detail("CSRF validation failed.")),
            AuthRejection::RateLimited(decision) => too_many_requests(decision, Utc::now()),
            AuthRejection::Internal(msg) => {
                tracing::error!("Authentication backend error: {}", msg);
                HttpResponse::InternalServerError().json(ErrorResponse::internal_error())
            }
        }
    }
}

fn app_state(req: &HttpRequest) -> Result<&web::Data<AppState>, AuthRejection> {
    req.app_data::<web::Data<AppState>>().ok_or_else(|| {
        AuthRejection::Internal("AppState not found in app data".to_string())
    })
}

fn bearer_token(req: &HttpRequest) -> Option<&str> {
    req.headers()
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
}

fn session_from_request(req: &HttpRequest) -> Result<SessionIdentity, AuthRejection> {
    let state = app_state(req)?;
    let token = bearer_token(req).ok_or_else(|| AuthRejection::from(AuthError::MissingAuth))?;
    let claims = state.sessions.validate(token)?;
    Ok(SessionIdentity::from(claims))
}

impl FromRequest for SessionIdentity {
    type Error = AuthRejection;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        ready(session_from_request(req))
    }
}

/// Session identity whose request also passed the CSRF check.
///
/// Safe methods skip the CSRF check.
#[derive(Debug, Clone)]
pub struct CsrfProtected(pub SessionIdentity);

impl FromRequest for CsrfProtected {
    type Error = AuthRejection;
    type Future = Pin<Box<dyn Future<Output = Result<Self, Self::Error>>>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let req = req.clone();

        Box::pin(async move {
            let identity = session_from_request(&req)?;
            if csrf::is_safe_method(req.method()) {
                return Ok(CsrfProtected(identity));
            }

            let state = app_state(&req)?.clone();
            let check = csrf::check_from_request(&req, identity.session_id());
            if !state.csrf.validate(&check).await {
                tracing::warn!(user_id = %identity.user_id, "CSRF validation failed");
                return Err(AuthRejection::CsrfFailed);
            }
            Ok(CsrfProtected(identity))
        })
    }
}

/// Request authenticated by API key and admitted by its plan quota.
#[derive(Debug, Clone)]
pub struct ApiKeyIdentity {
    pub principal: ApiKeyPrincipal,
    /// Plan quota state after this request; absent if the limiter failed.
    pub quota: Option<RateLimitDecision>,
}

impl ApiKeyIdentity {
    /// Attach this key's quota headers so the address-level ones stay off.
    pub fn decorate(&self, response: &mut HttpResponse) {
        if let Some(decision) = &self.quota {
            apply_rate_limit_headers(response.headers_mut(), decision);
        }
    }
}

fn presented_api_key(req: &HttpRequest) -> Option<String> {
    req.headers()
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim().to_string())
        .or_else(|| bearer_token(req).map(str::to_string))
        .filter(|key| !key.is_empty())
}

impl FromRequest for ApiKeyIdentity {
    type Error = AuthRejection;
    type Future = Pin<Box<dyn Future<Output = Result<Self, Self::Error>>>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let state = app_state(req).cloned();
        let presented = presented_api_key(req);

        Box::pin(async move {
            let state = state?;
            let presented = presented.ok_or_else(|| AuthRejection::from(AuthError::MissingAuth))?;

            let principal = match state.authenticator.authenticate(&presented).await? {
                Verification::Granted(principal) => principal,
                Verification::Denied => return Err(AuthRejection::Unauthorized),
            };

            let identifier = RateLimitKey::api_key(principal.key_id);
            let quota = match state
                .limiter
                .check(&identifier, &principal.plan.quota())
                .await
            {
                Ok(decision) if !decision.allowed => {
                    tracing::warn!(key_id = %principal.key_id, plan = %principal.plan, "Plan quota exceeded");
                    return Err(AuthRejection::RateLimited(decision));
                }
                Ok(decision) => Some(decision),
                Err(e) => {
                    tracing::error!(error = %e, "Rate limiter error, failing open");
                    None
                }
            };

            Ok(ApiKeyIdentity { principal, quota })
        })
    }
}
