//! CSRF request helpers.

use actix_web::{
    HttpRequest,
    cookie::{Cookie, SameSite, time::Duration as CookieDuration},
    http::{Method, header},
};
use xbrl_core::domain::{CsrfCheck, CsrfToken};
use xbrl_infra::csrf::{CSRF_COOKIE_NAME, CSRF_HEADER_NAME};

/// Methods that never change state and need no CSRF token.
pub fn is_safe_method(method: &Method) -> bool {
    matches!(*method, Method::GET | Method::HEAD | Method::OPTIONS)
}

fn header_value(req: &HttpRequest, name: impl header::AsHeaderName) -> Option<String> {
    req.headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// Collect everything the guard needs from a request.
pub fn check_from_request(req: &HttpRequest, session_id: String) -> CsrfCheck {
    CsrfCheck {
        session_id,
        origin: header_value(req, header::ORIGIN),
        referer: header_value(req, header::REFERER),
        host: header_value(req, header::HOST),
        header_token: header_value(req, CSRF_HEADER_NAME),
        cookie_token: req.cookie(CSRF_COOKIE_NAME).map(|c| c.value().to_string()),
    }
}

/// Cookie half of the double-submit pair. Readable by scripts so the client
/// can echo it in the header.
pub fn token_cookie(token: &CsrfToken, max_age_secs: i64) -> Cookie<'static> {
    Cookie::build(CSRF_COOKIE_NAME, token.token.clone())
        .path("/")
        .secure(true)
        .http_only(false)
        .same_site(SameSite::Strict)
        .max_age(CookieDuration::seconds(max_age_secs))
        .finish()
}
