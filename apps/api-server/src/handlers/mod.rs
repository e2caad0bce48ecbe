//! HTTP handlers and route configuration.

mod api_keys;
mod csrf;
mod health;
mod v1;

use actix_web::web;

use crate::middleware::rate_limit::RateLimitMiddleware;
use crate::state::AppState;

/// Configure all application routes.
pub fn configure_routes(cfg: &mut web::ServiceConfig, state: &AppState) {
    cfg.service(
        web::scope("/api")
            .wrap(RateLimitMiddleware::new(
                state.limiter.clone(),
                state.ip_quota,
            ))
            // Public routes
            .route("/health", web::get().to(health::health_check))
            // Dashboard session routes
            .route("/csrf", web::get().to(csrf::issue_token))
            .service(
                web::scope("/keys")
                    .route("", web::get().to(api_keys::list_keys))
                    .route("", web::post().to(api_keys::issue_key))
                    .route("/{id}/revoke", web::post().to(api_keys::revoke_key)),
            )
            // API-key routes
            .service(web::scope("/v1").route("/me", web::get().to(v1::me))),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{App, cookie::Cookie, http::StatusCode, http::header, test};
    use std::sync::Arc;
    use uuid::Uuid;
    use xbrl_core::domain::Quota;
    use xbrl_core::ports::SessionTokenService;
    use xbrl_infra::{
        ApiKeyAuthenticator, CsrfConfig, CsrfGuard, HmacApiKeyVerifier, InMemoryApiKeyRepository,
        InMemoryCsrfTokenStore, InMemoryRateLimiter, JwtSessionService, SessionConfig,
    };

    const APP_URL: &str = "https://dashboard.example.com";

    fn test_state() -> AppState {
        let local = Arc::new(InMemoryRateLimiter::new());
        let verifier =
            Arc::new(HmacApiKeyVerifier::new("handler-test-secret-0123456789abcdef").unwrap());
        let authenticator = Arc::new(ApiKeyAuthenticator::new(
            Arc::new(InMemoryApiKeyRepository::new()),
            verifier,
        ));
        let sessions = Arc::new(JwtSessionService::new(SessionConfig {
            secret: "session-test-secret".to_string(),
            ..SessionConfig::default()
        }));
        let csrf = Arc::new(CsrfGuard::new(
            Arc::new(InMemoryCsrfTokenStore::new()),
            CsrfConfig {
                allowed_origin: Some(APP_URL.to_string()),
                ..CsrfConfig::default()
            },
        ));

        AppState {
            limiter: local.clone(),
            local_limiter: Some(local),
            ip_quota: Quota::api(),
            authenticator,
            sessions,
            csrf,
        }
    }

    fn session_token(state: &AppState, user_id: Uuid) -> String {
        state
            .sessions
            .issue(user_id, Some("analyst@example.com"), "authenticated")
            .unwrap()
    }

    macro_rules! app {
        ($state:expr) => {{
            let state = $state.clone();
            test::init_service(
                App::new()
                    .app_data(web::Data::new(state.clone()))
                    .configure(|cfg| configure_routes(cfg, &state)),
            )
            .await
        }};
    }

    fn protected_post(uri: &str, session: &str, csrf: &str) -> test::TestRequest {
        test::TestRequest::post()
            .uri(uri)
            .insert_header((header::AUTHORIZATION, format!("Bearer {}", session)))
            .insert_header((header::ORIGIN, APP_URL))
            .insert_header(("x-csrf-token", csrf))
            .cookie(Cookie::new("csrf-token", csrf.to_string()))
    }

    #[actix_web::test]
    async fn test_health_reports_limiter_stats() {
        let state = test_state();
        let app = app!(state);

        let req = test::TestRequest::get().uri("/api/health").to_request();
        let res = test::call_service(&app, req).await;
        assert_eq!(res.status(), StatusCode::OK);
        assert!(res.headers().contains_key("x-ratelimit-limit"));

        let body: serde_json::Value = test::read_body_json(res).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["rate_limit"]["active_keys"], 1);
    }

    #[actix_web::test]
    async fn test_key_lifecycle_over_http() {
        let state = test_state();
        let app = app!(state);
        let session = session_token(&state, Uuid::new_v4());

        // CSRF token
        let req = test::TestRequest::get()
            .uri("/api/csrf")
            .insert_header((header::AUTHORIZATION, format!("Bearer {}", session)))
            .to_request();
        let res = test::call_service(&app, req).await;
        assert_eq!(res.status(), StatusCode::OK);
        assert!(res.response().cookies().any(|c| c.name() == "csrf-token"));
        let body: serde_json::Value = test::read_body_json(res).await;
        let csrf = body["csrf_token"].as_str().unwrap().to_string();

        // Issue without the CSRF pair is refused
        let req = test::TestRequest::post()
            .uri("/api/keys")
            .insert_header((header::AUTHORIZATION, format!("Bearer {}", session)))
            .insert_header((header::ORIGIN, APP_URL))
            .set_json(serde_json::json!({"name": "ci"}))
            .to_request();
        let res = test::call_service(&app, req).await;
        assert_eq!(res.status(), StatusCode::FORBIDDEN);

        // Issue
        let req = protected_post("/api/keys", &session, &csrf)
            .set_json(serde_json::json!({"name": "ci", "plan": "pro"}))
            .to_request();
        let res = test::call_service(&app, req).await;
        assert_eq!(res.status(), StatusCode::CREATED);
        let body: serde_json::Value = test::read_body_json(res).await;
        let api_key = body["data"]["api_key"].as_str().unwrap().to_string();
        let key_id = body["data"]["id"].as_str().unwrap().to_string();
        assert!(api_key.starts_with("xbrl_live_"));

        // Use
        let req = test::TestRequest::get()
            .uri("/api/v1/me")
            .insert_header(("x-api-key", api_key.as_str()))
            .to_request();
        let res = test::call_service(&app, req).await;
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(res.headers().get("x-ratelimit-limit").unwrap(), "300");
        assert_eq!(res.headers().get("x-ratelimit-remaining").unwrap(), "299");
        let body: serde_json::Value = test::read_body_json(res).await;
        assert_eq!(body["plan"], "pro");

        // Bearer form works too
        let req = test::TestRequest::get()
            .uri("/api/v1/me")
            .insert_header((header::AUTHORIZATION, format!("Bearer {}", api_key)))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);

        // List shows only the masked form
        let req = test::TestRequest::get()
            .uri("/api/keys")
            .insert_header((header::AUTHORIZATION, format!("Bearer {}", session)))
            .to_request();
        let res = test::call_service(&app, req).await;
        let body: serde_json::Value = test::read_body_json(res).await;
        let listed = body["data"].as_array().unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0]["usage_count"], 2);
        assert!(!listed[0]["masked_key"].as_str().unwrap().contains(&api_key));
        assert!(!body.to_string().contains(&api_key));

        // Revoke, then the key stops working
        let req = protected_post(&format!("/api/keys/{}/revoke", key_id), &session, &csrf)
            .to_request();
        let res = test::call_service(&app, req).await;
        assert_eq!(res.status(), StatusCode::OK);

        let req = test::TestRequest::get()
            .uri("/api/v1/me")
            .insert_header(("x-api-key", api_key.as_str()))
            .to_request();
        assert_eq!(
            test::call_service(&app, req).await.status(),
            StatusCode::UNAUTHORIZED
        );

        // Revoking twice conflicts
        let req = protected_post(&format!("/api/keys/{}/revoke", key_id), &session, &csrf)
            .to_request();
        assert_eq!(
            test::call_service(&app, req).await.status(),
            StatusCode::CONFLICT
        );
    }

    #[actix_web::test]
    async fn test_issue_rejects_excessive_lifetime() {
        let state = test_state();
        let app = app!(state);
        let session = session_token(&state, Uuid::new_v4());

        let req = test::TestRequest::get()
            .uri("/api/csrf")
            .insert_header((header::AUTHORIZATION, format!("Bearer {}", session)))
            .to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        let csrf = body["csrf_token"].as_str().unwrap().to_string();

        let req = protected_post("/api/keys", &session, &csrf)
            .set_json(serde_json::json!({"name": "ci", "expires_in_days": 4_000_000_000u32}))
            .to_request();
        let res = test::call_service(&app, req).await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);

        let req = protected_post("/api/keys", &session, &csrf)
            .set_json(serde_json::json!({
                "name": "ci",
                "expires_in_days": api_keys::MAX_KEY_LIFETIME_DAYS
            }))
            .to_request();
        let res = test::call_service(&app, req).await;
        assert_eq!(res.status(), StatusCode::CREATED);
    }

    #[actix_web::test]
    async fn test_auth_failures_share_one_body() {
        let state = test_state();
        let app = app!(state);

        let mut bodies = Vec::new();
        for key in [None, Some("garbage"), Some("xbrl_live_0000")] {
            let mut req = test::TestRequest::get().uri("/api/v1/me");
            if let Some(key) = key {
                req = req.insert_header(("x-api-key", key));
            }
            let res = test::call_service(&app, req.to_request()).await;
            assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
            let body: serde_json::Value = test::read_body_json(res).await;
            bodies.push(body);
        }
        assert!(bodies.windows(2).all(|w| w[0] == w[1]));

        let req = test::TestRequest::get()
            .uri("/api/keys")
            .insert_header((header::AUTHORIZATION, "Bearer not-a-jwt"))
            .to_request();
        let res = test::call_service(&app, req).await;
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
        let body: serde_json::Value = test::read_body_json(res).await;
        assert_eq!(body, bodies[0]);
    }

    #[actix_web::test]
    async fn test_plan_quota_enforced_per_key() {
        let state = test_state();
        let app = app!(state);

        let issued = state
            .authenticator
            .issue(Uuid::new_v4(), "free", xbrl_core::domain::PlanTier::Free, None)
            .await
            .unwrap();

        for _ in 0..10 {
            let req = test::TestRequest::get()
                .uri("/api/v1/me")
                .insert_header(("x-api-key", issued.plaintext.as_str()))
                .to_request();
            assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);
        }

        let req = test::TestRequest::get()
            .uri("/api/v1/me")
            .insert_header(("x-api-key", issued.plaintext.as_str()))
            .to_request();
        let res = test::call_service(&app, req).await;
        assert_eq!(res.status(), StatusCode::TOO_MANY_REQUESTS);
        assert!(res.headers().contains_key(header::RETRY_AFTER));
        assert_eq!(res.headers().get("x-ratelimit-limit").unwrap(), "10");
    }
}
