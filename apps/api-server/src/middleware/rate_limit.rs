//! Rate limiting middleware.

use actix_web::{
    Error, HttpResponse,
    body::EitherBody,
    dev::{Service, ServiceRequest, ServiceResponse, Transform, forward_ready},
    http::header::{HeaderMap, HeaderName, HeaderValue, RETRY_AFTER},
};
use chrono::{DateTime, SecondsFormat, Utc};
use std::future::{Future, Ready, ready};
use std::pin::Pin;
use std::rc::Rc;
use std::sync::Arc;
use xbrl_core::domain::{Quota, RateLimitDecision, RateLimitKey};
use xbrl_core::ports::RateLimiter;
use xbrl_shared::ErrorResponse;

pub const X_RATELIMIT_LIMIT: &str = "x-ratelimit-limit";
pub const X_RATELIMIT_REMAINING: &str = "x-ratelimit-remaining";
pub const X_RATELIMIT_RESET: &str = "x-ratelimit-reset";

/// Write the `X-RateLimit-*` headers for a decision, leaving any already set
/// by an inner, more specific limit untouched.
pub fn apply_rate_limit_headers(headers: &mut HeaderMap, decision: &RateLimitDecision) {
    if headers.contains_key(X_RATELIMIT_LIMIT) {
        return;
    }

    headers.insert(
        HeaderName::from_static(X_RATELIMIT_LIMIT),
        HeaderValue::from(decision.limit),
    );
    headers.insert(
        HeaderName::from_static(X_RATELIMIT_REMAINING),
        HeaderValue::from(decision.remaining),
    );
    let reset = decision.reset_at.to_rfc3339_opts(SecondsFormat::Secs, true);
    if let Ok(value) = HeaderValue::from_str(&reset) {
        headers.insert(HeaderName::from_static(X_RATELIMIT_RESET), value);
    }
}

/// 429 response for a denied decision.
pub fn too_many_requests(decision: &RateLimitDecision, now: DateTime<Utc>) -> HttpResponse {
    let retry_after = decision.retry_after(now).as_secs();

    let mut response = HttpResponse::TooManyRequests()
        .insert_header((RETRY_AFTER, retry_after.to_string()))
        .json(ErrorResponse::too_many_requests(retry_after));
    apply_rate_limit_headers(response.headers_mut(), decision);
    response
}

/// Per-client-address rate limiting for everything it wraps.
pub struct RateLimitMiddleware {
    limiter: Arc<dyn RateLimiter>,
    quota: Quota,
}

impl RateLimitMiddleware {
    pub fn new(limiter: Arc<dyn RateLimiter>, quota: Quota) -> Self {
        Self { limiter, quota }
    }
}

impl<S, B> Transform<S, ServiceRequest> for RateLimitMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Transform = RateLimitMiddlewareService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(RateLimitMiddlewareService {
            service: Rc::new(service),
            limiter: self.limiter.clone(),
            quota: self.quota,
        }))
    }
}

pub struct RateLimitMiddlewareService<S> {
    service: Rc<S>,
    limiter: Arc<dyn RateLimiter>,
    quota: Quota,
}

impl<S, B> Service<ServiceRequest> for RateLimitMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>>>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = self.service.clone();
        let limiter = self.limiter.clone();
        let quota = self.quota;

        let identifier = RateLimitKey::ip(
            req.connection_info()
                .realip_remote_addr()
                .unwrap_or("unknown"),
        );

        Box::pin(async move {
            let decision = match limiter.check(&identifier, &quota).await {
                Ok(decision) => Some(decision),
                Err(e) => {
                    tracing::error!(error = %e, "Rate limiter error, failing open");
                    None
                }
            };

            if let Some(denied) = decision.as_ref().filter(|d| !d.allowed) {
                tracing::warn!(identifier = %identifier, "Rate limit exceeded");

                let response = too_many_requests(denied, Utc::now());
                let (http_req, _payload) = req.into_parts();
                return Ok(ServiceResponse::new(http_req, response).map_into_right_body());
            }

            let mut res = service.call(req).await?;
            if let Some(decision) = decision {
                apply_rate_limit_headers(res.headers_mut(), &decision);
            }
            Ok(res.map_into_left_body())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{App, http::StatusCode, test, web};
    use async_trait::async_trait;
    use xbrl_core::ports::RateLimitError;
    use xbrl_infra::InMemoryRateLimiter;

    struct BrokenLimiter;

    #[async_trait]
    impl RateLimiter for BrokenLimiter {
        async fn check(
            &self,
            _identifier: &str,
            _quota: &Quota,
        ) -> Result<RateLimitDecision, RateLimitError> {
            Err(RateLimitError::Backend("connection refused".to_string()))
        }
    }

    async fn ok() -> HttpResponse {
        HttpResponse::Ok().finish()
    }

    #[actix_web::test]
    async fn test_limits_then_rejects() {
        let limiter: Arc<dyn RateLimiter> = Arc::new(InMemoryRateLimiter::new());
        let quota = Quota::from_millis(2, 60_000).unwrap();
        let app = test::init_service(
            App::new()
                .wrap(RateLimitMiddleware::new(limiter, quota))
                .route("/ping", web::get().to(ok)),
        )
        .await;

        for expected_remaining in ["1", "0"] {
            let res = test::call_service(&app, test::TestRequest::get().uri("/ping").to_request())
                .await;
            assert_eq!(res.status(), StatusCode::OK);
            assert_eq!(res.headers().get(X_RATELIMIT_LIMIT).unwrap(), "2");
            assert_eq!(
                res.headers().get(X_RATELIMIT_REMAINING).unwrap(),
                expected_remaining
            );
            assert!(res.headers().contains_key(X_RATELIMIT_RESET));
        }

        let res =
            test::call_service(&app, test::TestRequest::get().uri("/ping").to_request()).await;
        assert_eq!(res.status(), StatusCode::TOO_MANY_REQUESTS);
        let retry_after: u64 = res
            .headers()
            .get(RETRY_AFTER)
            .unwrap()
            .to_str()
            .unwrap()
            .parse()
            .unwrap();
        assert!((1..=60).contains(&retry_after));
        assert_eq!(res.headers().get(X_RATELIMIT_REMAINING).unwrap(), "0");

        let body: serde_json::Value = test::read_body_json(res).await;
        assert_eq!(body["status"], 429);
    }

    #[actix_web::test]
    async fn test_backend_errors_fail_open() {
        let limiter: Arc<dyn RateLimiter> = Arc::new(BrokenLimiter);
        let app = test::init_service(
            App::new()
                .wrap(RateLimitMiddleware::new(limiter, Quota::strict()))
                .route("/ping", web::get().to(ok)),
        )
        .await;

        let res =
            test::call_service(&app, test::TestRequest::get().uri("/ping").to_request()).await;
        assert_eq!(res.status(), StatusCode::OK);
        assert!(!res.headers().contains_key(X_RATELIMIT_LIMIT));
    }
}
