//! Application state - shared across all handlers.

use std::sync::Arc;

use xbrl_core::DomainError;
use xbrl_core::domain::{Quota, RateLimitStats};
use xbrl_core::ports::{AuthError, RateLimiter, SessionTokenService};
use xbrl_infra::{
    ApiKeyAuthenticator, CsrfConfig, CsrfGuard, HmacApiKeyVerifier, InMemoryApiKeyRepository,
    InMemoryCsrfTokenStore, InMemoryRateLimiter, JwtSessionService, RateLimitConfig,
    SweeperHandle,
};

use crate::config::{AppConfig, RateLimitBackend};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub limiter: Arc<dyn RateLimiter>,
    /// Set when the in-memory limiter is active; exposes stats and resets.
    pub local_limiter: Option<Arc<InMemoryRateLimiter>>,
    /// Quota applied per client address across `/api`.
    pub ip_quota: Quota,
    pub authenticator: Arc<ApiKeyAuthenticator>,
    pub sessions: Arc<dyn SessionTokenService>,
    pub csrf: Arc<CsrfGuard>,
}

/// Startup failures that stop the server from booting.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("authentication setup failed: {0}")]
    Auth(#[from] AuthError),

    #[error("invalid rate limit configuration: {0}")]
    RateLimit(#[from] DomainError),
}

impl AppState {
    /// Build the application state with appropriate implementations.
    ///
    /// Returns the sweeper handle when the in-memory limiter is used; the
    /// caller stops it on shutdown.
    pub async fn new(config: &AppConfig) -> Result<(Self, Option<SweeperHandle>), StartupError> {
        let rate_config = RateLimitConfig::from_env();
        let ip_quota = rate_config.quota()?;

        let (limiter, local_limiter, sweeper) =
            build_rate_limiter(config.rate_limit_backend, &rate_config).await;

        let verifier = Arc::new(HmacApiKeyVerifier::from_env()?);
        let repo = Arc::new(InMemoryApiKeyRepository::new());
        let authenticator = Arc::new(ApiKeyAuthenticator::new(repo, verifier));

        let sessions: Arc<dyn SessionTokenService> = Arc::new(JwtSessionService::from_env());
        let csrf = Arc::new(CsrfGuard::new(
            Arc::new(InMemoryCsrfTokenStore::new()),
            CsrfConfig::from_env(),
        ));

        tracing::info!(
            limit = ip_quota.limit(),
            window_ms = ip_quota.window().as_millis() as u64,
            "Application state initialized"
        );

        Ok((
            Self {
                limiter,
                local_limiter,
                ip_quota,
                authenticator,
                sessions,
                csrf,
            },
            sweeper,
        ))
    }

    /// Stats of the in-memory limiter, if that is the active backend.
    pub fn rate_limit_stats(&self) -> Option<RateLimitStats> {
        self.local_limiter.as_ref().map(|l| l.stats())
    }
}

type LimiterParts = (
    Arc<dyn RateLimiter>,
    Option<Arc<InMemoryRateLimiter>>,
    Option<SweeperHandle>,
);

async fn build_rate_limiter(backend: RateLimitBackend, config: &RateLimitConfig) -> LimiterParts {
    if backend == RateLimitBackend::Redis {
        #[cfg(feature = "redis")]
        {
            match xbrl_infra::RedisRateLimiter::from_env().await {
                Ok(limiter) => return (Arc::new(limiter), None, None),
                Err(e) => {
                    tracing::error!(
                        "Failed to connect to Redis: {}. Using in-memory rate limiter.",
                        e
                    );
                }
            }
        }

        #[cfg(not(feature = "redis"))]
        tracing::warn!("Built without redis feature. Using in-memory rate limiter.");
    }

    let local = Arc::new(InMemoryRateLimiter::new());
    let sweeper = local.start_sweeper(config.sweep_interval);
    (local.clone(), Some(local), Some(sweeper))
}
