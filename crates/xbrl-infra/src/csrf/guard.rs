//! CSRF token issuance and validation.

use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::TimeDelta;
use rand::RngCore;
use sha2::{Digest, Sha256};
use url::Url;

use xbrl_core::domain::{CsrfCheck, CsrfToken, CsrfTokenRecord};
use xbrl_core::ports::{Clock, CsrfError, CsrfTokenStore, SystemClock};

/// Cookie carrying the client copy of the token.
pub const CSRF_COOKIE_NAME: &str = "csrf-token";

/// Header the client echoes the token in.
pub const CSRF_HEADER_NAME: &str = "x-csrf-token";

const TOKEN_BYTES: usize = 32;

/// CSRF configuration.
#[derive(Debug, Clone)]
pub struct CsrfConfig {
    /// Public origin of the dashboard. When unset, `https://<Host>` is expected.
    pub allowed_origin: Option<String>,
    pub token_ttl: Duration,
}

impl Default for CsrfConfig {
    fn default() -> Self {
        Self {
            allowed_origin: None,
            token_ttl: Duration::from_secs(60 * 60),
        }
    }
}

impl CsrfConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            allowed_origin: std::env::var("APP_URL")
                .ok()
                .map(|url| url.trim_end_matches('/').to_string())
                .filter(|url| !url.is_empty()),
            token_ttl: std::env::var("CSRF_TOKEN_TTL_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.token_ttl),
        }
    }
}

/// Double-submit CSRF guard backed by server-side token hashes.
pub struct CsrfGuard {
    store: Arc<dyn CsrfTokenStore>,
    config: CsrfConfig,
    clock: Arc<dyn Clock>,
}

impl CsrfGuard {
    pub fn new(store: Arc<dyn CsrfTokenStore>, config: CsrfConfig) -> Self {
        Self::with_clock(store, config, Arc::new(SystemClock))
    }

    pub fn with_clock(
        store: Arc<dyn CsrfTokenStore>,
        config: CsrfConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            config,
            clock,
        }
    }

    pub fn token_ttl(&self) -> Duration {
        self.config.token_ttl
    }

    /// Issue a fresh token for a session, replacing any previous one.
    pub async fn issue(&self, session_id: &str) -> Result<CsrfToken, CsrfError> {
        let mut bytes = [0u8; TOKEN_BYTES];
        rand::thread_rng().fill_bytes(&mut bytes);
        let token = URL_SAFE_NO_PAD.encode(bytes);

        let now = self.clock.now();
        let expires_at =
            now + TimeDelta::from_std(self.config.token_ttl).unwrap_or(TimeDelta::hours(1));

        self.store
            .upsert(CsrfTokenRecord {
                session_id: session_id.to_string(),
                token_hash: hash_token(&token),
                expires_at,
                created_at: now,
            })
            .await?;

        Ok(CsrfToken { token, expires_at })
    }

    /// Validate a state-changing request. Any failure is `false`.
    pub async fn validate(&self, check: &CsrfCheck) -> bool {
        let Some(source) = check.origin.as_deref().or(check.referer.as_deref()) else {
            tracing::debug!("CSRF rejected: no origin or referer");
            return false;
        };

        let expected = match (&self.config.allowed_origin, &check.host) {
            (Some(origin), _) => web_origin(origin),
            (None, Some(host)) => web_origin(&format!("https://{}", host)),
            (None, None) => None,
        };
        let Some(expected) = expected else {
            tracing::debug!("CSRF rejected: no expected origin");
            return false;
        };
        if web_origin(source).as_deref() != Some(expected.as_str()) {
            tracing::debug!(source = %source, expected = %expected, "CSRF rejected: origin mismatch");
            return false;
        }

        let (Some(header), Some(cookie)) = (&check.header_token, &check.cookie_token) else {
            tracing::debug!("CSRF rejected: token missing");
            return false;
        };
        if !constant_time_eq(header, cookie) {
            tracing::debug!("CSRF rejected: header and cookie differ");
            return false;
        }
        if !is_token_shaped(header) {
            tracing::debug!("CSRF rejected: malformed token");
            return false;
        }

        let stored = match self.store.find(&check.session_id).await {
            Ok(Some(stored)) => stored,
            Ok(None) => {
                tracing::debug!("CSRF rejected: no token for session");
                return false;
            }
            Err(e) => {
                tracing::warn!(error = %e, "CSRF token lookup failed");
                return false;
            }
        };

        if !constant_time_eq(&stored.token_hash, &hash_token(header)) {
            tracing::debug!("CSRF rejected: token does not match session");
            return false;
        }

        if stored.is_expired(self.clock.now()) {
            tracing::debug!("CSRF rejected: token expired");
            if let Err(e) = self.store.remove(&check.session_id).await {
                tracing::warn!(error = %e, "Failed to remove expired CSRF token");
            }
            return false;
        }

        true
    }

    /// Drop expired tokens; returns how many were removed.
    pub async fn purge_expired(&self) -> Result<usize, CsrfError> {
        self.store.purge_expired(self.clock.now()).await
    }
}

/// `scheme://host[:port]` of a URL, with the default port left out.
/// Opaque origins such as `null` have none.
fn web_origin(raw: &str) -> Option<String> {
    let origin = Url::parse(raw).ok()?.origin();
    origin.is_tuple().then(|| origin.ascii_serialization())
}

fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

fn is_token_shaped(token: &str) -> bool {
    !token.is_empty()
        && token
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    a.bytes()
        .zip(b.bytes())
        .fold(0u8, |acc, (x, y)| acc | (x ^ y))
        == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use xbrl_core::ports::ManualClock;

    use crate::csrf::InMemoryCsrfTokenStore;

    const APP: &str = "https://app.example.com";

    fn guard() -> (CsrfGuard, Arc<InMemoryCsrfTokenStore>, Arc<ManualClock>) {
        let store = Arc::new(InMemoryCsrfTokenStore::new());
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let config = CsrfConfig {
            allowed_origin: Some(APP.to_string()),
            ..CsrfConfig::default()
        };
        let guard = CsrfGuard::with_clock(store.clone(), config, clock.clone());
        (guard, store, clock)
    }

    fn check_for(session: &str, token: &str) -> CsrfCheck {
        CsrfCheck {
            session_id: session.to_string(),
            origin: Some(APP.to_string()),
            referer: None,
            host: Some("app.example.com".to_string()),
            header_token: Some(token.to_string()),
            cookie_token: Some(token.to_string()),
        }
    }

    #[tokio::test]
    async fn test_issue_stores_only_hash() {
        let (guard, store, clock) = guard();
        let issued = guard.issue("session-1").await.unwrap();

        assert_eq!(URL_SAFE_NO_PAD.decode(&issued.token).unwrap().len(), TOKEN_BYTES);
        assert_eq!(issued.expires_at, clock.now() + TimeDelta::hours(1));

        let stored = store.find("session-1").await.unwrap().unwrap();
        assert_ne!(stored.token_hash, issued.token);
        assert_eq!(stored.token_hash, hash_token(&issued.token));
    }

    #[tokio::test]
    async fn test_valid_request_passes() {
        let (guard, _, _) = guard();
        let issued = guard.issue("session-1").await.unwrap();

        assert!(guard.validate(&check_for("session-1", &issued.token)).await);

        let mut via_referer = check_for("session-1", &issued.token);
        via_referer.origin = None;
        via_referer.referer = Some(format!("{}/dashboard/keys", APP));
        assert!(guard.validate(&via_referer).await);
    }

    #[tokio::test]
    async fn test_origin_checks() {
        let (guard, _, _) = guard();
        let issued = guard.issue("session-1").await.unwrap();

        let mut missing = check_for("session-1", &issued.token);
        missing.origin = None;
        assert!(!guard.validate(&missing).await);

        for origin in [
            "https://evil.example.net",
            "https://app.example.com.evil.net",
            "https://app.example.com:444",
            "http://app.example.com",
            "null",
        ] {
            let mut foreign = check_for("session-1", &issued.token);
            foreign.origin = Some(origin.to_string());
            assert!(!guard.validate(&foreign).await, "accepted {}", origin);
        }

        let mut foreign_referer = check_for("session-1", &issued.token);
        foreign_referer.origin = None;
        foreign_referer.referer = Some("https://app.example.com.evil.net/dashboard".to_string());
        assert!(!guard.validate(&foreign_referer).await);

        let mut explicit_port = check_for("session-1", &issued.token);
        explicit_port.origin = Some("https://app.example.com:443".to_string());
        assert!(guard.validate(&explicit_port).await);
    }

    #[test]
    fn test_web_origin() {
        assert_eq!(
            web_origin("https://app.example.com/keys?tab=1").as_deref(),
            Some("https://app.example.com")
        );
        assert_eq!(
            web_origin("http://localhost:3000/").as_deref(),
            Some("http://localhost:3000")
        );
        assert_eq!(web_origin("null"), None);
        assert_eq!(web_origin("not a url"), None);
    }

    #[tokio::test]
    async fn test_host_fallback_when_no_app_url() {
        let store = Arc::new(InMemoryCsrfTokenStore::new());
        let guard = CsrfGuard::new(store, CsrfConfig::default());
        let issued = guard.issue("s").await.unwrap();

        assert!(guard.validate(&check_for("s", &issued.token)).await);

        let mut no_host = check_for("s", &issued.token);
        no_host.host = None;
        assert!(!guard.validate(&no_host).await);
    }

    #[tokio::test]
    async fn test_double_submit_required() {
        let (guard, _, _) = guard();
        let issued = guard.issue("session-1").await.unwrap();

        let mut no_cookie = check_for("session-1", &issued.token);
        no_cookie.cookie_token = None;
        assert!(!guard.validate(&no_cookie).await);

        let mut mismatch = check_for("session-1", &issued.token);
        mismatch.cookie_token = Some(format!("{}x", issued.token));
        assert!(!guard.validate(&mismatch).await);

        assert!(!guard.validate(&check_for("session-1", "not a token!")).await);
    }

    #[tokio::test]
    async fn test_token_bound_to_session() {
        let (guard, _, _) = guard();
        let first = guard.issue("session-1").await.unwrap();
        guard.issue("session-2").await.unwrap();

        assert!(!guard.validate(&check_for("session-2", &first.token)).await);
        assert!(!guard.validate(&check_for("unknown", &first.token)).await);

        // Reissuing replaces the previous token.
        let second = guard.issue("session-1").await.unwrap();
        assert!(!guard.validate(&check_for("session-1", &first.token)).await);
        assert!(guard.validate(&check_for("session-1", &second.token)).await);
    }

    #[tokio::test]
    async fn test_expired_token_rejected_and_removed() {
        let (guard, store, clock) = guard();
        let issued = guard.issue("session-1").await.unwrap();

        clock.advance(Duration::from_secs(3601));
        assert!(!guard.validate(&check_for("session-1", &issued.token)).await);
        assert!(store.find("session-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let (guard, store, clock) = guard();
        guard.issue("old").await.unwrap();
        clock.advance(Duration::from_secs(1800));
        guard.issue("fresh").await.unwrap();
        clock.advance(Duration::from_secs(1801));

        assert_eq!(guard.purge_expired().await.unwrap(), 1);
        assert_eq!(store.len().await, 1);
    }

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq("abc", "abc"));
        assert!(!constant_time_eq("abc", "abd"));
        assert!(!constant_time_eq("abc", "abcd"));
        assert!(constant_time_eq("", ""));
    }
}
