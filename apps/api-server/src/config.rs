//! Application configuration loaded from environment variables.

use std::env;
use std::str::FromStr;

/// Which store backs the rate limiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RateLimitBackend {
    #[default]
    Memory,
    Redis,
}

impl FromStr for RateLimitBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" | "in-memory" => Ok(Self::Memory),
            "redis" => Ok(Self::Redis),
            other => Err(format!("unknown rate limit backend: {}", other)),
        }
    }
}

/// Application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub rate_limit_backend: RateLimitBackend,
    /// Cron expression for expired CSRF token cleanup.
    pub cleanup_schedule: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            rate_limit_backend: RateLimitBackend::Memory,
            cleanup_schedule: "0 */10 * * * *".to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let rate_limit_backend = match env::var("RATE_LIMIT_BACKEND") {
            Ok(value) => value.parse().unwrap_or_else(|e| {
                tracing::warn!("{}; using in-memory rate limiter", e);
                RateLimitBackend::Memory
            }),
            Err(_) => defaults.rate_limit_backend,
        };

        Self {
            host: env::var("HOST").unwrap_or(defaults.host),
            port: env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.port),
            rate_limit_backend,
            cleanup_schedule: env::var("CLEANUP_SCHEDULE").unwrap_or(defaults.cleanup_schedule),
        }
    }
}
