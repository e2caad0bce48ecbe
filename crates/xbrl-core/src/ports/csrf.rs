//! CSRF token storage port.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::CsrfTokenRecord;

/// Server-side storage for hashed CSRF tokens, one per session.
#[async_trait]
pub trait CsrfTokenStore: Send + Sync {
    /// Insert or replace the token for `record.session_id`.
    async fn upsert(&self, record: CsrfTokenRecord) -> Result<(), CsrfError>;

    async fn find(&self, session_id: &str) -> Result<Option<CsrfTokenRecord>, CsrfError>;

    async fn remove(&self, session_id: &str) -> Result<(), CsrfError>;

    /// Drop every token that expired before `now`; returns how many.
    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize, CsrfError>;
}

/// CSRF storage errors.
#[derive(Debug, thiserror::Error)]
pub enum CsrfError {
    #[error("Token store error: {0}")]
    Store(String),
}
