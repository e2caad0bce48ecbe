//! In-memory CSRF token store.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use xbrl_core::domain::CsrfTokenRecord;
use xbrl_core::ports::{CsrfError, CsrfTokenStore};

/// One hashed token per session, kept in process memory.
#[derive(Debug, Default)]
pub struct InMemoryCsrfTokenStore {
    tokens: RwLock<HashMap<String, CsrfTokenRecord>>,
}

impl InMemoryCsrfTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.tokens.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.tokens.read().await.is_empty()
    }
}

#[async_trait]
impl CsrfTokenStore for InMemoryCsrfTokenStore {
    async fn upsert(&self, record: CsrfTokenRecord) -> Result<(), CsrfError> {
        self.tokens
            .write()
            .await
            .insert(record.session_id.clone(), record);
        Ok(())
    }

    async fn find(&self, session_id: &str) -> Result<Option<CsrfTokenRecord>, CsrfError> {
        Ok(self.tokens.read().await.get(session_id).cloned())
    }

    async fn remove(&self, session_id: &str) -> Result<(), CsrfError> {
        self.tokens.write().await.remove(session_id);
        Ok(())
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize, CsrfError> {
        let mut tokens = self.tokens.write().await;
        let before = tokens.len();
        tokens.retain(|_, record| !record.is_expired(now));
        Ok(before - tokens.len())
    }
}
