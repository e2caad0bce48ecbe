//! API-key lifecycle: issue, authenticate, revoke, list.

use std::sync::Arc;

use chrono::TimeDelta;
use uuid::Uuid;

use xbrl_core::DomainError;
use xbrl_core::domain::api_key::display_prefix;
use xbrl_core::domain::{ApiKeyRecord, PlanTier, mask_api_key};
use xbrl_core::error::RepoError;
use xbrl_core::ports::{ApiKeyRepository, ApiKeyVerifier, AuthError, Clock, SystemClock};

/// Longest accepted key name, in characters.
pub const MAX_KEY_NAME_LEN: usize = 100;

/// Fresh keys generated before giving up on display-prefix clashes.
const MAX_ISSUE_ATTEMPTS: usize = 3;

/// A newly issued key. `plaintext` is shown to the owner exactly once.
pub struct IssuedApiKey {
    pub record: ApiKeyRecord,
    pub plaintext: String,
}

impl std::fmt::Debug for IssuedApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IssuedApiKey")
            .field("id", &self.record.id)
            .field("plaintext", &mask_api_key(&self.plaintext))
            .finish_non_exhaustive()
    }
}

/// Identity attached to a request authenticated by API key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiKeyPrincipal {
    pub key_id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub plan: PlanTier,
    pub prefix: String,
}

impl From<&ApiKeyRecord> for ApiKeyPrincipal {
    fn from(record: &ApiKeyRecord) -> Self {
        Self {
            key_id: record.id,
            user_id: record.user_id,
            name: record.name.clone(),
            plan: record.plan,
            prefix: record.prefix.clone(),
        }
    }
}

/// Outcome of presenting a key. The reason for a denial is never exposed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verification {
    Granted(ApiKeyPrincipal),
    Denied,
}

/// Ties the verifier to credential storage.
pub struct ApiKeyAuthenticator {
    repo: Arc<dyn ApiKeyRepository>,
    verifier: Arc<dyn ApiKeyVerifier>,
    clock: Arc<dyn Clock>,
}

impl ApiKeyAuthenticator {
    pub fn new(repo: Arc<dyn ApiKeyRepository>, verifier: Arc<dyn ApiKeyVerifier>) -> Self {
        Self::with_clock(repo, verifier, Arc::new(SystemClock))
    }

    pub fn with_clock(
        repo: Arc<dyn ApiKeyRepository>,
        verifier: Arc<dyn ApiKeyVerifier>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            repo,
            verifier,
            clock,
        }
    }

    /// Generate and store a new key for `user_id`.
    ///
    /// Only the hash and display parts are persisted.
    pub async fn issue(
        &self,
        user_id: Uuid,
        name: &str,
        plan: PlanTier,
        ttl: Option<TimeDelta>,
    ) -> Result<IssuedApiKey, DomainError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(DomainError::Validation("key name is required".to_string()));
        }
        if name.chars().count() > MAX_KEY_NAME_LEN {
            return Err(DomainError::Validation(format!(
                "key name must be at most {} characters",
                MAX_KEY_NAME_LEN
            )));
        }
        if ttl.is_some_and(|ttl| ttl <= TimeDelta::zero()) {
            return Err(DomainError::Validation(
                "key lifetime must be positive".to_string(),
            ));
        }

        let now = self.clock.now();
        let expires_at = match ttl {
            Some(ttl) => Some(now.checked_add_signed(ttl).ok_or_else(|| {
                DomainError::Validation("key lifetime too long".to_string())
            })?),
            None => None,
        };

        let mut attempt = 1;
        loop {
            let generated = self.verifier.generate();
            let record = ApiKeyRecord::new(
                user_id,
                name.to_string(),
                generated.hash,
                generated.prefix,
                generated.suffix,
                plan,
                expires_at,
                now,
            );

            match self.repo.save(record).await {
                Ok(record) => {
                    tracing::info!(key_id = %record.id, user_id = %user_id, plan = %plan, "API key issued");
                    return Ok(IssuedApiKey {
                        record,
                        plaintext: generated.plaintext,
                    });
                }
                Err(RepoError::Constraint(reason)) if attempt < MAX_ISSUE_ATTEMPTS => {
                    tracing::warn!(attempt, reason = %reason, "API key prefix clash, regenerating");
                    attempt += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Check a presented key.
    ///
    /// Only storage failures are errors; every rejection is `Denied`.
    pub async fn authenticate(&self, presented: &str) -> Result<Verification, AuthError> {
        let Some(prefix) = display_prefix(presented) else {
            tracing::debug!("API key rejected: malformed");
            return Ok(Verification::Denied);
        };

        let Some(record) = self.repo.find_by_prefix(prefix).await? else {
            tracing::debug!(prefix = %prefix, "API key rejected: unknown prefix");
            return Ok(Verification::Denied);
        };

        if !self.verifier.verify(presented, &record.key_hash) {
            tracing::debug!(key_id = %record.id, "API key rejected: hash mismatch");
            return Ok(Verification::Denied);
        }

        let now = self.clock.now();
        if self.repo.mark_expired(record.id, now).await? {
            tracing::info!(key_id = %record.id, "API key expired");
            return Ok(Verification::Denied);
        }

        // The stored status is rechecked under the write; the copy read
        // above may already be stale.
        match self.repo.record_usage(record.id, now).await? {
            Some(used) => Ok(Verification::Granted(ApiKeyPrincipal::from(&used))),
            None => {
                tracing::debug!(key_id = %record.id, status = %record.status, "API key rejected: not active");
                Ok(Verification::Denied)
            }
        }
    }

    /// Revoke one of the caller's keys.
    pub async fn revoke(&self, user_id: Uuid, key_id: Uuid) -> Result<ApiKeyRecord, DomainError> {
        let mut record =
            self.repo
                .find_by_id(key_id)
                .await?
                .ok_or(DomainError::NotFound {
                    entity_type: "api_key",
                    id: key_id,
                })?;

        if record.user_id != user_id {
            tracing::warn!(key_id = %key_id, user_id = %user_id, "Revoke attempted by non-owner");
            return Err(DomainError::Forbidden);
        }

        let now = self.clock.now();
        record.revoke(now)?;
        let record = self.repo.mark_revoked(key_id, now).await?.ok_or_else(|| {
            DomainError::InvalidTransition("key is no longer active".to_string())
        })?;

        tracing::info!(key_id = %key_id, user_id = %user_id, "API key revoked");
        Ok(record)
    }

    /// The caller's keys, newest first.
    pub async fn list(&self, user_id: Uuid) -> Result<Vec<ApiKeyRecord>, DomainError> {
        Ok(self.repo.list_by_user(user_id).await?)
    }
}
