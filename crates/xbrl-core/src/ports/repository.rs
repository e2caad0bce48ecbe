use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::ApiKeyRecord;
use crate::error::RepoError;

/// Generic repository trait for entities that are never physically deleted.
#[async_trait]
pub trait BaseRepository<T, ID>: Send + Sync {
    /// Find an entity by its unique ID.
    async fn find_by_id(&self, id: ID) -> Result<Option<T>, RepoError>;

    /// Save an entity (create or update).
    async fn save(&self, entity: T) -> Result<T, RepoError>;
}

/// Credential storage for API keys.
#[async_trait]
pub trait ApiKeyRepository: BaseRepository<ApiKeyRecord, Uuid> {
    /// Find the record whose display prefix matches a presented key.
    async fn find_by_prefix(&self, prefix: &str) -> Result<Option<ApiKeyRecord>, RepoError>;

    /// All keys owned by a user, newest first.
    async fn list_by_user(&self, user_id: Uuid) -> Result<Vec<ApiKeyRecord>, RepoError>;

    /// Count one use of the key, atomically with checking that the stored
    /// record is still usable at `now`.
    ///
    /// Returns the updated record, or `None` if the key is missing or no
    /// longer active.
    async fn record_usage(
        &self,
        id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<ApiKeyRecord>, RepoError>;

    /// Persist the expiry of an active key whose lifetime has passed.
    /// Returns true if the stored status changed.
    async fn mark_expired(&self, id: Uuid, now: DateTime<Utc>) -> Result<bool, RepoError>;

    /// Revoke the stored record if it is still active at `now`.
    ///
    /// Returns the revoked record, or `None` if the key is missing or not
    /// active anymore.
    async fn mark_revoked(
        &self,
        id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<ApiKeyRecord>, RepoError>;
}
