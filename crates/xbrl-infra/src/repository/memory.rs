//! In-memory API-key repository.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use xbrl_core::domain::ApiKeyRecord;
use xbrl_core::error::RepoError;
use xbrl_core::ports::{ApiKeyRepository, BaseRepository};

/// Process-local key store for development and tests.
///
/// Display prefixes are unique across records, mirroring the unique index a
/// database-backed store would carry.
#[derive(Debug, Default)]
pub struct InMemoryApiKeyRepository {
    records: RwLock<HashMap<Uuid, ApiKeyRecord>>,
}

impl InMemoryApiKeyRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl BaseRepository<ApiKeyRecord, Uuid> for InMemoryApiKeyRepository {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<ApiKeyRecord>, RepoError> {
        Ok(self.records.read().await.get(&id).cloned())
    }

    async fn save(&self, entity: ApiKeyRecord) -> Result<ApiKeyRecord, RepoError> {
        let mut records = self.records.write().await;

        let clash = records
            .values()
            .any(|r| r.prefix == entity.prefix && r.id != entity.id);
        if clash {
            return Err(RepoError::Constraint(format!(
                "duplicate key prefix {}",
                entity.prefix
            )));
        }

        records.insert(entity.id, entity.clone());
        Ok(entity)
    }
}

#[async_trait]
impl ApiKeyRepository for InMemoryApiKeyRepository {
    async fn find_by_prefix(&self, prefix: &str) -> Result<Option<ApiKeyRecord>, RepoError> {
        Ok(self
            .records
            .read()
            .await
            .values()
            .find(|r| r.prefix == prefix)
            .cloned())
    }

    async fn list_by_user(&self, user_id: Uuid) -> Result<Vec<ApiKeyRecord>, RepoError> {
        let mut keys: Vec<ApiKeyRecord> = self
            .records
            .read()
            .await
            .values()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect();
        keys.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(keys)
    }

    async fn record_usage(
        &self,
        id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<ApiKeyRecord>, RepoError> {
        let mut records = self.records.write().await;
        match records.get_mut(&id) {
            Some(record) if record.is_usable(now) => {
                record.record_usage(now);
                Ok(Some(record.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn mark_expired(&self, id: Uuid, now: DateTime<Utc>) -> Result<bool, RepoError> {
        let mut records = self.records.write().await;
        Ok(records
            .get_mut(&id)
            .is_some_and(|record| record.expire_if_due(now)))
    }

    async fn mark_revoked(
        &self,
        id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<ApiKeyRecord>, RepoError> {
        let mut records = self.records.write().await;
        match records.get_mut(&id) {
            Some(record) => {
                if record.revoke(now).is_ok() {
                    Ok(Some(record.clone()))
                } else {
                    Ok(None)
                }
            }
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeDelta, Utc};
    use xbrl_core::domain::{ApiKeyStatus, PlanTier};

    fn record(user_id: Uuid, prefix: &str, age_minutes: i64) -> ApiKeyRecord {
        ApiKeyRecord::new(
            user_id,
            format!("key {}", prefix),
            "00".repeat(32),
            prefix.to_string(),
            "abcd".to_string(),
            PlanTier::Free,
            None,
            Utc::now() - TimeDelta::minutes(age_minutes),
        )
    }

    #[tokio::test]
    async fn test_save_and_find() {
        let repo = InMemoryApiKeyRepository::new();
        let saved = repo
            .save(record(Uuid::new_v4(), "xbrl_live_aaaaaaaa", 0))
            .await
            .unwrap();

        let by_id = repo.find_by_id(saved.id).await.unwrap().unwrap();
        assert_eq!(by_id.prefix, saved.prefix);

        let by_prefix = repo.find_by_prefix("xbrl_live_aaaaaaaa").await.unwrap();
        assert_eq!(by_prefix.map(|r| r.id), Some(saved.id));
        assert!(repo.find_by_prefix("xbrl_live_bbbbbbbb").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_save_updates_in_place() {
        let repo = InMemoryApiKeyRepository::new();
        let mut saved = repo
            .save(record(Uuid::new_v4(), "xbrl_live_aaaaaaaa", 0))
            .await
            .unwrap();

        saved.record_usage(Utc::now());
        repo.save(saved.clone()).await.unwrap();

        assert_eq!(repo.len().await, 1);
        let stored = repo.find_by_id(saved.id).await.unwrap().unwrap();
        assert_eq!(stored.usage_count, 1);
    }

    #[tokio::test]
    async fn test_duplicate_prefix_rejected() {
        let repo = InMemoryApiKeyRepository::new();
        repo.save(record(Uuid::new_v4(), "xbrl_live_aaaaaaaa", 0))
            .await
            .unwrap();

        let result = repo.save(record(Uuid::new_v4(), "xbrl_live_aaaaaaaa", 0)).await;
        assert!(matches!(result, Err(RepoError::Constraint(_))));
    }

    #[tokio::test]
    async fn test_list_by_user_newest_first() {
        let repo = InMemoryApiKeyRepository::new();
        let owner = Uuid::new_v4();

        let old = repo.save(record(owner, "xbrl_live_00000001", 30)).await.unwrap();
        let new = repo.save(record(owner, "xbrl_live_00000002", 1)).await.unwrap();
        repo.save(record(Uuid::new_v4(), "xbrl_live_00000003", 0))
            .await
            .unwrap();

        let keys = repo.list_by_user(owner).await.unwrap();
        let ids: Vec<Uuid> = keys.iter().map(|k| k.id).collect();
        assert_eq!(ids, vec![new.id, old.id]);
    }

    #[tokio::test]
    async fn test_record_usage_only_counts_active_keys() {
        let repo = InMemoryApiKeyRepository::new();
        let saved = repo
            .save(record(Uuid::new_v4(), "xbrl_live_aaaaaaaa", 0))
            .await
            .unwrap();
        let now = Utc::now();

        let used = repo.record_usage(saved.id, now).await.unwrap().unwrap();
        assert_eq!(used.usage_count, 1);
        assert_eq!(used.last_used_at, Some(now));

        repo.mark_revoked(saved.id, now).await.unwrap().unwrap();
        assert!(repo.record_usage(saved.id, now).await.unwrap().is_none());
        assert!(repo.record_usage(Uuid::new_v4(), now).await.unwrap().is_none());

        let stored = repo.find_by_id(saved.id).await.unwrap().unwrap();
        assert_eq!(stored.status, ApiKeyStatus::Revoked);
        assert_eq!(stored.usage_count, 1);
    }

    #[tokio::test]
    async fn test_mark_expired_and_revoked_transitions() {
        let repo = InMemoryApiKeyRepository::new();
        let mut expiring = record(Uuid::new_v4(), "xbrl_live_aaaaaaaa", 10);
        expiring.expires_at = Some(Utc::now() - TimeDelta::minutes(1));
        let expiring = repo.save(expiring).await.unwrap();
        let now = Utc::now();

        assert!(repo.mark_expired(expiring.id, now).await.unwrap());
        assert!(!repo.mark_expired(expiring.id, now).await.unwrap());
        assert!(repo.mark_revoked(expiring.id, now).await.unwrap().is_none());

        let active = repo
            .save(record(Uuid::new_v4(), "xbrl_live_bbbbbbbb", 0))
            .await
            .unwrap();
        assert!(!repo.mark_expired(active.id, now).await.unwrap());
        let revoked = repo.mark_revoked(active.id, now).await.unwrap().unwrap();
        assert_eq!(revoked.revoked_at, Some(now));
        assert!(repo.mark_revoked(active.id, now).await.unwrap().is_none());
    }
}
