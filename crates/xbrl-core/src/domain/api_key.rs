//! API-key records and the plaintext key format.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::rate_limit::Quota;
use crate::error::DomainError;

/// Literal prefix every issued key starts with.
pub const KEY_LITERAL_PREFIX: &str = "xbrl_live_";

/// Length of the random hex segment following the literal prefix.
pub const KEY_RANDOM_LEN: usize = 64;

/// Number of random characters kept in the display prefix.
const DISPLAY_RANDOM_CHARS: usize = 8;

/// Length of the display prefix (literal + first random chars).
pub const KEY_DISPLAY_PREFIX_LEN: usize = KEY_LITERAL_PREFIX.len() + DISPLAY_RANDOM_CHARS;

/// Length of the display suffix.
pub const KEY_DISPLAY_SUFFIX_LEN: usize = 4;

/// Replacement for the hidden middle of a key.
pub const KEY_MASK: &str = "********";

/// Cheap structural check: literal prefix followed by exactly
/// [`KEY_RANDOM_LEN`] lowercase hex digits.
///
/// This is not a security boundary; it only avoids hashing obvious garbage.
pub fn is_well_formed_key(key: &str) -> bool {
    match key.strip_prefix(KEY_LITERAL_PREFIX) {
        Some(random) => {
            random.len() == KEY_RANDOM_LEN
                && random
                    .bytes()
                    .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
        }
        None => false,
    }
}

/// Display prefix of a well-formed key, used to look the record up.
pub fn display_prefix(key: &str) -> Option<&str> {
    is_well_formed_key(key).then(|| &key[..KEY_DISPLAY_PREFIX_LEN])
}

/// Display suffix of a well-formed key.
pub fn display_suffix(key: &str) -> Option<&str> {
    is_well_formed_key(key).then(|| &key[key.len() - KEY_DISPLAY_SUFFIX_LEN..])
}

/// Mask a key for display.
///
/// Keeps the first [`KEY_DISPLAY_PREFIX_LEN`] and last
/// [`KEY_DISPLAY_SUFFIX_LEN`] characters and replaces everything between
/// them with [`KEY_MASK`]. A full key and its already-masked form produce the
/// same output. Inputs too short to carry both ends are masked entirely.
pub fn mask_api_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() < KEY_DISPLAY_PREFIX_LEN + KEY_DISPLAY_SUFFIX_LEN {
        return KEY_MASK.to_string();
    }

    let prefix: String = chars[..KEY_DISPLAY_PREFIX_LEN].iter().collect();
    let suffix: String = chars[chars.len() - KEY_DISPLAY_SUFFIX_LEN..].iter().collect();
    format!("{}{}{}", prefix, KEY_MASK, suffix)
}

/// Lifecycle status of an API key.
///
/// `Revoked` and `Expired` are terminal: a key never returns to `Active`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ApiKeyStatus {
    #[default]
    Active,
    Revoked,
    Expired,
}

impl ApiKeyStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Active)
    }
}

impl fmt::Display for ApiKeyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Revoked => write!(f, "revoked"),
            Self::Expired => write!(f, "expired"),
        }
    }
}

/// Subscription plan attached to a key; decides its request quota.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PlanTier {
    #[default]
    Free,
    Standard,
    Pro,
    Enterprise,
}

impl PlanTier {
    /// Requests allowed per minute on this plan.
    pub fn requests_per_minute(&self) -> u32 {
        match self {
            Self::Free => 10,
            Self::Standard => 60,
            Self::Pro => 300,
            Self::Enterprise => 1000,
        }
    }

    pub fn quota(&self) -> Quota {
        Quota::per_minute(self.requests_per_minute())
    }
}

impl fmt::Display for PlanTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Free => write!(f, "free"),
            Self::Standard => write!(f, "standard"),
            Self::Pro => write!(f, "pro"),
            Self::Enterprise => write!(f, "enterprise"),
        }
    }
}

impl FromStr for PlanTier {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "free" => Ok(Self::Free),
            "standard" => Ok(Self::Standard),
            "pro" => Ok(Self::Pro),
            "enterprise" => Ok(Self::Enterprise),
            other => Err(DomainError::Validation(format!("unknown plan: {}", other))),
        }
    }
}

/// Stored API-key record. The plaintext key is never part of it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKeyRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub key_hash: String,
    pub prefix: String,
    pub suffix: String,
    pub status: ApiKeyStatus,
    pub plan: PlanTier,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub usage_count: u64,
    pub revoked_at: Option<DateTime<Utc>>,
}

impl ApiKeyRecord {
    /// Create a new active record from the hashed parts of a generated key.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        user_id: Uuid,
        name: String,
        key_hash: String,
        prefix: String,
        suffix: String,
        plan: PlanTier,
        expires_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            name,
            key_hash,
            prefix,
            suffix,
            status: ApiKeyStatus::Active,
            plan,
            expires_at,
            created_at: now,
            last_used_at: None,
            usage_count: 0,
            revoked_at: None,
        }
    }

    /// Status as of `now`: an active key past its expiry reads as expired
    /// even before the transition has been persisted.
    pub fn effective_status(&self, now: DateTime<Utc>) -> ApiKeyStatus {
        match (self.status, self.expires_at) {
            (ApiKeyStatus::Active, Some(expires_at)) if expires_at <= now => ApiKeyStatus::Expired,
            (status, _) => status,
        }
    }

    pub fn is_usable(&self, now: DateTime<Utc>) -> bool {
        self.effective_status(now) == ApiKeyStatus::Active
    }

    /// Explicitly revoke an active key.
    pub fn revoke(&mut self, now: DateTime<Utc>) -> Result<(), DomainError> {
        match self.effective_status(now) {
            ApiKeyStatus::Active => {
                self.status = ApiKeyStatus::Revoked;
                self.revoked_at = Some(now);
                Ok(())
            }
            status => Err(DomainError::InvalidTransition(format!(
                "cannot revoke a key that is {}",
                status
            ))),
        }
    }

    /// Persist the time-based transition. Returns true if the status changed.
    pub fn expire_if_due(&mut self, now: DateTime<Utc>) -> bool {
        if self.status == ApiKeyStatus::Active
            && self.effective_status(now) == ApiKeyStatus::Expired
        {
            self.status = ApiKeyStatus::Expired;
            return true;
        }
        false
    }

    pub fn record_usage(&mut self, now: DateTime<Utc>) {
        self.last_used_at = Some(now);
        self.usage_count = self.usage_count.saturating_add(1);
    }

    /// Display-safe form of the key.
    pub fn masked(&self) -> String {
        format!("{}{}{}", self.prefix, KEY_MASK, self.suffix)
    }
}
