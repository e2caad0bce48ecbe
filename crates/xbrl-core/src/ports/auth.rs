//! Authentication ports: API-key hashing and dashboard session tokens.

use uuid::Uuid;

use crate::domain::mask_api_key;
use crate::error::RepoError;

/// Claims carried by a dashboard session token.
#[derive(Debug, Clone)]
pub struct SessionClaims {
    pub user_id: Uuid,
    pub email: Option<String>,
    pub role: String,
    pub exp: i64,
}

/// Session token service for the key-management dashboard.
pub trait SessionTokenService: Send + Sync {
    /// Issue a session token for a user.
    fn issue(&self, user_id: Uuid, email: Option<&str>, role: &str) -> Result<String, AuthError>;

    /// Validate and decode a session token.
    fn validate(&self, token: &str) -> Result<SessionClaims, AuthError>;

    /// Lifetime of issued tokens in seconds.
    fn expiration_seconds(&self) -> i64;
}

/// A freshly generated API key.
///
/// `plaintext` must be handed to the caller once and never logged or stored.
pub struct GeneratedApiKey {
    pub plaintext: String,
    pub hash: String,
    pub prefix: String,
    pub suffix: String,
}

impl std::fmt::Debug for GeneratedApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeneratedApiKey")
            .field("plaintext", &mask_api_key(&self.plaintext))
            .field("prefix", &self.prefix)
            .field("suffix", &self.suffix)
            .finish_non_exhaustive()
    }
}

/// Issues API keys and checks presented keys against stored hashes.
pub trait ApiKeyVerifier: Send + Sync {
    /// Generate a new random key together with its hash and display parts.
    fn generate(&self) -> GeneratedApiKey;

    /// Check a presented key against a stored hash.
    ///
    /// Malformed keys or hashes yield `false`, never an error.
    fn verify(&self, presented: &str, stored_hash: &str) -> bool;

    /// Display-safe form of a full or already-shortened key.
    fn mask(&self, key: &str) -> String {
        mask_api_key(key)
    }
}

/// Authentication errors.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Token expired")]
    TokenExpired,

    #[error("Invalid token: {0}")]
    InvalidToken(String),

    #[error("Missing authorization header")]
    MissingAuth,

    #[error("Insufficient permissions")]
    InsufficientPermissions,

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Credential storage error: {0}")]
    Storage(#[from] RepoError),
}
