//! HMAC-SHA256 API-key hashing.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;

use xbrl_core::domain::api_key::{
    KEY_DISPLAY_PREFIX_LEN, KEY_DISPLAY_SUFFIX_LEN, KEY_LITERAL_PREFIX, KEY_RANDOM_LEN,
    is_well_formed_key,
};
use xbrl_core::ports::{ApiKeyVerifier, AuthError, GeneratedApiKey};

type HmacSha256 = Hmac<Sha256>;

/// Environment variables consulted for the server secret, in order.
const SECRET_ENV_VARS: [&str; 3] = ["KEY_DERIVE_SECRET", "API_KEY_SECRET", "KEY_PEPPER"];

/// Secrets shorter than this still work but are flagged at startup.
const RECOMMENDED_SECRET_LEN: usize = 32;

/// API-key verifier keyed with a server-side secret.
///
/// Stored hashes are hex HMAC-SHA256 digests of the full plaintext key, so a
/// leaked table is useless without the secret.
pub struct HmacApiKeyVerifier {
    mac: HmacSha256,
}

impl HmacApiKeyVerifier {
    pub fn new(secret: impl AsRef<[u8]>) -> Result<Self, AuthError> {
        let secret = secret.as_ref();
        if secret.is_empty() {
            return Err(AuthError::Configuration(
                "API key secret must not be empty".to_string(),
            ));
        }
        if secret.len() < RECOMMENDED_SECRET_LEN {
            tracing::warn!(
                len = secret.len(),
                "API key secret is shorter than {} bytes",
                RECOMMENDED_SECRET_LEN
            );
        }

        let mac = HmacSha256::new_from_slice(secret)
            .map_err(|e| AuthError::Configuration(e.to_string()))?;
        Ok(Self { mac })
    }

    /// Build from `KEY_DERIVE_SECRET`, `API_KEY_SECRET` or `KEY_PEPPER`.
    pub fn from_env() -> Result<Self, AuthError> {
        let secret = resolve_secret(|name| std::env::var(name).ok())?;
        Self::new(secret)
    }

    fn hash(&self, key: &str) -> String {
        let mut mac = self.mac.clone();
        mac.update(key.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }
}

/// Pick the first non-empty secret variable. Values that are valid padded
/// base64 are decoded; anything else is used as raw UTF-8.
fn resolve_secret(lookup: impl Fn(&str) -> Option<String>) -> Result<Vec<u8>, AuthError> {
    let raw = SECRET_ENV_VARS
        .iter()
        .find_map(|name| lookup(name).filter(|v| !v.trim().is_empty()))
        .ok_or_else(|| {
            AuthError::Configuration(format!(
                "one of {} must be set",
                SECRET_ENV_VARS.join(", ")
            ))
        })?;

    let raw = raw.trim();
    if raw.len() % 4 == 0 {
        if let Ok(decoded) = STANDARD.decode(raw) {
            if !decoded.is_empty() {
                return Ok(decoded);
            }
        }
    }
    Ok(raw.as_bytes().to_vec())
}

impl ApiKeyVerifier for HmacApiKeyVerifier {
    fn generate(&self) -> GeneratedApiKey {
        let mut random = [0u8; KEY_RANDOM_LEN / 2];
        rand::thread_rng().fill_bytes(&mut random);

        let plaintext = format!("{}{}", KEY_LITERAL_PREFIX, hex::encode(random));
        let hash = self.hash(&plaintext);
        let prefix = plaintext[..KEY_DISPLAY_PREFIX_LEN].to_string();
        let suffix = plaintext[plaintext.len() - KEY_DISPLAY_SUFFIX_LEN..].to_string();

        GeneratedApiKey {
            plaintext,
            hash,
            prefix,
            suffix,
        }
    }

    fn verify(&self, presented: &str, stored_hash: &str) -> bool {
        if !is_well_formed_key(presented) {
            return false;
        }
        let Ok(expected) = hex::decode(stored_hash) else {
            return false;
        };

        let mut mac = self.mac.clone();
        mac.update(presented.as_bytes());
        // Constant-time comparison; a length mismatch is also a plain `false`.
        mac.verify_slice(&expected).is_ok()
    }
}
