//! API-key and session authentication.

mod api_key;
mod authenticator;
mod jwt;

pub use api_key::HmacApiKeyVerifier;
pub use authenticator::{
    ApiKeyAuthenticator, ApiKeyPrincipal, IssuedApiKey, MAX_KEY_NAME_LEN, Verification,
};
pub use jwt::{JwtSessionService, SessionConfig};
