//! Credential storage implementations.

mod memory;

pub use memory::InMemoryApiKeyRepository;
