//! CSRF double-submit protection for state-changing dashboard requests.

mod guard;
mod memory;

pub use guard::{CSRF_COOKIE_NAME, CSRF_HEADER_NAME, CsrfConfig, CsrfGuard};
pub use memory::InMemoryCsrfTokenStore;
