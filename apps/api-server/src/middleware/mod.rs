//! Middleware and request extractors.

pub mod auth;
pub mod csrf;
pub mod error;
pub mod rate_limit;
