//! # XBRL Core
//!
//! The domain layer of the XBRL API access-control stack: API-key records,
//! rate-limit quotas and decisions, CSRF token records, and the ports that
//! infrastructure implements. No I/O lives here.

pub mod domain;
pub mod error;
pub mod ports;

pub use error::DomainError;
