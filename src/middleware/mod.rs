//! HTTP middleware
//!
//! Request tracing, security headers and the authentication extractors.

pub mod auth;
mod security;
mod tracing;

pub use auth::StaffUser;
pub use security::{security_headers, SecurityPolicy};
pub use self::tracing::{request_tracing, REQUEST_ID_HEADER};
