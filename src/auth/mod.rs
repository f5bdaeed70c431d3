//! Staff token verification
//!
//! Tokens are issued by the identity service; this crate only checks the
//! signature, expiry and token type and reads the staff member's id and role.

mod jwt;

pub use jwt::{Claims, JwtError, StaffIdentity, TokenVerifier};
