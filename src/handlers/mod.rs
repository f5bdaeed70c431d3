//! API handlers
//!
//! Thin adapters: validate the payload, call the service, wrap the result.

mod account;
mod branch;
mod customer;
mod loan;

pub use account::*;
pub use branch::*;
pub use customer::*;
pub use loan::*;

use serde::Serialize;

/// Standard API response envelope
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }
}
