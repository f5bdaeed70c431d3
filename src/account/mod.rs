//! Products and account provisioning

mod model;
mod service;

pub use model::*;
pub use service::AccountService;
