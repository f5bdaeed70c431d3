//! Customer onboarding and KYC

mod model;
mod service;

pub use model::*;
pub use service::{kyc_status, load_customer, CustomerService};
