//! Loan origination lifecycle: application, appraisal, approval,
//! disbursement and repayment scheduling

pub mod amortization;
pub mod appraisal;
pub mod approval;
pub mod disbursement;
pub mod lifecycle;
mod model;
pub mod repo;
mod service;

pub use lifecycle::{ensure_allowed, validate_terms, LoanAction};
pub use model::*;
pub use service::LoanService;
