//! Microfinance core server library
//!
//! Loan origination lifecycle, amortization, customers and KYC, products and
//! accounts, exposed over an axum HTTP API backed by Postgres.

pub mod account;
pub mod auth;
pub mod branch;
pub mod config;
pub mod context;
pub mod customer;
pub mod db;
pub mod eligibility;
pub mod error;
pub mod handlers;
pub mod loan;
pub mod middleware;
pub mod routes;
pub mod sequence;
pub mod state;
