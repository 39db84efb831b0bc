//! Shared types and models for the publishing inventory & fulfillment ledger
//!
//! This crate contains the domain types, the order transition table and the
//! pure availability calculations used by the backend and its tests.

pub mod availability;
pub mod models;
pub mod types;
pub mod validation;

pub use availability::*;
pub use models::*;
pub use types::*;
pub use validation::*;
