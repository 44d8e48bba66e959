//! # Shopfront Domain
//!
//! Business domain types for the Shopfront gateway.
//!
//! This crate contains:
//! - The gateway error taxonomy and Result definition
//! - Configuration structures
//! - Domain constants
//!
//! ## Architecture
//! - Depends only on the foundation tier of `shopfront-common`, so errors can
//!   describe themselves through `ErrorClassification`
//! - No I/O, no async runtime

pub mod config;
pub mod constants;
pub mod errors;

// Re-export commonly used items
pub use config::*;
pub use errors::*;
