//! Infrastructure-side error plumbing
//!
//! External crate errors are converted into [`GatewayError`] here and nowhere
//! else.
//!
//! [`GatewayError`]: shopfront_domain::GatewayError

mod conversions;

pub use conversions::{transport_error, InfraError};
