//! Middleware for request logging and caller identification.

pub mod logging;
pub mod principal;

pub use logging::request_logging;
pub use principal::{principal_middleware, Caller, PRINCIPAL_HEADER};
