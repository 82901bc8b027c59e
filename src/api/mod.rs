//! HTTP surface over the solvency ledger.

pub mod routes;

pub use routes::{create_router, ApiError, AppState};
