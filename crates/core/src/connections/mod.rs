//! User-facing connection operations: linking, manual syncs, retries and health.

mod connections_model;
mod connections_service;

pub use connections_model::*;
pub use connections_service::*;
