//! Northstar core: provider sync engine, webhook ingestion and credential vault.
//!
//! Storage and the aggregation provider are reached only through the traits
//! defined here; `northstar-storage-sqlite` and `northstar-plaid` implement them.

pub mod connections;
pub mod errors;
pub mod items;
pub mod provider;
pub mod secrets;
pub mod sync;
pub mod transactions;
pub mod webhooks;

pub use errors::{DatabaseError, Error, Result};

#[cfg(test)]
pub(crate) mod testing;
