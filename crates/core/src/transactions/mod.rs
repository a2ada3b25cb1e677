//! Ledger rows reconciled from the provider's transaction feed.

mod transactions_model;
mod transactions_traits;

pub use transactions_model::*;
pub use transactions_traits::*;
