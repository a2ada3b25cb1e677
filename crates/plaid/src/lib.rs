//! HTTP client for the Plaid API.
//!
//! Implements the provider contracts from `northstar-core`: the transaction
//! sync feed, the account-linking calls and webhook verification-key lookup.

mod client;
mod environment;
mod error;
mod types;

pub use client::PlaidClient;
pub use environment::{PlaidConfig, PlaidEnvironment};
pub use error::{PlaidError, Result};
pub use types::*;
