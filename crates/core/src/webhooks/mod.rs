//! Signed webhook verification and idempotent ingestion.

mod ingestion;
mod key_cache;
mod verifier;
mod webhooks_model;
mod webhooks_traits;

pub use ingestion::*;
pub use key_cache::*;
pub use verifier::*;
pub use webhooks_model::*;
pub use webhooks_traits::*;
