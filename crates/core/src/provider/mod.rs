//! Contract with the external aggregation provider.
//!
//! Provider calls return [`ProviderError`] with the structured fields the
//! failure classifier needs instead of an opaque error.

mod provider_model;
mod provider_traits;

pub use provider_model::*;
pub use provider_traits::*;
