//! Secret handling for provider credentials.

mod vault;

pub use vault::*;
