mod model;
mod repository;

pub use model::{AccountDB, InstitutionDB, ItemDB};
pub use repository::ItemRepository;

#[cfg(test)]
pub(crate) use repository::test_support;
