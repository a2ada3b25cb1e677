mod model;
mod repository;

pub use model::TransactionDB;
pub use repository::LedgerRepository;
