//! SQLite storage for Northstar.
//!
//! Reads go through an r2d2 connection pool; every write is funneled through a
//! single writer actor ([`db::WriteHandle`]) that runs each job in one
//! immediate transaction.

pub mod db;
pub mod errors;
pub mod items;
pub mod retry_queue;
pub mod schema;
pub mod sync_runs;
pub mod transactions;
pub mod webhooks;

mod utils;

pub use db::{
    create_pool, get_connection, init, run_migrations, spawn_writer, DbPool, WriteHandle,
};
pub use errors::StorageError;
pub use items::ItemRepository;
pub use retry_queue::{QueuedRetry, RetryQueueRepository};
pub use sync_runs::SyncRunRepository;
pub use transactions::LedgerRepository;
pub use webhooks::WebhookEventRepository;
