//! Incremental provider sync: failure classification, retry policy, run records and the engine.

mod failure_classifier;
mod retry_scheduler;
mod sync_engine;
mod sync_run_model;
mod sync_run_traits;

pub use failure_classifier::*;
pub use retry_scheduler::*;
pub use sync_engine::*;
pub use sync_run_model::*;
pub use sync_run_traits::*;
