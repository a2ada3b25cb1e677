mod model;
mod repository;

pub use model::{QueuedRetry, RetryQueueDB};
pub use repository::RetryQueueRepository;
