//! Sync retry policy constants and the delayed re-invocation contract.

use std::time::Duration;

use async_trait::async_trait;

use crate::errors::Result;

/// Failed attempts after which an item is parked as `needs_reauth`.
pub const MAX_SYNC_RETRIES: i32 = 5;

/// Delay before the first retry.
pub const BASE_RETRY_DELAY_MS: u64 = 60_000;

/// Upper bound on any retry delay.
pub const MAX_RETRY_DELAY_MS: u64 = 6 * 60 * 60 * 1000;

/// Transactions requested per provider page.
pub const SYNC_PAGE_SIZE: u32 = 100;

/// How long a sync may hold an item before another worker can take it over.
pub const SYNC_LEASE_TTL_SECS: i64 = 10 * 60;

/// Follow-up delay for a trigger that found another sync holding the item.
pub const LEASE_CONTENTION_RETRY_DELAY_SECS: u64 = 30;

/// Durable delayed-task facility that re-runs an item sync later.
///
/// Scheduling is fire-and-forget: implementations persist the request and return.
#[async_trait]
pub trait RetryScheduler: Send + Sync {
    async fn schedule_retry(&self, item_id: String, delay: Duration) -> Result<()>;
}
