//! Background worker that drains the durable retry queue.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use northstar_core::sync::{
    RetryScheduler, SyncEngineTrait, SyncError, LEASE_CONTENTION_RETRY_DELAY_SECS,
};
use northstar_core::Error;
use northstar_storage_sqlite::RetryQueueRepository;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Entries claimed per poll.
const CLAIM_BATCH_SIZE: i64 = 25;

/// Claims every due entry and syncs each item once. Returns how many were attempted.
pub async fn run_once(
    queue: &RetryQueueRepository,
    sync_engine: &Arc<dyn SyncEngineTrait>,
) -> northstar_core::Result<usize> {
    let due = queue.claim_due(Utc::now(), CLAIM_BATCH_SIZE).await?;
    for entry in &due {
        debug!(
            "[RetryWorker] Retrying item {} (attempt {})",
            entry.item_id, entry.attempts
        );
        // A failed run books its own outcome and reschedules itself when retryable.
        match sync_engine.sync_item(&entry.item_id).await {
            Ok(summary) => info!(
                "[RetryWorker] Item {} recovered in run {}",
                entry.item_id, summary.run_id
            ),
            // Claiming removed the entry, so put it back for after the running sync.
            Err(Error::Sync(SyncError::InProgress(_))) => {
                queue
                    .schedule_retry(
                        entry.item_id.clone(),
                        Duration::from_secs(LEASE_CONTENTION_RETRY_DELAY_SECS),
                    )
                    .await?;
                debug!(
                    "[RetryWorker] Item {} is mid-sync, retry pushed back",
                    entry.item_id
                );
            }
            Err(err) => warn!("[RetryWorker] Item {} retry failed: {}", entry.item_id, err),
        }
    }
    Ok(due.len())
}

pub fn spawn(
    queue: Arc<RetryQueueRepository>,
    sync_engine: Arc<dyn SyncEngineTrait>,
    poll_interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(
            "[RetryWorker] Polling retry queue every {}s",
            poll_interval.as_secs()
        );
        let mut ticker = tokio::time::interval(poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Err(err) = run_once(&queue, &sync_engine).await {
                error!("[RetryWorker] Failed to claim due retries: {}", err);
            }
        }
    })
}
