use std::sync::Arc;
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use diesel::prelude::*;
use diesel::SqliteConnection;
use log::debug;

use northstar_core::sync::RetryScheduler;
use northstar_core::{Error, Result};

use super::model::{QueuedRetry, RetryQueueDB};
use crate::db::{get_connection, DbPool, WriteHandle};
use crate::errors::StorageError;
use crate::schema::sync_retry_queue;
use crate::utils::to_db_time;

/// Durable delayed-sync queue, one pending entry per item.
///
/// Rescheduling an item that is already queued moves its due time instead of
/// adding a second entry.
pub struct RetryQueueRepository {
    pool: Arc<DbPool>,
    writer: WriteHandle,
}

impl RetryQueueRepository {
    pub fn new(pool: Arc<DbPool>, writer: WriteHandle) -> Self {
        Self { pool, writer }
    }

    pub fn list_pending(&self) -> Result<Vec<QueuedRetry>> {
        let mut conn = get_connection(&self.pool)?;
        sync_retry_queue::table
            .order((sync_retry_queue::due_at.asc(), sync_retry_queue::item_id.asc()))
            .select(RetryQueueDB::as_select())
            .load::<RetryQueueDB>(&mut conn)
            .map_err(StorageError::from)?
            .into_iter()
            .map(QueuedRetry::try_from)
            .collect()
    }

    /// Removes and returns up to `limit` entries due at `now`.
    pub async fn claim_due(&self, now: DateTime<Utc>, limit: i64) -> Result<Vec<QueuedRetry>> {
        self.writer
            .exec(move |conn: &mut SqliteConnection| -> Result<Vec<QueuedRetry>> {
                let due = sync_retry_queue::table
                    .filter(sync_retry_queue::due_at.le(to_db_time(now)))
                    .order((sync_retry_queue::due_at.asc(), sync_retry_queue::item_id.asc()))
                    .limit(limit.max(0))
                    .select(RetryQueueDB::as_select())
                    .load::<RetryQueueDB>(conn)
                    .map_err(StorageError::from)?;
                if due.is_empty() {
                    return Ok(Vec::new());
                }

                let ids: Vec<&String> = due.iter().map(|entry| &entry.item_id).collect();
                diesel::delete(
                    sync_retry_queue::table.filter(sync_retry_queue::item_id.eq_any(ids)),
                )
                .execute(conn)
                .map_err(StorageError::from)?;

                due.into_iter().map(QueuedRetry::try_from).collect()
            })
            .await
    }
}

#[async_trait]
impl RetryScheduler for RetryQueueRepository {
    async fn schedule_retry(&self, item_id: String, delay: StdDuration) -> Result<()> {
        let delay = Duration::from_std(delay)
            .map_err(|e| Error::validation(format!("Retry delay out of range: {}", e)))?;

        self.writer
            .exec(move |conn: &mut SqliteConnection| -> Result<()> {
                let now = Utc::now();
                let row = RetryQueueDB {
                    item_id,
                    due_at: to_db_time(now + delay),
                    attempts: 1,
                    created_at: to_db_time(now),
                    updated_at: to_db_time(now),
                };
                diesel::insert_into(sync_retry_queue::table)
                    .values(&row)
                    .on_conflict(sync_retry_queue::item_id)
                    .do_update()
                    .set((
                        sync_retry_queue::due_at.eq(&row.due_at),
                        sync_retry_queue::attempts.eq(sync_retry_queue::attempts + 1),
                        sync_retry_queue::updated_at.eq(&row.updated_at),
                    ))
                    .execute(conn)
                    .map_err(StorageError::from)?;
                debug!(
                    "[RetryQueue] Item {} scheduled for {}",
                    row.item_id, row.due_at
                );
                Ok(())
            })
            .await
    }
}
