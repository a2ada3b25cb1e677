use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use diesel::prelude::*;
use diesel::SqliteConnection;
use uuid::Uuid;

use northstar_core::items::ItemStatus;
use northstar_core::sync::{
    NewSyncRun, SyncError, SyncRun, SyncRunOutcome, SyncRunRepositoryTrait, SyncRunStatus,
};
use northstar_core::{Error, Result};

use super::model::SyncRunDB;
use crate::db::{get_connection, DbPool, WriteHandle};
use crate::errors::StorageError;
use crate::schema::{items, sync_runs};
use crate::utils::to_db_time;

pub struct SyncRunRepository {
    pool: Arc<DbPool>,
    writer: WriteHandle,
}

impl SyncRunRepository {
    pub fn new(pool: Arc<DbPool>, writer: WriteHandle) -> Self {
        Self { pool, writer }
    }
}

/// Writes the terminal state of `run` and the owning item's sync state.
///
/// Runs inside the writer's transaction, so the two updates land together.
fn finalize(
    conn: &mut SqliteConnection,
    run: &SyncRunDB,
    outcome: SyncRunOutcome,
) -> Result<()> {
    let status = outcome.status().as_str();
    match outcome {
        SyncRunOutcome::Success {
            cursor_after,
            counts,
            finished_at,
        } => {
            let finished_at = to_db_time(finished_at);
            diesel::update(sync_runs::table.find(&run.id))
                .set((
                    sync_runs::status.eq(status),
                    sync_runs::cursor_after.eq(cursor_after.clone()),
                    sync_runs::added_count.eq(counts.added as i64),
                    sync_runs::modified_count.eq(counts.modified as i64),
                    sync_runs::removed_count.eq(counts.removed as i64),
                    sync_runs::finished_at.eq(Some(finished_at.clone())),
                ))
                .execute(conn)
                .map_err(StorageError::from)?;

            diesel::update(items::table.find(&run.item_id))
                .set((
                    items::cursor.eq(cursor_after),
                    items::status.eq(ItemStatus::Healthy.as_str()),
                    items::failure_count.eq(0),
                    items::next_retry_at.eq(None::<String>),
                    items::error_code.eq(None::<String>),
                    items::error_message.eq(None::<String>),
                    items::last_successful_sync_at.eq(Some(finished_at.clone())),
                    items::updated_at.eq(finished_at),
                ))
                .execute(conn)
                .map_err(StorageError::from)?;
        }
        SyncRunOutcome::Failed {
            cursor_after,
            counts,
            classification,
            item_status,
            failure_count,
            retry_scheduled_at,
            finished_at,
        } => {
            let finished_at = to_db_time(finished_at);
            let retry_at = retry_scheduled_at.map(to_db_time);
            diesel::update(sync_runs::table.find(&run.id))
                .set((
                    sync_runs::status.eq(status),
                    sync_runs::cursor_after.eq(cursor_after),
                    sync_runs::added_count.eq(counts.added as i64),
                    sync_runs::modified_count.eq(counts.modified as i64),
                    sync_runs::removed_count.eq(counts.removed as i64),
                    sync_runs::error_code.eq(classification.error_code.clone()),
                    sync_runs::error_type.eq(classification.error_type.clone()),
                    sync_runs::error_message.eq(Some(classification.error_message.clone())),
                    sync_runs::http_status.eq(classification.http_status.map(i32::from)),
                    sync_runs::retryable.eq(Some(classification.is_retryable)),
                    sync_runs::retry_scheduled_at.eq(retry_at.clone()),
                    sync_runs::finished_at.eq(Some(finished_at.clone())),
                ))
                .execute(conn)
                .map_err(StorageError::from)?;

            // The item cursor only moves on success.
            diesel::update(items::table.find(&run.item_id))
                .set((
                    items::status.eq(item_status.as_str()),
                    items::failure_count.eq(failure_count),
                    items::next_retry_at.eq(retry_at),
                    items::error_code.eq(classification.error_code),
                    items::error_message.eq(Some(classification.error_message)),
                    items::updated_at.eq(finished_at),
                ))
                .execute(conn)
                .map_err(StorageError::from)?;
        }
    }
    Ok(())
}

#[async_trait]
impl SyncRunRepositoryTrait for SyncRunRepository {
    fn get_sync_run(&self, run_id: &str) -> Result<Option<SyncRun>> {
        let mut conn = get_connection(&self.pool)?;
        sync_runs::table
            .find(run_id)
            .select(SyncRunDB::as_select())
            .first::<SyncRunDB>(&mut conn)
            .optional()
            .map_err(StorageError::from)?
            .map(SyncRun::try_from)
            .transpose()
    }

    fn list_item_sync_runs(&self, item_id: &str, limit: i64) -> Result<Vec<SyncRun>> {
        let mut conn = get_connection(&self.pool)?;
        sync_runs::table
            .filter(sync_runs::item_id.eq(item_id))
            .order((sync_runs::started_at.desc(), sync_runs::id.desc()))
            .limit(limit.max(0))
            .select(SyncRunDB::as_select())
            .load::<SyncRunDB>(&mut conn)
            .map_err(StorageError::from)?
            .into_iter()
            .map(SyncRun::try_from)
            .collect()
    }

    async fn create_sync_run(&self, run: NewSyncRun) -> Result<SyncRun> {
        self.writer
            .exec(move |conn: &mut SqliteConnection| -> Result<SyncRun> {
                let row = SyncRunDB {
                    id: Uuid::now_v7().to_string(),
                    user_id: run.user_id,
                    item_id: run.item_id,
                    status: SyncRunStatus::Running.as_str().to_string(),
                    cursor_before: run.cursor_before,
                    cursor_after: None,
                    added_count: 0,
                    modified_count: 0,
                    removed_count: 0,
                    error_code: None,
                    error_type: None,
                    error_message: None,
                    http_status: None,
                    retryable: None,
                    retry_scheduled_at: None,
                    started_at: to_db_time(Utc::now()),
                    finished_at: None,
                };
                let stored = diesel::insert_into(sync_runs::table)
                    .values(&row)
                    .returning(SyncRunDB::as_returning())
                    .get_result(conn)
                    .map_err(StorageError::from)?;
                SyncRun::try_from(stored)
            })
            .await
    }

    async fn finalize_sync_run(&self, run_id: String, outcome: SyncRunOutcome) -> Result<SyncRun> {
        self.writer
            .exec(move |conn: &mut SqliteConnection| -> Result<SyncRun> {
                let run = sync_runs::table
                    .find(&run_id)
                    .select(SyncRunDB::as_select())
                    .first::<SyncRunDB>(conn)
                    .optional()
                    .map_err(StorageError::from)?
                    .ok_or_else(|| Error::not_found(format!("Sync run {} not found", run_id)))?;
                if run.status != SyncRunStatus::Running.as_str() {
                    return Err(SyncError::RunAlreadyFinalized(run_id).into());
                }

                finalize(conn, &run, outcome)?;

                let stored = sync_runs::table
                    .find(&run_id)
                    .select(SyncRunDB::as_select())
                    .first::<SyncRunDB>(conn)
                    .map_err(StorageError::from)?;
                SyncRun::try_from(stored)
            })
            .await
    }
}
