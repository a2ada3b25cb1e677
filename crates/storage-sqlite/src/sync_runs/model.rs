use diesel::prelude::*;

use northstar_core::sync::SyncRun;
use northstar_core::Result;

use crate::utils::{from_db_time, from_db_time_opt};

#[derive(Queryable, Identifiable, Insertable, Selectable, Debug, Clone)]
#[diesel(table_name = crate::schema::sync_runs)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct SyncRunDB {
    pub id: String,
    pub user_id: String,
    pub item_id: String,
    pub status: String,
    pub cursor_before: Option<String>,
    pub cursor_after: Option<String>,
    pub added_count: i64,
    pub modified_count: i64,
    pub removed_count: i64,
    pub error_code: Option<String>,
    pub error_type: Option<String>,
    pub error_message: Option<String>,
    pub http_status: Option<i32>,
    pub retryable: Option<bool>,
    pub retry_scheduled_at: Option<String>,
    pub started_at: String,
    pub finished_at: Option<String>,
}

impl TryFrom<SyncRunDB> for SyncRun {
    type Error = northstar_core::Error;

    fn try_from(db: SyncRunDB) -> Result<Self> {
        Ok(SyncRun {
            status: db.status.parse()?,
            retry_scheduled_at: from_db_time_opt(db.retry_scheduled_at.as_deref())?,
            started_at: from_db_time(&db.started_at)?,
            finished_at: from_db_time_opt(db.finished_at.as_deref())?,
            id: db.id,
            user_id: db.user_id,
            item_id: db.item_id,
            cursor_before: db.cursor_before,
            cursor_after: db.cursor_after,
            added_count: db.added_count,
            modified_count: db.modified_count,
            removed_count: db.removed_count,
            error_code: db.error_code,
            error_type: db.error_type,
            error_message: db.error_message,
            http_status: db.http_status,
            retryable: db.retryable,
        })
    }
}
