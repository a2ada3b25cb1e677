use chrono::{DateTime, Utc};
use diesel::prelude::*;

use northstar_core::Result;

use crate::utils::from_db_time;

#[derive(Queryable, Identifiable, Insertable, Selectable, Debug, Clone)]
#[diesel(primary_key(item_id))]
#[diesel(table_name = crate::schema::sync_retry_queue)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct RetryQueueDB {
    pub item_id: String,
    pub due_at: String,
    pub attempts: i32,
    pub created_at: String,
    pub updated_at: String,
}

/// A delayed sync waiting in the durable queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedRetry {
    pub item_id: String,
    pub due_at: DateTime<Utc>,
    /// Times this item has been scheduled since it last left the queue.
    pub attempts: i32,
}

impl TryFrom<RetryQueueDB> for QueuedRetry {
    type Error = northstar_core::Error;

    fn try_from(db: RetryQueueDB) -> Result<Self> {
        Ok(QueuedRetry {
            due_at: from_db_time(&db.due_at)?,
            item_id: db.item_id,
            attempts: db.attempts,
        })
    }
}
