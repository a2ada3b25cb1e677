use diesel::prelude::*;

use northstar_core::webhooks::WebhookEvent;
use northstar_core::Result;

use crate::utils::{from_db_time, from_db_time_opt};

#[derive(Queryable, Identifiable, Insertable, Selectable, Debug, Clone)]
#[diesel(table_name = crate::schema::webhook_events)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct WebhookEventDB {
    pub id: String,
    pub idempotency_key: String,
    pub event_type: String,
    pub plaid_item_id: Option<String>,
    pub item_id: Option<String>,
    pub payload: String,
    pub received_at: String,
    pub processed_at: Option<String>,
}

impl TryFrom<WebhookEventDB> for WebhookEvent {
    type Error = northstar_core::Error;

    fn try_from(db: WebhookEventDB) -> Result<Self> {
        Ok(WebhookEvent {
            received_at: from_db_time(&db.received_at)?,
            processed_at: from_db_time_opt(db.processed_at.as_deref())?,
            id: db.id,
            idempotency_key: db.idempotency_key,
            event_type: db.event_type,
            plaid_item_id: db.plaid_item_id,
            item_id: db.item_id,
            payload: db.payload,
        })
    }
}
