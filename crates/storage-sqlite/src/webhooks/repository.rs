use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::SqliteConnection;
use log::debug;
use uuid::Uuid;

use northstar_core::webhooks::{NewWebhookEvent, WebhookEvent, WebhookEventRepositoryTrait};
use northstar_core::Result;

use super::model::WebhookEventDB;
use crate::db::{get_connection, DbPool, WriteHandle};
use crate::errors::StorageError;
use crate::schema::webhook_events;
use crate::utils::to_db_time;

pub struct WebhookEventRepository {
    pool: Arc<DbPool>,
    writer: WriteHandle,
}

impl WebhookEventRepository {
    pub fn new(pool: Arc<DbPool>, writer: WriteHandle) -> Self {
        Self { pool, writer }
    }
}

#[async_trait]
impl WebhookEventRepositoryTrait for WebhookEventRepository {
    fn get_webhook_event(&self, idempotency_key: &str) -> Result<Option<WebhookEvent>> {
        let mut conn = get_connection(&self.pool)?;
        webhook_events::table
            .filter(webhook_events::idempotency_key.eq(idempotency_key))
            .select(WebhookEventDB::as_select())
            .first::<WebhookEventDB>(&mut conn)
            .optional()
            .map_err(StorageError::from)?
            .map(WebhookEvent::try_from)
            .transpose()
    }

    async fn insert_webhook_event(&self, event: NewWebhookEvent) -> Result<Option<WebhookEvent>> {
        self.writer
            .exec(move |conn: &mut SqliteConnection| -> Result<Option<WebhookEvent>> {
                let row = WebhookEventDB {
                    id: Uuid::new_v4().to_string(),
                    idempotency_key: event.idempotency_key,
                    event_type: event.event_type,
                    plaid_item_id: event.plaid_item_id,
                    item_id: event.item_id,
                    payload: event.payload,
                    received_at: to_db_time(event.received_at),
                    processed_at: None,
                };

                let inserted = diesel::insert_into(webhook_events::table)
                    .values(&row)
                    .on_conflict(webhook_events::idempotency_key)
                    .do_nothing()
                    .execute(conn)
                    .map_err(StorageError::from)?;
                if inserted == 0 {
                    debug!("[Webhook] Idempotency key {} already recorded", row.idempotency_key);
                    return Ok(None);
                }
                WebhookEvent::try_from(row).map(Some)
            })
            .await
    }

    async fn mark_webhook_processed(
        &self,
        event_id: String,
        processed_at: DateTime<Utc>,
    ) -> Result<()> {
        self.writer
            .exec(move |conn: &mut SqliteConnection| -> Result<()> {
                diesel::update(webhook_events::table.find(event_id))
                    .set(webhook_events::processed_at.eq(Some(to_db_time(processed_at))))
                    .execute(conn)
                    .map_err(StorageError::from)?;
                Ok(())
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::setup_db;

    fn event(key: &str) -> NewWebhookEvent {
        NewWebhookEvent {
            idempotency_key: key.to_string(),
            event_type: "TRANSACTIONS:SYNC_UPDATES_AVAILABLE".to_string(),
            plaid_item_id: Some("plaid-1".to_string()),
            item_id: None,
            payload: r#"{"webhook_type":"TRANSACTIONS"}"#.to_string(),
            received_at: Utc::now(),
        }
    }

    fn repo() -> WebhookEventRepository {
        let (pool, writer) = setup_db();
        WebhookEventRepository::new(pool, writer)
    }

    #[tokio::test]
    async fn duplicate_idempotency_key_returns_none() {
        let repo = repo();

        let first = repo.insert_webhook_event(event("delivery-1")).await.unwrap();
        let second = repo.insert_webhook_event(event("delivery-1")).await.unwrap();
        let other = repo.insert_webhook_event(event("delivery-2")).await.unwrap();

        let first = first.expect("first delivery recorded");
        assert!(second.is_none());
        assert!(other.is_some());
        assert_eq!(
            repo.get_webhook_event("delivery-1").unwrap().unwrap().id,
            first.id
        );
    }

    #[tokio::test]
    async fn marks_event_processed() {
        let repo = repo();
        let stored = repo
            .insert_webhook_event(event("delivery-1"))
            .await
            .unwrap()
            .unwrap();
        assert!(stored.processed_at.is_none());

        repo.mark_webhook_processed(stored.id.clone(), Utc::now())
            .await
            .unwrap();

        let reloaded = repo.get_webhook_event("delivery-1").unwrap().unwrap();
        assert!(reloaded.processed_at.is_some());
        assert_eq!(reloaded.payload, stored.payload);
    }
}
