use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use log::{debug, info, warn};

use super::{
    IngestOutcome, IngestStatus, NewWebhookEvent, WebhookEnvelope, WebhookEventRepositoryTrait,
    WebhookIngestionServiceTrait,
};
use crate::errors::{Error, Result};
use crate::items::ItemRepositoryTrait;
use crate::sync::{
    RetryScheduler, SyncEngineTrait, SyncError, LEASE_CONTENTION_RETRY_DELAY_SECS,
};

/// Records each delivery once per idempotency key and triggers item syncs.
pub struct WebhookIngestionService {
    event_repository: Arc<dyn WebhookEventRepositoryTrait>,
    item_repository: Arc<dyn ItemRepositoryTrait>,
    sync_engine: Arc<dyn SyncEngineTrait>,
    retry_scheduler: Arc<dyn RetryScheduler>,
}

impl WebhookIngestionService {
    pub fn new(
        event_repository: Arc<dyn WebhookEventRepositoryTrait>,
        item_repository: Arc<dyn ItemRepositoryTrait>,
        sync_engine: Arc<dyn SyncEngineTrait>,
        retry_scheduler: Arc<dyn RetryScheduler>,
    ) -> Self {
        Self {
            event_repository,
            item_repository,
            sync_engine,
            retry_scheduler,
        }
    }
}

#[async_trait]
impl WebhookIngestionServiceTrait for WebhookIngestionService {
    async fn ingest(&self, body: &[u8], idempotency_key: &str) -> Result<IngestOutcome> {
        let envelope = WebhookEnvelope::parse(body);
        let event_type = envelope.event_type();
        let item = match envelope.item_id.as_deref() {
            Some(plaid_item_id) => self.item_repository.get_item_by_plaid_item_id(plaid_item_id)?,
            None => None,
        };
        let received_at = Utc::now();

        let inserted = self
            .event_repository
            .insert_webhook_event(NewWebhookEvent {
                idempotency_key: idempotency_key.to_string(),
                event_type: event_type.clone(),
                plaid_item_id: envelope.item_id.clone(),
                item_id: item.as_ref().map(|item| item.id.clone()),
                payload: String::from_utf8_lossy(body).into_owned(),
                received_at,
            })
            .await?;
        let Some(event) = inserted else {
            info!(
                "[Webhook] Duplicate delivery {} ignored ({})",
                idempotency_key, event_type
            );
            return Ok(IngestOutcome::duplicate());
        };

        let mut sync_triggered = false;
        match &item {
            Some(item) => {
                self.item_repository
                    .record_webhook_received(item.id.clone(), received_at)
                    .await?;

                if envelope.is_transactions_update() {
                    match self.sync_engine.sync_item(&item.id).await {
                        Ok(summary) => {
                            sync_triggered = true;
                            debug!(
                                "[Webhook] {} synced item {} (run {})",
                                event_type, item.id, summary.run_id
                            );
                        }
                        // The running sync may have read its last page already, so follow up.
                        Err(Error::Sync(SyncError::InProgress(_))) => {
                            self.retry_scheduler
                                .schedule_retry(
                                    item.id.clone(),
                                    Duration::from_secs(LEASE_CONTENTION_RETRY_DELAY_SECS),
                                )
                                .await?;
                            info!(
                                "[Webhook] {} found item {} mid-sync, follow-up scheduled",
                                event_type, item.id
                            );
                        }
                        // Already booked on the run and item by the engine.
                        Err(Error::Sync(err)) => {
                            sync_triggered = true;
                            warn!(
                                "[Webhook] {} sync for item {} did not complete: {}",
                                event_type, item.id, err
                            );
                        }
                        Err(err) => return Err(err),
                    }
                }
            }
            None => debug!("[Webhook] {} does not reference a known item", event_type),
        }

        self.event_repository
            .mark_webhook_processed(event.id.clone(), Utc::now())
            .await?;

        Ok(IngestOutcome {
            status: IngestStatus::Processed,
            event_id: Some(event.id),
            event_type: Some(event_type),
            sync_triggered,
        })
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;
    use crate::items::ItemStatus;
    use crate::provider::ProviderError;
    use crate::testing::{provider_tx, sync_page, RecordingScheduler, SyncHarness};

    const TRANSACTIONS_BODY: &[u8] =
        br#"{"webhook_type":"TRANSACTIONS","webhook_code":"SYNC_UPDATES_AVAILABLE","item_id":"plaid-item-1"}"#;

    fn service(harness: &SyncHarness) -> WebhookIngestionService {
        WebhookIngestionService::new(
            harness.store.clone(),
            harness.store.clone(),
            harness.engine.clone(),
            harness.scheduler.clone(),
        )
    }

    fn seeded() -> SyncHarness {
        let harness = SyncHarness::new();
        harness.seed_item("item-1", "user-1");
        harness
    }

    #[tokio::test]
    async fn transactions_webhook_syncs_known_item_and_marks_processed() {
        let harness = seeded();
        harness.provider.push_page(sync_page(
            vec![provider_tx("tx-1", "acct-1", dec!(3.5))],
            vec![],
            vec![],
            "cursor-1",
            false,
        ));

        let outcome = service(&harness)
            .ingest(TRANSACTIONS_BODY, "delivery-1")
            .await
            .unwrap();

        assert_eq!(outcome.status, IngestStatus::Processed);
        assert!(outcome.sync_triggered);
        assert_eq!(
            outcome.event_type.as_deref(),
            Some("TRANSACTIONS:SYNC_UPDATES_AVAILABLE")
        );
        assert_eq!(harness.provider.calls(), 1);
        assert!(harness.store.transaction("tx-1").is_some());

        let events = harness.store.webhook_events.lock().unwrap().clone();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].item_id.as_deref(), Some("item-1"));
        assert!(events[0].processed_at.is_some());
        assert!(harness.store.item("item-1").last_webhook_at.is_some());
    }

    #[tokio::test]
    async fn duplicate_key_is_ignored_without_side_effects() {
        let harness = seeded();
        let service = service(&harness);

        service.ingest(TRANSACTIONS_BODY, "delivery-1").await.unwrap();
        let runs_after_first = harness.store.runs().len();
        let webhook_at = harness.store.item("item-1").last_webhook_at;

        let outcome = service.ingest(TRANSACTIONS_BODY, "delivery-1").await.unwrap();

        assert_eq!(outcome, IngestOutcome::duplicate());
        assert_eq!(harness.provider.calls(), 1);
        assert_eq!(harness.store.runs().len(), runs_after_first);
        assert_eq!(harness.store.webhook_events.lock().unwrap().len(), 1);
        assert_eq!(harness.store.item("item-1").last_webhook_at, webhook_at);
    }

    #[tokio::test]
    async fn distinct_keys_for_same_event_are_independent_triggers() {
        let harness = seeded();
        let service = service(&harness);

        service.ingest(TRANSACTIONS_BODY, "delivery-1").await.unwrap();
        service.ingest(TRANSACTIONS_BODY, "delivery-2").await.unwrap();

        assert_eq!(harness.provider.calls(), 2);
        assert_eq!(harness.store.webhook_events.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn non_transaction_webhooks_only_touch_item_health() {
        let harness = seeded();
        let body = br#"{"webhook_type":"ITEM","webhook_code":"ERROR","item_id":"plaid-item-1"}"#;

        let outcome = service(&harness).ingest(body, "delivery-1").await.unwrap();

        assert!(!outcome.sync_triggered);
        assert_eq!(outcome.event_type.as_deref(), Some("ITEM:ERROR"));
        assert_eq!(harness.provider.calls(), 0);
        assert!(harness.store.item("item-1").last_webhook_at.is_some());
    }

    #[tokio::test]
    async fn unknown_item_and_non_json_bodies_are_recorded() {
        let harness = seeded();
        let service = service(&harness);

        let unknown_item = br#"{"webhook_type":"TRANSACTIONS","webhook_code":"DEFAULT_UPDATE","item_id":"nope"}"#;
        let outcome = service.ingest(unknown_item, "delivery-1").await.unwrap();
        assert!(!outcome.sync_triggered);

        let outcome = service.ingest(b"garbage", "delivery-2").await.unwrap();
        assert_eq!(outcome.event_type.as_deref(), Some("unknown:unknown"));

        let events = harness.store.webhook_events.lock().unwrap().clone();
        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|event| event.processed_at.is_some()));
        assert_eq!(events[0].item_id, None);
        assert_eq!(events[0].plaid_item_id.as_deref(), Some("nope"));
        assert_eq!(harness.provider.calls(), 0);
    }

    #[tokio::test]
    async fn booked_sync_failure_still_marks_event_processed() {
        let harness = seeded();
        harness
            .provider
            .push_error(ProviderError::api(400, "ITEM_LOGIN_REQUIRED", "login"));

        let outcome = service(&harness)
            .ingest(TRANSACTIONS_BODY, "delivery-1")
            .await
            .unwrap();

        assert!(outcome.sync_triggered);
        assert_eq!(
            harness.store.item("item-1").status,
            ItemStatus::NeedsReauth
        );
        let events = harness.store.webhook_events.lock().unwrap().clone();
        assert!(events[0].processed_at.is_some());
    }

    #[tokio::test]
    async fn lease_contention_schedules_a_follow_up_sync() {
        let harness = seeded();
        harness.store.hold_lease("item-1");

        let outcome = service(&harness)
            .ingest(TRANSACTIONS_BODY, "delivery-1")
            .await
            .unwrap();

        assert_eq!(outcome.status, IngestStatus::Processed);
        assert!(!outcome.sync_triggered);
        assert_eq!(harness.provider.calls(), 0);
        assert_eq!(
            harness.scheduler.scheduled.lock().unwrap().as_slice(),
            [(
                "item-1".to_string(),
                Duration::from_secs(LEASE_CONTENTION_RETRY_DELAY_SECS)
            )]
        );
        let events = harness.store.webhook_events.lock().unwrap().clone();
        assert!(events[0].processed_at.is_some());
    }

    #[tokio::test]
    async fn unschedulable_follow_up_leaves_event_unprocessed() {
        let harness = SyncHarness::with_scheduler(RecordingScheduler {
            fail: true,
            ..RecordingScheduler::default()
        });
        harness.seed_item("item-1", "user-1");
        harness.store.hold_lease("item-1");

        service(&harness)
            .ingest(TRANSACTIONS_BODY, "delivery-1")
            .await
            .unwrap_err();

        let events = harness.store.webhook_events.lock().unwrap().clone();
        assert_eq!(events.len(), 1);
        assert!(events[0].processed_at.is_none());
    }

    #[tokio::test]
    async fn credential_failure_propagates_and_leaves_event_unprocessed() {
        let harness = seeded();
        let mut item = harness.store.item("item-1");
        item.encrypted_access_token = "v2:broken".to_string();
        harness.store.insert_item(item);

        let err = service(&harness)
            .ingest(TRANSACTIONS_BODY, "delivery-1")
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Vault(_)));
        let events = harness.store.webhook_events.lock().unwrap().clone();
        assert_eq!(events.len(), 1);
        assert!(events[0].processed_at.is_none());
    }
}
