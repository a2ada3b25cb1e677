//! In-memory fakes of the repository and provider contracts for unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::errors::{Error, Result};
use crate::items::{
    ConnectionHealth, Item, ItemRepositoryTrait, ItemRetryState, ItemStatus, NewAccount,
    NewLinkedItem, SyncLease,
};
use crate::provider::{
    LinkProvider, LinkToken, ProviderAccount, ProviderError, ProviderInstitution,
    ProviderTransaction, PublicTokenExchange, SyncPage, TransactionsSyncProvider,
};
use crate::secrets::CredentialVault;
use crate::sync::{
    NewSyncRun, RetryScheduler, SyncEngine, SyncError, SyncRun, SyncRunOutcome,
    SyncRunRepositoryTrait, SyncRunStatus,
};
use crate::transactions::{AppliedPage, LedgerPage, LedgerRepositoryTrait, LedgerTransaction};
use crate::webhooks::{NewWebhookEvent, WebhookEvent, WebhookEventRepositoryTrait};

pub(crate) const TEST_KEY_B64: &str = "MDEyMzQ1Njc4OTAxMjM0NTY3ODkwMTIzNDU2Nzg5MDE=";
pub(crate) const ACCESS_TOKEN: &str = "access-sandbox-1234";

pub(crate) fn test_vault() -> Arc<CredentialVault> {
    Arc::new(CredentialVault::new(TEST_KEY_B64).unwrap())
}

pub(crate) fn provider_tx(id: &str, account_id: &str, amount: Decimal) -> ProviderTransaction {
    ProviderTransaction {
        transaction_id: id.to_string(),
        account_id: account_id.to_string(),
        pending_transaction_id: None,
        amount,
        iso_currency_code: Some("USD".to_string()),
        unofficial_currency_code: None,
        merchant_name: None,
        name: format!("Transaction {}", id),
        authorized_date: None,
        date: Some("2024-05-01".to_string()),
        pending: false,
    }
}

pub(crate) fn sync_page(
    added: Vec<ProviderTransaction>,
    modified: Vec<ProviderTransaction>,
    removed: Vec<&str>,
    next_cursor: &str,
    has_more: bool,
) -> SyncPage {
    SyncPage {
        added,
        modified,
        removed: removed.into_iter().map(str::to_string).collect(),
        next_cursor: next_cursor.to_string(),
        has_more,
    }
}

/// Single store backing every repository trait so finalization can touch items and runs together.
#[derive(Default)]
pub(crate) struct InMemoryStore {
    pub items: Mutex<HashMap<String, Item>>,
    pub leases: Mutex<HashMap<String, SyncLease>>,
    /// plaid account id -> (item id, local account id)
    pub accounts: Mutex<HashMap<String, (String, String)>>,
    pub runs: Mutex<Vec<SyncRun>>,
    pub ledger: Mutex<HashMap<String, LedgerTransaction>>,
    pub rotations: Mutex<Vec<(String, String)>>,
    pub webhook_events: Mutex<Vec<WebhookEvent>>,
}

impl InMemoryStore {
    pub fn insert_item(&self, item: Item) {
        self.items.lock().unwrap().insert(item.id.clone(), item);
    }

    pub fn add_account(&self, item_id: &str, plaid_account_id: &str) {
        self.accounts.lock().unwrap().insert(
            plaid_account_id.to_string(),
            (item_id.to_string(), format!("local-{}", plaid_account_id)),
        );
    }

    pub fn item(&self, item_id: &str) -> Item {
        self.items.lock().unwrap().get(item_id).cloned().unwrap()
    }

    pub fn runs(&self) -> Vec<SyncRun> {
        self.runs.lock().unwrap().clone()
    }

    pub fn transaction(&self, provider_transaction_id: &str) -> Option<LedgerTransaction> {
        self.ledger
            .lock()
            .unwrap()
            .get(provider_transaction_id)
            .cloned()
    }

    pub fn hold_lease(&self, item_id: &str) {
        self.leases.lock().unwrap().insert(
            item_id.to_string(),
            SyncLease {
                item_id: item_id.to_string(),
                token: "someone-else".to_string(),
                expires_at: Utc::now() + Duration::minutes(5),
            },
        );
    }
}

pub(crate) fn new_item(id: &str, user_id: &str, envelope: &str) -> Item {
    let now = Utc::now();
    Item {
        id: id.to_string(),
        user_id: user_id.to_string(),
        institution_id: "inst-1".to_string(),
        plaid_item_id: format!("plaid-{}", id),
        encrypted_access_token: envelope.to_string(),
        status: ItemStatus::Healthy,
        cursor: None,
        failure_count: 0,
        next_retry_at: None,
        error_code: None,
        error_message: None,
        last_webhook_at: None,
        last_successful_sync_at: None,
        created_at: now,
        updated_at: now,
    }
}

#[async_trait]
impl ItemRepositoryTrait for InMemoryStore {
    fn get_item(&self, item_id: &str) -> Result<Option<Item>> {
        Ok(self.items.lock().unwrap().get(item_id).cloned())
    }

    fn get_item_by_plaid_item_id(&self, plaid_item_id: &str) -> Result<Option<Item>> {
        Ok(self
            .items
            .lock()
            .unwrap()
            .values()
            .find(|item| item.plaid_item_id == plaid_item_id)
            .cloned())
    }

    fn get_retry_state(&self, item_id: &str) -> Result<Option<ItemRetryState>> {
        Ok(self
            .items
            .lock()
            .unwrap()
            .get(item_id)
            .map(|item| ItemRetryState {
                failure_count: item.failure_count,
                next_retry_at: item.next_retry_at,
                status: item.status,
            }))
    }

    fn list_connection_health(&self, user_id: &str) -> Result<Vec<ConnectionHealth>> {
        let mut health: Vec<ConnectionHealth> = self
            .items
            .lock()
            .unwrap()
            .values()
            .filter(|item| item.user_id == user_id)
            .map(|item| ConnectionHealth {
                item_id: item.id.clone(),
                plaid_item_id: item.plaid_item_id.clone(),
                institution_name: "Test Bank".to_string(),
                status: item.status,
                error_code: item.error_code.clone(),
                error_message: item.error_message.clone(),
                last_webhook_at: item.last_webhook_at,
                next_retry_at: item.next_retry_at,
                last_successful_sync_at: item.last_successful_sync_at,
                updated_at: item.updated_at,
            })
            .collect();
        health.sort_by(|a, b| a.item_id.cmp(&b.item_id));
        Ok(health)
    }

    fn list_retryable_items_due(&self, now: DateTime<Utc>) -> Result<Vec<Item>> {
        let mut due: Vec<Item> = self
            .items
            .lock()
            .unwrap()
            .values()
            .filter(|item| {
                item.status == ItemStatus::Degraded
                    && item.next_retry_at.is_some_and(|at| at <= now)
            })
            .cloned()
            .collect();
        due.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(due)
    }

    async fn upsert_item_with_institution(&self, linked: NewLinkedItem) -> Result<Item> {
        let mut items = self.items.lock().unwrap();
        let now = Utc::now();
        if let Some(existing) = items
            .values_mut()
            .find(|item| item.plaid_item_id == linked.plaid_item_id)
        {
            existing.encrypted_access_token = linked.encrypted_access_token;
            existing.status = ItemStatus::Healthy;
            existing.error_code = None;
            existing.error_message = None;
            existing.updated_at = now;
            return Ok(existing.clone());
        }

        let mut item = new_item(
            &Uuid::new_v4().to_string(),
            &linked.user_id,
            &linked.encrypted_access_token,
        );
        item.plaid_item_id = linked.plaid_item_id;
        item.institution_id = linked.plaid_institution_id;
        items.insert(item.id.clone(), item.clone());
        Ok(item)
    }

    async fn upsert_accounts(
        &self,
        _user_id: String,
        item_id: String,
        accounts: Vec<NewAccount>,
    ) -> Result<usize> {
        for account in &accounts {
            self.add_account(&item_id, &account.plaid_account_id);
        }
        Ok(accounts.len())
    }

    async fn rotate_access_token_ciphertext(
        &self,
        item_id: String,
        encrypted_access_token: String,
    ) -> Result<()> {
        let mut items = self.items.lock().unwrap();
        let item = items
            .get_mut(&item_id)
            .ok_or_else(|| Error::not_found(item_id.clone()))?;
        item.encrypted_access_token = encrypted_access_token.clone();
        self.rotations
            .lock()
            .unwrap()
            .push((item_id, encrypted_access_token));
        Ok(())
    }

    async fn acquire_sync_lease(
        &self,
        item_id: String,
        ttl: Duration,
    ) -> Result<Option<SyncLease>> {
        let now = Utc::now();
        let mut leases = self.leases.lock().unwrap();
        if leases
            .get(&item_id)
            .is_some_and(|lease| lease.expires_at > now)
        {
            return Ok(None);
        }
        let lease = SyncLease {
            item_id: item_id.clone(),
            token: Uuid::new_v4().to_string(),
            expires_at: now + ttl,
        };
        leases.insert(item_id, lease.clone());
        Ok(Some(lease))
    }

    async fn release_sync_lease(&self, lease: SyncLease) -> Result<()> {
        let mut leases = self.leases.lock().unwrap();
        if leases
            .get(&lease.item_id)
            .is_some_and(|held| held.token == lease.token)
        {
            leases.remove(&lease.item_id);
        }
        Ok(())
    }

    async fn record_webhook_received(
        &self,
        item_id: String,
        received_at: DateTime<Utc>,
    ) -> Result<()> {
        if let Some(item) = self.items.lock().unwrap().get_mut(&item_id) {
            item.last_webhook_at = Some(received_at);
        }
        Ok(())
    }
}

#[async_trait]
impl SyncRunRepositoryTrait for InMemoryStore {
    fn get_sync_run(&self, run_id: &str) -> Result<Option<SyncRun>> {
        Ok(self
            .runs
            .lock()
            .unwrap()
            .iter()
            .find(|run| run.id == run_id)
            .cloned())
    }

    fn list_item_sync_runs(&self, item_id: &str, limit: i64) -> Result<Vec<SyncRun>> {
        Ok(self
            .runs
            .lock()
            .unwrap()
            .iter()
            .rev()
            .filter(|run| run.item_id == item_id)
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn create_sync_run(&self, new_run: NewSyncRun) -> Result<SyncRun> {
        let run = SyncRun {
            id: Uuid::new_v4().to_string(),
            user_id: new_run.user_id,
            item_id: new_run.item_id,
            status: SyncRunStatus::Running,
            cursor_before: new_run.cursor_before,
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
            started_at: Utc::now(),
            finished_at: None,
        };
        self.runs.lock().unwrap().push(run.clone());
        Ok(run)
    }

    async fn finalize_sync_run(&self, run_id: String, outcome: SyncRunOutcome) -> Result<SyncRun> {
        let mut runs = self.runs.lock().unwrap();
        let run = runs
            .iter_mut()
            .find(|run| run.id == run_id)
            .ok_or_else(|| Error::not_found(run_id.clone()))?;
        if run.status != SyncRunStatus::Running {
            return Err(SyncError::RunAlreadyFinalized(run_id).into());
        }

        let mut items = self.items.lock().unwrap();
        let item = items
            .get_mut(&run.item_id)
            .ok_or_else(|| Error::not_found(run.item_id.clone()))?;

        run.status = outcome.status();
        match outcome {
            SyncRunOutcome::Success {
                cursor_after,
                counts,
                finished_at,
            } => {
                run.cursor_after = cursor_after.clone();
                run.added_count = counts.added as i64;
                run.modified_count = counts.modified as i64;
                run.removed_count = counts.removed as i64;
                run.finished_at = Some(finished_at);

                item.cursor = cursor_after;
                item.status = ItemStatus::Healthy;
                item.failure_count = 0;
                item.next_retry_at = None;
                item.error_code = None;
                item.error_message = None;
                item.last_successful_sync_at = Some(finished_at);
                item.updated_at = finished_at;
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
                run.cursor_after = cursor_after;
                run.added_count = counts.added as i64;
                run.modified_count = counts.modified as i64;
                run.removed_count = counts.removed as i64;
                run.error_code = classification.error_code.clone();
                run.error_type = classification.error_type.clone();
                run.error_message = Some(classification.error_message.clone());
                run.http_status = classification.http_status.map(i32::from);
                run.retryable = Some(classification.is_retryable);
                run.retry_scheduled_at = retry_scheduled_at;
                run.finished_at = Some(finished_at);

                item.status = item_status;
                item.failure_count = failure_count;
                item.next_retry_at = retry_scheduled_at;
                item.error_code = classification.error_code;
                item.error_message = Some(classification.error_message);
                item.updated_at = finished_at;
            }
        }
        Ok(run.clone())
    }
}

#[async_trait]
impl LedgerRepositoryTrait for InMemoryStore {
    fn get_transaction(&self, provider_transaction_id: &str) -> Result<Option<LedgerTransaction>> {
        Ok(self.transaction(provider_transaction_id))
    }

    fn list_item_transactions(&self, item_id: &str) -> Result<Vec<LedgerTransaction>> {
        Ok(self
            .ledger
            .lock()
            .unwrap()
            .values()
            .filter(|tx| tx.item_id == item_id)
            .cloned()
            .collect())
    }

    async fn apply_sync_page(&self, page: LedgerPage) -> Result<AppliedPage> {
        let accounts = self.accounts.lock().unwrap();
        let mut ledger = self.ledger.lock().unwrap();
        let mut applied = AppliedPage::default();
        let now = Utc::now();

        for row in page.added.iter().chain(page.modified.iter()) {
            let Some((_, local_account_id)) = accounts
                .get(&row.provider_account_id)
                .filter(|(item_id, _)| *item_id == page.item_id)
            else {
                applied.skipped += 1;
                continue;
            };
            let (id, created_at) = ledger
                .get(&row.provider_transaction_id)
                .map(|existing| (existing.id.clone(), existing.created_at))
                .unwrap_or_else(|| (Uuid::new_v4().to_string(), now));
            ledger.insert(
                row.provider_transaction_id.clone(),
                LedgerTransaction {
                    id,
                    user_id: page.user_id.clone(),
                    item_id: page.item_id.clone(),
                    account_id: local_account_id.clone(),
                    provider_transaction_id: row.provider_transaction_id.clone(),
                    pending_transaction_id: row.pending_transaction_id.clone(),
                    amount_cents: row.amount_cents,
                    currency: row.currency.clone(),
                    merchant_name: row.merchant_name.clone(),
                    name: row.name.clone(),
                    authorized_date: row.authorized_date.clone(),
                    posted_date: row.posted_date.clone(),
                    pending: row.pending,
                    hash_fingerprint: row.hash_fingerprint.clone(),
                    removed_at: None,
                    created_at,
                    updated_at: now,
                },
            );
            applied.upserted += 1;
        }

        for removed_id in &page.removed {
            if let Some(existing) = ledger.get_mut(removed_id) {
                existing.removed_at = Some(now);
                existing.updated_at = now;
                applied.tombstoned += 1;
            }
        }

        Ok(applied)
    }
}

#[async_trait]
impl WebhookEventRepositoryTrait for InMemoryStore {
    fn get_webhook_event(&self, idempotency_key: &str) -> Result<Option<WebhookEvent>> {
        Ok(self
            .webhook_events
            .lock()
            .unwrap()
            .iter()
            .find(|event| event.idempotency_key == idempotency_key)
            .cloned())
    }

    async fn insert_webhook_event(&self, event: NewWebhookEvent) -> Result<Option<WebhookEvent>> {
        let mut events = self.webhook_events.lock().unwrap();
        if events
            .iter()
            .any(|existing| existing.idempotency_key == event.idempotency_key)
        {
            return Ok(None);
        }
        let stored = WebhookEvent {
            id: Uuid::new_v4().to_string(),
            idempotency_key: event.idempotency_key,
            event_type: event.event_type,
            plaid_item_id: event.plaid_item_id,
            item_id: event.item_id,
            payload: event.payload,
            received_at: event.received_at,
            processed_at: None,
        };
        events.push(stored.clone());
        Ok(Some(stored))
    }

    async fn mark_webhook_processed(
        &self,
        event_id: String,
        processed_at: DateTime<Utc>,
    ) -> Result<()> {
        if let Some(event) = self
            .webhook_events
            .lock()
            .unwrap()
            .iter_mut()
            .find(|event| event.id == event_id)
        {
            event.processed_at = Some(processed_at);
        }
        Ok(())
    }
}

/// Provider whose sync pages and link responses are scripted per test.
#[derive(Default)]
pub(crate) struct ScriptedProvider {
    pub pages: Mutex<VecDeque<std::result::Result<SyncPage, ProviderError>>>,
    pub cursors_requested: Mutex<Vec<Option<String>>>,
    pub tokens_seen: Mutex<Vec<String>>,
    pub exchange: Mutex<Option<PublicTokenExchange>>,
    pub institution: Mutex<Option<ProviderInstitution>>,
    pub accounts: Mutex<Vec<ProviderAccount>>,
}

impl ScriptedProvider {
    pub fn push_page(&self, page: SyncPage) {
        self.pages.lock().unwrap().push_back(Ok(page));
    }

    pub fn push_error(&self, error: ProviderError) {
        self.pages.lock().unwrap().push_back(Err(error));
    }

    pub fn calls(&self) -> usize {
        self.cursors_requested.lock().unwrap().len()
    }
}

#[async_trait]
impl TransactionsSyncProvider for ScriptedProvider {
    async fn sync_transactions_page(
        &self,
        access_token: &str,
        cursor: Option<&str>,
        _count: u32,
    ) -> std::result::Result<SyncPage, ProviderError> {
        self.cursors_requested
            .lock()
            .unwrap()
            .push(cursor.map(str::to_string));
        self.tokens_seen
            .lock()
            .unwrap()
            .push(access_token.to_string());
        self.pages.lock().unwrap().pop_front().unwrap_or_else(|| {
            Ok(SyncPage {
                next_cursor: cursor.unwrap_or_default().to_string(),
                ..SyncPage::default()
            })
        })
    }
}

#[async_trait]
impl LinkProvider for ScriptedProvider {
    async fn create_link_token(
        &self,
        client_user_id: &str,
    ) -> std::result::Result<LinkToken, ProviderError> {
        Ok(LinkToken {
            link_token: format!("link-sandbox-{}", client_user_id),
            expiration: "2030-01-01T00:00:00Z".to_string(),
            request_id: "req-link".to_string(),
        })
    }

    async fn exchange_public_token(
        &self,
        _public_token: &str,
    ) -> std::result::Result<PublicTokenExchange, ProviderError> {
        self.exchange
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| ProviderError::api(400, "INVALID_PUBLIC_TOKEN", "bad public token"))
    }

    async fn get_item_institution(
        &self,
        _access_token: &str,
    ) -> std::result::Result<Option<ProviderInstitution>, ProviderError> {
        Ok(self.institution.lock().unwrap().clone())
    }

    async fn get_accounts(
        &self,
        _access_token: &str,
    ) -> std::result::Result<Vec<ProviderAccount>, ProviderError> {
        Ok(self.accounts.lock().unwrap().clone())
    }
}

#[derive(Default)]
pub(crate) struct RecordingScheduler {
    pub scheduled: Mutex<Vec<(String, StdDuration)>>,
    pub fail: bool,
}

#[async_trait]
impl RetryScheduler for RecordingScheduler {
    async fn schedule_retry(&self, item_id: String, delay: StdDuration) -> Result<()> {
        if self.fail {
            return Err(Error::Unexpected("queue unavailable".to_string()));
        }
        self.scheduled.lock().unwrap().push((item_id, delay));
        Ok(())
    }
}

/// Engine wired to in-memory collaborators.
pub(crate) struct SyncHarness {
    pub store: Arc<InMemoryStore>,
    pub provider: Arc<ScriptedProvider>,
    pub scheduler: Arc<RecordingScheduler>,
    pub vault: Arc<CredentialVault>,
    pub engine: Arc<SyncEngine>,
}

impl SyncHarness {
    pub fn new() -> Self {
        Self::with_scheduler(RecordingScheduler::default())
    }

    pub fn with_scheduler(scheduler: RecordingScheduler) -> Self {
        let store = Arc::new(InMemoryStore::default());
        let provider = Arc::new(ScriptedProvider::default());
        let scheduler = Arc::new(scheduler);
        let vault = test_vault();
        let engine = Arc::new(SyncEngine::new(
            store.clone(),
            store.clone(),
            store.clone(),
            provider.clone(),
            vault.clone(),
            scheduler.clone(),
        ));
        Self {
            store,
            provider,
            scheduler,
            vault,
            engine,
        }
    }

    /// Seeds a healthy item owning account `acct-1` with an encrypted access token.
    pub fn seed_item(&self, item_id: &str, user_id: &str) -> Item {
        let envelope = self.vault.encrypt(ACCESS_TOKEN).unwrap();
        let item = new_item(item_id, user_id, &envelope);
        self.store.insert_item(item.clone());
        self.store.add_account(item_id, "acct-1");
        item
    }
}
