use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use super::{ConnectionHealth, Item, ItemRetryState, NewAccount, NewLinkedItem, SyncLease};
use crate::errors::Result;

/// Persistence contract for items, their institutions and accounts.
///
/// Reads are synchronous pool reads; writes go through the store's single writer.
#[async_trait]
pub trait ItemRepositoryTrait: Send + Sync {
    fn get_item(&self, item_id: &str) -> Result<Option<Item>>;

    fn get_item_by_plaid_item_id(&self, plaid_item_id: &str) -> Result<Option<Item>>;

    fn get_retry_state(&self, item_id: &str) -> Result<Option<ItemRetryState>>;

    fn list_connection_health(&self, user_id: &str) -> Result<Vec<ConnectionHealth>>;

    /// Degraded items whose `next_retry_at` is at or before `now`.
    fn list_retryable_items_due(&self, now: DateTime<Utc>) -> Result<Vec<Item>>;

    async fn upsert_item_with_institution(&self, item: NewLinkedItem) -> Result<Item>;

    async fn upsert_accounts(
        &self,
        user_id: String,
        item_id: String,
        accounts: Vec<NewAccount>,
    ) -> Result<usize>;

    async fn rotate_access_token_ciphertext(
        &self,
        item_id: String,
        encrypted_access_token: String,
    ) -> Result<()>;

    /// Takes the per-item sync lease, or returns `None` while another holder's lease is live.
    async fn acquire_sync_lease(&self, item_id: String, ttl: Duration)
        -> Result<Option<SyncLease>>;

    async fn release_sync_lease(&self, lease: SyncLease) -> Result<()>;

    async fn record_webhook_received(
        &self,
        item_id: String,
        received_at: DateTime<Utc>,
    ) -> Result<()>;
}
