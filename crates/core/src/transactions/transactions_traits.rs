use async_trait::async_trait;

use super::{AppliedPage, LedgerPage, LedgerTransaction};
use crate::errors::Result;

#[async_trait]
pub trait LedgerRepositoryTrait: Send + Sync {
    fn get_transaction(&self, provider_transaction_id: &str) -> Result<Option<LedgerTransaction>>;

    fn list_item_transactions(&self, item_id: &str) -> Result<Vec<LedgerTransaction>>;

    /// Upserts added/modified rows by provider transaction id and tombstones removed ids,
    /// all in one transaction. Reapplying the same page leaves the ledger unchanged.
    async fn apply_sync_page(&self, page: LedgerPage) -> Result<AppliedPage>;
}
