use async_trait::async_trait;

use super::{NewSyncRun, SyncRun, SyncRunOutcome};
use crate::errors::Result;

#[async_trait]
pub trait SyncRunRepositoryTrait: Send + Sync {
    fn get_sync_run(&self, run_id: &str) -> Result<Option<SyncRun>>;

    /// Most recent runs for an item, newest first.
    fn list_item_sync_runs(&self, item_id: &str, limit: i64) -> Result<Vec<SyncRun>>;

    async fn create_sync_run(&self, run: NewSyncRun) -> Result<SyncRun>;

    /// Closes a `running` run and applies the outcome to its item in one transaction.
    ///
    /// Fails with `SyncError::RunAlreadyFinalized` when the run already left `running`.
    async fn finalize_sync_run(&self, run_id: String, outcome: SyncRunOutcome) -> Result<SyncRun>;
}
