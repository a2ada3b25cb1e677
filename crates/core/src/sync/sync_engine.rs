use std::sync::Arc;
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use log::{debug, error, info, warn};

use super::{
    classify_sync_error, decide_retry, NewSyncRun, RetryScheduler, SyncCounts, SyncError,
    SyncRun, SyncRunOutcome, SyncRunRepositoryTrait, SyncSummary, SYNC_LEASE_TTL_SECS,
    SYNC_PAGE_SIZE,
};
use crate::errors::{Error, Result};
use crate::items::{Item, ItemRepositoryTrait};
use crate::provider::TransactionsSyncProvider;
use crate::secrets::CredentialVault;
use crate::transactions::{LedgerPage, LedgerRepositoryTrait, NewLedgerTransaction};

/// Drains the provider's transaction cursor for one item.
#[async_trait]
pub trait SyncEngineTrait: Send + Sync {
    async fn sync_item(&self, item_id: &str) -> Result<SyncSummary>;
}

/// Progress carried through the page loop so a failure can record how far it got.
#[derive(Debug, Clone, Default)]
struct DrainProgress {
    cursor: Option<String>,
    counts: SyncCounts,
    pages: usize,
}

pub struct SyncEngine {
    item_repository: Arc<dyn ItemRepositoryTrait>,
    sync_run_repository: Arc<dyn SyncRunRepositoryTrait>,
    ledger_repository: Arc<dyn LedgerRepositoryTrait>,
    provider: Arc<dyn TransactionsSyncProvider>,
    vault: Arc<CredentialVault>,
    retry_scheduler: Arc<dyn RetryScheduler>,
    page_size: u32,
    lease_ttl: Duration,
}

impl SyncEngine {
    pub fn new(
        item_repository: Arc<dyn ItemRepositoryTrait>,
        sync_run_repository: Arc<dyn SyncRunRepositoryTrait>,
        ledger_repository: Arc<dyn LedgerRepositoryTrait>,
        provider: Arc<dyn TransactionsSyncProvider>,
        vault: Arc<CredentialVault>,
        retry_scheduler: Arc<dyn RetryScheduler>,
    ) -> Self {
        Self {
            item_repository,
            sync_run_repository,
            ledger_repository,
            provider,
            vault,
            retry_scheduler,
            page_size: SYNC_PAGE_SIZE,
            lease_ttl: Duration::seconds(SYNC_LEASE_TTL_SECS),
        }
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn with_lease_ttl(mut self, lease_ttl: Duration) -> Self {
        self.lease_ttl = lease_ttl;
        self
    }

    async fn sync_leased_item(&self, item: &Item) -> Result<SyncSummary> {
        let credential = self.vault.decrypt(&item.encrypted_access_token)?;
        if credential.was_legacy_format {
            let envelope = self.vault.encrypt(&credential.token)?;
            self.item_repository
                .rotate_access_token_ciphertext(item.id.clone(), envelope)
                .await?;
            info!("[Vault] Re-encrypted legacy credential for item {}", item.id);
        }

        let run = self
            .sync_run_repository
            .create_sync_run(NewSyncRun {
                user_id: item.user_id.clone(),
                item_id: item.id.clone(),
                cursor_before: item.cursor.clone(),
            })
            .await?;

        let mut progress = DrainProgress {
            cursor: item.cursor.clone(),
            ..DrainProgress::default()
        };

        if let Err(err) = self.drain_pages(item, &credential.token, &mut progress).await {
            return Err(self.record_failure(item, &run, progress, err).await);
        }

        // A run that cannot be closed as successful is booked as a failure instead.
        if let Err(err) = self
            .sync_run_repository
            .finalize_sync_run(
                run.id.clone(),
                SyncRunOutcome::Success {
                    cursor_after: progress.cursor.clone(),
                    counts: progress.counts,
                    finished_at: Utc::now(),
                },
            )
            .await
        {
            return Err(self.record_failure(item, &run, progress, err).await);
        }

        info!(
            "[Sync] Item {} synced: +{} ~{} -{} over {} page(s)",
            item.id,
            progress.counts.added,
            progress.counts.modified,
            progress.counts.removed,
            progress.pages
        );

        Ok(SyncSummary {
            run_id: run.id,
            added_count: progress.counts.added,
            modified_count: progress.counts.modified,
            removed_count: progress.counts.removed,
            cursor: progress.cursor,
            pages: progress.pages,
        })
    }

    async fn drain_pages(
        &self,
        item: &Item,
        access_token: &str,
        progress: &mut DrainProgress,
    ) -> Result<()> {
        loop {
            let page = self
                .provider
                .sync_transactions_page(access_token, progress.cursor.as_deref(), self.page_size)
                .await?;

            let ledger_page = LedgerPage {
                item_id: item.id.clone(),
                user_id: item.user_id.clone(),
                added: page
                    .added
                    .iter()
                    .map(NewLedgerTransaction::try_from)
                    .collect::<Result<Vec<_>>>()?,
                modified: page
                    .modified
                    .iter()
                    .map(NewLedgerTransaction::try_from)
                    .collect::<Result<Vec<_>>>()?,
                removed: page.removed.clone(),
            };

            let applied = self.ledger_repository.apply_sync_page(ledger_page).await?;
            if applied.skipped > 0 {
                warn!(
                    "[Sync] Skipped {} transaction(s) for unknown accounts on item {}",
                    applied.skipped, item.id
                );
            }

            // Advance only once the page is durably applied.
            progress.counts.added += page.added.len();
            progress.counts.modified += page.modified.len();
            progress.counts.removed += page.removed.len();
            progress.cursor = Some(page.next_cursor);
            progress.pages += 1;

            debug!(
                "[Sync] Item {} page {} applied (has_more={})",
                item.id, progress.pages, page.has_more
            );

            if !page.has_more {
                return Ok(());
            }
        }
    }

    /// Classifies the failure, schedules a retry when allowed and closes the run as failed.
    async fn record_failure(
        &self,
        item: &Item,
        run: &SyncRun,
        progress: DrainProgress,
        cause: Error,
    ) -> Error {
        let previous_failures = match self.item_repository.get_retry_state(&item.id) {
            Ok(Some(state)) => state.failure_count,
            Ok(None) => item.failure_count,
            Err(err) => {
                warn!(
                    "[Sync] Could not read retry state for item {}: {}",
                    item.id, err
                );
                item.failure_count
            }
        };

        let classification = classify_sync_error(&cause);
        let decision = decide_retry(&classification, previous_failures);
        let now = Utc::now();

        let retry_scheduled_at = match decision.retry_delay_ms {
            Some(delay_ms) => {
                if let Err(err) = self
                    .retry_scheduler
                    .schedule_retry(item.id.clone(), StdDuration::from_millis(delay_ms))
                    .await
                {
                    warn!(
                        "[Sync] Failed to schedule retry for item {}: {}",
                        item.id, err
                    );
                }
                i64::try_from(delay_ms)
                    .ok()
                    .map(|ms| now + Duration::milliseconds(ms))
            }
            None => None,
        };

        let outcome = SyncRunOutcome::Failed {
            cursor_after: progress.cursor,
            counts: progress.counts,
            classification: classification.clone(),
            item_status: decision.item_status,
            failure_count: decision.failure_count,
            retry_scheduled_at,
            finished_at: now,
        };
        if let Err(err) = self
            .sync_run_repository
            .finalize_sync_run(run.id.clone(), outcome)
            .await
        {
            error!(
                "[Sync] Failed to finalize run {} for item {}: {}",
                run.id, item.id, err
            );
        }

        error!(
            "[Sync] Item {} failed (code={}, retryable={}, failures={}, status={}): {}",
            item.id,
            classification.error_code.as_deref().unwrap_or("none"),
            classification.is_retryable,
            decision.failure_count,
            decision.item_status,
            classification.error_message
        );

        SyncError::Failed {
            item_id: item.id.clone(),
            run_id: run.id.clone(),
            classification,
            failure_count: decision.failure_count,
            retries_exhausted: decision.retries_exhausted,
            retry_delay_ms: decision.retry_delay_ms,
        }
        .into()
    }
}

#[async_trait]
impl SyncEngineTrait for SyncEngine {
    async fn sync_item(&self, item_id: &str) -> Result<SyncSummary> {
        let item = self
            .item_repository
            .get_item(item_id)?
            .ok_or_else(|| Error::not_found(format!("Item {} not found", item_id)))?;

        let lease = self
            .item_repository
            .acquire_sync_lease(item.id.clone(), self.lease_ttl)
            .await?
            .ok_or_else(|| SyncError::InProgress(item.id.clone()))?;

        // Re-read under the lease so the cursor reflects any sync that finished meanwhile.
        let result = match self.item_repository.get_item(&item.id) {
            Ok(Some(current)) => self.sync_leased_item(&current).await,
            Ok(None) => Err(Error::not_found(format!("Item {} not found", item.id))),
            Err(err) => Err(err),
        };

        if let Err(err) = self.item_repository.release_sync_lease(lease).await {
            warn!(
                "[Sync] Failed to release sync lease for item {}: {}",
                item.id, err
            );
        }

        result
    }
}
