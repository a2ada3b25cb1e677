use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use log::{info, warn};

use super::{LinkedConnection, RetryResult, RetryResultStatus, RetryRunReport};
use crate::errors::{Error, Result};
use crate::items::{ConnectionHealth, Item, ItemRepositoryTrait, NewAccount, NewLinkedItem};
use crate::provider::{LinkProvider, LinkToken, ProviderAccount};
use crate::secrets::CredentialVault;
use crate::sync::{SyncEngineTrait, SyncSummary};
use crate::transactions::to_minor_units;

/// Connection operations, each scoped to the authenticated caller.
#[async_trait]
pub trait ConnectionServiceTrait: Send + Sync {
    async fn create_link_token(&self, user_id: &str) -> Result<LinkToken>;

    async fn exchange_public_token_and_sync(
        &self,
        user_id: &str,
        public_token: &str,
    ) -> Result<LinkedConnection>;

    async fn run_sync_for_item(&self, user_id: &str, item_id: &str) -> Result<SyncSummary>;

    async fn run_due_retries(&self, user_id: &str) -> Result<RetryRunReport>;

    fn list_connection_health(&self, user_id: &str) -> Result<Vec<ConnectionHealth>>;
}

pub struct ConnectionService {
    item_repository: Arc<dyn ItemRepositoryTrait>,
    link_provider: Arc<dyn LinkProvider>,
    vault: Arc<CredentialVault>,
    sync_engine: Arc<dyn SyncEngineTrait>,
}

impl ConnectionService {
    pub fn new(
        item_repository: Arc<dyn ItemRepositoryTrait>,
        link_provider: Arc<dyn LinkProvider>,
        vault: Arc<CredentialVault>,
        sync_engine: Arc<dyn SyncEngineTrait>,
    ) -> Self {
        Self {
            item_repository,
            link_provider,
            vault,
            sync_engine,
        }
    }

    /// Loads an item only if it belongs to `user_id`; foreign items read as missing.
    fn owned_item(&self, user_id: &str, item_id: &str) -> Result<Item> {
        self.item_repository
            .get_item(item_id)?
            .filter(|item| item.user_id == user_id)
            .ok_or_else(|| Error::not_found(format!("Item {} not found", item_id)))
    }
}

fn to_new_account(account: ProviderAccount) -> Result<NewAccount> {
    Ok(NewAccount {
        current_balance_cents: account.current_balance.map(to_minor_units).transpose()?,
        available_balance_cents: account.available_balance.map(to_minor_units).transpose()?,
        plaid_account_id: account.account_id,
        name: account.name,
        account_type: account.account_type,
        subtype: account.subtype,
        mask: account.mask,
    })
}

#[async_trait]
impl ConnectionServiceTrait for ConnectionService {
    async fn create_link_token(&self, user_id: &str) -> Result<LinkToken> {
        Ok(self.link_provider.create_link_token(user_id).await?)
    }

    async fn exchange_public_token_and_sync(
        &self,
        user_id: &str,
        public_token: &str,
    ) -> Result<LinkedConnection> {
        if public_token.trim().is_empty() {
            return Err(Error::validation("publicToken is required"));
        }

        let exchange = self.link_provider.exchange_public_token(public_token).await?;
        let institution = self
            .link_provider
            .get_item_institution(&exchange.access_token)
            .await?
            .ok_or_else(|| {
                Error::Unexpected(format!(
                    "Provider returned no institution for item {}",
                    exchange.item_id
                ))
            })?;

        let item = self
            .item_repository
            .upsert_item_with_institution(NewLinkedItem {
                user_id: user_id.to_string(),
                plaid_item_id: exchange.item_id.clone(),
                plaid_institution_id: institution.institution_id,
                institution_name: institution.name,
                institution_logo_url: institution.logo,
                encrypted_access_token: self.vault.encrypt(&exchange.access_token)?,
            })
            .await?;

        let accounts = self
            .link_provider
            .get_accounts(&exchange.access_token)
            .await?
            .into_iter()
            .map(to_new_account)
            .collect::<Result<Vec<_>>>()?;
        let account_count = self
            .item_repository
            .upsert_accounts(user_id.to_string(), item.id.clone(), accounts)
            .await?;
        info!(
            "[Connections] Linked item {} with {} account(s)",
            item.id, account_count
        );

        let sync_summary = self.sync_engine.sync_item(&item.id).await?;
        Ok(LinkedConnection {
            item_id: item.id,
            sync_summary,
        })
    }

    async fn run_sync_for_item(&self, user_id: &str, item_id: &str) -> Result<SyncSummary> {
        let item = self.owned_item(user_id, item_id)?;
        self.sync_engine.sync_item(&item.id).await
    }

    async fn run_due_retries(&self, user_id: &str) -> Result<RetryRunReport> {
        let due: Vec<Item> = self
            .item_repository
            .list_retryable_items_due(Utc::now())?
            .into_iter()
            .filter(|item| item.user_id == user_id)
            .collect();

        let mut report = RetryRunReport {
            tried_count: due.len(),
            ..RetryRunReport::default()
        };
        for item in due {
            match self.sync_engine.sync_item(&item.id).await {
                Ok(_) => {
                    report.success_count += 1;
                    report.results.push(RetryResult {
                        item_id: item.id,
                        status: RetryResultStatus::Success,
                        error_message: None,
                    });
                }
                Err(err) => {
                    warn!("[Connections] Retry for item {} failed: {}", item.id, err);
                    report.results.push(RetryResult {
                        item_id: item.id,
                        status: RetryResultStatus::Failed,
                        error_message: Some(err.to_string()),
                    });
                }
            }
        }
        Ok(report)
    }

    fn list_connection_health(&self, user_id: &str) -> Result<Vec<ConnectionHealth>> {
        self.item_repository.list_connection_health(user_id)
    }
}
