use async_trait::async_trait;

use super::{
    LinkToken, ProviderAccount, ProviderError, ProviderInstitution, PublicTokenExchange, SyncPage,
};

/// Cursor-based incremental transaction feed.
#[async_trait]
pub trait TransactionsSyncProvider: Send + Sync {
    /// Requests one page after `cursor` (`None` starts a full resync).
    async fn sync_transactions_page(
        &self,
        access_token: &str,
        cursor: Option<&str>,
        count: u32,
    ) -> Result<SyncPage, ProviderError>;
}

/// Account-linking calls used when a user connects an institution.
#[async_trait]
pub trait LinkProvider: Send + Sync {
    async fn create_link_token(&self, client_user_id: &str) -> Result<LinkToken, ProviderError>;

    async fn exchange_public_token(
        &self,
        public_token: &str,
    ) -> Result<PublicTokenExchange, ProviderError>;

    /// Institution backing the item, or `None` when the provider reports none.
    async fn get_item_institution(
        &self,
        access_token: &str,
    ) -> Result<Option<ProviderInstitution>, ProviderError>;

    async fn get_accounts(&self, access_token: &str) -> Result<Vec<ProviderAccount>, ProviderError>;
}
