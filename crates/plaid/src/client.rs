//! Plaid API client.
//!
//! Every Plaid endpoint is a JSON `POST` authenticated with the client id and
//! secret headers. Errors come back as a structured body which is preserved so
//! the sync engine can classify it.

use async_trait::async_trait;
use log::{debug, error};
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;

use northstar_core::provider::{
    LinkProvider, LinkToken, ProviderAccount, ProviderError, ProviderInstitution,
    PublicTokenExchange, SyncPage, TransactionsSyncProvider,
};
use northstar_core::webhooks::{VerificationKey, VerificationKeySource};

use crate::environment::PlaidConfig;
use crate::error::{PlaidError, Result};
use crate::types::*;

/// Default timeout for API requests.
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const MAX_LOG_BODY_CHARS: usize = 512;
const TRANSACTIONS_PRODUCT: &str = "transactions";

#[derive(Debug, Clone)]
pub struct PlaidClient {
    client: reqwest::Client,
    base_url: String,
    config: PlaidConfig,
}

impl PlaidClient {
    pub fn new(config: PlaidConfig) -> Result<Self> {
        if config.client_id.trim().is_empty() || config.secret.trim().is_empty() {
            return Err(PlaidError::invalid_request(
                "Plaid client id and secret are required",
            ));
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            base_url: config.resolved_base_url(),
            config,
        })
    }

    pub fn config(&self) -> &PlaidConfig {
        &self.config
    }

    fn log_response(path: &str, status: reqwest::StatusCode, body: &str) {
        if status.is_success() {
            debug!("[Plaid] {} -> {}", path, status);
            return;
        }

        let mut preview = body.chars().take(MAX_LOG_BODY_CHARS).collect::<String>();
        if body.chars().count() > MAX_LOG_BODY_CHARS {
            preview.push_str("...");
        }
        debug!("[Plaid] {} -> {}: {}", path, status, preview);
    }

    fn headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client_id = HeaderValue::from_str(&self.config.client_id)
            .map_err(|_| PlaidError::invalid_request("Invalid Plaid client id"))?;
        let mut secret = HeaderValue::from_str(&self.config.secret)
            .map_err(|_| PlaidError::invalid_request("Invalid Plaid secret"))?;
        secret.set_sensitive(true);

        headers.insert("PLAID-CLIENT-ID", client_id);
        headers.insert("PLAID-SECRET", secret);
        Ok(headers)
    }

    async fn parse_response<T: DeserializeOwned>(
        path: &str,
        response: reqwest::Response,
    ) -> Result<T> {
        let status = response.status();
        let body = response.text().await?;
        Self::log_response(path, status, &body);

        if !status.is_success() {
            return match serde_json::from_str::<PlaidApiError>(&body) {
                Ok(error) => Err(PlaidError::Api {
                    status: status.as_u16(),
                    error,
                }),
                Err(_) => Err(PlaidError::Status {
                    status: status.as_u16(),
                    body,
                }),
            };
        }

        serde_json::from_str(&body).map_err(|e| {
            error!("[Plaid] Failed to deserialize {} response: {}", path, e);
            PlaidError::Json(e)
        })
    }

    async fn post<Req: Serialize + ?Sized, Resp: DeserializeOwned>(
        &self,
        path: &str,
        body: &Req,
    ) -> Result<Resp> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .post(&url)
            .headers(self.headers()?)
            .json(body)
            .send()
            .await?;
        Self::parse_response(path, response).await
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Transactions
    // ─────────────────────────────────────────────────────────────────────────

    pub async fn transactions_sync(
        &self,
        access_token: &str,
        cursor: Option<&str>,
        count: u32,
    ) -> Result<TransactionsSyncResponse> {
        // An empty cursor is the same as no cursor: start from the beginning.
        let cursor = cursor.filter(|cursor| !cursor.is_empty());
        self.post(
            "/transactions/sync",
            &TransactionsSyncRequest {
                access_token,
                cursor,
                count,
            },
        )
        .await
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Link and item
    // ─────────────────────────────────────────────────────────────────────────

    pub async fn link_token_create(&self, client_user_id: &str) -> Result<LinkTokenCreateResponse> {
        let request = LinkTokenCreateRequest {
            client_name: &self.config.client_name,
            language: &self.config.language,
            country_codes: &self.config.country_codes,
            user: LinkTokenUser { client_user_id },
            products: &[TRANSACTIONS_PRODUCT],
            webhook: self.config.webhook_url.as_deref(),
            redirect_uri: self.config.redirect_uri.as_deref(),
        };
        self.post("/link/token/create", &request).await
    }

    pub async fn item_public_token_exchange(
        &self,
        public_token: &str,
    ) -> Result<PublicTokenExchangeResponse> {
        self.post(
            "/item/public_token/exchange",
            &PublicTokenExchangeRequest { public_token },
        )
        .await
    }

    pub async fn item_get(&self, access_token: &str) -> Result<ItemGetResponse> {
        self.post("/item/get", &AccessTokenRequest { access_token })
            .await
    }

    pub async fn institution_get_by_id(
        &self,
        institution_id: &str,
    ) -> Result<InstitutionGetResponse> {
        let request = InstitutionGetRequest {
            institution_id,
            country_codes: &self.config.country_codes,
            options: InstitutionGetOptions {
                include_optional_metadata: true,
            },
        };
        self.post("/institutions/get_by_id", &request).await
    }

    pub async fn accounts_get(&self, access_token: &str) -> Result<AccountsGetResponse> {
        self.post("/accounts/get", &AccessTokenRequest { access_token })
            .await
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Webhooks
    // ─────────────────────────────────────────────────────────────────────────

    pub async fn webhook_verification_key_get(
        &self,
        key_id: &str,
    ) -> Result<VerificationKeyResponse> {
        self.post(
            "/webhook_verification_key/get",
            &VerificationKeyRequest { key_id },
        )
        .await
    }
}

#[async_trait]
impl TransactionsSyncProvider for PlaidClient {
    async fn sync_transactions_page(
        &self,
        access_token: &str,
        cursor: Option<&str>,
        count: u32,
    ) -> std::result::Result<SyncPage, ProviderError> {
        let response = self.transactions_sync(access_token, cursor, count).await?;
        Ok(response.into())
    }
}

#[async_trait]
impl LinkProvider for PlaidClient {
    async fn create_link_token(
        &self,
        client_user_id: &str,
    ) -> std::result::Result<LinkToken, ProviderError> {
        Ok(self.link_token_create(client_user_id).await?.into())
    }

    async fn exchange_public_token(
        &self,
        public_token: &str,
    ) -> std::result::Result<PublicTokenExchange, ProviderError> {
        Ok(self.item_public_token_exchange(public_token).await?.into())
    }

    async fn get_item_institution(
        &self,
        access_token: &str,
    ) -> std::result::Result<Option<ProviderInstitution>, ProviderError> {
        let item = self.item_get(access_token).await?.item;
        let Some(institution_id) = item.institution_id else {
            debug!("[Plaid] Item {} has no institution", item.item_id);
            return Ok(None);
        };
        let response = self.institution_get_by_id(&institution_id).await?;
        Ok(Some(response.institution.into()))
    }

    async fn get_accounts(
        &self,
        access_token: &str,
    ) -> std::result::Result<Vec<ProviderAccount>, ProviderError> {
        let response = self.accounts_get(access_token).await?;
        Ok(response.accounts.into_iter().map(Into::into).collect())
    }
}

#[async_trait]
impl VerificationKeySource for PlaidClient {
    async fn get_verification_key(
        &self,
        key_id: &str,
    ) -> std::result::Result<VerificationKey, ProviderError> {
        Ok(self.webhook_verification_key_get(key_id).await?.key)
    }
}
