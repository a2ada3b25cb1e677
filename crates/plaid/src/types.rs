//! Request and response bodies for the Plaid endpoints the client calls.

use northstar_core::provider::{
    LinkToken, ProviderAccount, ProviderInstitution, ProviderTransaction, PublicTokenExchange,
    SyncPage,
};
use northstar_core::webhooks::VerificationKey;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Error body Plaid returns with non-2xx responses.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PlaidApiError {
    pub error_type: String,
    pub error_code: String,
    pub error_message: String,
    #[serde(default)]
    pub display_message: Option<String>,
    #[serde(default)]
    pub request_id: Option<String>,
}

// ─────────────────────────────────────────────────────────────────────────────
// /transactions/sync
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct TransactionsSyncRequest<'a> {
    pub access_token: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cursor: Option<&'a str>,
    pub count: u32,
}

#[derive(Debug, Deserialize)]
pub struct TransactionsSyncResponse {
    #[serde(default)]
    pub added: Vec<PlaidTransaction>,
    #[serde(default)]
    pub modified: Vec<PlaidTransaction>,
    #[serde(default)]
    pub removed: Vec<RemovedTransaction>,
    pub next_cursor: String,
    pub has_more: bool,
    #[serde(default)]
    pub request_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PlaidTransaction {
    pub transaction_id: String,
    pub account_id: String,
    #[serde(default)]
    pub pending_transaction_id: Option<String>,
    pub amount: Decimal,
    #[serde(default)]
    pub iso_currency_code: Option<String>,
    #[serde(default)]
    pub unofficial_currency_code: Option<String>,
    #[serde(default)]
    pub merchant_name: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub authorized_date: Option<String>,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub pending: bool,
}

#[derive(Debug, Deserialize)]
pub struct RemovedTransaction {
    pub transaction_id: String,
}

impl From<PlaidTransaction> for ProviderTransaction {
    fn from(tx: PlaidTransaction) -> Self {
        Self {
            transaction_id: tx.transaction_id,
            account_id: tx.account_id,
            pending_transaction_id: tx.pending_transaction_id,
            amount: tx.amount,
            iso_currency_code: tx.iso_currency_code,
            unofficial_currency_code: tx.unofficial_currency_code,
            name: tx
                .name
                .or_else(|| tx.merchant_name.clone())
                .unwrap_or_default(),
            merchant_name: tx.merchant_name,
            authorized_date: tx.authorized_date,
            date: tx.date,
            pending: tx.pending,
        }
    }
}

impl From<TransactionsSyncResponse> for SyncPage {
    fn from(response: TransactionsSyncResponse) -> Self {
        Self {
            added: response.added.into_iter().map(Into::into).collect(),
            modified: response.modified.into_iter().map(Into::into).collect(),
            removed: response
                .removed
                .into_iter()
                .map(|removed| removed.transaction_id)
                .collect(),
            next_cursor: response.next_cursor,
            has_more: response.has_more,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// /link/token/create
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct LinkTokenCreateRequest<'a> {
    pub client_name: &'a str,
    pub language: &'a str,
    pub country_codes: &'a [String],
    pub user: LinkTokenUser<'a>,
    pub products: &'a [&'a str],
    #[serde(skip_serializing_if = "Option::is_none")]
    pub webhook: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect_uri: Option<&'a str>,
}

#[derive(Debug, Serialize)]
pub struct LinkTokenUser<'a> {
    pub client_user_id: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct LinkTokenCreateResponse {
    pub link_token: String,
    pub expiration: String,
    pub request_id: String,
}

impl From<LinkTokenCreateResponse> for LinkToken {
    fn from(response: LinkTokenCreateResponse) -> Self {
        Self {
            link_token: response.link_token,
            expiration: response.expiration,
            request_id: response.request_id,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// /item/public_token/exchange, /item/get, /institutions/get_by_id
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct PublicTokenExchangeRequest<'a> {
    pub public_token: &'a str,
}

#[derive(Deserialize)]
pub struct PublicTokenExchangeResponse {
    pub access_token: String,
    pub item_id: String,
}

impl From<PublicTokenExchangeResponse> for PublicTokenExchange {
    fn from(response: PublicTokenExchangeResponse) -> Self {
        Self {
            item_id: response.item_id,
            access_token: response.access_token,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AccessTokenRequest<'a> {
    pub access_token: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct ItemGetResponse {
    pub item: PlaidItem,
}

#[derive(Debug, Deserialize)]
pub struct PlaidItem {
    pub item_id: String,
    #[serde(default)]
    pub institution_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct InstitutionGetRequest<'a> {
    pub institution_id: &'a str,
    pub country_codes: &'a [String],
    pub options: InstitutionGetOptions,
}

#[derive(Debug, Serialize)]
pub struct InstitutionGetOptions {
    pub include_optional_metadata: bool,
}

#[derive(Debug, Deserialize)]
pub struct InstitutionGetResponse {
    pub institution: PlaidInstitution,
}

#[derive(Debug, Deserialize)]
pub struct PlaidInstitution {
    pub institution_id: String,
    pub name: String,
    #[serde(default)]
    pub logo: Option<String>,
}

impl From<PlaidInstitution> for ProviderInstitution {
    fn from(institution: PlaidInstitution) -> Self {
        Self {
            institution_id: institution.institution_id,
            name: institution.name,
            logo: institution.logo,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// /accounts/get
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct AccountsGetResponse {
    pub accounts: Vec<PlaidAccount>,
}

#[derive(Debug, Deserialize)]
pub struct PlaidAccount {
    pub account_id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub account_type: String,
    #[serde(default)]
    pub subtype: Option<String>,
    #[serde(default)]
    pub mask: Option<String>,
    #[serde(default)]
    pub balances: PlaidBalances,
}

#[derive(Debug, Default, Deserialize)]
pub struct PlaidBalances {
    #[serde(default)]
    pub current: Option<Decimal>,
    #[serde(default)]
    pub available: Option<Decimal>,
}

impl From<PlaidAccount> for ProviderAccount {
    fn from(account: PlaidAccount) -> Self {
        Self {
            account_id: account.account_id,
            name: account.name,
            account_type: account.account_type,
            subtype: account.subtype,
            mask: account.mask,
            current_balance: account.balances.current,
            available_balance: account.balances.available,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// /webhook_verification_key/get
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct VerificationKeyRequest<'a> {
    pub key_id: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct VerificationKeyResponse {
    pub key: VerificationKey,
}
