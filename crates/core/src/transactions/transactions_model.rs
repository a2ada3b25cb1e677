use chrono::{DateTime, Utc};
use num_traits::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::errors::{Error, Result};
use crate::provider::ProviderTransaction;

/// Currency recorded when the provider reports neither an ISO nor an unofficial code.
pub const DEFAULT_CURRENCY: &str = "USD";

/// One persisted ledger row, unique per provider transaction id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerTransaction {
    pub id: String,
    pub user_id: String,
    pub item_id: String,
    pub account_id: String,
    pub provider_transaction_id: String,
    pub pending_transaction_id: Option<String>,
    pub amount_cents: i64,
    pub currency: String,
    pub merchant_name: Option<String>,
    pub name: String,
    pub authorized_date: Option<String>,
    pub posted_date: Option<String>,
    pub pending: bool,
    pub hash_fingerprint: String,
    /// Tombstone set when the provider reports the transaction removed.
    pub removed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Provider transaction translated into ledger units, not yet bound to a local account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewLedgerTransaction {
    pub provider_account_id: String,
    pub provider_transaction_id: String,
    pub pending_transaction_id: Option<String>,
    pub amount_cents: i64,
    pub currency: String,
    pub merchant_name: Option<String>,
    pub name: String,
    pub authorized_date: Option<String>,
    pub posted_date: Option<String>,
    pub pending: bool,
    pub hash_fingerprint: String,
}

impl TryFrom<&ProviderTransaction> for NewLedgerTransaction {
    type Error = Error;

    fn try_from(tx: &ProviderTransaction) -> Result<Self> {
        let currency = tx
            .iso_currency_code
            .as_deref()
            .or(tx.unofficial_currency_code.as_deref())
            .filter(|code| !code.trim().is_empty())
            .unwrap_or(DEFAULT_CURRENCY)
            .to_string();

        Ok(Self {
            provider_account_id: tx.account_id.clone(),
            provider_transaction_id: tx.transaction_id.clone(),
            pending_transaction_id: tx.pending_transaction_id.clone(),
            amount_cents: to_minor_units(tx.amount)?,
            currency,
            merchant_name: tx.merchant_name.clone(),
            name: tx.name.clone(),
            authorized_date: tx.authorized_date.clone(),
            posted_date: tx.date.clone(),
            pending: tx.pending,
            hash_fingerprint: format!("{}:{}", tx.account_id, tx.transaction_id),
        })
    }
}

/// Converts a major-unit amount to integer minor units.
///
/// Halves round toward positive infinity, so `-0.005` becomes `0` and `0.005` becomes `1`.
pub fn to_minor_units(amount: Decimal) -> Result<i64> {
    amount
        .checked_mul(Decimal::ONE_HUNDRED)
        .and_then(|cents| cents.checked_add(Decimal::new(5, 1)))
        .map(|cents| cents.floor())
        .and_then(|cents| cents.to_i64())
        .ok_or_else(|| Error::validation(format!("Amount {} is out of range", amount)))
}

/// Delta for one provider page, applied in a single store transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LedgerPage {
    pub item_id: String,
    pub user_id: String,
    pub added: Vec<NewLedgerTransaction>,
    pub modified: Vec<NewLedgerTransaction>,
    pub removed: Vec<String>,
}

impl LedgerPage {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.modified.is_empty() && self.removed.is_empty()
    }
}

/// Rows touched by one page application.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppliedPage {
    pub upserted: usize,
    pub tombstoned: usize,
    /// Rows referencing an account this item does not own locally.
    pub skipped: usize,
}
