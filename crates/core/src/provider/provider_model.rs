use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Structured failure from a provider call.
///
/// `http_status` and `error_code` are absent for transport failures (timeouts,
/// connection resets) where no provider response was received.
#[derive(Debug, Clone, Default, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[error("{}", self.summary())]
pub struct ProviderError {
    pub http_status: Option<u16>,
    pub error_code: Option<String>,
    pub error_type: Option<String>,
    pub error_message: Option<String>,
    pub display_message: Option<String>,
    pub request_id: Option<String>,
    /// Transport-level description when no structured body was available.
    pub message: Option<String>,
}

impl ProviderError {
    pub fn transport(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Self::default()
        }
    }

    pub fn api(
        http_status: u16,
        error_code: impl Into<String>,
        error_message: impl Into<String>,
    ) -> Self {
        Self {
            http_status: Some(http_status),
            error_code: Some(error_code.into()),
            error_message: Some(error_message.into()),
            ..Self::default()
        }
    }

    /// Most user-facing message available, in provider preference order.
    pub fn best_message(&self) -> Option<&str> {
        self.display_message
            .as_deref()
            .or(self.error_message.as_deref())
            .or(self.message.as_deref())
    }

    fn summary(&self) -> String {
        let message = self.best_message().unwrap_or("Unknown provider error");
        match (self.http_status, self.error_code.as_deref()) {
            (Some(status), Some(code)) => format!("{} ({}): {}", code, status, message),
            (Some(status), None) => format!("HTTP {}: {}", status, message),
            (None, Some(code)) => format!("{}: {}", code, message),
            (None, None) => message.to_string(),
        }
    }
}

/// One transaction as reported by the provider's incremental sync.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderTransaction {
    pub transaction_id: String,
    pub account_id: String,
    pub pending_transaction_id: Option<String>,
    /// Major currency units, positive for outflows.
    pub amount: Decimal,
    pub iso_currency_code: Option<String>,
    pub unofficial_currency_code: Option<String>,
    pub merchant_name: Option<String>,
    pub name: String,
    pub authorized_date: Option<String>,
    pub date: Option<String>,
    pub pending: bool,
}

/// One page of the provider's cursor-based transaction delta feed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncPage {
    pub added: Vec<ProviderTransaction>,
    pub modified: Vec<ProviderTransaction>,
    pub removed: Vec<String>,
    pub next_cursor: String,
    pub has_more: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkToken {
    pub link_token: String,
    pub expiration: String,
    pub request_id: String,
}

#[derive(Clone, PartialEq, Eq)]
pub struct PublicTokenExchange {
    pub item_id: String,
    pub access_token: String,
}

impl std::fmt::Debug for PublicTokenExchange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PublicTokenExchange")
            .field("item_id", &self.item_id)
            .field("access_token", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderInstitution {
    pub institution_id: String,
    pub name: String,
    pub logo: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderAccount {
    pub account_id: String,
    pub name: String,
    pub account_type: String,
    pub subtype: Option<String>,
    pub mask: Option<String>,
    pub current_balance: Option<Decimal>,
    pub available_balance: Option<Decimal>,
}
