use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::Error;

/// Health of a linked provider connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    Healthy,
    Degraded,
    NeedsReauth,
    Disconnected,
}

impl ItemStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::Degraded => "degraded",
            Self::NeedsReauth => "needs_reauth",
            Self::Disconnected => "disconnected",
        }
    }
}

impl fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ItemStatus {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "healthy" => Ok(Self::Healthy),
            "degraded" => Ok(Self::Degraded),
            "needs_reauth" => Ok(Self::NeedsReauth),
            "disconnected" => Ok(Self::Disconnected),
            other => Err(Error::validation(format!("Unknown item status '{}'", other))),
        }
    }
}

/// One linked external account connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    pub id: String,
    pub user_id: String,
    pub institution_id: String,
    pub plaid_item_id: String,
    #[serde(skip_serializing)]
    pub encrypted_access_token: String,
    pub status: ItemStatus,
    pub cursor: Option<String>,
    pub failure_count: i32,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub last_webhook_at: Option<DateTime<Utc>>,
    pub last_successful_sync_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Failure bookkeeping read by the sync engine before classifying an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemRetryState {
    pub failure_count: i32,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub status: ItemStatus,
}

/// Exclusive right to run a sync for one item until `expires_at`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncLease {
    pub item_id: String,
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Input for creating or re-linking an item after a public token exchange.
#[derive(Debug, Clone)]
pub struct NewLinkedItem {
    pub user_id: String,
    pub plaid_item_id: String,
    pub plaid_institution_id: String,
    pub institution_name: String,
    pub institution_logo_url: Option<String>,
    pub encrypted_access_token: String,
}

/// Account metadata reported by the provider for a linked item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAccount {
    pub plaid_account_id: String,
    pub name: String,
    pub account_type: String,
    pub subtype: Option<String>,
    pub mask: Option<String>,
    pub current_balance_cents: Option<i64>,
    pub available_balance_cents: Option<i64>,
}

/// Item health joined with its institution, as shown to the owning user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionHealth {
    pub item_id: String,
    pub plaid_item_id: String,
    pub institution_name: String,
    pub status: ItemStatus,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub last_webhook_at: Option<DateTime<Utc>>,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub last_successful_sync_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}
