use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Webhook type whose deliveries trigger a transaction sync.
pub const TRANSACTIONS_WEBHOOK_TYPE: &str = "TRANSACTIONS";

const UNKNOWN_PART: &str = "unknown";

/// One distinct inbound delivery, unique per idempotency key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookEvent {
    pub id: String,
    pub idempotency_key: String,
    pub event_type: String,
    pub plaid_item_id: Option<String>,
    pub item_id: Option<String>,
    pub payload: String,
    pub received_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewWebhookEvent {
    pub idempotency_key: String,
    pub event_type: String,
    pub plaid_item_id: Option<String>,
    pub item_id: Option<String>,
    pub payload: String,
    pub received_at: DateTime<Utc>,
}

/// Routing fields read from a webhook body. Unknown fields are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct WebhookEnvelope {
    pub webhook_type: Option<String>,
    pub webhook_code: Option<String>,
    pub item_id: Option<String>,
}

impl WebhookEnvelope {
    /// Parses leniently: a body that is not a JSON object yields an empty envelope.
    pub fn parse(body: &[u8]) -> Self {
        serde_json::from_slice(body).unwrap_or_default()
    }

    /// `"<webhook_type>:<webhook_code>"` with `unknown` for missing parts.
    pub fn event_type(&self) -> String {
        format!(
            "{}:{}",
            self.webhook_type.as_deref().unwrap_or(UNKNOWN_PART),
            self.webhook_code.as_deref().unwrap_or(UNKNOWN_PART)
        )
    }

    pub fn is_transactions_update(&self) -> bool {
        self.webhook_type.as_deref() == Some(TRANSACTIONS_WEBHOOK_TYPE)
    }
}

/// Public half of a provider webhook signing key, in JWK form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationKey {
    pub alg: String,
    pub kty: String,
    pub crv: String,
    pub kid: String,
    pub x: String,
    pub y: String,
    #[serde(default, rename = "use")]
    pub key_use: Option<String>,
    #[serde(default)]
    pub created_at: Option<i64>,
    #[serde(default)]
    pub expired_at: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestStatus {
    Processed,
    DuplicateIgnored,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestOutcome {
    pub status: IngestStatus,
    pub event_id: Option<String>,
    pub event_type: Option<String>,
    pub sync_triggered: bool,
}

impl IngestOutcome {
    pub fn duplicate() -> Self {
        Self {
            status: IngestStatus::DuplicateIgnored,
            event_id: None,
            event_type: None,
            sync_triggered: false,
        }
    }
}
