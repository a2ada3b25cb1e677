use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{IngestOutcome, NewWebhookEvent, VerificationKey, WebhookEvent};
use crate::errors::Result;
use crate::provider::ProviderError;

#[async_trait]
pub trait WebhookEventRepositoryTrait: Send + Sync {
    fn get_webhook_event(&self, idempotency_key: &str) -> Result<Option<WebhookEvent>>;

    /// Inserts the event unless its idempotency key exists; `None` means duplicate.
    async fn insert_webhook_event(&self, event: NewWebhookEvent) -> Result<Option<WebhookEvent>>;

    async fn mark_webhook_processed(
        &self,
        event_id: String,
        processed_at: DateTime<Utc>,
    ) -> Result<()>;
}

/// Resolves a signing key id to its public verification key.
#[async_trait]
pub trait VerificationKeySource: Send + Sync {
    async fn get_verification_key(
        &self,
        key_id: &str,
    ) -> std::result::Result<VerificationKey, ProviderError>;
}

#[async_trait]
pub trait WebhookIngestionServiceTrait: Send + Sync {
    async fn ingest(&self, body: &[u8], idempotency_key: &str) -> Result<IngestOutcome>;
}
