use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use moka::future::Cache;

use super::{VerificationKey, VerificationKeySource};
use crate::provider::ProviderError;

/// Cached verification keys live this long before the provider is asked again.
pub const VERIFICATION_KEY_CACHE_TTL_SECS: u64 = 10 * 60;

/// Upper bound on distinct key ids held at once.
pub const VERIFICATION_KEY_CACHE_MAX_CAPACITY: u64 = 64;

/// TTL cache in front of a [`VerificationKeySource`]. Lookup failures are not cached.
pub struct CachedVerificationKeySource {
    inner: Arc<dyn VerificationKeySource>,
    cache: Cache<String, VerificationKey>,
}

impl CachedVerificationKeySource {
    pub fn new(inner: Arc<dyn VerificationKeySource>) -> Self {
        Self::with_ttl(inner, Duration::from_secs(VERIFICATION_KEY_CACHE_TTL_SECS))
    }

    pub fn with_ttl(inner: Arc<dyn VerificationKeySource>, ttl: Duration) -> Self {
        Self {
            inner,
            cache: Cache::builder()
                .max_capacity(VERIFICATION_KEY_CACHE_MAX_CAPACITY)
                .time_to_live(ttl)
                .build(),
        }
    }
}

#[async_trait]
impl VerificationKeySource for CachedVerificationKeySource {
    async fn get_verification_key(&self, key_id: &str) -> Result<VerificationKey, ProviderError> {
        if let Some(key) = self.cache.get(key_id).await {
            return Ok(key);
        }

        let key = self.inner.get_verification_key(key_id).await?;
        debug!("[Webhook] Cached verification key {}", key_id);
        self.cache.insert(key_id.to_string(), key.clone()).await;
        Ok(key)
    }
}
