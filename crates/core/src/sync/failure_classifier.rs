//! Maps sync failures to retry behavior and connection health.

use serde::{Deserialize, Serialize};

use super::{BASE_RETRY_DELAY_MS, MAX_RETRY_DELAY_MS, MAX_SYNC_RETRIES};
use crate::errors::Error;
use crate::items::ItemStatus;
use crate::provider::ProviderError;

/// Provider codes that only a user re-link can fix.
pub const NEEDS_REAUTH_ERROR_CODES: [&str; 3] = [
    "ITEM_LOGIN_REQUIRED",
    "INVALID_ACCESS_TOKEN",
    "ACCESS_NOT_GRANTED",
];

/// Provider codes that are expected to clear on their own.
pub const TRANSIENT_ERROR_CODES: [&str; 6] = [
    "RATE_LIMIT_EXCEEDED",
    "INSTITUTION_DOWN",
    "INSTITUTION_NOT_RESPONDING",
    "PRODUCT_NOT_READY",
    "INTERNAL_SERVER_ERROR",
    "TRANSACTIONS_SYNC_MUTATION_DURING_PAGINATION",
];

const UNKNOWN_SYNC_ERROR: &str = "Unknown sync error";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncFailureClassification {
    pub error_code: Option<String>,
    pub error_type: Option<String>,
    pub error_message: String,
    pub http_status: Option<u16>,
    pub is_retryable: bool,
    pub item_status: ItemStatus,
}

/// Classify a structured provider failure.
pub fn classify_provider_error(error: &ProviderError) -> SyncFailureClassification {
    let error_code = error.error_code.clone();
    let error_message = error
        .best_message()
        .unwrap_or(UNKNOWN_SYNC_ERROR)
        .to_string();

    let (is_retryable, item_status) = match error_code.as_deref() {
        Some(code) if NEEDS_REAUTH_ERROR_CODES.contains(&code) => (false, ItemStatus::NeedsReauth),
        // Transient codes, 5xx, unrecognized codes and missing codes all fail open toward retry.
        _ => (true, ItemStatus::Degraded),
    };

    SyncFailureClassification {
        error_code,
        error_type: error.error_type.clone(),
        error_message,
        http_status: error.http_status,
        is_retryable,
        item_status,
    }
}

/// Classify any error raised while draining provider pages.
pub fn classify_sync_error(error: &Error) -> SyncFailureClassification {
    match error {
        Error::Provider(provider_error) => classify_provider_error(provider_error),
        other => SyncFailureClassification {
            error_code: None,
            error_type: None,
            error_message: other.to_string(),
            http_status: None,
            is_retryable: true,
            item_status: ItemStatus::Degraded,
        },
    }
}

/// `true` when the code is one of the recognized transient provider codes.
pub fn is_transient_error_code(code: &str) -> bool {
    TRANSIENT_ERROR_CODES.contains(&code)
}

/// Exponential backoff in milliseconds: `base * 2^(failure_count - 1)`, capped.
pub fn calculate_retry_delay_ms(failure_count: i32) -> u64 {
    let exponent = failure_count.saturating_sub(1).clamp(0, 32) as u32;
    BASE_RETRY_DELAY_MS
        .saturating_mul(2_u64.saturating_pow(exponent))
        .min(MAX_RETRY_DELAY_MS)
}

/// Bookkeeping outcome for one failed sync attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryDecision {
    pub failure_count: i32,
    pub retries_exhausted: bool,
    pub retry_delay_ms: Option<u64>,
    pub item_status: ItemStatus,
}

impl RetryDecision {
    pub fn should_retry(&self) -> bool {
        self.retry_delay_ms.is_some()
    }
}

/// Counts this failure against the item and decides whether to schedule another attempt.
pub fn decide_retry(
    classification: &SyncFailureClassification,
    previous_failure_count: i32,
) -> RetryDecision {
    let failure_count = previous_failure_count.max(0) + 1;
    let retries_exhausted = failure_count >= MAX_SYNC_RETRIES;
    let retry_delay_ms = (classification.is_retryable && !retries_exhausted)
        .then(|| calculate_retry_delay_ms(failure_count));
    let item_status = if retries_exhausted {
        ItemStatus::NeedsReauth
    } else {
        classification.item_status
    };

    RetryDecision {
        failure_count,
        retries_exhausted,
        retry_delay_ms,
        item_status,
    }
}
