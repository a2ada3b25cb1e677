use serde::{Deserialize, Serialize};

use crate::sync::SyncSummary;

/// Result of linking an institution and running its first sync.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkedConnection {
    pub item_id: String,
    pub sync_summary: SyncSummary,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryResultStatus {
    Success,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryResult {
    pub item_id: String,
    pub status: RetryResultStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryRunReport {
    pub tried_count: usize,
    pub success_count: usize,
    pub results: Vec<RetryResult>,
}
