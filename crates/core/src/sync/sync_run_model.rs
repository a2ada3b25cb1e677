//! Sync run records and engine results.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::SyncFailureClassification;
use crate::errors::Error;
use crate::items::ItemStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncRunStatus {
    Running,
    Success,
    Failed,
}

impl SyncRunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for SyncRunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncRunStatus {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "running" => Ok(Self::Running),
            "success" => Ok(Self::Success),
            "failed" => Ok(Self::Failed),
            other => Err(Error::validation(format!(
                "Unknown sync run status '{}'",
                other
            ))),
        }
    }
}

/// One sync attempt for an item. Immutable once it leaves `running`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncRun {
    pub id: String,
    pub user_id: String,
    pub item_id: String,
    pub status: SyncRunStatus,
    pub cursor_before: Option<String>,
    pub cursor_after: Option<String>,
    pub added_count: i64,
    pub modified_count: i64,
    pub removed_count: i64,
    pub error_code: Option<String>,
    pub error_type: Option<String>,
    pub error_message: Option<String>,
    pub http_status: Option<i32>,
    pub retryable: Option<bool>,
    pub retry_scheduled_at: Option<DateTime<Utc>>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSyncRun {
    pub user_id: String,
    pub item_id: String,
    pub cursor_before: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncCounts {
    pub added: usize,
    pub modified: usize,
    pub removed: usize,
}

/// How a run ends, together with the item fields written in the same transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncRunOutcome {
    /// Item becomes `healthy` with `cursor_after`; error and retry state is cleared.
    Success {
        cursor_after: Option<String>,
        counts: SyncCounts,
        finished_at: DateTime<Utc>,
    },
    /// Item keeps its cursor and takes the failure bookkeeping below.
    Failed {
        cursor_after: Option<String>,
        counts: SyncCounts,
        classification: SyncFailureClassification,
        item_status: ItemStatus,
        failure_count: i32,
        retry_scheduled_at: Option<DateTime<Utc>>,
        finished_at: DateTime<Utc>,
    },
}

impl SyncRunOutcome {
    pub fn status(&self) -> SyncRunStatus {
        match self {
            Self::Success { .. } => SyncRunStatus::Success,
            Self::Failed { .. } => SyncRunStatus::Failed,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncSummary {
    pub run_id: String,
    pub added_count: usize,
    pub modified_count: usize,
    pub removed_count: usize,
    pub cursor: Option<String>,
    pub pages: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    #[error("A sync is already running for item {0}")]
    InProgress(String),

    #[error("Sync run {0} was already finalized")]
    RunAlreadyFinalized(String),

    #[error("Sync failed for item {item_id}: {}", .classification.error_message)]
    Failed {
        item_id: String,
        run_id: String,
        classification: SyncFailureClassification,
        failure_count: i32,
        retries_exhausted: bool,
        retry_delay_ms: Option<u64>,
    },
}

impl SyncError {
    /// Machine-readable code surfaced next to the human message.
    pub fn code(&self) -> &str {
        match self {
            Self::InProgress(_) => "SYNC_IN_PROGRESS",
            Self::RunAlreadyFinalized(_) => "SYNC_RUN_FINALIZED",
            Self::Failed { classification, .. } => classification
                .error_code
                .as_deref()
                .unwrap_or("SYNC_FAILED"),
        }
    }
}
