use chrono::{DateTime, SecondsFormat, Utc};
use northstar_core::Result;

use crate::errors::StorageError;

/// Fixed-width RFC 3339 so stored timestamps compare correctly as text.
pub(crate) fn to_db_time(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn from_db_time(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|e| {
            StorageError::InvalidValue(format!("Bad timestamp '{}': {}", value, e)).into()
        })
}

pub(crate) fn from_db_time_opt(value: Option<&str>) -> Result<Option<DateTime<Utc>>> {
    value.map(from_db_time).transpose()
}
