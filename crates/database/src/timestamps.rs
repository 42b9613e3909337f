//! Timestamps are stored as fixed-width RFC 3339 text so they sort as strings.

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use parlor_hub::StoreError;

/// Current time at the precision the database keeps.
pub(crate) fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

pub(crate) fn format_timestamp(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(value)
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|e| StoreError::Backend(format!("invalid timestamp {value:?}: {e}")))
}
