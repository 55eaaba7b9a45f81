//! Helpers shared by the SQLite repositories

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use synclane_domain::{Result, SyncLaneError};
use tokio::task;

use super::manager::{DbManager, SqliteConnection};
use crate::errors::InfraError;

/// Run `op` on a pooled connection inside `spawn_blocking`.
pub(crate) async fn with_connection<T, F>(db: &Arc<DbManager>, op: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce(&mut SqliteConnection) -> Result<T> + Send + 'static,
{
    let db = Arc::clone(db);
    task::spawn_blocking(move || -> Result<T> {
        let mut conn = db.get_connection()?;
        op(&mut conn)
    })
    .await
    .map_err(map_join_error)?
}

pub(crate) fn map_join_error(err: task::JoinError) -> SyncLaneError {
    SyncLaneError::from(InfraError::from(err))
}

pub(crate) fn to_millis(instant: DateTime<Utc>) -> i64 {
    instant.timestamp_millis()
}

/// Read a millisecond timestamp column.
pub(crate) fn from_millis(column: usize, millis: i64) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            column,
            Type::Integer,
            format!("timestamp out of range: {millis}").into(),
        )
    })
}

pub(crate) fn from_millis_opt(
    column: usize,
    millis: Option<i64>,
) -> rusqlite::Result<Option<DateTime<Utc>>> {
    millis.map(|value| from_millis(column, value)).transpose()
}

/// Decode a JSON text column.
pub(crate) fn from_json<T: serde::de::DeserializeOwned>(
    column: usize,
    raw: &str,
) -> rusqlite::Result<T> {
    serde_json::from_str(raw)
        .map_err(|err| rusqlite::Error::FromSqlConversionFailure(column, Type::Text, Box::new(err)))
}

pub(crate) fn to_json<T: serde::Serialize>(value: &T) -> Result<String> {
    serde_json::to_string(value)
        .map_err(|err| SyncLaneError::Internal(format!("failed to encode JSON column: {err}")))
}

pub(crate) fn bool_to_int(value: bool) -> i64 {
    i64::from(value)
}

pub(crate) fn int_to_bool(value: i64) -> bool {
    value != 0
}

pub(crate) fn usize_to_i64(value: usize) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn millis_round_trip_preserves_precision() {
        let instant = Utc.timestamp_millis_opt(1_704_067_200_123).single().unwrap();
        assert_eq!(from_millis(0, to_millis(instant)).unwrap(), instant);
    }

    #[test]
    fn out_of_range_millis_is_a_conversion_error() {
        let err = from_millis(3, i64::MAX).unwrap_err();
        assert!(matches!(err, rusqlite::Error::FromSqlConversionFailure(3, _, _)));
    }

    #[test]
    fn usize_conversion_saturates() {
        assert_eq!(usize_to_i64(usize::MAX), i64::MAX);
        assert_eq!(usize_to_i64(7), 7);
    }
}
