//! Conversions from external infrastructure errors into domain errors.

use r2d2::Error as PoolError;
use reqwest::Error as HttpError;
use rusqlite::Error as SqlError;
use synclane_domain::SyncLaneError;
use tokio::task::JoinError;

/// Error newtype that keeps conversions on the infrastructure side and can be
/// converted back into the domain error.
#[derive(Debug)]
pub struct InfraError(pub SyncLaneError);

impl From<InfraError> for SyncLaneError {
    fn from(value: InfraError) -> Self {
        value.0
    }
}

impl From<SyncLaneError> for InfraError {
    fn from(value: SyncLaneError) -> Self {
        InfraError(value)
    }
}

/// Extension trait to make the conversion logic explicit in tests and within
/// this module.
trait IntoSyncLaneError {
    fn into_synclane(self) -> SyncLaneError;
}

/* -------------------------------------------------------------------------- */
/* rusqlite::Error → SyncLaneError */
/* -------------------------------------------------------------------------- */

impl IntoSyncLaneError for SqlError {
    fn into_synclane(self) -> SyncLaneError {
        use rusqlite::ffi::ErrorCode;
        use rusqlite::Error as RE;

        match self {
            RE::SqliteFailure(err, maybe_message) => {
                let message = maybe_message.unwrap_or_default();
                match (err.code, err.extended_code) {
                    (ErrorCode::DatabaseBusy, _) => {
                        SyncLaneError::Database("database is busy".into())
                    }
                    (ErrorCode::DatabaseLocked, _) => {
                        SyncLaneError::Database("database is locked".into())
                    }
                    // SQLITE_CONSTRAINT_UNIQUE / SQLITE_CONSTRAINT_PRIMARYKEY
                    (ErrorCode::ConstraintViolation, 2067 | 1555) => {
                        SyncLaneError::Conflict(format!("unique constraint violation: {message}"))
                    }
                    (ErrorCode::ConstraintViolation, 787) => {
                        SyncLaneError::InvalidInput("foreign key constraint violation".into())
                    }
                    (ErrorCode::CannotOpen | ErrorCode::NotADatabase, _) => {
                        SyncLaneError::Config(format!("cannot open database: {message}"))
                    }
                    _ => SyncLaneError::Database(format!(
                        "sqlite failure {:?} (code {}): {}",
                        err.code, err.extended_code, message
                    )),
                }
            }
            RE::QueryReturnedNoRows => SyncLaneError::NotFound("no rows returned by query".into()),
            RE::FromSqlConversionFailure(_, _, cause) => {
                SyncLaneError::Internal(format!("failed to convert sqlite value: {cause}"))
            }
            RE::InvalidColumnType(_, _, ty) => {
                SyncLaneError::Internal(format!("invalid column type: {ty}"))
            }
            RE::Utf8Error(_) => {
                SyncLaneError::Internal("invalid UTF-8 returned from sqlite".into())
            }
            RE::InvalidParameterName(parameter_name) => {
                SyncLaneError::Internal(format!("invalid parameter name: {parameter_name}"))
            }
            RE::InvalidPath(path) => SyncLaneError::Config(format!(
                "invalid database path: {}",
                path.to_string_lossy()
            )),
            RE::InvalidQuery => SyncLaneError::Internal("invalid SQL query".into()),
            other => SyncLaneError::Database(other.to_string()),
        }
    }
}

impl From<SqlError> for InfraError {
    fn from(value: SqlError) -> Self {
        InfraError(value.into_synclane())
    }
}

/* -------------------------------------------------------------------------- */
/* r2d2::Error → SyncLaneError */
/* -------------------------------------------------------------------------- */

impl IntoSyncLaneError for PoolError {
    fn into_synclane(self) -> SyncLaneError {
        // r2d2 only surfaces checkout timeouts here; retrying may succeed.
        SyncLaneError::Database(format!("connection pool exhausted: {self}"))
    }
}

impl From<PoolError> for InfraError {
    fn from(value: PoolError) -> Self {
        InfraError(value.into_synclane())
    }
}

/* -------------------------------------------------------------------------- */
/* tokio::task::JoinError → SyncLaneError */
/* -------------------------------------------------------------------------- */

impl IntoSyncLaneError for JoinError {
    fn into_synclane(self) -> SyncLaneError {
        if self.is_cancelled() {
            SyncLaneError::Internal("blocking task cancelled".into())
        } else {
            SyncLaneError::Internal(format!("blocking task panicked: {self}"))
        }
    }
}

impl From<JoinError> for InfraError {
    fn from(value: JoinError) -> Self {
        InfraError(value.into_synclane())
    }
}

/* -------------------------------------------------------------------------- */
/* reqwest::Error → SyncLaneError */
/* -------------------------------------------------------------------------- */

impl IntoSyncLaneError for HttpError {
    fn into_synclane(self) -> SyncLaneError {
        if self.is_timeout() {
            return SyncLaneError::Network("HTTP request timed out".into());
        }

        if self.is_connect() {
            return SyncLaneError::Network("HTTP connection failure".into());
        }

        if self.is_builder() {
            return SyncLaneError::Config(format!("invalid HTTP request: {self}"));
        }

        SyncLaneError::Network(self.to_string())
    }
}

impl From<HttpError> for InfraError {
    fn from(value: HttpError) -> Self {
        InfraError(value.into_synclane())
    }
}

/* -------------------------------------------------------------------------- */
/* Tests */
/* -------------------------------------------------------------------------- */

#[cfg(test)]
mod tests {
    use rusqlite::ffi::{Error as FfiError, ErrorCode};
    use rusqlite::Error as SqlError;

    use super::*;

    #[test]
    fn sqlite_busy_maps_to_transient_database_error() {
        let err = SqlError::SqliteFailure(
            FfiError { code: ErrorCode::DatabaseBusy, extended_code: 5 },
            Some("database is locked".into()),
        );

        let mapped: SyncLaneError = InfraError::from(err).into();
        match &mapped {
            SyncLaneError::Database(msg) => {
                assert!(msg.contains("busy") || msg.contains("locked"));
            }
            other => panic!("expected database error, got {:?}", other),
        }
        assert!(mapped.is_transient());
    }

    #[test]
    fn sqlite_unique_violation_maps_to_conflict() {
        let err = SqlError::SqliteFailure(
            FfiError { code: ErrorCode::ConstraintViolation, extended_code: 2067 },
            Some("UNIQUE constraint failed: sync_attempts.client_id".into()),
        );

        let mapped: SyncLaneError = InfraError::from(err).into();
        assert!(matches!(mapped, SyncLaneError::Conflict(_)), "got {mapped:?}");
    }

    #[test]
    fn no_rows_maps_to_not_found() {
        let mapped: SyncLaneError = InfraError::from(SqlError::QueryReturnedNoRows).into();
        assert!(matches!(mapped, SyncLaneError::NotFound(_)));
    }

    #[test]
    fn malformed_request_maps_to_config_error() {
        let err = reqwest::Client::new().get("not a url").build().unwrap_err();

        let mapped: SyncLaneError = InfraError::from(err).into();
        assert!(matches!(mapped, SyncLaneError::Config(_)), "got {mapped:?}");
    }

    #[tokio::test]
    async fn cancelled_join_maps_to_internal() {
        let handle = tokio::spawn(async {
            tokio::time::sleep(std::time::Duration::from_secs(60)).await;
        });
        handle.abort();
        let err = handle.await.unwrap_err();

        let mapped: SyncLaneError = InfraError::from(err).into();
        match mapped {
            SyncLaneError::Internal(msg) => assert!(msg.contains("cancelled")),
            other => panic!("expected internal error, got {:?}", other),
        }
    }
}
