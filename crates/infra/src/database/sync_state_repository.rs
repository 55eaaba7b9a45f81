//! SQLite-backed sync state: attempts history and client status.

use std::sync::Arc;

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use synclane_core::SyncStateStore;
use synclane_domain::{
    AttemptOutcome, ClientId, ClientStatus, CycleId, Result, SyncAttempt, SyncLaneError,
};
use tracing::{debug, warn};
use uuid::Uuid;

use super::manager::{map_sql_error, DbManager};
use super::repository::{
    from_json, from_millis, from_millis_opt, to_json, to_millis, usize_to_i64, with_connection,
};

/// Attempt history in `sync_attempts`; client status in `clients`.
pub struct SqliteSyncStateRepository {
    db: Arc<DbManager>,
}

impl SqliteSyncStateRepository {
    /// Repository over the shared connection pool.
    pub fn new(db: Arc<DbManager>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl SyncStateStore for SqliteSyncStateRepository {
    async fn upsert_attempt(&self, attempt: &SyncAttempt) -> Result<()> {
        self.write(attempt, None).await
    }

    async fn record_attempt(&self, attempt: &SyncAttempt, status: ClientStatus) -> Result<()> {
        self.write(attempt, Some(status)).await
    }

    async fn get_latest_attempt(&self, client_id: &ClientId) -> Result<Option<SyncAttempt>> {
        let client_id = client_id.clone();
        with_connection(&self.db, move |conn| {
            conn.query_row(ATTEMPT_LATEST_SQL, params![client_id.as_str()], map_attempt_row)
                .optional()
                .map_err(map_sql_error)
        })
        .await
    }

    async fn get_history(&self, client_id: &ClientId, limit: usize) -> Result<Vec<SyncAttempt>> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let client_id = client_id.clone();
        let limit = usize_to_i64(limit);
        with_connection(&self.db, move |conn| {
            let mut stmt = conn.prepare(ATTEMPT_HISTORY_SQL).map_err(map_sql_error)?;
            let rows = stmt
                .query_map(params![client_id.as_str(), limit], map_attempt_row)
                .map_err(map_sql_error)?;
            rows.collect::<rusqlite::Result<Vec<_>>>().map_err(map_sql_error)
        })
        .await
    }

    async fn update_client_status(
        &self,
        client_id: &ClientId,
        status: ClientStatus,
    ) -> Result<()> {
        let client_id = client_id.clone();
        with_connection(&self.db, move |conn| write_status(conn, &client_id, status)).await
    }

    async fn list_awaiting_retry(&self) -> Result<Vec<SyncAttempt>> {
        with_connection(&self.db, move |conn| {
            let mut stmt = conn.prepare(ATTEMPT_AWAITING_RETRY_SQL).map_err(map_sql_error)?;
            let rows = stmt.query_map([], map_attempt_row).map_err(map_sql_error)?;
            rows.collect::<rusqlite::Result<Vec<_>>>().map_err(map_sql_error)
        })
        .await
    }
}

impl SqliteSyncStateRepository {
    /// Insert or complete `attempt`, plus the client status when given, in one
    /// immediate transaction.
    async fn write(&self, attempt: &SyncAttempt, status: Option<ClientStatus>) -> Result<()> {
        let attempt = attempt.clone();
        let payload = attempt.normalized_payload.as_ref().map(to_json).transpose()?;

        with_connection(&self.db, move |conn| {
            let tx = conn
                .transaction_with_behavior(TransactionBehavior::Immediate)
                .map_err(map_sql_error)?;

            write_attempt(&tx, &attempt, payload)?;
            if let Some(status) = status {
                write_status(&tx, &attempt.client_id, status)?;
            }

            tx.commit().map_err(map_sql_error)
        })
        .await
    }
}

/// Complete the attempt when its row is still pending, insert it when the row
/// does not exist, and report a conflict otherwise.
fn write_attempt(conn: &Connection, attempt: &SyncAttempt, payload: Option<String>) -> Result<()> {
    let id = attempt.id.to_string();
    let updated = conn
        .execute(
            ATTEMPT_COMPLETE_SQL,
            params![
                id,
                attempt.outcome.to_string(),
                attempt.finished_at.map(to_millis),
                payload,
                attempt.error_code,
                attempt.error_detail,
                attempt.retry_at.map(to_millis),
            ],
        )
        .map_err(map_sql_error)?;

    if updated > 0 {
        debug!(
            client_id = %attempt.client_id,
            attempt_id = %id,
            outcome = %attempt.outcome,
            "attempt completed"
        );
        return Ok(());
    }

    let existing: Option<String> = conn
        .query_row("SELECT outcome FROM sync_attempts WHERE id = ?1", params![id], |row| {
            row.get(0)
        })
        .optional()
        .map_err(map_sql_error)?;

    if let Some(outcome) = existing {
        return Err(SyncLaneError::Conflict(format!("attempt {id} is already {outcome}")));
    }

    conn.execute(
        ATTEMPT_INSERT_SQL,
        params![
            id,
            attempt.client_id.as_str(),
            attempt.cycle_id.to_string(),
            attempt.attempt_number,
            to_millis(attempt.cycle_started_at),
            to_millis(attempt.started_at),
            attempt.finished_at.map(to_millis),
            attempt.outcome.to_string(),
            payload,
            attempt.error_code,
            attempt.error_detail,
            attempt.retry_at.map(to_millis),
        ],
    )
    .map_err(map_sql_error)?;
    debug!(client_id = %attempt.client_id, attempt_id = %id, "attempt inserted");
    Ok(())
}

fn write_status(conn: &Connection, client_id: &ClientId, status: ClientStatus) -> Result<()> {
    let updated = conn
        .execute(
            "UPDATE clients SET status = ?1, updated_at = ?2 WHERE id = ?3",
            params![status.to_string(), to_millis(chrono::Utc::now()), client_id.as_str()],
        )
        .map_err(map_sql_error)?;
    if updated == 0 {
        return Err(SyncLaneError::NotFound(format!("client {client_id}")));
    }
    Ok(())
}

/// Compare-and-set: only a row that is still pending can be completed.
const ATTEMPT_COMPLETE_SQL: &str = "UPDATE sync_attempts SET
        outcome = ?2, finished_at = ?3, normalized_payload = ?4,
        error_code = ?5, error_detail = ?6, retry_at = ?7
    WHERE id = ?1 AND outcome = 'pending'";

const ATTEMPT_INSERT_SQL: &str = "INSERT INTO sync_attempts (
        id, client_id, cycle_id, attempt_number, cycle_started_at, started_at, finished_at,
        outcome, normalized_payload, error_code, error_detail, retry_at
    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)";

const ATTEMPT_LATEST_SQL: &str = "SELECT
        id, client_id, cycle_id, attempt_number, cycle_started_at, started_at, finished_at,
        outcome, normalized_payload, error_code, error_detail, retry_at
    FROM sync_attempts WHERE client_id = ?1
    ORDER BY started_at DESC, attempt_number DESC, rowid DESC
    LIMIT 1";

const ATTEMPT_HISTORY_SQL: &str = "SELECT
        id, client_id, cycle_id, attempt_number, cycle_started_at, started_at, finished_at,
        outcome, normalized_payload, error_code, error_detail, retry_at
    FROM sync_attempts WHERE client_id = ?1
    ORDER BY started_at DESC, attempt_number DESC, rowid DESC
    LIMIT ?2";

const ATTEMPT_AWAITING_RETRY_SQL: &str = "SELECT
        a.id, a.client_id, a.cycle_id, a.attempt_number, a.cycle_started_at, a.started_at,
        a.finished_at, a.outcome, a.normalized_payload, a.error_code, a.error_detail, a.retry_at
    FROM sync_attempts a
    WHERE a.outcome = 'recoverable_failure'
      AND a.retry_at IS NOT NULL
      AND a.rowid = (
          SELECT b.rowid FROM sync_attempts b
          WHERE b.client_id = a.client_id
          ORDER BY b.started_at DESC, b.attempt_number DESC, b.rowid DESC
          LIMIT 1
      )
    ORDER BY a.retry_at ASC";

fn map_attempt_row(row: &Row<'_>) -> rusqlite::Result<SyncAttempt> {
    let id: String = row.get(0)?;
    let cycle_id: String = row.get(2)?;
    let outcome: String = row.get(7)?;
    let payload: Option<String> = row.get(8)?;

    Ok(SyncAttempt {
        outcome: parse_outcome(&id, &outcome),
        id: parse_uuid(0, &id)?,
        client_id: ClientId::new(row.get::<_, String>(1)?),
        cycle_id: CycleId::from_uuid(parse_uuid(2, &cycle_id)?),
        attempt_number: row.get(3)?,
        cycle_started_at: from_millis(4, row.get(4)?)?,
        started_at: from_millis(5, row.get(5)?)?,
        finished_at: from_millis_opt(6, row.get(6)?)?,
        normalized_payload: payload.as_deref().map(|raw| from_json(8, raw)).transpose()?,
        error_code: row.get(9)?,
        error_detail: row.get(10)?,
        retry_at: from_millis_opt(11, row.get(11)?)?,
    })
}

fn parse_uuid(column: usize, raw: &str) -> rusqlite::Result<Uuid> {
    Uuid::parse_str(raw).map_err(|err| {
        let kind = rusqlite::types::Type::Text;
        rusqlite::Error::FromSqlConversionFailure(column, kind, Box::new(err))
    })
}

fn parse_outcome(id: &str, raw: &str) -> AttemptOutcome {
    match raw.parse::<AttemptOutcome>() {
        Ok(outcome) => outcome,
        Err(err) => {
            warn!(
                attempt_id = %id,
                raw_outcome = %raw,
                error = %err,
                "invalid attempt outcome in database - treating as fatal failure"
            );
            AttemptOutcome::FatalFailure
        }
    }
}
