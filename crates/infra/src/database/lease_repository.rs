//! SQLite-backed sync-cycle leases.
//!
//! Acquisition is a single upsert that only overwrites an expired row, so two
//! processes sharing the database file can never both hold a client.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};
use synclane_core::LeaseStore;
use synclane_domain::{ClientId, Result, SyncCycleLock};
use uuid::Uuid;

use super::manager::{map_sql_error, DbManager};
use super::repository::{from_millis, to_millis, with_connection};

pub struct SqliteLeaseRepository {
    db: Arc<DbManager>,
}

impl SqliteLeaseRepository {
    /// Repository over the shared connection pool.
    pub fn new(db: Arc<DbManager>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl LeaseStore for SqliteLeaseRepository {
    async fn try_acquire(
        &self,
        client_id: &ClientId,
        owner: Uuid,
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<Option<SyncCycleLock>> {
        let client_id = client_id.clone();
        with_connection(&self.db, move |conn| {
            let changed = conn
                .execute(
                    LEASE_ACQUIRE_SQL,
                    params![
                        client_id.as_str(),
                        owner.to_string(),
                        to_millis(now),
                        to_millis(expires_at)
                    ],
                )
                .map_err(map_sql_error)?;

            Ok((changed == 1).then(|| SyncCycleLock {
                client_id,
                owner,
                acquired_at: now,
                expires_at,
            }))
        })
        .await
    }

    async fn release(&self, client_id: &ClientId, owner: Uuid) -> Result<()> {
        let client_id = client_id.clone();
        with_connection(&self.db, move |conn| {
            conn.execute(
                "DELETE FROM sync_locks WHERE client_id = ?1 AND owner = ?2",
                params![client_id.as_str(), owner.to_string()],
            )
            .map_err(map_sql_error)?;
            Ok(())
        })
        .await
    }

    async fn get_active(
        &self,
        client_id: &ClientId,
        now: DateTime<Utc>,
    ) -> Result<Option<SyncCycleLock>> {
        let client_id = client_id.clone();
        with_connection(&self.db, move |conn| {
            conn.query_row(
                LEASE_ACTIVE_SQL,
                params![client_id.as_str(), to_millis(now)],
                |row| {
                    let owner: String = row.get(0)?;
                    Ok(SyncCycleLock {
                        client_id: client_id.clone(),
                        owner: Uuid::parse_str(&owner).map_err(|err| {
                            rusqlite::Error::FromSqlConversionFailure(
                                0,
                                rusqlite::types::Type::Text,
                                Box::new(err),
                            )
                        })?,
                        acquired_at: from_millis(1, row.get(1)?)?,
                        expires_at: from_millis(2, row.get(2)?)?,
                    })
                },
            )
            .optional()
            .map_err(map_sql_error)
        })
        .await
    }
}

/// Insert, or take over a row whose lease already expired.
const LEASE_ACQUIRE_SQL: &str = "INSERT INTO sync_locks (client_id, owner, acquired_at, expires_at)
    VALUES (?1, ?2, ?3, ?4)
    ON CONFLICT(client_id) DO UPDATE SET
        owner = excluded.owner,
        acquired_at = excluded.acquired_at,
        expires_at = excluded.expires_at
    WHERE sync_locks.expires_at <= excluded.acquired_at";

const LEASE_ACTIVE_SQL: &str = "SELECT owner, acquired_at, expires_at
    FROM sync_locks WHERE client_id = ?1 AND expires_at > ?2";
