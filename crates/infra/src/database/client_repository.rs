//! SQLite-backed client registry.

use std::sync::Arc;

use async_trait::async_trait;
use rusqlite::{params, OptionalExtension, Row};
use synclane_core::ClientDirectory;
use synclane_domain::{Client, ClientId, ClientStatus, Result, SyncLaneError};
use tracing::{info, warn};

use super::manager::{map_sql_error, DbManager};
use super::repository::{
    bool_to_int, from_json, from_millis, int_to_bool, to_json, to_millis, with_connection,
};

/// Client management backed by the `clients` table.
pub struct SqliteClientRepository {
    db: Arc<DbManager>,
}

impl SqliteClientRepository {
    /// Repository over the shared connection pool.
    pub fn new(db: Arc<DbManager>) -> Self {
        Self { db }
    }

    /// Store a new client. Fails with `Conflict` when the id is taken.
    pub async fn register(&self, client: &Client) -> Result<()> {
        let client = client.clone();
        let integration = to_json(&client.integration)?;

        with_connection(&self.db, move |conn| {
            conn.execute(
                CLIENT_INSERT_SQL,
                params![
                    client.id.as_str(),
                    client.name,
                    client.description,
                    integration,
                    client.status.to_string(),
                    bool_to_int(client.is_active),
                    to_millis(client.created_at),
                    to_millis(client.updated_at),
                ],
            )
            .map_err(|err| match map_sql_error(err) {
                SyncLaneError::Conflict(_) => {
                    SyncLaneError::Conflict(format!("client {} already exists", client.id))
                }
                other => other,
            })?;
            info!(client_id = %client.id, "client registered");
            Ok(())
        })
        .await
    }

    /// Look up one client by id.
    pub async fn get(&self, client_id: &ClientId) -> Result<Option<Client>> {
        let client_id = client_id.clone();
        with_connection(&self.db, move |conn| {
            conn.query_row(CLIENT_SELECT_BY_ID_SQL, params![client_id.as_str()], map_client_row)
                .optional()
                .map_err(map_sql_error)
        })
        .await
    }

    /// All clients, oldest registration first.
    pub async fn list(&self) -> Result<Vec<Client>> {
        with_connection(&self.db, move |conn| {
            let mut stmt = conn.prepare(CLIENT_SELECT_ALL_SQL).map_err(map_sql_error)?;
            let rows = stmt.query_map([], map_client_row).map_err(map_sql_error)?;
            rows.collect::<rusqlite::Result<Vec<_>>>().map_err(map_sql_error)
        })
        .await
    }

    /// Activate or deactivate a client. Deactivated clients reject new
    /// triggers.
    pub async fn set_active(&self, client_id: &ClientId, active: bool) -> Result<()> {
        let client_id = client_id.clone();
        let now = chrono::Utc::now();
        with_connection(&self.db, move |conn| {
            let updated = conn
                .execute(
                    "UPDATE clients SET is_active = ?1, updated_at = ?2 WHERE id = ?3",
                    params![bool_to_int(active), to_millis(now), client_id.as_str()],
                )
                .map_err(map_sql_error)?;
            if updated == 0 {
                return Err(SyncLaneError::NotFound(format!("client {client_id}")));
            }
            info!(client_id = %client_id, active, "client activation changed");
            Ok(())
        })
        .await
    }
}

#[async_trait]
impl ClientDirectory for SqliteClientRepository {
    async fn get_client(&self, client_id: &ClientId) -> Result<Option<Client>> {
        self.get(client_id).await
    }
}

const CLIENT_INSERT_SQL: &str = "INSERT INTO clients (
        id, name, description, integration, status, is_active, created_at, updated_at
    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)";

const CLIENT_SELECT_BY_ID_SQL: &str = "SELECT
        id, name, description, integration, status, is_active, created_at, updated_at
    FROM clients WHERE id = ?1";

const CLIENT_SELECT_ALL_SQL: &str = "SELECT
        id, name, description, integration, status, is_active, created_at, updated_at
    FROM clients ORDER BY created_at ASC, id ASC";

pub(crate) fn map_client_row(row: &Row<'_>) -> rusqlite::Result<Client> {
    let id: String = row.get(0)?;
    let integration: String = row.get(3)?;
    let status: String = row.get(4)?;

    Ok(Client {
        status: parse_status(&id, &status),
        id: ClientId::new(id),
        name: row.get(1)?,
        description: row.get(2)?,
        integration: from_json(3, &integration)?,
        is_active: int_to_bool(row.get(5)?),
        created_at: from_millis(6, row.get(6)?)?,
        updated_at: from_millis(7, row.get(7)?)?,
    })
}

fn parse_status(id: &str, raw: &str) -> ClientStatus {
    match raw.parse::<ClientStatus>() {
        Ok(status) => status,
        Err(err) => {
            warn!(
                client_id = %id,
                raw_status = %raw,
                error = %err,
                "invalid client status in database - defaulting to registered"
            );
            ClientStatus::Registered
        }
    }
}
