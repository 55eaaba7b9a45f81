use std::sync::Arc;

use chrono::Utc;
use synclane_core::SyncEngine;
use synclane_domain::{
    Client, ClientId, DatabaseConfig, EngineConfig, GatewayConfig, IntegrationConfig, RetryConfig,
};
use synclane_infra::database::{
    DbManager, SqliteClientRepository, SqliteLeaseRepository, SqliteSyncStateRepository,
};
use synclane_infra::{retry_queue, HttpGateway, RetryInbox};
use tempfile::TempDir;

/// Full engine stack over a temporary SQLite file and the real HTTP gateway.
pub struct TestStack {
    pub db: Arc<DbManager>,
    pub clients: Arc<SqliteClientRepository>,
    pub state: Arc<SqliteSyncStateRepository>,
    pub leases: Arc<SqliteLeaseRepository>,
    pub engine: Arc<SyncEngine>,
    pub inbox: RetryInbox,
    _temp_dir: TempDir,
}

impl TestStack {
    pub fn new() -> Self {
        Self::with_retry(fast_retry())
    }

    pub fn with_retry(retry: RetryConfig) -> Self {
        Self::build(retry, |engine| engine)
    }

    /// Build the stack, letting the caller adjust the engine before it is
    /// shared.
    pub fn build(retry: RetryConfig, customize: impl FnOnce(SyncEngine) -> SyncEngine) -> Self {
        let temp_dir = TempDir::new().expect("temp dir should be created");
        let db_config = DatabaseConfig {
            path: temp_dir.path().join("synclane.db").to_string_lossy().into_owned(),
            ..DatabaseConfig::default()
        };
        let db = Arc::new(DbManager::open(&db_config).expect("database should open"));

        let clients = Arc::new(SqliteClientRepository::new(Arc::clone(&db)));
        let state = Arc::new(SqliteSyncStateRepository::new(Arc::clone(&db)));
        let leases = Arc::new(SqliteLeaseRepository::new(Arc::clone(&db)));
        let gateway = Arc::new(HttpGateway::new(&GatewayConfig::default()).expect("gateway"));
        let (queue, inbox) = retry_queue();

        let engine = SyncEngine::new(
            clients.clone(),
            state.clone(),
            leases.clone(),
            gateway,
            Arc::new(queue),
        )
        .with_engine_config(EngineConfig { lease_duration_secs: 5, ..EngineConfig::default() })
        .with_retry_config(&retry);
        let engine = customize(engine);

        Self {
            db,
            clients,
            state,
            leases,
            engine: Arc::new(engine),
            inbox,
            _temp_dir: temp_dir,
        }
    }

    /// Register an active client pointing at `base_url`.
    pub async fn register(&self, id: &str, base_url: &str) -> ClientId {
        self.register_with(id, IntegrationConfig::new(base_url)).await
    }

    pub async fn register_with(&self, id: &str, integration: IntegrationConfig) -> ClientId {
        let client_id = ClientId::new(id);
        let client = Client::new(client_id.clone(), id, integration, Utc::now());
        self.clients.register(&client).await.expect("client should register");
        client_id
    }
}

/// Millisecond-scale backoff so worker tests finish quickly.
pub fn fast_retry() -> RetryConfig {
    RetryConfig {
        base_delay_ms: 50,
        multiplier: 2.0,
        max_delay_ms: 400,
        max_attempts: 4,
        max_elapsed_secs: 60,
    }
}
