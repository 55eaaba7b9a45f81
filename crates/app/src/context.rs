//! Application context - dependency injection container

use std::sync::Arc;

use synclane_core::SyncEngine;
use synclane_domain::{Config, Result};
use synclane_infra::scheduling::SchedulerError;
use synclane_infra::{
    retry_queue, DbManager, EnvCredentialResolver, HttpGateway, RetryWorker, RetryWorkerConfig,
    SqliteClientRepository, SqliteLeaseRepository, SqliteSyncStateRepository,
};
use tracing::info;

/// Application context - holds all services and dependencies
pub struct AppContext {
    pub config: Config,
    pub db: Arc<DbManager>,
    pub clients: Arc<SqliteClientRepository>,
    pub state: Arc<SqliteSyncStateRepository>,
    pub engine: Arc<SyncEngine>,
    worker: RetryWorker,
}

impl AppContext {
    /// Open the database and wire the engine, gateway and retry worker.
    ///
    /// The retry worker is created stopped; call [`AppContext::start_worker`]
    /// in processes that should execute scheduled retries.
    pub fn new(config: Config) -> Result<Self> {
        let db = Arc::new(DbManager::open(&config.database)?);

        let clients = Arc::new(SqliteClientRepository::new(Arc::clone(&db)));
        let state = Arc::new(SqliteSyncStateRepository::new(Arc::clone(&db)));
        let leases = Arc::new(SqliteLeaseRepository::new(Arc::clone(&db)));
        let gateway = Arc::new(HttpGateway::new(&config.gateway)?);
        let (queue, inbox) = retry_queue();

        let engine = Arc::new(
            SyncEngine::new(clients.clone(), state.clone(), leases, gateway, Arc::new(queue))
                .with_engine_config(config.engine.clone())
                .with_retry_config(&config.retry)
                .with_credentials(Arc::new(EnvCredentialResolver::new())),
        );

        let worker_config = RetryWorkerConfig {
            rescan_interval: config.engine.retry_rescan(),
            ..RetryWorkerConfig::for_lease(engine.lease_duration())
        };
        let worker = RetryWorker::new(Arc::clone(&engine), state.clone(), inbox, worker_config);

        info!(db_path = %db.path().display(), "application context ready");
        Ok(Self { config, db, clients, state, engine, worker })
    }

    /// Start executing scheduled retries, including ones scheduled by other
    /// processes sharing the database.
    pub async fn start_worker(&mut self) -> std::result::Result<(), SchedulerError> {
        self.worker.start().await
    }

    /// Stop the retry worker, waiting for in-flight resumes.
    pub async fn stop_worker(&mut self) -> std::result::Result<(), SchedulerError> {
        self.worker.stop().await
    }

    /// Whether the retry worker is currently running.
    pub fn worker_running(&self) -> bool {
        self.worker.is_running()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::Utc;
    use serde_json::json;
    use synclane_domain::{Client, ClientId, ClientStatus, IntegrationConfig, StatusOutcome};
    use tempfile::TempDir;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn test_config(dir: &TempDir) -> Config {
        let mut config = Config::default();
        config.database.path = dir.path().join("app.db").to_string_lossy().into_owned();
        config
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn context_wires_a_working_engine() {
        let dir = TempDir::new().expect("temp dir");
        let ctx = AppContext::new(test_config(&dir)).expect("context builds");

        ctx.db.health_check().expect("database healthy");
        let status = ctx.engine.get_status(&ClientId::new("nobody")).await.expect("status");
        assert_eq!(status, StatusOutcome::ClientNotFound);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn worker_lifecycle_is_exposed() {
        let dir = TempDir::new().expect("temp dir");
        let mut ctx = AppContext::new(test_config(&dir)).expect("context builds");

        assert!(!ctx.worker_running());
        ctx.start_worker().await.expect("worker starts");
        assert!(ctx.worker_running());
        ctx.stop_worker().await.expect("worker stops");
        assert!(!ctx.worker_running());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn worker_finishes_cycles_triggered_by_another_process() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"id": 1}])))
            .mount(&server)
            .await;

        let dir = TempDir::new().expect("temp dir");
        let mut config = test_config(&dir);
        config.retry.base_delay_ms = 50;
        config.retry.max_delay_ms = 200;
        config.engine.retry_rescan_ms = 100;

        let mut worker_ctx = AppContext::new(config.clone()).expect("worker context");
        let mut trigger_ctx = AppContext::new(config).expect("trigger context");
        worker_ctx.start_worker().await.expect("worker starts");

        let client_id = ClientId::new("acme");
        let client = Client::new(
            client_id.clone(),
            "Acme",
            IntegrationConfig::new(server.uri()),
            Utc::now(),
        );
        trigger_ctx.clients.register(&client).await.expect("registered");
        crate::commands::trigger(&mut trigger_ctx, &client_id, false).await.expect("trigger");
        drop(trigger_ctx);

        let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
        let view = loop {
            if let StatusOutcome::Found(view) =
                worker_ctx.engine.get_status(&client_id).await.expect("status")
            {
                if view.status == ClientStatus::Synced {
                    break view;
                }
            }
            assert!(tokio::time::Instant::now() < deadline, "retry was never picked up");
            tokio::time::sleep(Duration::from_millis(25)).await;
        };
        worker_ctx.stop_worker().await.expect("worker stops");

        assert_eq!(view.history.len(), 2);
        assert_eq!(view.history[0].attempt_number, 2);
    }
}
