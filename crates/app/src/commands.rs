//! CLI command handlers.
//!
//! Each handler returns a serializable value; `main` prints it as JSON.

use std::time::Duration;

use anyhow::Context;
use chrono::Utc;
use serde::Serialize;
use synclane_domain::{
    Client, ClientId, ClientStatus, IntegrationConfig, StatusOutcome, SyncStatusView,
    TriggerOutcome,
};
use tracing::{info, warn};

use crate::context::AppContext;

const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Arguments of `synclane register`.
#[derive(Debug, Clone)]
pub struct RegisterArgs {
    pub id: Option<String>,
    pub name: String,
    pub base_url: String,
    pub endpoint: Option<String>,
    pub method: Option<String>,
    pub timeout_secs: Option<u64>,
    pub credentials_ref: Option<String>,
    pub params: Vec<(String, String)>,
}

impl RegisterArgs {
    fn integration(&self) -> IntegrationConfig {
        let mut integration = IntegrationConfig::new(self.base_url.clone());
        if let Some(endpoint) = &self.endpoint {
            integration = integration.with_endpoint(endpoint.clone());
        }
        if let Some(method) = &self.method {
            integration = integration.with_method(method.to_ascii_uppercase());
        }
        if let Some(secs) = self.timeout_secs {
            integration = integration.with_timeout(Duration::from_secs(secs));
        }
        if let Some(reference) = &self.credentials_ref {
            integration = integration.with_credentials_ref(reference.clone());
        }
        for (key, value) in &self.params {
            integration = integration.with_param(key.clone(), value.clone());
        }
        integration
    }
}

/// Register a new client; the id is generated when not given.
pub async fn register(ctx: &AppContext, args: RegisterArgs) -> anyhow::Result<Client> {
    let id = args.id.clone().map(ClientId::new).unwrap_or_else(ClientId::generate);
    let client = Client::new(id, args.name.clone(), args.integration(), Utc::now());
    ctx.clients.register(&client).await?;
    Ok(client)
}

/// Every registered client, oldest first.
pub async fn list(ctx: &AppContext) -> anyhow::Result<Vec<Client>> {
    Ok(ctx.clients.list().await?)
}

/// Activate or deactivate a client and return its updated record. Scheduled
/// retries of an in-progress cycle still run after deactivation.
pub async fn set_active(
    ctx: &AppContext,
    client_id: &ClientId,
    active: bool,
) -> anyhow::Result<Client> {
    ctx.clients
        .set_active(client_id, active)
        .await
        .with_context(|| format!("failed to update client {client_id}"))?;
    ctx.clients
        .get(client_id)
        .await?
        .with_context(|| format!("client {client_id} disappeared"))
}

#[derive(Debug, Serialize)]
pub struct TriggerResult {
    pub outcome: TriggerOutcome,
    /// Final state when `--wait` was given and the cycle started.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_status: Option<SyncStatusView>,
}

/// Trigger a cycle. With `wait`, keep the retry worker alive until the cycle
/// reaches `synced` or `failed`.
pub async fn trigger(
    ctx: &mut AppContext,
    client_id: &ClientId,
    wait: bool,
) -> anyhow::Result<TriggerResult> {
    if wait {
        ctx.start_worker().await?;
    }

    let outcome = ctx.engine.trigger_sync(client_id).await;
    let result = match outcome {
        Ok(outcome) => {
            let final_status = match (&outcome, wait) {
                (TriggerOutcome::Started(_), true) => {
                    Some(wait_for_terminal(ctx, client_id).await?)
                }
                _ => None,
            };
            Ok(TriggerResult { outcome, final_status })
        }
        Err(err) => Err(anyhow::Error::new(err).context("trigger failed")),
    };

    if ctx.worker_running() {
        if let Err(err) = ctx.stop_worker().await {
            warn!(error = %err, "retry worker did not stop cleanly");
        }
    }
    result
}

async fn wait_for_terminal(
    ctx: &AppContext,
    client_id: &ClientId,
) -> anyhow::Result<SyncStatusView> {
    loop {
        let view = require_status(ctx, client_id).await?;
        if matches!(view.status, ClientStatus::Synced | ClientStatus::Failed) && !view.running {
            return Ok(view);
        }
        tokio::select! {
            _ = tokio::time::sleep(WAIT_POLL_INTERVAL) => {}
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted while waiting for sync cycle");
                return Ok(view);
            }
        }
    }
}

async fn require_status(ctx: &AppContext, client_id: &ClientId) -> anyhow::Result<SyncStatusView> {
    match ctx.engine.get_status(client_id).await? {
        StatusOutcome::Found(view) => Ok(view),
        StatusOutcome::ClientNotFound => anyhow::bail!("client {client_id} not found"),
    }
}

/// Current status, in-flight flag and recent attempts of a client.
pub async fn status(ctx: &AppContext, client_id: &ClientId) -> anyhow::Result<StatusOutcome> {
    Ok(ctx.engine.get_status(client_id).await?)
}

/// Run the retry worker until Ctrl-C.
pub async fn worker(ctx: &mut AppContext) -> anyhow::Result<()> {
    ctx.start_worker().await?;
    info!("retry worker running; press Ctrl-C to stop");

    tokio::signal::ctrl_c().await.context("failed to listen for Ctrl-C")?;

    info!("shutting down retry worker");
    ctx.stop_worker().await?;
    Ok(())
}

#[derive(Debug, Serialize)]
pub struct HealthReport {
    pub database: &'static str,
    pub database_path: String,
}

/// Check that the database answers.
pub fn health(ctx: &AppContext) -> anyhow::Result<HealthReport> {
    ctx.db.health_check().context("database health check failed")?;
    Ok(HealthReport { database: "ok", database_path: ctx.db.path().display().to_string() })
}
