//! Port interfaces for sync operations

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use synclane_domain::{
    Client, ClientId, ClientStatus, Credentials, IntegrationConfig, Result, RetryTicket,
    SyncAttempt, SyncCycleLock, SyncEvent,
};
use uuid::Uuid;

/// Read access to registered clients (owned by client management).
#[async_trait]
pub trait ClientDirectory: Send + Sync {
    /// Fetch a client, `None` when it does not exist.
    async fn get_client(&self, client_id: &ClientId) -> Result<Option<Client>>;
}

/// Durable per-client sync state.
///
/// All writes for one client are serialized by the idempotency guard, so
/// implementations only need atomic single-row semantics.
#[async_trait]
pub trait SyncStateStore: Send + Sync {
    /// Insert a new attempt, or complete an existing one.
    ///
    /// Completing is a compare-and-set: it only applies while the stored row
    /// is still `pending`, otherwise `SyncLaneError::Conflict` is returned and
    /// nothing is written.
    async fn upsert_attempt(&self, attempt: &SyncAttempt) -> Result<()>;

    /// [`SyncStateStore::upsert_attempt`] and
    /// [`SyncStateStore::update_client_status`] as one atomic write: either
    /// both apply or neither does.
    async fn record_attempt(&self, attempt: &SyncAttempt, status: ClientStatus) -> Result<()>;

    /// Most recently started attempt for the client.
    async fn get_latest_attempt(&self, client_id: &ClientId) -> Result<Option<SyncAttempt>>;

    /// Snapshot of up to `limit` attempts, most recent first.
    async fn get_history(&self, client_id: &ClientId, limit: usize) -> Result<Vec<SyncAttempt>>;

    /// Set the client's status; `NotFound` when the client does not exist.
    async fn update_client_status(&self, client_id: &ClientId, status: ClientStatus)
        -> Result<()>;

    /// Latest attempt of every client whose cycle is waiting on a scheduled
    /// retry. Used to rebuild the retry queue after a restart.
    async fn list_awaiting_retry(&self) -> Result<Vec<SyncAttempt>>;
}

/// Storage for sync-cycle leases.
#[async_trait]
pub trait LeaseStore: Send + Sync {
    /// Atomically create a lease for `client_id` unless an unexpired one
    /// exists. Returns `None` when another holder owns the client.
    async fn try_acquire(
        &self,
        client_id: &ClientId,
        owner: Uuid,
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<Option<SyncCycleLock>>;

    /// Delete the lease if `owner` still holds it. Idempotent.
    async fn release(&self, client_id: &ClientId, owner: Uuid) -> Result<()>;

    /// The unexpired lease for the client, if any.
    async fn get_active(
        &self,
        client_id: &ClientId,
        now: DateTime<Utc>,
    ) -> Result<Option<SyncCycleLock>>;
}

/// Everything the gateway needs for one call.
#[derive(Debug, Clone)]
pub struct GatewayRequest {
    pub client_id: ClientId,
    pub config: IntegrationConfig,
    pub credentials: Credentials,
}

/// A 2xx response whose body parsed as JSON.
#[derive(Debug, Clone, PartialEq)]
pub struct GatewayResponse {
    pub status: u16,
    pub url: String,
    pub method: String,
    pub body: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayFailure {
    /// Machine-readable code stored on the attempt, e.g. `EXTERNAL_HTTP_503`.
    pub code: String,
    pub detail: String,
    /// Upstream `Retry-After` hint.
    pub retry_after: Option<Duration>,
}

impl GatewayFailure {
    /// Failure without a retry hint.
    pub fn new(code: impl Into<String>, detail: impl Into<String>) -> Self {
        Self { code: code.into(), detail: detail.into(), retry_after: None }
    }

    /// Attach the upstream's `Retry-After` hint.
    pub fn with_retry_after(mut self, retry_after: Option<Duration>) -> Self {
        self.retry_after = retry_after;
        self
    }
}

/// Classified result of one external call.
#[derive(Debug, Clone, PartialEq)]
pub enum GatewayOutcome {
    Success(GatewayResponse),
    /// Transient: timeout, connection error, 5xx, 429.
    Recoverable(GatewayFailure),
    /// Retrying the same request is pointless: other 4xx, malformed body.
    Fatal(GatewayFailure),
}

/// Performs one bounded call to a client's external system.
///
/// Implementations classify every transport and HTTP result; they never
/// retry on their own.
#[async_trait]
pub trait ExternalGateway: Send + Sync {
    async fn call(&self, request: &GatewayRequest) -> GatewayOutcome;
}

/// Turns a client's `credentials_ref` into secrets.
#[async_trait]
pub trait CredentialResolver: Send + Sync {
    async fn resolve(&self, reference: &str) -> Result<Credentials>;
}

/// Deferred re-trigger of a cycle. Enqueueing must not block.
pub trait RetryScheduler: Send + Sync {
    fn schedule(&self, ticket: RetryTicket) -> Result<()>;
}

/// Consumer of state-transition events.
pub trait SyncEventSink: Send + Sync {
    fn emit(&self, event: &SyncEvent);
}
