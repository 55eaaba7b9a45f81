//! In-memory port implementations

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde_json::{json, Value};
use synclane_core::{
    ClientDirectory, ExternalGateway, GatewayFailure, GatewayOutcome, GatewayRequest,
    GatewayResponse, LeaseStore, RetryScheduler, SyncEventSink, SyncStateStore,
};
use synclane_domain::{
    Client, ClientId, ClientStatus, Result, RetryTicket, SyncAttempt, SyncCycleLock, SyncEvent,
    SyncLaneError,
};
use tokio::sync::Notify;
use uuid::Uuid;

#[derive(Default)]
struct StoreState {
    clients: HashMap<ClientId, Client>,
    attempts: Vec<SyncAttempt>,
    leases: HashMap<ClientId, SyncCycleLock>,
    failing_writes: u32,
    rejected_status: Option<ClientStatus>,
    failing_lease_lookups: bool,
}

impl StoreState {
    fn write_attempt(&mut self, attempt: &SyncAttempt) -> Result<()> {
        if self.failing_writes > 0 {
            self.failing_writes -= 1;
            return Err(SyncLaneError::Database("database is locked".into()));
        }

        if let Some(existing) = self.attempts.iter().find(|a| a.id == attempt.id) {
            if !existing.is_pending() {
                return Err(SyncLaneError::Conflict(format!(
                    "attempt {} already completed",
                    attempt.id
                )));
            }
            return Ok(());
        }

        let other_pending =
            self.attempts.iter().any(|a| a.client_id == attempt.client_id && a.is_pending());
        if attempt.is_pending() && other_pending {
            return Err(SyncLaneError::Conflict("client already has a pending attempt".into()));
        }
        Ok(())
    }

    fn apply_attempt(&mut self, attempt: &SyncAttempt) {
        match self.attempts.iter_mut().find(|a| a.id == attempt.id) {
            Some(existing) => *existing = attempt.clone(),
            None => self.attempts.push(attempt.clone()),
        }
    }

    fn write_status(&mut self, client_id: &ClientId, status: ClientStatus) -> Result<()> {
        if self.rejected_status == Some(status) {
            return Err(SyncLaneError::Database(format!("status {status} rejected")));
        }
        let client = self
            .clients
            .get_mut(client_id)
            .ok_or_else(|| SyncLaneError::NotFound(client_id.to_string()))?;
        client.status = status;
        Ok(())
    }
}

/// Client directory, sync state and leases behind one mutex.
#[derive(Default)]
pub struct InMemoryStore {
    state: Mutex<StoreState>,
}

impl InMemoryStore {
    pub fn insert_client(&self, client: Client) {
        self.state.lock().clients.insert(client.id.clone(), client);
    }

    pub fn set_active(&self, client_id: &ClientId, active: bool) {
        if let Some(client) = self.state.lock().clients.get_mut(client_id) {
            client.is_active = active;
        }
    }

    pub fn client_status(&self, client_id: &ClientId) -> Option<ClientStatus> {
        self.state.lock().clients.get(client_id).map(|client| client.status)
    }

    /// Attempts for the client, oldest first.
    pub fn attempts(&self, client_id: &ClientId) -> Vec<SyncAttempt> {
        self.state.lock().attempts.iter().filter(|a| &a.client_id == client_id).cloned().collect()
    }

    pub fn pending_count(&self, client_id: &ClientId) -> usize {
        self.attempts(client_id).iter().filter(|a| a.is_pending()).count()
    }

    pub fn seed_attempt(&self, attempt: SyncAttempt) {
        self.state.lock().attempts.push(attempt);
    }

    pub fn lease(&self, client_id: &ClientId) -> Option<SyncCycleLock> {
        self.state.lock().leases.get(client_id).cloned()
    }

    /// Make the next `count` attempt writes fail with a database error.
    pub fn fail_next_writes(&self, count: u32) {
        self.state.lock().failing_writes = count;
    }

    /// Make every write of `status` fail with a database error.
    pub fn reject_status(&self, status: Option<ClientStatus>) {
        self.state.lock().rejected_status = status;
    }

    pub fn fail_lease_lookups(&self, failing: bool) {
        self.state.lock().failing_lease_lookups = failing;
    }
}

#[async_trait]
impl ClientDirectory for InMemoryStore {
    async fn get_client(&self, client_id: &ClientId) -> Result<Option<Client>> {
        Ok(self.state.lock().clients.get(client_id).cloned())
    }
}

#[async_trait]
impl SyncStateStore for InMemoryStore {
    async fn upsert_attempt(&self, attempt: &SyncAttempt) -> Result<()> {
        let mut state = self.state.lock();
        state.write_attempt(attempt)?;
        state.apply_attempt(attempt);
        Ok(())
    }

    async fn record_attempt(&self, attempt: &SyncAttempt, status: ClientStatus) -> Result<()> {
        let mut state = self.state.lock();
        state.write_attempt(attempt)?;
        state.write_status(&attempt.client_id, status)?;
        state.apply_attempt(attempt);
        Ok(())
    }

    async fn get_latest_attempt(&self, client_id: &ClientId) -> Result<Option<SyncAttempt>> {
        Ok(self.attempts(client_id).into_iter().last())
    }

    async fn get_history(&self, client_id: &ClientId, limit: usize) -> Result<Vec<SyncAttempt>> {
        Ok(self.attempts(client_id).into_iter().rev().take(limit).collect())
    }

    async fn update_client_status(&self, client_id: &ClientId, status: ClientStatus) -> Result<()> {
        self.state.lock().write_status(client_id, status)
    }

    async fn list_awaiting_retry(&self) -> Result<Vec<SyncAttempt>> {
        let state = self.state.lock();
        let mut latest: HashMap<&ClientId, &SyncAttempt> = HashMap::new();
        for attempt in &state.attempts {
            latest.insert(&attempt.client_id, attempt);
        }
        Ok(latest.into_values().filter(|a| a.awaits_retry()).cloned().collect())
    }
}

#[async_trait]
impl LeaseStore for InMemoryStore {
    async fn try_acquire(
        &self,
        client_id: &ClientId,
        owner: Uuid,
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<Option<SyncCycleLock>> {
        let mut state = self.state.lock();
        if state.leases.get(client_id).is_some_and(|lock| !lock.is_expired(now)) {
            return Ok(None);
        }
        let lock =
            SyncCycleLock { client_id: client_id.clone(), owner, acquired_at: now, expires_at };
        state.leases.insert(client_id.clone(), lock.clone());
        Ok(Some(lock))
    }

    async fn release(&self, client_id: &ClientId, owner: Uuid) -> Result<()> {
        let mut state = self.state.lock();
        if state.leases.get(client_id).is_some_and(|lock| lock.owner == owner) {
            state.leases.remove(client_id);
        }
        Ok(())
    }

    async fn get_active(
        &self,
        client_id: &ClientId,
        now: DateTime<Utc>,
    ) -> Result<Option<SyncCycleLock>> {
        let state = self.state.lock();
        if state.failing_lease_lookups {
            return Err(SyncLaneError::Database("lease table unavailable".into()));
        }
        Ok(state.leases.get(client_id).filter(|lock| !lock.is_expired(now)).cloned())
    }
}

/// What a scripted call does.
pub enum Step {
    Respond(GatewayOutcome),
    /// Block until [`ScriptedGateway::open_gate`] is called, then respond.
    Gated(GatewayOutcome),
    Sleep(Duration),
    Panic,
}

/// Gateway replaying a fixed script. Once the script runs dry every call
/// succeeds with a two-element list.
#[derive(Default)]
pub struct ScriptedGateway {
    script: Mutex<VecDeque<Step>>,
    gate: Notify,
    calls: AtomicUsize,
    requests: Mutex<Vec<GatewayRequest>>,
}

impl ScriptedGateway {
    pub fn new(steps: impl IntoIterator<Item = Step>) -> Self {
        Self { script: Mutex::new(steps.into_iter().collect()), ..Self::default() }
    }

    pub fn open_gate(&self) {
        self.gate.notify_one();
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<GatewayRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl ExternalGateway for ScriptedGateway {
    async fn call(&self, request: &GatewayRequest) -> GatewayOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().push(request.clone());
        let step = self.script.lock().pop_front();
        match step {
            None => ok(json!([{"id": 1}, {"id": 2}])),
            Some(Step::Respond(outcome)) => outcome,
            Some(Step::Gated(outcome)) => {
                self.gate.notified().await;
                outcome
            }
            Some(Step::Sleep(duration)) => {
                tokio::time::sleep(duration).await;
                ok(json!([]))
            }
            Some(Step::Panic) => panic!("scripted gateway panic"),
        }
    }
}

pub fn ok(body: Value) -> GatewayOutcome {
    GatewayOutcome::Success(GatewayResponse {
        status: 200,
        url: "https://upstream.test/posts".into(),
        method: "GET".into(),
        body,
    })
}

pub fn recoverable(code: &str) -> GatewayOutcome {
    GatewayOutcome::Recoverable(GatewayFailure::new(code, "upstream trouble"))
}

pub fn fatal(code: &str) -> GatewayOutcome {
    GatewayOutcome::Fatal(GatewayFailure::new(code, "request rejected"))
}

#[derive(Default)]
pub struct RecordingScheduler {
    tickets: Mutex<Vec<RetryTicket>>,
    failing: AtomicBool,
}

impl RecordingScheduler {
    pub fn tickets(&self) -> Vec<RetryTicket> {
        self.tickets.lock().clone()
    }

    pub fn take(&self) -> Vec<RetryTicket> {
        std::mem::take(&mut *self.tickets.lock())
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

impl RetryScheduler for RecordingScheduler {
    fn schedule(&self, ticket: RetryTicket) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(SyncLaneError::Unavailable("retry queue closed".into()));
        }
        self.tickets.lock().push(ticket);
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<SyncEvent>>,
}

impl RecordingSink {
    pub fn events(&self) -> Vec<SyncEvent> {
        self.events.lock().clone()
    }
}

impl SyncEventSink for RecordingSink {
    fn emit(&self, event: &SyncEvent) {
        self.events.lock().push(event.clone());
    }
}
