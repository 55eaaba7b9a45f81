//! Sync engine - drives one sync cycle per client
//!
//! A cycle moves through `Acquiring -> Calling -> Classifying` and ends in
//! `Succeeded`, `Failed` or `Retrying`. A retrying cycle is not slept on: the
//! engine hands a [`RetryTicket`] to the [`RetryScheduler`] and returns. When
//! the ticket becomes due, the scheduler calls [`SyncEngine::resume_cycle`],
//! which re-enters `Acquiring` for the next attempt of the same cycle.
//!
//! The lease from the [`IdempotencyGuard`] is released on every exit path
//! once it has been acquired. Gateway panics and overruns are contained and
//! classified as recoverable failures.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use synclane_common::time::{from_chrono_duration, to_chrono_duration, Clock, SystemClock};
use synclane_domain::constants::{
    ERROR_CODE_ABANDONED, ERROR_CODE_CONFIG, ERROR_CODE_MALFORMED, ERROR_CODE_PANIC,
    ERROR_CODE_TIMEOUT, MAX_ERROR_DETAIL_LEN,
};
use synclane_domain::{
    AttemptOutcome, AttemptReport, Client, ClientId, ClientStatus, CycleId, CycleState,
    EngineConfig, FailureKind, LeaseAcquisition, NextStep, Result, ResumeOutcome, RetryConfig,
    RetryTicket, StatusOutcome, SyncAttempt, SyncCycleLock, SyncEvent, SyncLaneError,
    SyncStatusView, TriggerOutcome,
};
use tracing::{debug, error, info, instrument, warn};

use super::events::TracingEventSink;
use super::guard::IdempotencyGuard;
use super::normalize::normalize;
use super::ports::{
    ClientDirectory, CredentialResolver, ExternalGateway, GatewayFailure, GatewayOutcome,
    GatewayRequest, LeaseStore, RetryScheduler, SyncEventSink, SyncStateStore,
};
use super::retry_policy::{NextAction, RetryPolicy};

/// Orchestrates sync cycles against the configured ports.
pub struct SyncEngine {
    clients: Arc<dyn ClientDirectory>,
    store: Arc<dyn SyncStateStore>,
    leases: Arc<dyn LeaseStore>,
    gateway: Arc<dyn ExternalGateway>,
    scheduler: Arc<dyn RetryScheduler>,
    credentials: Option<Arc<dyn CredentialResolver>>,
    events: Arc<dyn SyncEventSink>,
    clock: Arc<dyn Clock>,
    guard: IdempotencyGuard,
    policy: RetryPolicy,
    config: EngineConfig,
}

impl SyncEngine {
    /// Create an engine with default engine/retry settings, the system clock
    /// and the tracing event sink.
    pub fn new(
        clients: Arc<dyn ClientDirectory>,
        store: Arc<dyn SyncStateStore>,
        leases: Arc<dyn LeaseStore>,
        gateway: Arc<dyn ExternalGateway>,
        scheduler: Arc<dyn RetryScheduler>,
    ) -> Self {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let config = EngineConfig::default();
        let guard =
            IdempotencyGuard::new(Arc::clone(&leases), Arc::clone(&clock), config.lease_duration());

        Self {
            clients,
            store,
            leases,
            gateway,
            scheduler,
            credentials: None,
            events: Arc::new(TracingEventSink),
            clock,
            guard,
            policy: RetryPolicy::default(),
            config,
        }
    }

    /// Replace the clock used for leases, attempt timestamps and retry due
    /// times.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self.rebuild_guard();
        self
    }

    /// Apply the `engine` configuration section (lease, grace, persistence
    /// retries, history limit).
    pub fn with_engine_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self.rebuild_guard();
        self
    }

    /// Build the retry policy from the `retry` configuration section.
    pub fn with_retry_config(mut self, config: &RetryConfig) -> Self {
        self.policy = RetryPolicy::from_config(config);
        self
    }

    /// Resolver for clients that carry a `credentials_ref`. Without one such
    /// clients fail with a configuration error.
    pub fn with_credentials(mut self, resolver: Arc<dyn CredentialResolver>) -> Self {
        self.credentials = Some(resolver);
        self
    }

    /// Send transition events to `sink` instead of the tracing sink.
    pub fn with_event_sink(mut self, sink: Arc<dyn SyncEventSink>) -> Self {
        self.events = sink;
        self
    }

    /// Minimum lease length; also how long a due retry may stay unclaimed
    /// before a trigger starts a fresh cycle.
    pub fn lease_duration(&self) -> Duration {
        self.config.lease_duration()
    }

    fn rebuild_guard(&mut self) {
        self.guard = IdempotencyGuard::new(
            Arc::clone(&self.leases),
            Arc::clone(&self.clock),
            self.config.lease_duration(),
        );
    }

    /// Start a new sync cycle for `client_id`.
    ///
    /// Returns `AlreadyRunning` without side effects when another cycle holds
    /// the client, including a cycle that is waiting on a scheduled retry.
    /// Errors only when the state store stays unavailable.
    #[instrument(skip(self, client_id), fields(client_id = %client_id))]
    pub async fn trigger_sync(&self, client_id: &ClientId) -> Result<TriggerOutcome> {
        let Some(client) = self.load_client(client_id).await? else {
            debug!("trigger for unknown client");
            return Ok(TriggerOutcome::ClientNotFound);
        };

        if !client.is_active {
            info!("trigger refused for inactive client");
            return Ok(TriggerOutcome::ClientInactive);
        }

        self.emit_transition(client_id, None, 0, None, 0, CycleState::Acquiring);
        let Some(lock) = self.acquire(&client).await? else {
            return Ok(TriggerOutcome::AlreadyRunning);
        };

        let result = self.start_cycle(&client, &lock).await;
        self.release(&lock).await;
        result
    }

    /// Run the next attempt of a cycle whose backoff elapsed.
    ///
    /// Tickets that no longer match the client's latest attempt are dropped as
    /// `Stale` so a late retry can never overwrite a newer or terminal state.
    #[instrument(
        skip(self, ticket),
        fields(
            client_id = %ticket.client_id,
            cycle_id = %ticket.cycle_id,
            attempt_number = ticket.attempt_number
        )
    )]
    pub async fn resume_cycle(&self, ticket: RetryTicket) -> Result<ResumeOutcome> {
        let Some(client) = self.load_client(&ticket.client_id).await? else {
            return Ok(ResumeOutcome::ClientNotFound);
        };

        self.emit_transition(
            &ticket.client_id,
            Some(ticket.cycle_id),
            ticket.attempt_number,
            None,
            0,
            CycleState::Acquiring,
        );
        let Some(lock) = self.acquire(&client).await? else {
            return Ok(ResumeOutcome::Deferred);
        };

        let result = self.continue_cycle(&client, &ticket, &lock).await;
        self.release(&lock).await;
        result
    }

    /// Best-known sync state. Never waits for an in-flight cycle.
    #[instrument(skip(self, client_id), fields(client_id = %client_id))]
    pub async fn get_status(&self, client_id: &ClientId) -> Result<StatusOutcome> {
        let Some(client) = self.load_client(client_id).await? else {
            return Ok(StatusOutcome::ClientNotFound);
        };

        let store = &self.store;
        let limit = self.config.history_limit.max(1);
        let history = self
            .persist("get_history", client_id, move || store.get_history(client_id, limit))
            .await?;
        let latest_attempt = match history.first() {
            Some(latest) => Some(latest.clone()),
            None => {
                self.persist("get_latest_attempt", client_id, move || {
                    store.get_latest_attempt(client_id)
                })
                .await?
            }
        };

        let running = match self.guard.is_running(client_id).await {
            Ok(running) => running,
            Err(err) => {
                warn!(error = %err, "lease lookup failed; reporting not running");
                false
            }
        };

        Ok(StatusOutcome::Found(SyncStatusView {
            client_id: client.id,
            status: client.status,
            running,
            latest_attempt,
            history,
        }))
    }

    async fn load_client(&self, client_id: &ClientId) -> Result<Option<Client>> {
        let clients = &self.clients;
        self.persist("get_client", client_id, move || clients.get_client(client_id)).await
    }

    /// Lease long enough to cover the hard call deadline.
    async fn acquire(&self, client: &Client) -> Result<Option<SyncCycleLock>> {
        let hold_for = self.call_deadline(client).saturating_add(self.config.call_grace());
        let guard = &self.guard;
        let client_id = &client.id;
        let acquired = self
            .persist("acquire_lease", client_id, move || guard.try_acquire_for(client_id, hold_for))
            .await?;
        match acquired {
            LeaseAcquisition::Acquired(lock) => Ok(Some(lock)),
            LeaseAcquisition::AlreadyRunning => {
                info!(client_id = %client.id, "sync already running");
                Ok(None)
            }
        }
    }

    async fn release(&self, lock: &SyncCycleLock) {
        let guard = &self.guard;
        if let Err(err) =
            self.persist("release_lease", &lock.client_id, move || guard.release(lock)).await
        {
            // The lease expires on its own.
            error!(client_id = %lock.client_id, error = %err, "lease release failed");
        }
    }

    async fn start_cycle(&self, client: &Client, lock: &SyncCycleLock) -> Result<TriggerOutcome> {
        let latest = self.latest_attempt(&client.id).await?;

        if let Some(latest) = latest {
            if latest.is_pending() {
                self.close_orphan(latest).await?;
            } else if latest.awaits_retry() && !self.retry_overdue(&latest) {
                info!(cycle_id = %latest.cycle_id, "cycle waiting on scheduled retry");
                return Ok(TriggerOutcome::AlreadyRunning);
            } else if latest.awaits_retry() {
                warn!(
                    cycle_id = %latest.cycle_id,
                    retry_at = ?latest.retry_at,
                    "scheduled retry overdue; starting a fresh cycle"
                );
            }
        }

        let now = self.clock.now();
        let attempt = SyncAttempt::begin(client.id.clone(), CycleId::new(), 1, now, now);
        info!(cycle_id = %attempt.cycle_id, "sync cycle started");
        let report = self.run_attempt(client, attempt, lock).await?;
        Ok(TriggerOutcome::Started(report))
    }

    async fn continue_cycle(
        &self,
        client: &Client,
        ticket: &RetryTicket,
        lock: &SyncCycleLock,
    ) -> Result<ResumeOutcome> {
        let latest = self.latest_attempt(&client.id).await?;

        let previous = match latest {
            Some(previous)
                if previous.cycle_id == ticket.cycle_id
                    && previous.awaits_retry()
                    && previous.attempt_number.saturating_add(1) == ticket.attempt_number =>
            {
                previous
            }
            _ => {
                info!("retry ticket is stale; dropping");
                return Ok(ResumeOutcome::Stale);
            }
        };

        let attempt = SyncAttempt::begin(
            client.id.clone(),
            previous.cycle_id,
            ticket.attempt_number,
            previous.cycle_started_at,
            self.clock.now(),
        );
        let report = self.run_attempt(client, attempt, lock).await?;
        Ok(ResumeOutcome::Resumed(report))
    }

    async fn latest_attempt(&self, client_id: &ClientId) -> Result<Option<SyncAttempt>> {
        let store = &self.store;
        self.persist("get_latest_attempt", client_id, move || store.get_latest_attempt(client_id))
            .await
    }

    /// Execute one attempt end to end and persist its completion.
    ///
    /// The attempt and the client status are always written together so the
    /// reported status never disagrees with the latest attempt.
    async fn run_attempt(
        &self,
        client: &Client,
        attempt: SyncAttempt,
        lock: &SyncCycleLock,
    ) -> Result<AttemptReport> {
        let client_id = &client.id;
        let store = &self.store;

        {
            let pending = &attempt;
            self.persist("insert_attempt", client_id, move || {
                store.record_attempt(pending, ClientStatus::Syncing)
            })
            .await?;
        }

        self.emit(&attempt, CycleState::Calling);
        let outcome = self.execute_call(client, lock).await;
        self.emit(&attempt, CycleState::Classifying);

        let (completed, next) = self.classify(attempt, outcome);
        let (status, state) = match (&next, completed.outcome.failure_kind()) {
            (NextStep::RetryScheduled { .. }, _) => (ClientStatus::Syncing, CycleState::Retrying),
            (NextStep::Completed, None) => (ClientStatus::Synced, CycleState::Succeeded),
            (NextStep::Completed, Some(_)) => (ClientStatus::Failed, CycleState::Failed),
        };

        let finished = &completed;
        let written = self
            .persist("complete_attempt", client_id, move || store.record_attempt(finished, status))
            .await;
        if let Err(SyncLaneError::Conflict(detail)) = written {
            // Our lease ran out and another holder closed the attempt.
            warn!(
                client_id = %client_id,
                attempt_id = %completed.id,
                detail = %detail,
                "attempt superseded before completion"
            );
            return Err(SyncLaneError::Unavailable(
                "sync attempt was superseded; try again".into(),
            ));
        }
        written?;

        if let Some(ticket) = RetryTicket::following(&completed) {
            if let Err(err) = self.scheduler.schedule(ticket) {
                // Recovered on restart or by the overdue rule in `start_cycle`.
                error!(client_id = %client_id, error = %err, "failed to schedule retry");
            }
        }

        self.emit(&completed, state);
        info!(
            client_id = %client_id,
            cycle_id = %completed.cycle_id,
            attempt_number = completed.attempt_number,
            outcome = %completed.outcome,
            error_code = completed.error_code.as_deref().unwrap_or("-"),
            "sync attempt completed"
        );

        Ok(AttemptReport {
            client_id: completed.client_id.clone(),
            cycle_id: completed.cycle_id,
            attempt_number: completed.attempt_number,
            outcome: completed.outcome,
            client_status: status,
            next,
        })
    }

    /// Build the request and run the gateway under the hard deadline.
    async fn execute_call(&self, client: &Client, lock: &SyncCycleLock) -> GatewayOutcome {
        let credentials = match (&client.integration.credentials_ref, &self.credentials) {
            (None, _) => Default::default(),
            (Some(_), None) => {
                return GatewayOutcome::Fatal(GatewayFailure::new(
                    ERROR_CODE_CONFIG,
                    "client references credentials but no resolver is configured",
                ));
            }
            (Some(reference), Some(resolver)) => match resolver.resolve(reference).await {
                Ok(credentials) => credentials,
                Err(err) if err.is_transient() => {
                    return GatewayOutcome::Recoverable(GatewayFailure::new(
                        ERROR_CODE_CONFIG,
                        format!("credentials unavailable: {err}"),
                    ));
                }
                Err(err) => {
                    return GatewayOutcome::Fatal(GatewayFailure::new(
                        ERROR_CODE_CONFIG,
                        format!("credentials could not be resolved: {err}"),
                    ));
                }
            },
        };

        let request = GatewayRequest {
            client_id: client.id.clone(),
            config: client.integration.clone(),
            credentials,
        };

        let deadline = self.call_budget(client, lock);
        if deadline.is_zero() {
            warn!(client_id = %client.id, "lease nearly expired before the external call");
            return GatewayOutcome::Recoverable(GatewayFailure::new(
                ERROR_CODE_TIMEOUT,
                "lease expired before the external call started",
            ));
        }
        let call = AssertUnwindSafe(self.gateway.call(&request)).catch_unwind();

        match tokio::time::timeout(deadline, call).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(panic)) => {
                let message = panic_message(panic.as_ref());
                error!(client_id = %client.id, panic = %message, "gateway panicked");
                GatewayOutcome::Recoverable(GatewayFailure::new(
                    ERROR_CODE_PANIC,
                    format!("gateway panicked: {message}"),
                ))
            }
            Err(_) => {
                warn!(
                    client_id = %client.id,
                    deadline_ms = millis(deadline),
                    "gateway call exceeded deadline"
                );
                GatewayOutcome::Recoverable(GatewayFailure::new(
                    ERROR_CODE_TIMEOUT,
                    format!("no response within {}ms", deadline.as_millis()),
                ))
            }
        }
    }

    /// Turn a gateway outcome into the completed attempt and the next step.
    fn classify(&self, attempt: SyncAttempt, outcome: GatewayOutcome) -> (SyncAttempt, NextStep) {
        let now = self.clock.now();

        let (kind, failure) = match outcome {
            GatewayOutcome::Success(response) => match normalize(&response, now) {
                Ok(payload) => return (attempt.succeed(payload, now), NextStep::Completed),
                Err(err) => {
                    let failure = GatewayFailure::new(ERROR_CODE_MALFORMED, err.to_string());
                (FailureKind::Fatal, failure)
                }
            },
            GatewayOutcome::Recoverable(failure) => (FailureKind::Recoverable, failure),
            GatewayOutcome::Fatal(failure) => (FailureKind::Fatal, failure),
        };

        let detail = truncate_detail(&failure.detail);
        let action = self.policy.next_action(
            attempt.attempt_number,
            kind,
            attempt.cycle_started_at,
            now,
            failure.retry_after,
        );
        match action {
            NextAction::RetryAfter(delay) => {
                let at = now + to_chrono_duration(delay);
                warn!(
                    client_id = %attempt.client_id,
                    attempt_number = attempt.attempt_number,
                    error_code = %failure.code,
                    delay_ms = millis(delay),
                    "recoverable external failure; retry scheduled"
                );
                let completed = attempt.fail(kind, failure.code, detail, now).with_retry_at(at);
                let next = NextStep::RetryScheduled { delay_ms: millis(delay), at };
                (completed, next)
            }
            NextAction::GiveUp(reason) => {
                warn!(
                    client_id = %attempt.client_id,
                    attempt_number = attempt.attempt_number,
                    error_code = %failure.code,
                    reason = %reason,
                    "external failure is terminal"
                );
                (attempt.fail(kind, failure.code, detail, now), NextStep::Completed)
            }
        }
    }

    /// Close a pending attempt left behind by a holder whose lease expired.
    async fn close_orphan(&self, orphan: SyncAttempt) -> Result<()> {
        warn!(
            client_id = %orphan.client_id,
            cycle_id = %orphan.cycle_id,
            attempt_number = orphan.attempt_number,
            "closing attempt abandoned by an expired lease"
        );
        let now = self.clock.now();
        let closed = orphan.fail(
            FailureKind::Recoverable,
            ERROR_CODE_ABANDONED,
            "attempt abandoned after lease expiry",
            now,
        );
        let store = &self.store;
        let closed_ref = &closed;
        let written = self
            .persist("close_orphan", &closed.client_id, move || store.upsert_attempt(closed_ref))
            .await;
        match written {
            Ok(()) | Err(SyncLaneError::Conflict(_)) => {
                self.emit(&closed, CycleState::Failed);
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    /// A retry is overdue once its due time passed by more than one lease; its
    /// ticket is then assumed lost.
    fn retry_overdue(&self, attempt: &SyncAttempt) -> bool {
        attempt.retry_at.is_some_and(|retry_at| {
            self.clock.now() > retry_at + to_chrono_duration(self.config.lease_duration())
        })
    }

    fn call_deadline(&self, client: &Client) -> Duration {
        client.integration.timeout().saturating_add(self.config.call_grace())
    }

    /// Hard deadline for the external call: the client's deadline, shortened
    /// so the call ends at least one grace period before the lease expires.
    fn call_budget(&self, client: &Client, lock: &SyncCycleLock) -> Duration {
        let lease_left = from_chrono_duration(lock.expires_at - self.clock.now());
        call_budget(self.call_deadline(client), lease_left, self.config.call_grace())
    }

    fn emit(&self, attempt: &SyncAttempt, state: CycleState) {
        let duration_ms = attempt.duration_ms().unwrap_or_else(|| {
            u64::try_from((self.clock.now() - attempt.started_at).num_milliseconds()).unwrap_or(0)
        });
        let outcome = (!attempt.is_pending()).then_some(attempt.outcome);
        self.emit_transition(
            &attempt.client_id,
            Some(attempt.cycle_id),
            attempt.attempt_number,
            outcome,
            duration_ms,
            state,
        );
    }

    fn emit_transition(
        &self,
        client_id: &ClientId,
        cycle_id: Option<CycleId>,
        attempt_number: u32,
        outcome_kind: Option<AttemptOutcome>,
        duration_ms: u64,
        cycle_state: CycleState,
    ) {
        self.events.emit(&SyncEvent {
            client_id: client_id.clone(),
            cycle_id,
            attempt_number,
            outcome_kind,
            duration_ms,
            cycle_state,
            occurred_at: self.clock.now(),
        });
    }

    /// Run a state-store operation, retrying transient failures a bounded
    /// number of times. Exhaustion is logged as critical and surfaced as
    /// `Unavailable`.
    async fn persist<T, F, Fut>(
        &self,
        operation: &'static str,
        client_id: &ClientId,
        mut op: F,
    ) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let attempts = self.config.persistence_retries.saturating_add(1);
        let mut last_error = None;

        for attempt in 1..=attempts {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if !is_retryable_store_error(&err) => return Err(err),
                Err(err) => {
                    warn!(
                        operation,
                        client_id = %client_id,
                        attempt,
                        error = %err,
                        "state store operation failed"
                    );
                    last_error = Some(err);
                    if attempt < attempts {
                        let backoff = self.config.persistence_backoff().saturating_mul(attempt);
                        tokio::time::sleep(backoff).await;
                    }
                }
            }
        }

        let detail = last_error.map(|err| err.to_string()).unwrap_or_default();
        error!(
            severity = "critical",
            operation,
            client_id = %client_id,
            error = %detail,
            "state_store_unavailable"
        );
        Err(SyncLaneError::Unavailable(format!("state store unavailable during {operation}")))
    }
}

fn call_budget(deadline: Duration, lease_left: Duration, grace: Duration) -> Duration {
    deadline.min(lease_left.saturating_sub(grace))
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

fn is_retryable_store_error(err: &SyncLaneError) -> bool {
    err.is_transient() || matches!(err, SyncLaneError::Internal(_))
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn truncate_detail(detail: &str) -> String {
    if detail.len() <= MAX_ERROR_DETAIL_LEN {
        return detail.to_string();
    }
    let mut end = MAX_ERROR_DETAIL_LEN;
    while !detail.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &detail[..end])
}
