//! Deferred retry worker.
//!
//! The engine hands retry tickets to a [`RetryQueue`]. A single
//! [`RetryWorker`] task owns a `DelayQueue` holding every pending ticket and
//! resumes each cycle on its own task once the ticket is due. Tickets that
//! find the client's lease held elsewhere are pushed back by one lease
//! duration.
//!
//! On start the worker rebuilds the queue from the state store, so retries
//! scheduled before a restart are not lost. It then re-reads the store every
//! `rescan_interval` to pick up retries scheduled by other processes sharing
//! the same database. A ticket is only queued once per worker, whichever way
//! it arrived.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use synclane_core::{SyncEngine, SyncStateStore};
//! use synclane_infra::scheduling::{RetryInbox, RetryWorker, RetryWorkerConfig};
//!
//! # async fn example(
//! #     engine: Arc<SyncEngine>,
//! #     store: Arc<dyn SyncStateStore>,
//! #     inbox: RetryInbox,
//! # ) -> Result<(), synclane_infra::scheduling::SchedulerError> {
//! let config = RetryWorkerConfig::for_lease(engine.lease_duration());
//! let mut worker = RetryWorker::new(engine, store, inbox, config);
//!
//! worker.start().await?;
//! // ... application runs ...
//! worker.stop().await?;
//! # Ok(())
//! # }
//! ```

use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::{FutureExt, StreamExt};
use synclane_common::time::{from_chrono_duration, Clock, SystemClock};
use synclane_core::{RetryScheduler, SyncEngine, SyncStateStore};
use synclane_domain::{ClientId, CycleId, ResumeOutcome, Result, RetryTicket, SyncLaneError};
use tokio::sync::{mpsc, Mutex};
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tokio_util::time::DelayQueue;
use tracing::{debug, error, info, instrument, warn};

use super::error::{SchedulerError, SchedulerResult};

/// Create a connected queue / inbox pair.
///
/// The queue goes to the engine, the inbox to the worker.
pub fn retry_queue() -> (RetryQueue, RetryInbox) {
    let (tx, rx) = mpsc::unbounded_channel();
    (RetryQueue { tx }, RetryInbox { rx: Arc::new(Mutex::new(rx)) })
}

/// Sending half: implements the engine's [`RetryScheduler`] port.
#[derive(Clone, Debug)]
pub struct RetryQueue {
    tx: mpsc::UnboundedSender<RetryTicket>,
}

impl RetryScheduler for RetryQueue {
    fn schedule(&self, ticket: RetryTicket) -> Result<()> {
        debug!(
            client_id = %ticket.client_id,
            cycle_id = %ticket.cycle_id,
            attempt_number = ticket.attempt_number,
            due_at = %ticket.due_at,
            "retry_ticket_enqueued"
        );
        self.tx
            .send(ticket)
            .map_err(|_| SyncLaneError::Unavailable("retry worker has shut down".into()))
    }
}

/// Receiving half, owned by the worker.
///
/// Shared so a stopped worker can be started again without losing tickets
/// enqueued in between.
#[derive(Clone, Debug)]
pub struct RetryInbox {
    rx: Arc<Mutex<mpsc::UnboundedReceiver<RetryTicket>>>,
}

/// Configuration for the retry worker.
#[derive(Debug, Clone)]
pub struct RetryWorkerConfig {
    /// Delay before retrying a ticket whose client was busy or whose resume
    /// failed.
    pub deferral: Duration,
    /// Bound on each reload from the state store
    pub recovery_timeout: Duration,
    /// Period between reloads while running
    pub rescan_interval: Duration,
    /// Join timeout when stopping
    pub join_timeout: Duration,
}

impl RetryWorkerConfig {
    /// Defaults with the deferral set to one lease duration.
    pub fn for_lease(lease_duration: Duration) -> Self {
        Self { deferral: lease_duration, ..Self::default() }
    }
}

impl Default for RetryWorkerConfig {
    fn default() -> Self {
        Self {
            deferral: Duration::from_secs(30),
            recovery_timeout: Duration::from_secs(10),
            rescan_interval: Duration::from_secs(5),
            join_timeout: Duration::from_secs(5),
        }
    }
}

/// Retry worker with explicit lifecycle management.
pub struct RetryWorker {
    engine: Arc<SyncEngine>,
    store: Arc<dyn SyncStateStore>,
    inbox: RetryInbox,
    clock: Arc<dyn Clock>,
    config: RetryWorkerConfig,
    cancellation: CancellationToken,
    task_handle: Option<JoinHandle<()>>,
}

impl RetryWorker {
    /// Worker serving `inbox`, resuming cycles through `engine` and reloading
    /// pending retries from `store`. Call [`RetryWorker::start`] to run it.
    pub fn new(
        engine: Arc<SyncEngine>,
        store: Arc<dyn SyncStateStore>,
        inbox: RetryInbox,
        config: RetryWorkerConfig,
    ) -> Self {
        Self {
            engine,
            store,
            inbox,
            clock: Arc::new(SystemClock),
            config,
            cancellation: CancellationToken::new(),
            task_handle: None,
        }
    }

    /// Clock used to turn ticket due times into delays.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Reload pending retries and spawn the processing task.
    #[instrument(skip(self))]
    pub async fn start(&mut self) -> SchedulerResult<()> {
        if self.is_running() {
            return Err(SchedulerError::AlreadyRunning);
        }

        info!("Starting retry worker");
        self.cancellation = CancellationToken::new();

        let recovered = load_pending(self.store.as_ref(), self.config.recovery_timeout).await;
        if !recovered.is_empty() {
            info!(count = recovered.len(), "recovered_pending_retries");
        }

        let run = WorkerLoop {
            engine: Arc::clone(&self.engine),
            store: Arc::clone(&self.store),
            inbox: self.inbox.clone(),
            clock: Arc::clone(&self.clock),
            config: self.config.clone(),
            cancel: self.cancellation.clone(),
        };
        self.task_handle = Some(tokio::spawn(run.run(recovered)));

        info!("Retry worker started");
        Ok(())
    }

    /// Cancel the processing task and wait for in-flight resumes to finish.
    #[instrument(skip(self))]
    pub async fn stop(&mut self) -> SchedulerResult<()> {
        if !self.is_running() {
            return Err(SchedulerError::NotRunning);
        }

        info!("Stopping retry worker");
        self.cancellation.cancel();

        if let Some(handle) = self.task_handle.take() {
            let join_timeout = self.config.join_timeout;
            match tokio::time::timeout(join_timeout, handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    warn!("Retry worker task panicked: {}", e);
                    return Err(SchedulerError::TaskJoinFailed(e.to_string()));
                }
                Err(_) => {
                    warn!("Retry worker task did not complete within timeout");
                    return Err(SchedulerError::Timeout { seconds: join_timeout.as_secs() });
                }
            }
        }

        info!("Retry worker stopped");
        self.cancellation = CancellationToken::new();
        Ok(())
    }

    /// Returns true when a worker instance is active.
    pub fn is_running(&self) -> bool {
        self.task_handle.is_some()
    }
}

/// Tickets for every cycle currently waiting on a retry. Failures are
/// logged; live tickets are still served.
async fn load_pending(store: &dyn SyncStateStore, timeout: Duration) -> Vec<RetryTicket> {
    match tokio::time::timeout(timeout, store.list_awaiting_retry()).await {
        Ok(Ok(attempts)) => attempts.iter().filter_map(RetryTicket::following).collect(),
        Ok(Err(err)) => {
            error!(error = %err, "failed to reload pending retries");
            Vec::new()
        }
        Err(_) => {
            warn!(timeout_secs = timeout.as_secs(), "reloading pending retries timed out");
            Vec::new()
        }
    }
}

impl Drop for RetryWorker {
    fn drop(&mut self) {
        if self.is_running() {
            warn!("RetryWorker dropped while running; cancelling tasks");
            self.cancellation.cancel();
        }
    }
}

struct WorkerLoop {
    engine: Arc<SyncEngine>,
    store: Arc<dyn SyncStateStore>,
    inbox: RetryInbox,
    clock: Arc<dyn Clock>,
    config: RetryWorkerConfig,
    cancel: CancellationToken,
}

type ResumeResult = (RetryTicket, Result<ResumeOutcome>);

/// Identity of a ticket: one attempt of one cycle.
type TicketKey = (ClientId, CycleId, u32);

fn key_of(ticket: &RetryTicket) -> TicketKey {
    (ticket.client_id.clone(), ticket.cycle_id, ticket.attempt_number)
}

/// Tickets the loop currently owns, queued or in flight.
#[derive(Default)]
struct Tracked {
    delays: DelayQueue<RetryTicket>,
    known: HashSet<TicketKey>,
}

impl Tracked {
    /// Queue `ticket` unless it is already queued or running. Returns whether
    /// it was new.
    fn offer(&mut self, ticket: RetryTicket, delay: Duration) -> bool {
        if !self.known.insert(key_of(&ticket)) {
            return false;
        }
        self.delays.insert(ticket, delay);
        true
    }

    fn requeue(&mut self, ticket: RetryTicket, delay: Duration) {
        self.delays.insert(ticket, delay);
    }

    fn forget(&mut self, ticket: &RetryTicket) {
        self.known.remove(&key_of(ticket));
    }
}

impl WorkerLoop {
    async fn run(self, initial: Vec<RetryTicket>) {
        let mut rx = self.inbox.rx.lock().await;
        let mut tracked = Tracked::default();
        let mut in_flight: JoinSet<ResumeResult> = JoinSet::new();
        let period = self.config.rescan_interval.max(Duration::from_millis(1));
        let mut rescan = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        rescan.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        for ticket in initial {
            let delay = self.delay_until_due(&ticket);
            tracked.offer(ticket, delay);
        }

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    debug!(pending = tracked.delays.len(), "Retry worker loop cancelled");
                    break;
                }
                received = rx.recv() => match received {
                    Some(ticket) => {
                        let delay = self.delay_until_due(&ticket);
                        tracked.offer(ticket, delay);
                    }
                    None => {
                        debug!("Retry queue closed");
                        break;
                    }
                },
                _ = rescan.tick() => {
                    let found =
                        load_pending(self.store.as_ref(), self.config.recovery_timeout).await;
                    let mut added = 0usize;
                    for ticket in found {
                        let delay = self.delay_until_due(&ticket);
                        if tracked.offer(ticket, delay) {
                            added += 1;
                        }
                    }
                    if added > 0 {
                        info!(count = added, "discovered_pending_retries");
                    }
                }
                Some(expired) = tracked.delays.next(), if !tracked.delays.is_empty() => {
                    let ticket = expired.into_inner();
                    let engine = Arc::clone(&self.engine);
                    in_flight.spawn(async move {
                        let resume = AssertUnwindSafe(engine.resume_cycle(ticket.clone()));
                        let result = resume.catch_unwind().await.unwrap_or_else(|_| {
                            Err(SyncLaneError::Internal("retry resume panicked".into()))
                        });
                        (ticket, result)
                    });
                }
                Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                    match self.handle_result(joined) {
                        Some(Settled::Retry(ticket)) => {
                            tracked.requeue(ticket, self.config.deferral);
                        }
                        Some(Settled::Done(ticket)) => tracked.forget(&ticket),
                        None => {}
                    }
                }
            }
        }

        // In-flight resumes hold leases; let them finish and release.
        while let Some(joined) = in_flight.join_next().await {
            self.handle_result(joined);
        }
    }

    /// Whether the ticket should be tried again later.
    fn handle_result(
        &self,
        joined: std::result::Result<ResumeResult, tokio::task::JoinError>,
    ) -> Option<Settled> {
        let (ticket, result) = match joined {
            Ok(pair) => pair,
            Err(err) => {
                error!(error = %err, "retry resume task failed");
                return None;
            }
        };

        match result {
            Ok(ResumeOutcome::Resumed(report)) => {
                debug!(
                    client_id = %report.client_id,
                    attempt_number = report.attempt_number,
                    outcome = %report.outcome,
                    "retry_resumed"
                );
                Some(Settled::Done(ticket))
            }
            Ok(ResumeOutcome::Deferred) => {
                debug!(client_id = %ticket.client_id, "retry deferred; client busy");
                Some(Settled::Retry(ticket))
            }
            Ok(ResumeOutcome::Stale) | Ok(ResumeOutcome::ClientNotFound) => {
                debug!(
                    client_id = %ticket.client_id,
                    attempt_number = ticket.attempt_number,
                    "retry ticket dropped"
                );
                Some(Settled::Done(ticket))
            }
            Err(err) => {
                warn!(
                    client_id = %ticket.client_id,
                    error = %err,
                    "retry resume failed; deferring"
                );
                Some(Settled::Retry(ticket))
            }
        }
    }

    fn delay_until_due(&self, ticket: &RetryTicket) -> Duration {
        from_chrono_duration(ticket.due_at - self.clock.now())
    }
}

enum Settled {
    Retry(RetryTicket),
    Done(RetryTicket),
}
