//! Sync attempts, cycle leases and engine results

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::client::{ClientId, ClientStatus};

/// Identifier shared by every attempt of one sync cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CycleId(Uuid);

impl CycleId {
    /// Fresh time-ordered id.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Wrap an id read back from storage.
    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }
}

impl Default for CycleId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CycleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Outcome of a single attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    Pending,
    Success,
    RecoverableFailure,
    FatalFailure,
}

crate::impl_domain_status_conversions!(AttemptOutcome {
    Pending => "pending",
    Success => "success",
    RecoverableFailure => "recoverable_failure",
    FatalFailure => "fatal_failure",
});

impl AttemptOutcome {
    /// Retry eligibility, for failed outcomes only.
    pub fn failure_kind(self) -> Option<FailureKind> {
        match self {
            Self::RecoverableFailure => Some(FailureKind::Recoverable),
            Self::FatalFailure => Some(FailureKind::Fatal),
            Self::Pending | Self::Success => None,
        }
    }
}

/// Retry eligibility of a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Recoverable,
    Fatal,
}

impl FailureKind {
    /// Attempt outcome recorded for this kind of failure.
    pub fn outcome(self) -> AttemptOutcome {
        match self {
            Self::Recoverable => AttemptOutcome::RecoverableFailure,
            Self::Fatal => AttemptOutcome::FatalFailure,
        }
    }
}

/// Shape of the upstream body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    List,
    Object,
}

crate::impl_domain_status_conversions!(DataType {
    List => "list",
    Object => "object",
});

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayloadMetadata {
    pub source_url: String,
    pub method: String,
    pub fetched_at: DateTime<Utc>,
    /// Array length for lists, key count for objects.
    pub record_count: usize,
    pub data_type: DataType,
}

/// Internal representation of a successful upstream response.
///
/// `data` is the upstream document unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedPayload {
    pub data: serde_json::Value,
    pub metadata: PayloadMetadata,
}

/// One logical call to the external system.
///
/// Created `pending` at trigger time and completed exactly once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncAttempt {
    pub id: Uuid,
    pub client_id: ClientId,
    pub cycle_id: CycleId,
    /// Starts at 1 for every new cycle.
    pub attempt_number: u32,
    /// When attempt 1 of this cycle started; drives the elapsed-time cap.
    pub cycle_started_at: DateTime<Utc>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub outcome: AttemptOutcome,
    pub normalized_payload: Option<NormalizedPayload>,
    pub error_code: Option<String>,
    pub error_detail: Option<String>,
    /// Set when a follow-up attempt of the same cycle has been scheduled.
    pub retry_at: Option<DateTime<Utc>>,
}

impl SyncAttempt {
    /// Open a new pending attempt.
    pub fn begin(
        client_id: ClientId,
        cycle_id: CycleId,
        attempt_number: u32,
        cycle_started_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            client_id,
            cycle_id,
            attempt_number,
            cycle_started_at,
            started_at: now,
            finished_at: None,
            outcome: AttemptOutcome::Pending,
            normalized_payload: None,
            error_code: None,
            error_detail: None,
            retry_at: None,
        }
    }

    /// Complete as `success`. The payload is only ever attached here.
    pub fn succeed(mut self, payload: NormalizedPayload, now: DateTime<Utc>) -> Self {
        self.outcome = AttemptOutcome::Success;
        self.normalized_payload = Some(payload);
        self.error_code = None;
        self.error_detail = None;
        self.finished_at = Some(now);
        self
    }

    /// Complete as a failure of the given kind.
    pub fn fail(
        mut self,
        kind: FailureKind,
        code: impl Into<String>,
        detail: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        self.outcome = kind.outcome();
        self.normalized_payload = None;
        self.error_code = Some(code.into());
        self.error_detail = Some(detail.into());
        self.finished_at = Some(now);
        self
    }

    /// Record when the next attempt of the cycle is due.
    pub fn with_retry_at(mut self, retry_at: DateTime<Utc>) -> Self {
        self.retry_at = Some(retry_at);
        self
    }

    /// Started but not yet completed.
    pub fn is_pending(&self) -> bool {
        self.outcome == AttemptOutcome::Pending
    }

    /// The cycle this attempt belongs to is waiting for a scheduled retry.
    pub fn awaits_retry(&self) -> bool {
        self.outcome == AttemptOutcome::RecoverableFailure && self.retry_at.is_some()
    }

    /// Wall time of a completed attempt.
    pub fn duration_ms(&self) -> Option<u64> {
        self.finished_at.map(|finished| {
            u64::try_from((finished - self.started_at).num_milliseconds()).unwrap_or(0)
        })
    }
}

/// Time-bounded exclusive claim on a client's sync cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncCycleLock {
    pub client_id: ClientId,
    /// Identifies the holder so only it can release or extend the lease.
    pub owner: Uuid,
    pub acquired_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl SyncCycleLock {
    /// Expiry is inclusive: a lease ending at `now` is already free.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Result of asking for a client's lease.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LeaseAcquisition {
    Acquired(SyncCycleLock),
    AlreadyRunning,
}

/// What the engine will do after an attempt completes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NextStep {
    /// The cycle reached a terminal outcome.
    Completed,
    RetryScheduled { delay_ms: u64, at: DateTime<Utc> },
}

/// Summary of the attempt an engine call executed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptReport {
    pub client_id: ClientId,
    pub cycle_id: CycleId,
    pub attempt_number: u32,
    pub outcome: AttemptOutcome,
    pub client_status: ClientStatus,
    pub next: NextStep,
}

/// Deferred work item that resumes a cycle once its backoff elapsed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryTicket {
    pub client_id: ClientId,
    pub cycle_id: CycleId,
    /// Number the resumed attempt will carry.
    pub attempt_number: u32,
    pub due_at: DateTime<Utc>,
}

impl RetryTicket {
    /// Ticket for the attempt following `attempt`, if it scheduled one.
    pub fn following(attempt: &SyncAttempt) -> Option<Self> {
        attempt.retry_at.map(|due_at| Self {
            client_id: attempt.client_id.clone(),
            cycle_id: attempt.cycle_id,
            attempt_number: attempt.attempt_number.saturating_add(1),
            due_at,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum TriggerOutcome {
    Started(AttemptReport),
    /// Another cycle holds the client; nothing was done.
    AlreadyRunning,
    ClientNotFound,
    /// The client exists but is deactivated.
    ClientInactive,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum ResumeOutcome {
    Resumed(AttemptReport),
    /// The lease is held elsewhere; try again later.
    Deferred,
    /// The ticket no longer matches the client's latest attempt.
    Stale,
    ClientNotFound,
}

/// Best-known sync state of a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStatusView {
    pub client_id: ClientId,
    pub status: ClientStatus,
    /// A lease is currently held for this client.
    pub running: bool,
    pub latest_attempt: Option<SyncAttempt>,
    /// Most recent first.
    pub history: Vec<SyncAttempt>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum StatusOutcome {
    Found(SyncStatusView),
    ClientNotFound,
}
