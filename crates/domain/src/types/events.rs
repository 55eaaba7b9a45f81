//! Structured state-transition events

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::client::ClientId;
use super::sync::{AttemptOutcome, CycleId};

/// Sync-cycle state machine positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleState {
    Idle,
    Acquiring,
    Calling,
    Classifying,
    Retrying,
    Succeeded,
    Failed,
}

crate::impl_domain_status_conversions!(CycleState {
    Idle => "idle",
    Acquiring => "acquiring",
    Calling => "calling",
    Classifying => "classifying",
    Retrying => "retrying",
    Succeeded => "succeeded",
    Failed => "failed",
});

impl CycleState {
    /// The cycle ended and will not run again.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

/// Emitted on every state transition of a sync cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncEvent {
    pub client_id: ClientId,
    /// Absent before a cycle id has been assigned.
    pub cycle_id: Option<CycleId>,
    pub attempt_number: u32,
    pub outcome_kind: Option<AttemptOutcome>,
    /// Time spent since the attempt started.
    pub duration_ms: u64,
    pub cycle_state: CycleState,
    pub occurred_at: DateTime<Utc>,
}
