//! Default event sink writing one structured log line per transition.

use synclane_domain::SyncEvent;
use tracing::info;

use super::ports::SyncEventSink;

/// Emits [`SyncEvent`]s on the `synclane::events` tracing target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingEventSink;

impl SyncEventSink for TracingEventSink {
    fn emit(&self, event: &SyncEvent) {
        let outcome_kind = event.outcome_kind.map(|outcome| outcome.to_string());
        let cycle_id = event.cycle_id.map(|id| id.to_string());
        info!(
            target: "synclane::events",
            client_id = %event.client_id,
            cycle_id = cycle_id.as_deref().unwrap_or("-"),
            attempt_number = event.attempt_number,
            outcome_kind = outcome_kind.as_deref().unwrap_or("-"),
            duration_ms = event.duration_ms,
            cycle_state = %event.cycle_state,
            "sync_cycle_transition"
        );
    }
}
