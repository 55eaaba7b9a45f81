//! Idempotency guard
//!
//! Collapses concurrent or duplicate triggers for one client into at most one
//! active cycle by way of a self-expiring lease. A holder that crashes never
//! releases; its lease simply expires and the next acquisition succeeds.

use std::sync::Arc;
use std::time::Duration;

use synclane_common::time::{to_chrono_duration, Clock};
use synclane_domain::{ClientId, LeaseAcquisition, Result, SyncCycleLock};
use tracing::debug;
use uuid::Uuid;

use super::ports::LeaseStore;

pub struct IdempotencyGuard {
    leases: Arc<dyn LeaseStore>,
    clock: Arc<dyn Clock>,
    lease_duration: Duration,
}

impl IdempotencyGuard {
    /// Guard over `leases`; every lease lasts at least `lease_duration`.
    pub fn new(
        leases: Arc<dyn LeaseStore>,
        clock: Arc<dyn Clock>,
        lease_duration: Duration,
    ) -> Self {
        Self { leases, clock, lease_duration }
    }

    /// Minimum lease length.
    pub fn lease_duration(&self) -> Duration {
        self.lease_duration
    }

    /// Acquire with the configured lease duration.
    pub async fn try_acquire(&self, client_id: &ClientId) -> Result<LeaseAcquisition> {
        self.try_acquire_for(client_id, self.lease_duration).await
    }

    /// Acquire a lease lasting `hold_for` (never shorter than the configured
    /// duration).
    pub async fn try_acquire_for(
        &self,
        client_id: &ClientId,
        hold_for: Duration,
    ) -> Result<LeaseAcquisition> {
        let now = self.clock.now();
        let expires_at = now + to_chrono_duration(hold_for.max(self.lease_duration));
        let owner = Uuid::new_v4();

        match self.leases.try_acquire(client_id, owner, now, expires_at).await? {
            Some(lock) => {
                debug!(
                    client_id = %client_id,
                    owner = %owner,
                    expires_at = %lock.expires_at,
                    "lease_acquired"
                );
                Ok(LeaseAcquisition::Acquired(lock))
            }
            None => {
                debug!(client_id = %client_id, "lease_held_elsewhere");
                Ok(LeaseAcquisition::AlreadyRunning)
            }
        }
    }

    /// Release a lease previously returned by this guard. Calling twice is a
    /// no-op.
    pub async fn release(&self, lock: &SyncCycleLock) -> Result<()> {
        self.leases.release(&lock.client_id, lock.owner).await?;
        debug!(client_id = %lock.client_id, owner = %lock.owner, "lease_released");
        Ok(())
    }

    /// Whether an unexpired lease exists for the client.
    pub async fn is_running(&self, client_id: &ClientId) -> Result<bool> {
        let now = self.clock.now();
        Ok(self.leases.get_active(client_id, now).await?.is_some())
    }
}
