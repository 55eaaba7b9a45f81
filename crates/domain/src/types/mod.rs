//! Domain data types

pub mod client;
pub mod events;
pub mod sync;

pub use client::{Client, ClientId, ClientStatus, Credentials, IntegrationConfig};
pub use events::{CycleState, SyncEvent};
pub use sync::{
    AttemptOutcome, AttemptReport, CycleId, DataType, FailureKind, LeaseAcquisition, NextStep,
    NormalizedPayload, PayloadMetadata, ResumeOutcome, RetryTicket, StatusOutcome, SyncAttempt,
    SyncCycleLock, SyncStatusView, TriggerOutcome,
};
