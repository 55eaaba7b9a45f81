//! Shared test helpers for `synclane-core` integration tests.
//!
//! In-memory implementations of every engine port, so engine tests can drive
//! whole cycles without a database or network.

#![allow(dead_code)]

pub mod doubles;

use std::sync::Arc;

use synclane_common::testing::MockClock;
use synclane_common::time::Clock;
use synclane_core::SyncEngine;
use synclane_domain::{Client, ClientId, EngineConfig, IntegrationConfig, RetryConfig};

pub use doubles::{
    fatal, ok, recoverable, InMemoryStore, RecordingScheduler, RecordingSink, ScriptedGateway, Step,
};

/// Engine wired to in-memory doubles, plus handles to inspect them.
pub struct Harness {
    pub store: Arc<InMemoryStore>,
    pub gateway: Arc<ScriptedGateway>,
    pub scheduler: Arc<RecordingScheduler>,
    pub events: Arc<RecordingSink>,
    pub clock: MockClock,
    pub engine: Arc<SyncEngine>,
}

impl Harness {
    pub fn new(gateway: ScriptedGateway) -> Self {
        Self::with_retry(gateway, fast_retry())
    }

    pub fn with_retry(gateway: ScriptedGateway, retry: RetryConfig) -> Self {
        let store = Arc::new(InMemoryStore::default());
        let gateway = Arc::new(gateway);
        let scheduler = Arc::new(RecordingScheduler::default());
        let events = Arc::new(RecordingSink::default());
        let clock = MockClock::new();

        let engine = SyncEngine::new(
            store.clone(),
            store.clone(),
            store.clone(),
            gateway.clone(),
            scheduler.clone(),
        )
        .with_clock(Arc::new(clock.clone()))
        .with_event_sink(events.clone())
        .with_engine_config(engine_config())
        .with_retry_config(&retry);

        Self { store, gateway, scheduler, events, clock, engine: Arc::new(engine) }
    }

    /// Register an active client pointing at a dummy upstream.
    pub fn register(&self, id: &str) -> ClientId {
        self.register_with(id, IntegrationConfig::new("https://upstream.test"))
    }

    pub fn register_with(&self, id: &str, integration: IntegrationConfig) -> ClientId {
        let client_id = ClientId::new(id);
        let client =
            Client::new(client_id.clone(), format!("client {id}"), integration, self.clock.now());
        self.store.insert_client(client);
        client_id
    }
}

pub fn engine_config() -> EngineConfig {
    EngineConfig { persistence_retries: 2, persistence_backoff_ms: 1, ..EngineConfig::default() }
}

pub fn fast_retry() -> RetryConfig {
    RetryConfig {
        base_delay_ms: 1000,
        multiplier: 2.0,
        max_delay_ms: 60_000,
        max_attempts: 5,
        max_elapsed_secs: 600,
    }
}
