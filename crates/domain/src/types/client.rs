//! Registered clients and their integration settings

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::constants::{DEFAULT_ENDPOINT, DEFAULT_EXTERNAL_TIMEOUT_SECS, DEFAULT_METHOD};

/// Stable, immutable client identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientId(String);

impl ClientId {
    /// Wrap a caller-chosen identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Fresh time-ordered identifier for newly registered clients.
    pub fn generate() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ClientId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for ClientId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Integration status as seen by API consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClientStatus {
    Registered,
    Syncing,
    Synced,
    Failed,
}

crate::impl_domain_status_conversions!(ClientStatus {
    Registered => "registered",
    Syncing => "syncing",
    Synced => "synced",
    Failed => "failed",
});

fn default_endpoint() -> String {
    DEFAULT_ENDPOINT.to_string()
}

fn default_method() -> String {
    DEFAULT_METHOD.to_string()
}

fn default_timeout_secs() -> u64 {
    DEFAULT_EXTERNAL_TIMEOUT_SECS
}

/// How to reach a client's external system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrationConfig {
    pub base_url: String,
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_method")]
    pub method: String,
    #[serde(default)]
    pub params: BTreeMap<String, String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Opaque key resolved into [`Credentials`] at call time. Secrets are never
    /// stored alongside the client.
    #[serde(default)]
    pub credentials_ref: Option<String>,
}

impl IntegrationConfig {
    /// Integration against `base_url` with the default endpoint, method and
    /// timeout.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            endpoint: default_endpoint(),
            method: default_method(),
            params: BTreeMap::new(),
            timeout_secs: default_timeout_secs(),
            credentials_ref: None,
        }
    }

    /// Path appended to the base URL.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// HTTP method, upper case.
    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = method.into();
        self
    }

    /// Add a query parameter.
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// Per-call timeout in whole seconds, at least one.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_secs = timeout.as_secs().max(1);
        self
    }

    /// Key the credential resolver maps to secrets.
    pub fn with_credentials_ref(mut self, reference: impl Into<String>) -> Self {
        self.credentials_ref = Some(reference.into());
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Join `base_url` and `endpoint` with exactly one slash.
    pub fn request_url(&self) -> String {
        let base = self.base_url.trim_end_matches('/');
        let endpoint = self.endpoint.trim_start_matches('/');
        if endpoint.is_empty() {
            base.to_string()
        } else {
            format!("{base}/{endpoint}")
        }
    }
}

/// A registered client integration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Client {
    pub id: ClientId,
    pub name: String,
    pub description: Option<String>,
    pub integration: IntegrationConfig,
    pub status: ClientStatus,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Client {
    /// New active client in `registered` status.
    pub fn new(
        id: ClientId,
        name: impl Into<String>,
        integration: IntegrationConfig,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            description: None,
            integration,
            status: ClientStatus::Registered,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Secrets attached to outbound requests.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    /// Sent as `Authorization: Bearer <api_key>`.
    pub api_key: Option<String>,
    /// Sent as `X-API-Token`.
    pub api_token: Option<String>,
}

impl Credentials {
    /// No secret is set.
    pub fn is_empty(&self) -> bool {
        self.api_key.is_none() && self.api_token.is_none()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("api_token", &self.api_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}
