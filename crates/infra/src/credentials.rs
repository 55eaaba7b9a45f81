//! Credential resolution for outbound calls
//!
//! Clients only store an opaque `credentials_ref`; secrets are looked up at
//! call time and never persisted next to the client.
use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use synclane_core::CredentialResolver;
use synclane_domain::{Credentials, Result, SyncLaneError};

const ENV_PREFIX: &str = "SYNCLANE_CRED_";

/// Reads `SYNCLANE_CRED_<REF>_API_KEY` and `SYNCLANE_CRED_<REF>_API_TOKEN`.
///
/// `<REF>` is the reference uppercased with every non-alphanumeric character
/// replaced by `_` (`acme-prod` → `ACME_PROD`).
#[derive(Debug, Default, Clone, Copy)]
pub struct EnvCredentialResolver;

impl EnvCredentialResolver {
    /// Resolver reading `SYNCLANE_CRED_<REF>_*` variables.
    pub fn new() -> Self {
        Self
    }

    /// Environment variable names for a reference: `(api_key, api_token)`.
    pub fn variable_names(reference: &str) -> (String, String) {
        let stem: String = reference
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
            .collect();
        (format!("{ENV_PREFIX}{stem}_API_KEY"), format!("{ENV_PREFIX}{stem}_API_TOKEN"))
    }

    fn lookup(reference: &str, read: impl Fn(&str) -> Option<String>) -> Result<Credentials> {
        let (key_var, token_var) = Self::variable_names(reference);
        let credentials = Credentials {
            api_key: read(&key_var).filter(|v| !v.is_empty()),
            api_token: read(&token_var).filter(|v| !v.is_empty()),
        };

        if credentials.is_empty() {
            return Err(SyncLaneError::Config(format!(
                "no credentials for reference {reference:?} (set {key_var} or {token_var})"
            )));
        }
        Ok(credentials)
    }
}

#[async_trait]
impl CredentialResolver for EnvCredentialResolver {
    async fn resolve(&self, reference: &str) -> Result<Credentials> {
        Self::lookup(reference, |name| std::env::var(name).ok())
    }
}

/// In-memory resolver, useful for embedding and tests.
#[derive(Debug, Default)]
pub struct StaticCredentialResolver {
    entries: RwLock<HashMap<String, Credentials>>,
}

impl StaticCredentialResolver {
    /// Empty resolver.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`StaticCredentialResolver::insert`].
    pub fn with_entry(self, reference: impl Into<String>, credentials: Credentials) -> Self {
        self.insert(reference, credentials);
        self
    }

    /// Map `reference` to `credentials`, replacing any earlier entry.
    pub fn insert(&self, reference: impl Into<String>, credentials: Credentials) {
        self.entries.write().insert(reference.into(), credentials);
    }
}

#[async_trait]
impl CredentialResolver for StaticCredentialResolver {
    async fn resolve(&self, reference: &str) -> Result<Credentials> {
        self.entries
            .read()
            .get(reference)
            .cloned()
            .ok_or_else(|| {
                SyncLaneError::Config(format!("unknown credentials reference {reference:?}"))
            })
    }
}
