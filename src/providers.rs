//! Collaborator contracts consumed by the engine and session manager.
//!
//! The core never speaks a network protocol itself: health checking, key
//! lookup/rotation, and integration updates are consumed behind these traits.
//! The in-memory implementations back tests and local single-process use;
//! embedders supply real ones.
//!
//! The key store owns its rotation bookkeeping: the per-service cursor is
//! read-modify-written under one lock so two concurrent resolutions can never
//! both select the same unhealthy key.

use async_trait::async_trait;
use miette::Diagnostic;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A resolved credential record. Plain data; secret storage and encryption
/// live behind whatever implements [`KeyStore`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credential {
    pub service: String,
    pub key_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub secret: String,
}

impl Credential {
    pub fn new(
        service: impl Into<String>,
        key_id: impl Into<String>,
        secret: impl Into<String>,
    ) -> Self {
        Self {
            service: service.into(),
            key_id: key_id.into(),
            name: None,
            secret: secret.into(),
        }
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// Failures raised by collaborator implementations.
#[derive(Debug, Error, Diagnostic)]
pub enum ProviderError {
    #[error("health check failed for service {service}: {message}")]
    #[diagnostic(code(patchbay::provider::health_check))]
    HealthCheck { service: String, message: String },

    #[error("key store failure for service {service}: {message}")]
    #[diagnostic(code(patchbay::provider::key_store))]
    KeyStore { service: String, message: String },

    #[error("integration update failed for {integration}: {message}")]
    #[diagnostic(code(patchbay::provider::integration))]
    Integration {
        integration: String,
        message: String,
    },
}

/// Opaque async availability predicate for a service.
#[async_trait]
pub trait HealthCheckProvider: Send + Sync {
    async fn check(&self, service_id: &str) -> Result<bool, ProviderError>;
}

/// Key lookup and rotation. Implementations own their rotation cursor.
#[async_trait]
pub trait KeyStore: Send + Sync {
    /// Resolve a credential for a service. A `key_id` pins the lookup;
    /// otherwise the store picks per its rotation policy. `None` means no
    /// usable credential.
    async fn resolve(
        &self,
        service_id: &str,
        key_id: Option<&str>,
    ) -> Result<Option<Credential>, ProviderError>;
}

/// Side-effecting application of a credential to an external integration.
#[async_trait]
pub trait IntegrationUpdater: Send + Sync {
    async fn apply(
        &self,
        integration_id: &str,
        service_id: &str,
        credential: &Credential,
    ) -> Result<(), ProviderError>;
}

/// Health provider answering from a fixed table. Default answer covers
/// services without an explicit entry.
#[derive(Debug, Default)]
pub struct StaticHealth {
    default_available: bool,
    overrides: FxHashMap<String, bool>,
}

impl StaticHealth {
    /// Everything reports available.
    pub fn up() -> Self {
        Self {
            default_available: true,
            overrides: FxHashMap::default(),
        }
    }

    /// Everything reports unavailable.
    pub fn down() -> Self {
        Self {
            default_available: false,
            overrides: FxHashMap::default(),
        }
    }

    #[must_use]
    pub fn with_service(mut self, service_id: impl Into<String>, available: bool) -> Self {
        self.overrides.insert(service_id.into(), available);
        self
    }
}

#[async_trait]
impl HealthCheckProvider for StaticHealth {
    async fn check(&self, service_id: &str) -> Result<bool, ProviderError> {
        Ok(self
            .overrides
            .get(service_id)
            .copied()
            .unwrap_or(self.default_available))
    }
}

struct StoredKey {
    credential: Credential,
    healthy: bool,
}

#[derive(Default)]
struct KeyStoreInner {
    keys: FxHashMap<String, Vec<StoredKey>>,
    cursors: FxHashMap<String, usize>,
    rotations: u64,
}

/// In-memory key store with health-based rotation.
///
/// Unpinned resolution scans from the per-service cursor, returns the first
/// healthy credential, and leaves the cursor there so the next caller starts
/// at the last known-good key. The whole read-modify-write happens under one
/// lock.
#[derive(Default)]
pub struct InMemoryKeyStore {
    inner: Mutex<KeyStoreInner>,
}

impl InMemoryKeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_key(&self, credential: Credential) {
        let mut inner = self.inner.lock();
        inner
            .keys
            .entry(credential.service.clone())
            .or_default()
            .push(StoredKey {
                credential,
                healthy: true,
            });
    }

    /// Exclude a credential from rotation until marked healthy again.
    pub fn mark_unhealthy(&self, service_id: &str, key_id: &str) {
        self.set_health(service_id, key_id, false);
    }

    pub fn mark_healthy(&self, service_id: &str, key_id: &str) {
        self.set_health(service_id, key_id, true);
    }

    fn set_health(&self, service_id: &str, key_id: &str, healthy: bool) {
        let mut inner = self.inner.lock();
        if let Some(keys) = inner.keys.get_mut(service_id) {
            for stored in keys.iter_mut() {
                if stored.credential.key_id == key_id {
                    stored.healthy = healthy;
                }
            }
        }
    }

    /// Rotation cursors per service, for embedders that persist them.
    pub fn cursors(&self) -> FxHashMap<String, usize> {
        self.inner.lock().cursors.clone()
    }

    pub fn set_cursor(&self, service_id: impl Into<String>, index: usize) {
        self.inner.lock().cursors.insert(service_id.into(), index);
    }

    /// Times an unpinned resolution moved the cursor off its previous slot.
    pub fn rotation_count(&self) -> u64 {
        self.inner.lock().rotations
    }
}

#[async_trait]
impl KeyStore for InMemoryKeyStore {
    async fn resolve(
        &self,
        service_id: &str,
        key_id: Option<&str>,
    ) -> Result<Option<Credential>, ProviderError> {
        let mut inner = self.inner.lock();

        if let Some(pinned) = key_id {
            let found = inner.keys.get(service_id).and_then(|keys| {
                keys.iter()
                    .find(|stored| stored.credential.key_id == pinned)
                    .map(|stored| stored.credential.clone())
            });
            return Ok(found);
        }

        let Some(keys) = inner.keys.get(service_id) else {
            return Ok(None);
        };
        if keys.is_empty() {
            return Ok(None);
        }
        let start = inner.cursors.get(service_id).copied().unwrap_or(0) % keys.len();
        for offset in 0..keys.len() {
            let idx = (start + offset) % keys.len();
            if keys[idx].healthy {
                let credential = keys[idx].credential.clone();
                if idx != start {
                    inner.rotations += 1;
                }
                inner.cursors.insert(service_id.to_string(), idx);
                return Ok(Some(credential));
            }
        }
        Ok(None)
    }
}

/// Integration updater that records every apply, optionally failing for
/// selected integration ids. Backs tests and dry runs.
#[derive(Default)]
pub struct RecordingIntegrations {
    applied: Mutex<Vec<(String, String, String)>>,
    fail_for: Mutex<Vec<String>>,
}

impl RecordingIntegrations {
    pub fn new() -> Self {
        Self::default()
    }

    /// `(integration_id, service_id, key_id)` tuples in apply order.
    pub fn applied(&self) -> Vec<(String, String, String)> {
        self.applied.lock().clone()
    }

    pub fn fail_for(&self, integration_id: impl Into<String>) {
        self.fail_for.lock().push(integration_id.into());
    }
}

#[async_trait]
impl IntegrationUpdater for RecordingIntegrations {
    async fn apply(
        &self,
        integration_id: &str,
        service_id: &str,
        credential: &Credential,
    ) -> Result<(), ProviderError> {
        if self.fail_for.lock().iter().any(|id| id == integration_id) {
            return Err(ProviderError::Integration {
                integration: integration_id.to_string(),
                message: "configured to fail".to_string(),
            });
        }
        self.applied.lock().push((
            integration_id.to_string(),
            service_id.to_string(),
            credential.key_id.clone(),
        ));
        Ok(())
    }
}
