//! Service instance model.

use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

/// One running instance of a service.
///
/// Identity is `(service_name, host, port)`. Health, enablement, id and
/// metadata do not take part in equality, so re-registering an instance
/// with new metadata replaces the stored record instead of adding another.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceInstance {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub id: Option<String>,
    pub service_name: String,
    pub host: String,
    pub port: u16,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_true")]
    pub healthy: bool,
    /// Ordered so that URLs derived from it are deterministic.
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

fn default_true() -> bool {
    true
}

impl ServiceInstance {
    /// Creates an enabled, healthy instance with no metadata and no id.
    #[must_use]
    pub fn new(service_name: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self {
            id: None,
            service_name: service_name.into(),
            host: host.into(),
            port,
            enabled: true,
            healthy: true,
            metadata: BTreeMap::new(),
        }
    }

    /// Default instance id: `host:port`.
    #[must_use]
    pub fn generate_id(host: &str, port: u16) -> String {
        format!("{host}:{port}")
    }

    /// Sets the id to [`ServiceInstance::generate_id`] of this address.
    #[must_use]
    pub fn with_generated_id(mut self) -> Self {
        self.id = Some(Self::generate_id(&self.host, self.port));
        self
    }

    #[must_use]
    pub fn with_healthy(mut self, healthy: bool) -> Self {
        self.healthy = healthy;
        self
    }

    #[must_use]
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// `host:port`.
    #[must_use]
    pub fn address(&self) -> String {
        Self::generate_id(&self.host, self.port)
    }
}

impl PartialEq for ServiceInstance {
    fn eq(&self, other: &Self) -> bool {
        self.service_name == other.service_name
            && self.host == other.host
            && self.port == other.port
    }
}

impl Eq for ServiceInstance {}

impl Hash for ServiceInstance {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.service_name.hash(state);
        self.host.hash(state);
        self.port.hash(state);
    }
}
