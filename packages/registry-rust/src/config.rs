//! Registry configuration.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::warn;

use lodestar_core::event::TokioExecutor;
use lodestar_core::{EventDispatcher, InMemoryMetadataService};

use crate::error::RegistryError;

/// Configuration group holding interface -> service-name mappings.
pub const DEFAULT_SERVICES_MAPPING_GROUP: &str = "services-mapping";

/// Where event dispatch runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DispatchMode {
    /// On the caller's thread.
    #[default]
    Direct,
    /// On the ambient tokio runtime's blocking pool.
    Async,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LoggingConfig {
    /// `EnvFilter` directives, used when `RUST_LOG` is unset.
    pub filter: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            json: false,
        }
    }
}

/// Top-level configuration for a registry node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RegistryConfig {
    /// Name of the local application; reported by its metadata service.
    pub application_name: String,
    pub services_mapping_group: String,
    pub dispatch_mode: DispatchMode,
    pub logging: LoggingConfig,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            application_name: "lodestar-app".to_string(),
            services_mapping_group: DEFAULT_SERVICES_MAPPING_GROUP.to_string(),
            dispatch_mode: DispatchMode::Direct,
            logging: LoggingConfig::default(),
        }
    }
}

impl RegistryConfig {
    /// Parses a JSON document. Missing fields take their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Config`] if the document is not valid.
    pub fn from_json(input: &str) -> Result<Self, RegistryError> {
        Ok(serde_json::from_str(input)?)
    }

    #[must_use]
    pub fn metadata_service(&self) -> InMemoryMetadataService {
        InMemoryMetadataService::new(self.application_name.as_str())
    }

    /// A dispatcher running in the configured mode.
    ///
    /// Async mode needs a tokio runtime in the calling context; without one
    /// the dispatcher runs direct.
    #[must_use]
    pub fn event_dispatcher(&self) -> EventDispatcher {
        match self.dispatch_mode {
            DispatchMode::Direct => EventDispatcher::new(),
            DispatchMode::Async => match TokioExecutor::try_current() {
                Some(executor) => EventDispatcher::with_executor(Arc::new(executor)),
                None => {
                    warn!(
                        "async dispatch requested outside a tokio runtime, dispatching direct"
                    );
                    EventDispatcher::new()
                }
            },
        }
    }
}
