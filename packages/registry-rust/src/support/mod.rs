//! Registry orchestration on top of discovery and the metadata store.

use std::sync::Arc;

use lodestar_core::Url;

pub mod dynamic_config;
pub mod service_oriented;

pub use dynamic_config::{DynamicConfiguration, InMemoryDynamicConfiguration};
pub use service_oriented::ServiceOrientedRegistry;

/// Receives subscription results.
///
/// Always called with the complete current list, never a diff.
pub trait NotifyListener: Send + Sync {
    fn notify(&self, urls: Vec<Url>);
}

/// The hooks a registry implementation supplies to the layer that adds
/// retry and failback around them.
///
/// Errors from collaborators are returned unchanged so that layer can
/// decide whether to retry.
pub trait RegistryHooks: Send + Sync {
    /// The URL this registry was created for.
    fn url(&self) -> &Url;

    /// # Errors
    ///
    /// Propagates collaborator failures.
    fn do_register(&self, url: &Url) -> anyhow::Result<()>;

    /// # Errors
    ///
    /// Propagates collaborator failures.
    fn do_unregister(&self, url: &Url) -> anyhow::Result<()>;

    /// # Errors
    ///
    /// Propagates collaborator failures.
    fn do_subscribe(&self, url: &Url, listener: Arc<dyn NotifyListener>) -> anyhow::Result<()>;

    /// # Errors
    ///
    /// Propagates collaborator failures.
    fn do_unsubscribe(&self, url: &Url, listener: &Arc<dyn NotifyListener>) -> anyhow::Result<()>;

    fn is_available(&self) -> bool;
}
