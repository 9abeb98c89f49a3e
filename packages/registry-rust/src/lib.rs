//! Lodestar Registry — instance-level service discovery and registration.
//!
//! - [`client`]: service instances, paging, discovery sources, change
//!   notification and lifecycle events
//! - [`support`]: the service-oriented registry and dynamic configuration
//! - [`config`] / [`logging`]: node configuration and tracing bootstrap

pub mod client;
pub mod config;
pub mod error;
pub mod logging;
pub mod support;

pub use client::{
    BackendServiceDiscovery, CompositeServiceDiscovery, DiscoveryBackend,
    EventPublishingServiceRegistry, InMemoryServiceDiscovery, Page, ServiceDiscovery,
    ServiceInstance, ServiceRegistry,
};
pub use config::{DispatchMode, LoggingConfig, RegistryConfig};
pub use error::RegistryError;
pub use logging::init_logging;
pub use support::{NotifyListener, RegistryHooks, ServiceOrientedRegistry};
