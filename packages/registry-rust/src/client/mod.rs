//! Instance-level service discovery.
//!
//! - [`ServiceInstance`] / [`Page`]: the instance record and windowed results
//! - [`ServiceRegistry`] / [`ServiceDiscovery`]: write and read contracts
//! - [`InMemoryServiceDiscovery`], [`BackendServiceDiscovery`]: sources
//! - [`CompositeServiceDiscovery`]: several sources behind one interface
//! - [`ServiceDiscoveryChangeNotifier`]: per-service change fan-out
//! - [`EventPublishingServiceRegistry`]: lifecycle events around a registry

pub mod backend;
pub mod composite;
pub mod discovery;
pub mod event;
pub mod event_publishing;
pub mod in_memory;
pub mod instance;
pub mod notifier;
pub mod page;

pub use backend::{BackendServiceDiscovery, DiscoveryBackend, WatchCallback};
pub use composite::CompositeServiceDiscovery;
pub use discovery::{ServiceDiscovery, ServiceRegistry};
pub use event::{
    InstanceEventKind, ServiceDiscoveryChangeEvent, ServiceInstanceEvent,
    ServiceRegistryLifecycleEvent,
};
pub use event_publishing::EventPublishingServiceRegistry;
pub use in_memory::InMemoryServiceDiscovery;
pub use instance::ServiceInstance;
pub use notifier::{DefaultServiceDiscoveryChangeNotifier, ServiceDiscoveryChangeNotifier};
pub use page::Page;
