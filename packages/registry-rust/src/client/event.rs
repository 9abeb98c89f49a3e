//! Events raised by registries and discovery sources.

use std::any::Any;

use lodestar_core::event::ROOT_EVENT;
use lodestar_core::{Event, EventMetadata, EventType};

use super::instance::ServiceInstance;

/// Parent of every per-instance lifecycle event.
pub static SERVICE_INSTANCE: EventType = EventType::new("service-instance", &ROOT_EVENT);
pub static SERVICE_INSTANCE_PRE_REGISTERED: EventType =
    EventType::new("service-instance-pre-registered", &SERVICE_INSTANCE);
pub static SERVICE_INSTANCE_REGISTERED: EventType =
    EventType::new("service-instance-registered", &SERVICE_INSTANCE);
pub static SERVICE_INSTANCE_UPDATED: EventType =
    EventType::new("service-instance-updated", &SERVICE_INSTANCE);
pub static SERVICE_INSTANCE_UNREGISTERED: EventType =
    EventType::new("service-instance-unregistered", &SERVICE_INSTANCE);

/// Parent of registry start/stop events.
pub static SERVICE_REGISTRY_LIFECYCLE: EventType =
    EventType::new("service-registry-lifecycle", &ROOT_EVENT);
pub static SERVICE_REGISTRY_STARTED: EventType =
    EventType::new("service-registry-started", &SERVICE_REGISTRY_LIFECYCLE);
pub static SERVICE_REGISTRY_STOPPED: EventType =
    EventType::new("service-registry-stopped", &SERVICE_REGISTRY_LIFECYCLE);

pub static SERVICE_DISCOVERY_CHANGE: EventType =
    EventType::new("service-discovery-change", &ROOT_EVENT);

// ---------------------------------------------------------------------------
// Instance lifecycle
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceEventKind {
    PreRegistered,
    Registered,
    Updated,
    Unregistered,
}

impl InstanceEventKind {
    #[must_use]
    pub fn event_type(self) -> &'static EventType {
        match self {
            Self::PreRegistered => &SERVICE_INSTANCE_PRE_REGISTERED,
            Self::Registered => &SERVICE_INSTANCE_REGISTERED,
            Self::Updated => &SERVICE_INSTANCE_UPDATED,
            Self::Unregistered => &SERVICE_INSTANCE_UNREGISTERED,
        }
    }
}

/// Something happened to one service instance.
#[derive(Debug, Clone)]
pub struct ServiceInstanceEvent {
    pub kind: InstanceEventKind,
    pub meta: EventMetadata,
    pub instance: ServiceInstance,
}

impl ServiceInstanceEvent {
    #[must_use]
    pub fn new(
        kind: InstanceEventKind,
        source: impl Into<String>,
        instance: ServiceInstance,
    ) -> Self {
        Self {
            kind,
            meta: EventMetadata::new(source),
            instance,
        }
    }

    #[must_use]
    pub fn pre_registered(source: impl Into<String>, instance: ServiceInstance) -> Self {
        Self::new(InstanceEventKind::PreRegistered, source, instance)
    }

    #[must_use]
    pub fn registered(source: impl Into<String>, instance: ServiceInstance) -> Self {
        Self::new(InstanceEventKind::Registered, source, instance)
    }

    #[must_use]
    pub fn updated(source: impl Into<String>, instance: ServiceInstance) -> Self {
        Self::new(InstanceEventKind::Updated, source, instance)
    }

    #[must_use]
    pub fn unregistered(source: impl Into<String>, instance: ServiceInstance) -> Self {
        Self::new(InstanceEventKind::Unregistered, source, instance)
    }
}

impl Event for ServiceInstanceEvent {
    fn event_type(&self) -> &'static EventType {
        self.kind.event_type()
    }

    fn source(&self) -> &str {
        &self.meta.source
    }

    fn timestamp(&self) -> u64 {
        self.meta.timestamp
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// ---------------------------------------------------------------------------
// Registry lifecycle
// ---------------------------------------------------------------------------

/// A registry was started or stopped.
#[derive(Debug, Clone)]
pub struct ServiceRegistryLifecycleEvent {
    pub started: bool,
    pub meta: EventMetadata,
}

impl ServiceRegistryLifecycleEvent {
    #[must_use]
    pub fn started(source: impl Into<String>) -> Self {
        Self {
            started: true,
            meta: EventMetadata::new(source),
        }
    }

    #[must_use]
    pub fn stopped(source: impl Into<String>) -> Self {
        Self {
            started: false,
            meta: EventMetadata::new(source),
        }
    }
}

impl Event for ServiceRegistryLifecycleEvent {
    fn event_type(&self) -> &'static EventType {
        if self.started {
            &SERVICE_REGISTRY_STARTED
        } else {
            &SERVICE_REGISTRY_STOPPED
        }
    }

    fn source(&self) -> &str {
        &self.meta.source
    }

    fn timestamp(&self) -> u64 {
        self.meta.timestamp
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// ---------------------------------------------------------------------------
// Discovery change
// ---------------------------------------------------------------------------

/// The instance set of one service changed. Carries the complete new set.
#[derive(Debug, Clone)]
pub struct ServiceDiscoveryChangeEvent {
    pub meta: EventMetadata,
    pub service_name: String,
    pub instances: Vec<ServiceInstance>,
}

impl ServiceDiscoveryChangeEvent {
    #[must_use]
    pub fn new(
        source: impl Into<String>,
        service_name: impl Into<String>,
        instances: Vec<ServiceInstance>,
    ) -> Self {
        Self {
            meta: EventMetadata::new(source),
            service_name: service_name.into(),
            instances,
        }
    }
}

impl Event for ServiceDiscoveryChangeEvent {
    fn event_type(&self) -> &'static EventType {
        &SERVICE_DISCOVERY_CHANGE
    }

    fn source(&self) -> &str {
        &self.meta.source
    }

    fn timestamp(&self) -> u64 {
        self.meta.timestamp
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
