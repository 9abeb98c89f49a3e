//! Process-local discovery source.

use std::collections::BTreeSet;
use std::sync::Arc;

use dashmap::DashMap;
use tracing::debug;

use lodestar_core::ListenerRef;

use super::discovery::{ServiceDiscovery, ServiceRegistry};
use super::event::ServiceDiscoveryChangeEvent;
use super::instance::ServiceInstance;
use super::notifier::{DefaultServiceDiscoveryChangeNotifier, ServiceDiscoveryChangeNotifier};

/// A discovery source that is also its own registry.
///
/// Instances are kept per service name in registration order. Every
/// membership change notifies that service's change listeners with the
/// full new instance list.
pub struct InMemoryServiceDiscovery {
    name: String,
    instances: DashMap<String, Vec<ServiceInstance>>,
    notifier: Arc<dyn ServiceDiscoveryChangeNotifier>,
}

impl InMemoryServiceDiscovery {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_notifier(name, Arc::new(DefaultServiceDiscoveryChangeNotifier::new()))
    }

    #[must_use]
    pub fn with_notifier(
        name: impl Into<String>,
        notifier: Arc<dyn ServiceDiscoveryChangeNotifier>,
    ) -> Self {
        Self {
            name: name.into(),
            instances: DashMap::new(),
            notifier,
        }
    }

    /// Adds `instance`, or replaces the stored record with the same
    /// identity. Returns whether it was newly added.
    pub fn add_instance(&self, instance: ServiceInstance) -> bool {
        let service_name = instance.service_name.clone();
        let (added, instances) = {
            let mut bucket = self.instances.entry(service_name.clone()).or_default();
            let added = match bucket.iter_mut().find(|existing| **existing == instance) {
                Some(slot) => {
                    *slot = instance;
                    false
                }
                None => {
                    bucket.push(instance);
                    true
                }
            };
            (added, bucket.clone())
        };
        self.publish(&service_name, instances);
        added
    }

    /// Replaces the stored instance with the same identity. Returns `false`
    /// if there was none.
    pub fn update_instance(&self, instance: ServiceInstance) -> bool {
        let service_name = instance.service_name.clone();
        let updated = self
            .instances
            .get_mut(&service_name)
            .and_then(|mut bucket| {
                let slot = bucket.iter_mut().find(|existing| **existing == instance)?;
                *slot = instance;
                Some(bucket.clone())
            });
        match updated {
            Some(instances) => {
                self.publish(&service_name, instances);
                true
            }
            None => false,
        }
    }

    /// Removes the stored instance with the same identity. Returns `false`
    /// if there was none.
    pub fn remove_instance(&self, instance: &ServiceInstance) -> bool {
        let removed = self
            .instances
            .get_mut(&instance.service_name)
            .and_then(|mut bucket| {
                let before = bucket.len();
                bucket.retain(|existing| existing != instance);
                (bucket.len() != before).then(|| bucket.clone())
            });
        match removed {
            Some(instances) => {
                self.publish(&instance.service_name, instances);
                true
            }
            None => false,
        }
    }

    fn snapshot(&self, service_name: &str) -> Vec<ServiceInstance> {
        self.instances
            .get(service_name)
            .map(|bucket| bucket.clone())
            .unwrap_or_default()
    }

    /// `instances` is the set as it stood right after the change, taken
    /// under the bucket guard.
    fn publish(&self, service_name: &str, instances: Vec<ServiceInstance>) {
        debug!(
            discovery = %self.name,
            service = service_name,
            instances = instances.len(),
            "instance set changed"
        );
        self.notifier.notify(&ServiceDiscoveryChangeEvent::new(
            self.name.clone(),
            service_name,
            instances,
        ));
    }
}

impl ServiceRegistry for InMemoryServiceDiscovery {
    fn register(&self, instance: ServiceInstance) -> anyhow::Result<()> {
        self.add_instance(instance);
        Ok(())
    }

    fn update(&self, instance: ServiceInstance) -> anyhow::Result<()> {
        self.update_instance(instance);
        Ok(())
    }

    fn unregister(&self, instance: &ServiceInstance) -> anyhow::Result<()> {
        self.remove_instance(instance);
        Ok(())
    }
}

impl ServiceDiscovery for InMemoryServiceDiscovery {
    fn name(&self) -> &str {
        &self.name
    }

    fn get_services(&self) -> anyhow::Result<BTreeSet<String>> {
        Ok(self
            .instances
            .iter()
            .filter(|entry| !entry.value().is_empty())
            .map(|entry| entry.key().clone())
            .collect())
    }

    fn get_instances(&self, service_name: &str) -> anyhow::Result<Vec<ServiceInstance>> {
        Ok(self.snapshot(service_name))
    }

    fn add_change_listener(&self, service_name: &str, listener: ListenerRef) -> anyhow::Result<()> {
        self.notifier.add_listener(service_name, listener);
        Ok(())
    }

    fn remove_change_listener(&self, service_name: &str, listener: &ListenerRef) {
        self.notifier.remove_listener(service_name, listener);
    }
}
