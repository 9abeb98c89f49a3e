//! Per-service change notification.

use dashmap::DashMap;
use tracing::debug;

use lodestar_core::event::{invoke_listener, same_listener};
use lodestar_core::ListenerRef;

use super::event::ServiceDiscoveryChangeEvent;

/// Fans a [`ServiceDiscoveryChangeEvent`] out to the listeners registered
/// for its service name.
pub trait ServiceDiscoveryChangeNotifier: Send + Sync {
    /// Adds `listener` for `service_name`. Re-adding the same listener is a
    /// no-op.
    fn add_listener(&self, service_name: &str, listener: ListenerRef);

    /// Removes `listener` for `service_name` if present.
    fn remove_listener(&self, service_name: &str, listener: &ListenerRef);

    fn remove_all_listeners(&self, service_name: &str);

    /// Invokes every listener for `event.service_name` in insertion order on
    /// the calling thread.
    fn notify(&self, event: &ServiceDiscoveryChangeEvent);
}

/// Listener buckets keyed by service name, created on first add.
#[derive(Default)]
pub struct DefaultServiceDiscoveryChangeNotifier {
    listeners: DashMap<String, Vec<ListenerRef>>,
}

impl DefaultServiceDiscoveryChangeNotifier {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn listener_count(&self, service_name: &str) -> usize {
        self.listeners
            .get(service_name)
            .map_or(0, |bucket| bucket.len())
    }
}

impl ServiceDiscoveryChangeNotifier for DefaultServiceDiscoveryChangeNotifier {
    fn add_listener(&self, service_name: &str, listener: ListenerRef) {
        let mut bucket = self.listeners.entry(service_name.to_string()).or_default();
        if !bucket.iter().any(|known| same_listener(known, &listener)) {
            bucket.push(listener);
        }
    }

    fn remove_listener(&self, service_name: &str, listener: &ListenerRef) {
        if let Some(mut bucket) = self.listeners.get_mut(service_name) {
            bucket.retain(|existing| !same_listener(existing, listener));
        }
    }

    fn remove_all_listeners(&self, service_name: &str) {
        if let Some(mut bucket) = self.listeners.get_mut(service_name) {
            bucket.clear();
        }
    }

    fn notify(&self, event: &ServiceDiscoveryChangeEvent) {
        // Clone out of the shard so listeners may re-enter the notifier.
        let Some(bucket) = self
            .listeners
            .get(&event.service_name)
            .map(|bucket| bucket.clone())
        else {
            return;
        };
        debug!(
            service = %event.service_name,
            listeners = bucket.len(),
            instances = event.instances.len(),
            "notify service change"
        );
        for listener in &bucket {
            invoke_listener(listener.as_ref(), event);
        }
    }
}
