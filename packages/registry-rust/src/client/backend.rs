//! Discovery over a pluggable storage backend.
//!
//! The backend stores instances and calls back when a watched service's
//! instance set changes. [`BackendServiceDiscovery`] turns each callback into
//! a [`ServiceDiscoveryChangeEvent`] carrying a fresh query result, dispatches
//! it, and a bridge listener on the dispatcher hands it to the per-service
//! change notifier.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::{Arc, Weak};

use dashmap::DashSet;
use parking_lot::Mutex;
use tracing::{debug, warn};

use lodestar_core::{Event, EventDispatcher, EventListener, EventType, Listenable, ListenerRef};

use super::discovery::{ServiceDiscovery, ServiceRegistry};
use super::event::{ServiceDiscoveryChangeEvent, SERVICE_DISCOVERY_CHANGE};
use super::instance::ServiceInstance;
use super::notifier::{DefaultServiceDiscoveryChangeNotifier, ServiceDiscoveryChangeNotifier};
use crate::error::RegistryError;

/// Invoked by a backend with the name of a service whose instances changed.
pub type WatchCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// Storage and watch primitives of a discovery backend.
///
/// Calls may block on network I/O. Errors are returned to the caller of the
/// discovery or registry operation unchanged.
pub trait DiscoveryBackend: Send + Sync {
    /// # Errors
    ///
    /// Backend-specific.
    fn register_instance(&self, instance: &ServiceInstance) -> anyhow::Result<()>;

    /// # Errors
    ///
    /// Backend-specific.
    fn update_instance(&self, instance: &ServiceInstance) -> anyhow::Result<()>;

    /// # Errors
    ///
    /// Backend-specific.
    fn unregister_instance(&self, instance: &ServiceInstance) -> anyhow::Result<()>;

    /// # Errors
    ///
    /// Backend-specific.
    fn start(&self) -> anyhow::Result<()> {
        Ok(())
    }

    /// # Errors
    ///
    /// Backend-specific.
    fn stop(&self) -> anyhow::Result<()> {
        Ok(())
    }

    /// # Errors
    ///
    /// Backend-specific.
    fn query_service_names(&self) -> anyhow::Result<BTreeSet<String>>;

    /// # Errors
    ///
    /// Backend-specific.
    fn query_instances(&self, service_name: &str) -> anyhow::Result<Vec<ServiceInstance>>;

    /// Starts watching `service_name`, calling `callback` on every change.
    ///
    /// # Errors
    ///
    /// Backend-specific.
    fn watch(&self, service_name: &str, callback: WatchCallback) -> anyhow::Result<()>;
}

/// Forwards dispatched change events to the notifier.
struct NotifierBridge {
    notifier: Arc<dyn ServiceDiscoveryChangeNotifier>,
}

impl EventListener for NotifierBridge {
    fn declared_event_type(&self) -> Option<&'static EventType> {
        Some(&SERVICE_DISCOVERY_CHANGE)
    }

    fn on_event(&self, event: &dyn Event) {
        if let Some(change) = event.downcast_ref::<ServiceDiscoveryChangeEvent>() {
            self.notifier.notify(change);
        }
    }
}

/// [`ServiceRegistry`] and [`ServiceDiscovery`] over a [`DiscoveryBackend`].
///
/// A backend watch is installed the first time a change listener is added
/// for a service name, and at most once per name. A name counts as watched
/// only once the backend accepted the watch.
pub struct BackendServiceDiscovery {
    name: String,
    backend: Arc<dyn DiscoveryBackend>,
    dispatcher: Arc<EventDispatcher>,
    notifier: Arc<dyn ServiceDiscoveryChangeNotifier>,
    watched: DashSet<String>,
    /// Held across the check, the backend call and the insert into `watched`.
    watch_lock: Mutex<()>,
}

impl BackendServiceDiscovery {
    /// # Errors
    ///
    /// Returns [`RegistryError::Dispatch`] if the notifier bridge cannot be
    /// registered on `dispatcher`.
    pub fn new(
        name: impl Into<String>,
        backend: Arc<dyn DiscoveryBackend>,
        dispatcher: Arc<EventDispatcher>,
    ) -> Result<Self, RegistryError> {
        Self::with_notifier(
            name,
            backend,
            dispatcher,
            Arc::new(DefaultServiceDiscoveryChangeNotifier::new()),
        )
    }

    /// # Errors
    ///
    /// See [`BackendServiceDiscovery::new`].
    pub fn with_notifier(
        name: impl Into<String>,
        backend: Arc<dyn DiscoveryBackend>,
        dispatcher: Arc<EventDispatcher>,
        notifier: Arc<dyn ServiceDiscoveryChangeNotifier>,
    ) -> Result<Self, RegistryError> {
        let bridge: ListenerRef = Arc::new(NotifierBridge {
            notifier: Arc::clone(&notifier),
        });
        dispatcher.add_listener(bridge)?;
        Ok(Self {
            name: name.into(),
            backend,
            dispatcher,
            notifier,
            watched: DashSet::new(),
            watch_lock: Mutex::new(()),
        })
    }

    #[must_use]
    pub fn is_watching(&self, service_name: &str) -> bool {
        self.watched.contains(service_name)
    }

    fn watch_callback(&self) -> WatchCallback {
        let backend: Weak<dyn DiscoveryBackend> = Arc::downgrade(&self.backend);
        let dispatcher = Arc::clone(&self.dispatcher);
        let source = self.name.clone();
        Arc::new(move |service_name: &str| {
            let Some(backend) = backend.upgrade() else {
                return;
            };
            match backend.query_instances(service_name) {
                Ok(instances) => {
                    debug!(
                        discovery = %source,
                        service = service_name,
                        instances = instances.len(),
                        "backend reported change"
                    );
                    dispatcher.dispatch_event(ServiceDiscoveryChangeEvent::new(
                        source.as_str(),
                        service_name,
                        instances,
                    ));
                }
                Err(err) => {
                    warn!(
                        discovery = %source,
                        service = service_name,
                        error = %err,
                        "failed to query instances after change"
                    );
                }
            }
        })
    }
}

impl ServiceRegistry for BackendServiceDiscovery {
    fn register(&self, instance: ServiceInstance) -> anyhow::Result<()> {
        self.backend.register_instance(&instance)
    }

    fn update(&self, instance: ServiceInstance) -> anyhow::Result<()> {
        self.backend.update_instance(&instance)
    }

    fn unregister(&self, instance: &ServiceInstance) -> anyhow::Result<()> {
        self.backend.unregister_instance(instance)
    }

    fn start(&self) -> anyhow::Result<()> {
        self.backend.start()
    }

    fn stop(&self) -> anyhow::Result<()> {
        self.backend.stop()
    }
}

impl ServiceDiscovery for BackendServiceDiscovery {
    fn name(&self) -> &str {
        &self.name
    }

    fn get_services(&self) -> anyhow::Result<BTreeSet<String>> {
        self.backend.query_service_names()
    }

    fn get_instances(&self, service_name: &str) -> anyhow::Result<Vec<ServiceInstance>> {
        self.backend.query_instances(service_name)
    }

    fn add_change_listener(&self, service_name: &str, listener: ListenerRef) -> anyhow::Result<()> {
        self.notifier
            .add_listener(service_name, Arc::clone(&listener));
        let _guard = self.watch_lock.lock();
        if self.watched.contains(service_name) {
            return Ok(());
        }
        if let Err(err) = self.backend.watch(service_name, self.watch_callback()) {
            self.notifier.remove_listener(service_name, &listener);
            return Err(err);
        }
        self.watched.insert(service_name.to_string());
        debug!(discovery = %self.name, service = service_name, "watch installed");
        Ok(())
    }

    fn remove_change_listener(&self, service_name: &str, listener: &ListenerRef) {
        self.notifier.remove_listener(service_name, listener);
    }
}

impl fmt::Debug for BackendServiceDiscovery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendServiceDiscovery")
            .field("name", &self.name)
            .field("watched", &self.watched.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    use anyhow::bail;
    use dashmap::DashMap;

    use lodestar_core::event::{FnListener, TokioExecutor};

    use super::*;

    #[derive(Default)]
    struct MockBackend {
        instances: DashMap<String, Vec<ServiceInstance>>,
        watchers: Mutex<HashMap<String, Vec<WatchCallback>>>,
        watch_calls: AtomicUsize,
        watch_delay: Option<Duration>,
        fail_queries: AtomicBool,
    }

    impl MockBackend {
        fn fire(&self, service_name: &str) {
            let callbacks = self
                .watchers
                .lock()
                .get(service_name)
                .cloned()
                .unwrap_or_default();
            for callback in callbacks {
                callback(service_name);
            }
        }
    }

    impl DiscoveryBackend for MockBackend {
        fn register_instance(&self, instance: &ServiceInstance) -> anyhow::Result<()> {
            self.instances
                .entry(instance.service_name.clone())
                .or_default()
                .push(instance.clone());
            self.fire(&instance.service_name);
            Ok(())
        }

        fn update_instance(&self, instance: &ServiceInstance) -> anyhow::Result<()> {
            if let Some(mut bucket) = self.instances.get_mut(&instance.service_name) {
                if let Some(slot) = bucket.iter_mut().find(|e| **e == *instance) {
                    *slot = instance.clone();
                }
            }
            self.fire(&instance.service_name);
            Ok(())
        }

        fn unregister_instance(&self, instance: &ServiceInstance) -> anyhow::Result<()> {
            if let Some(mut bucket) = self.instances.get_mut(&instance.service_name) {
                bucket.retain(|existing| existing != instance);
            }
            self.fire(&instance.service_name);
            Ok(())
        }

        fn query_service_names(&self) -> anyhow::Result<BTreeSet<String>> {
            Ok(self.instances.iter().map(|e| e.key().clone()).collect())
        }

        fn query_instances(&self, service_name: &str) -> anyhow::Result<Vec<ServiceInstance>> {
            if self.fail_queries.load(Ordering::SeqCst) {
                bail!("backend down");
            }
            Ok(self
                .instances
                .get(service_name)
                .map(|bucket| bucket.clone())
                .unwrap_or_default())
        }

        fn watch(&self, service_name: &str, callback: WatchCallback) -> anyhow::Result<()> {
            self.watch_calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.watch_delay {
                std::thread::sleep(delay);
            }
            self.watchers
                .lock()
                .entry(service_name.to_string())
                .or_default()
                .push(callback);
            Ok(())
        }
    }

    struct UnwatchableBackend;

    impl DiscoveryBackend for UnwatchableBackend {
        fn register_instance(&self, _instance: &ServiceInstance) -> anyhow::Result<()> {
            Ok(())
        }

        fn update_instance(&self, _instance: &ServiceInstance) -> anyhow::Result<()> {
            Ok(())
        }

        fn unregister_instance(&self, _instance: &ServiceInstance) -> anyhow::Result<()> {
            Ok(())
        }

        fn query_service_names(&self) -> anyhow::Result<BTreeSet<String>> {
            Ok(BTreeSet::new())
        }

        fn query_instances(&self, _service_name: &str) -> anyhow::Result<Vec<ServiceInstance>> {
            Ok(Vec::new())
        }

        fn watch(&self, _service_name: &str, _callback: WatchCallback) -> anyhow::Result<()> {
            bail!("watch unsupported")
        }
    }

    fn sizes_listener(sizes: &Arc<Mutex<Vec<usize>>>) -> ListenerRef {
        let sink = Arc::clone(sizes);
        Arc::new(FnListener::new(&SERVICE_DISCOVERY_CHANGE, move |event: &dyn Event| {
            if let Some(change) = event.downcast_ref::<ServiceDiscoveryChangeEvent>() {
                sink.lock().push(change.instances.len());
            }
        }))
    }

    #[test]
    fn watch_is_installed_once_per_service() {
        let backend = Arc::new(MockBackend::default());
        let discovery = BackendServiceDiscovery::new(
            "mock",
            Arc::clone(&backend) as Arc<dyn DiscoveryBackend>,
            Arc::new(EventDispatcher::new()),
        )
        .unwrap();
        let sizes = Arc::new(Mutex::new(Vec::new()));

        discovery
            .add_change_listener("A", sizes_listener(&sizes))
            .unwrap();
        discovery
            .add_change_listener("A", sizes_listener(&sizes))
            .unwrap();
        discovery
            .add_change_listener("B", sizes_listener(&sizes))
            .unwrap();

        assert_eq!(backend.watch_calls.load(Ordering::SeqCst), 2);
        assert!(discovery.is_watching("A"));
        assert!(discovery.is_watching("B"));
        assert!(!discovery.is_watching("C"));
    }

    #[test]
    fn backend_changes_flow_through_dispatcher_to_listeners() {
        let backend = Arc::new(MockBackend::default());
        let dispatcher = Arc::new(EventDispatcher::new());
        let discovery = BackendServiceDiscovery::new(
            "mock",
            Arc::clone(&backend) as Arc<dyn DiscoveryBackend>,
            Arc::clone(&dispatcher),
        )
        .unwrap();
        let sizes = Arc::new(Mutex::new(Vec::new()));
        let listener = sizes_listener(&sizes);
        discovery
            .add_change_listener("A", Arc::clone(&listener))
            .unwrap();

        discovery
            .register(ServiceInstance::new("A", "h", 1))
            .unwrap();
        discovery
            .register(ServiceInstance::new("A", "h", 2))
            .unwrap();
        discovery
            .unregister(&ServiceInstance::new("A", "h", 1))
            .unwrap();
        assert_eq!(*sizes.lock(), vec![1, 2, 1]);

        // Unwatched service: no listener fires.
        discovery
            .register(ServiceInstance::new("B", "h", 1))
            .unwrap();
        assert_eq!(sizes.lock().len(), 3);

        discovery.remove_change_listener("A", &listener);
        discovery
            .register(ServiceInstance::new("A", "h", 3))
            .unwrap();
        assert_eq!(sizes.lock().len(), 3);

        assert_eq!(discovery.get_instances("A").unwrap().len(), 2);
        assert_eq!(discovery.get_services().unwrap().len(), 2);
        assert_eq!(dispatcher.get_all_listeners().len(), 1);
    }

    #[test]
    fn query_failures_propagate_and_silence_callbacks() {
        let backend = Arc::new(MockBackend::default());
        let discovery = BackendServiceDiscovery::new(
            "mock",
            Arc::clone(&backend) as Arc<dyn DiscoveryBackend>,
            Arc::new(EventDispatcher::new()),
        )
        .unwrap();
        let sizes = Arc::new(Mutex::new(Vec::new()));
        discovery
            .add_change_listener("A", sizes_listener(&sizes))
            .unwrap();

        backend.fail_queries.store(true, Ordering::SeqCst);
        let err = discovery.get_instances("A").unwrap_err();
        assert_eq!(err.to_string(), "backend down");

        backend.fire("A");
        assert!(sizes.lock().is_empty());
    }

    #[test]
    fn failed_watch_is_not_recorded() {
        let notifier = Arc::new(DefaultServiceDiscoveryChangeNotifier::new());
        let discovery = BackendServiceDiscovery::with_notifier(
            "unwatchable",
            Arc::new(UnwatchableBackend),
            Arc::new(EventDispatcher::new()),
            Arc::clone(&notifier) as Arc<dyn ServiceDiscoveryChangeNotifier>,
        )
        .unwrap();
        let sizes = Arc::new(Mutex::new(Vec::new()));

        let err = discovery
            .add_change_listener("A", sizes_listener(&sizes))
            .unwrap_err();
        assert_eq!(err.to_string(), "watch unsupported");
        assert!(!discovery.is_watching("A"));
        assert_eq!(notifier.listener_count("A"), 0);
    }

    #[test]
    fn concurrent_listeners_return_after_the_watch_exists() {
        let backend = Arc::new(MockBackend {
            watch_delay: Some(Duration::from_millis(50)),
            ..MockBackend::default()
        });
        let discovery = BackendServiceDiscovery::new(
            "mock",
            Arc::clone(&backend) as Arc<dyn DiscoveryBackend>,
            Arc::new(EventDispatcher::new()),
        )
        .unwrap();
        let discovery = Arc::new(discovery);
        let sizes = Arc::new(Mutex::new(Vec::new()));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let backend = Arc::clone(&backend);
                let discovery = Arc::clone(&discovery);
                let listener = sizes_listener(&sizes);
                std::thread::spawn(move || {
                    discovery.add_change_listener("A", listener).unwrap();
                    backend.watchers.lock().contains_key("A")
                })
            })
            .collect();
        for handle in handles {
            assert!(handle.join().unwrap());
        }
        assert_eq!(backend.watch_calls.load(Ordering::SeqCst), 1);

        discovery
            .register(ServiceInstance::new("A", "h", 1))
            .unwrap();
        assert_eq!(*sizes.lock(), vec![1, 1, 1, 1]);
    }

    #[test]
    fn dropped_backend_makes_callbacks_inert() {
        let backend = Arc::new(MockBackend::default());
        let discovery = BackendServiceDiscovery::new(
            "mock",
            Arc::clone(&backend) as Arc<dyn DiscoveryBackend>,
            Arc::new(EventDispatcher::new()),
        )
        .unwrap();
        let sizes = Arc::new(Mutex::new(Vec::new()));
        discovery
            .add_change_listener("A", sizes_listener(&sizes))
            .unwrap();

        let callback = backend.watchers.lock().get("A").unwrap()[0].clone();
        drop(discovery);
        drop(backend);
        callback("A");
        assert!(sizes.lock().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn async_dispatch_delivers_off_thread() {
        let backend = Arc::new(MockBackend::default());
        let executor = Arc::new(TokioExecutor::try_current().unwrap());
        let discovery = BackendServiceDiscovery::new(
            "mock",
            Arc::clone(&backend) as Arc<dyn DiscoveryBackend>,
            Arc::new(EventDispatcher::with_executor(executor)),
        )
        .unwrap();
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let listener: ListenerRef = Arc::new(FnListener::new(
            &SERVICE_DISCOVERY_CHANGE,
            move |event: &dyn Event| {
                if let Some(change) = event.downcast_ref::<ServiceDiscoveryChangeEvent>() {
                    let _ = tx.send(change.instances.len());
                }
            },
        ));
        discovery.add_change_listener("A", listener).unwrap();

        discovery
            .register(ServiceInstance::new("A", "h", 1))
            .unwrap();
        let size = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(size, 1);
    }
}
