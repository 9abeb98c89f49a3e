//! Registry decorator that publishes lifecycle events.

use std::sync::Arc;

use lodestar_core::{DispatchError, EventDispatcher, Listenable, ListenerRef};

use super::discovery::ServiceRegistry;
use super::event::{ServiceInstanceEvent, ServiceRegistryLifecycleEvent};
use super::instance::ServiceInstance;

/// Wraps a [`ServiceRegistry`] and dispatches a [`ServiceInstanceEvent`] or
/// [`ServiceRegistryLifecycleEvent`] around each call.
///
/// `register` publishes pre-registered before delegating and registered
/// after. Other calls publish after the delegate succeeds. A failing
/// delegate publishes nothing further and its error is returned as is.
pub struct EventPublishingServiceRegistry {
    source: String,
    delegate: Arc<dyn ServiceRegistry>,
    dispatcher: Arc<EventDispatcher>,
}

impl EventPublishingServiceRegistry {
    #[must_use]
    pub fn new(
        source: impl Into<String>,
        delegate: Arc<dyn ServiceRegistry>,
        dispatcher: Arc<EventDispatcher>,
    ) -> Self {
        Self {
            source: source.into(),
            delegate,
            dispatcher,
        }
    }

    #[must_use]
    pub fn dispatcher(&self) -> &Arc<EventDispatcher> {
        &self.dispatcher
    }
}

impl ServiceRegistry for EventPublishingServiceRegistry {
    fn register(&self, instance: ServiceInstance) -> anyhow::Result<()> {
        let source = self.source.as_str();
        let event = ServiceInstanceEvent::pre_registered(source, instance.clone());
        self.dispatcher.dispatch_event(event);
        self.delegate.register(instance.clone())?;
        self.dispatcher
            .dispatch_event(ServiceInstanceEvent::registered(source, instance));
        Ok(())
    }

    fn update(&self, instance: ServiceInstance) -> anyhow::Result<()> {
        self.delegate.update(instance.clone())?;
        let event = ServiceInstanceEvent::updated(self.source.as_str(), instance);
        self.dispatcher.dispatch_event(event);
        Ok(())
    }

    fn unregister(&self, instance: &ServiceInstance) -> anyhow::Result<()> {
        self.delegate.unregister(instance)?;
        let event = ServiceInstanceEvent::unregistered(self.source.as_str(), instance.clone());
        self.dispatcher.dispatch_event(event);
        Ok(())
    }

    fn start(&self) -> anyhow::Result<()> {
        self.delegate.start()?;
        self.dispatcher
            .dispatch_event(ServiceRegistryLifecycleEvent::started(self.source.as_str()));
        Ok(())
    }

    fn stop(&self) -> anyhow::Result<()> {
        self.delegate.stop()?;
        self.dispatcher
            .dispatch_event(ServiceRegistryLifecycleEvent::stopped(self.source.as_str()));
        Ok(())
    }
}

impl Listenable for EventPublishingServiceRegistry {
    fn add_listener(&self, listener: ListenerRef) -> Result<(), DispatchError> {
        self.dispatcher.add_listener(listener)
    }

    fn remove_listener(&self, listener: &ListenerRef) -> Result<(), DispatchError> {
        self.dispatcher.remove_listener(listener)
    }

    fn get_all_listeners(&self) -> Vec<ListenerRef> {
        self.dispatcher.get_all_listeners()
    }
}

#[cfg(test)]
mod tests {
    use anyhow::bail;
    use parking_lot::Mutex;

    use lodestar_core::event::FnListener;
    use lodestar_core::Event;

    use super::*;
    use crate::client::event::{SERVICE_INSTANCE, SERVICE_REGISTRY_LIFECYCLE};
    use crate::client::in_memory::InMemoryServiceDiscovery;

    struct FailingRegistry;

    impl ServiceRegistry for FailingRegistry {
        fn register(&self, _instance: ServiceInstance) -> anyhow::Result<()> {
            bail!("backend unavailable")
        }

        fn update(&self, _instance: ServiceInstance) -> anyhow::Result<()> {
            bail!("backend unavailable")
        }

        fn unregister(&self, _instance: &ServiceInstance) -> anyhow::Result<()> {
            bail!("backend unavailable")
        }
    }

    fn recorder(registry: &EventPublishingServiceRegistry) -> Arc<Mutex<Vec<&'static str>>> {
        let log = Arc::new(Mutex::new(Vec::new()));
        for event_type in [&SERVICE_INSTANCE, &SERVICE_REGISTRY_LIFECYCLE] {
            let sink = Arc::clone(&log);
            registry
                .add_listener(Arc::new(FnListener::new(event_type, move |event: &dyn Event| {
                    sink.lock().push(event.event_type().name());
                })))
                .unwrap();
        }
        log
    }

    #[test]
    fn publishes_around_each_call() {
        let registry = EventPublishingServiceRegistry::new(
            "test-registry",
            Arc::new(InMemoryServiceDiscovery::new("memory")),
            Arc::new(EventDispatcher::new()),
        );
        let log = recorder(&registry);
        let instance = ServiceInstance::new("A", "h", 1);

        registry.start().unwrap();
        registry.register(instance.clone()).unwrap();
        let unhealthy = instance.clone().with_healthy(false);
        registry.update(unhealthy).unwrap();
        registry.unregister(&instance).unwrap();
        registry.stop().unwrap();

        assert_eq!(
            *log.lock(),
            vec![
                "service-registry-started",
                "service-instance-pre-registered",
                "service-instance-registered",
                "service-instance-updated",
                "service-instance-unregistered",
                "service-registry-stopped",
            ]
        );
        assert_eq!(registry.get_all_listeners().len(), 2);
    }

    #[test]
    fn delegate_failure_is_returned_unchanged() {
        let registry = EventPublishingServiceRegistry::new(
            "test-registry",
            Arc::new(FailingRegistry),
            Arc::new(EventDispatcher::new()),
        );
        let log = recorder(&registry);
        let instance = ServiceInstance::new("A", "h", 1);

        let err = registry.register(instance.clone()).unwrap_err();
        assert_eq!(err.to_string(), "backend unavailable");
        assert_eq!(*log.lock(), vec!["service-instance-pre-registered"]);

        assert!(registry.unregister(&instance).is_err());
        assert_eq!(log.lock().len(), 1);
    }

    #[test]
    fn events_carry_the_instance() {
        let registry = EventPublishingServiceRegistry::new(
            "test-registry",
            Arc::new(InMemoryServiceDiscovery::new("memory")),
            Arc::new(EventDispatcher::new()),
        );
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        registry
            .add_listener(Arc::new(FnListener::new(&SERVICE_INSTANCE, move |event: &dyn Event| {
                if let Some(event) = event.downcast_ref::<ServiceInstanceEvent>() {
                    let seen = (event.source().to_string(), event.instance.port);
                    sink.lock().push(seen);
                }
            })))
            .unwrap();

        registry
            .register(ServiceInstance::new("A", "h", 7))
            .unwrap();
        let expected = ("test-registry".to_string(), 7);
        assert_eq!(*seen.lock(), vec![expected.clone(), expected]);
    }
}
