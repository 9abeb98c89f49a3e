//! Instance-level registry.
//!
//! Provider URLs are not pushed to a remote registry. They are recorded in
//! the local [`InMemoryMetadataService`], and consumers resolve an interface
//! to instances at subscribe time: interface -> owning service names (from
//! dynamic configuration) -> instances (from service discovery) -> URLs.

use std::sync::{Arc, Weak};

use dashmap::DashMap;
use tracing::{debug, info, warn};

use lodestar_core::metadata::METADATA_SERVICE_INTERFACE;
use lodestar_core::url::PROTOCOL_KEY;
use lodestar_core::{Event, EventListener, EventType, InMemoryMetadataService, ListenerRef, Url};

use super::dynamic_config::DynamicConfiguration;
use super::{NotifyListener, RegistryHooks};
use crate::client::event::SERVICE_DISCOVERY_CHANGE;
use crate::client::{ServiceDiscovery, ServiceInstance};
use crate::config::{RegistryConfig, DEFAULT_SERVICES_MAPPING_GROUP};
use crate::error::RegistryError;

fn same_notify_listener(a: &Arc<dyn NotifyListener>, b: &Arc<dyn NotifyListener>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

/// URL for one instance of the subscribed interface.
///
/// The protocol comes from the subscription's `protocol` parameter, falling
/// back to its own protocol. Instance metadata becomes the parameters.
fn instance_url(subscribed: &Url, instance: &ServiceInstance) -> Url {
    let protocol = subscribed
        .parameter(PROTOCOL_KEY)
        .filter(|p| !p.is_empty())
        .unwrap_or(subscribed.protocol());
    instance.metadata.iter().fold(
        Url::new(
            protocol,
            instance.host.as_str(),
            Some(instance.port),
            subscribed.service_interface(),
        ),
        |url, (key, value)| url.with_parameter(key.as_str(), value.as_str()),
    )
}

/// Instances of every service in `service_names`, in name order, as URLs.
fn instance_urls(
    discovery: &dyn ServiceDiscovery,
    subscribed: &Url,
    service_names: &[String],
) -> anyhow::Result<Vec<Url>> {
    let mut urls = Vec::new();
    for service_name in service_names {
        urls.extend(
            discovery
                .get_instances(service_name)?
                .iter()
                .map(|instance| instance_url(subscribed, instance)),
        );
    }
    Ok(urls)
}

/// Re-delivers the full snapshot whenever one of the resolved services
/// changes membership.
struct InstanceWatcher {
    discovery: Weak<dyn ServiceDiscovery>,
    subscribed: Url,
    service_names: Vec<String>,
    listener: Arc<dyn NotifyListener>,
}

impl EventListener for InstanceWatcher {
    fn declared_event_type(&self) -> Option<&'static EventType> {
        Some(&SERVICE_DISCOVERY_CHANGE)
    }

    fn on_event(&self, event: &dyn Event) {
        let Some(discovery) = self.discovery.upgrade() else {
            return;
        };
        match instance_urls(discovery.as_ref(), &self.subscribed, &self.service_names) {
            Ok(urls) => {
                debug!(
                    url = %self.subscribed,
                    source = event.source(),
                    urls = urls.len(),
                    "re-delivering subscription"
                );
                self.listener.notify(urls);
            }
            Err(err) => {
                warn!(url = %self.subscribed, error = %err, "failed to refresh subscription");
            }
        }
    }
}

struct Subscription {
    listener: Arc<dyn NotifyListener>,
    watcher: ListenerRef,
    service_names: Vec<String>,
}

/// Registry that registers instances rather than interface URLs.
///
/// Performs no network I/O of its own, so [`RegistryHooks::is_available`]
/// is always `false`; availability lives in the discovery backend.
pub struct ServiceOrientedRegistry {
    url: Url,
    services_mapping_group: String,
    metadata: Arc<InMemoryMetadataService>,
    discovery: Arc<dyn ServiceDiscovery>,
    dynamic_config: Arc<dyn DynamicConfiguration>,
    /// Active general-service subscriptions keyed by canonical URL.
    subscriptions: DashMap<String, Vec<Subscription>>,
}

impl ServiceOrientedRegistry {
    #[must_use]
    pub fn new(
        url: Url,
        metadata: Arc<InMemoryMetadataService>,
        discovery: Arc<dyn ServiceDiscovery>,
        dynamic_config: Arc<dyn DynamicConfiguration>,
    ) -> Self {
        Self {
            url,
            services_mapping_group: DEFAULT_SERVICES_MAPPING_GROUP.to_string(),
            metadata,
            discovery,
            dynamic_config,
            subscriptions: DashMap::new(),
        }
    }

    /// Builds a registry using the mapping group from `config`.
    #[must_use]
    pub fn from_config(
        url: Url,
        config: &RegistryConfig,
        metadata: Arc<InMemoryMetadataService>,
        discovery: Arc<dyn ServiceDiscovery>,
        dynamic_config: Arc<dyn DynamicConfiguration>,
    ) -> Self {
        Self::new(url, metadata, discovery, dynamic_config)
            .with_services_mapping_group(config.services_mapping_group.as_str())
    }

    #[must_use]
    pub fn with_services_mapping_group(mut self, group: impl Into<String>) -> Self {
        self.services_mapping_group = group.into();
        self
    }

    #[must_use]
    pub fn metadata(&self) -> &Arc<InMemoryMetadataService> {
        &self.metadata
    }

    /// Only provider-side URLs are registered.
    #[must_use]
    pub fn should_register(&self, url: &Url) -> bool {
        let should = url.is_provider();
        if !should {
            debug!(url = %url, "url is not provider-side, skipping registration");
        }
        should
    }

    /// Whether `url` subscribes to the metadata service itself.
    #[must_use]
    pub fn is_metadata_service_url(&self, url: &Url) -> bool {
        url.service_interface() == METADATA_SERVICE_INTERFACE
    }

    /// Service names that own `interface`, in configured order without
    /// duplicates. Blank or missing configuration yields none.
    ///
    /// # Errors
    ///
    /// Propagates configuration lookup failures.
    pub fn find_service_names(&self, interface: &str) -> anyhow::Result<Vec<String>> {
        let Some(value) = self
            .dynamic_config
            .get_config(interface, &self.services_mapping_group)?
        else {
            return Ok(Vec::new());
        };
        let mut names: Vec<String> = Vec::new();
        for name in value.split(',').map(str::trim).filter(|n| !n.is_empty()) {
            if !names.iter().any(|existing| existing == name) {
                names.push(name.to_string());
            }
        }
        Ok(names)
    }

    /// Number of active general-service subscriptions for `url`.
    #[must_use]
    pub fn subscription_count(&self, url: &Url) -> usize {
        self.subscriptions
            .get(&url.to_full_string())
            .map_or(0, |subscriptions| subscriptions.len())
    }

    fn subscribe_metadata_service_urls(
        &self,
        url: &Url,
        listener: &Arc<dyn NotifyListener>,
    ) -> Result<(), RegistryError> {
        let exported = self.metadata.get_exported_urls_by_protocol(
            url.service_interface(),
            url.group(),
            url.version(),
            url.parameter(PROTOCOL_KEY),
        );
        let urls = exported
            .iter()
            .map(|full| Url::parse(full))
            .collect::<Result<Vec<_>, _>>()?;
        debug!(url = %url, urls = urls.len(), "delivering metadata service urls");
        listener.notify(urls);
        Ok(())
    }

    /// Installs the watchers before the initial query, so a membership
    /// change that lands in between is re-delivered rather than lost.
    fn subscribe_service_urls(
        &self,
        url: &Url,
        listener: &Arc<dyn NotifyListener>,
    ) -> anyhow::Result<()> {
        let service_names = self.find_service_names(url.service_interface())?;
        let watcher: ListenerRef = Arc::new(InstanceWatcher {
            discovery: Arc::downgrade(&self.discovery),
            subscribed: url.clone(),
            service_names: service_names.clone(),
            listener: Arc::clone(listener),
        });
        for (i, service_name) in service_names.iter().enumerate() {
            if let Err(err) = self
                .discovery
                .add_change_listener(service_name, Arc::clone(&watcher))
            {
                self.unwatch(&service_names[..=i], &watcher);
                return Err(err);
            }
        }

        let urls = match instance_urls(self.discovery.as_ref(), url, &service_names) {
            Ok(urls) => urls,
            Err(err) => {
                self.unwatch(&service_names, &watcher);
                return Err(err);
            }
        };
        debug!(
            url = %url,
            services = ?service_names,
            urls = urls.len(),
            "delivering service instance urls"
        );
        listener.notify(urls);

        self.subscriptions
            .entry(url.to_full_string())
            .or_default()
            .push(Subscription {
                listener: Arc::clone(listener),
                watcher,
                service_names,
            });
        Ok(())
    }

    fn unwatch(&self, service_names: &[String], watcher: &ListenerRef) {
        for service_name in service_names {
            self.discovery.remove_change_listener(service_name, watcher);
        }
    }

    fn remove_subscription(&self, url: &Url, listener: &Arc<dyn NotifyListener>) {
        let key = url.to_full_string();
        let removed: Vec<Subscription> = match self.subscriptions.get_mut(&key) {
            Some(mut subscriptions) => {
                let (removed, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut *subscriptions)
                    .into_iter()
                    .partition(|s| same_notify_listener(&s.listener, listener));
                *subscriptions = kept;
                removed
            }
            None => return,
        };
        self.subscriptions
            .remove_if(&key, |_, subscriptions| subscriptions.is_empty());

        for subscription in removed {
            self.unwatch(&subscription.service_names, &subscription.watcher);
        }
    }
}

impl RegistryHooks for ServiceOrientedRegistry {
    fn url(&self) -> &Url {
        &self.url
    }

    fn do_register(&self, url: &Url) -> anyhow::Result<()> {
        if !self.should_register(url) {
            return Ok(());
        }
        if self.metadata.export_url(url) {
            info!(url = %url, "url registered");
        } else {
            info!(url = %url, "url already registered");
        }
        Ok(())
    }

    fn do_unregister(&self, url: &Url) -> anyhow::Result<()> {
        if !self.should_register(url) {
            return Ok(());
        }
        if self.metadata.unexport_url(url) {
            info!(url = %url, "url deregistered");
        } else {
            info!(url = %url, "url not registered");
        }
        Ok(())
    }

    fn do_subscribe(&self, url: &Url, listener: Arc<dyn NotifyListener>) -> anyhow::Result<()> {
        if self.is_metadata_service_url(url) {
            self.subscribe_metadata_service_urls(url, &listener)?;
        } else {
            // Re-subscribing the same listener replaces its watchers.
            self.remove_subscription(url, &listener);
            self.subscribe_service_urls(url, &listener)?;
        }
        self.metadata.subscribe_service_url(url);
        Ok(())
    }

    fn do_unsubscribe(&self, url: &Url, listener: &Arc<dyn NotifyListener>) -> anyhow::Result<()> {
        self.remove_subscription(url, listener);
        if self.metadata.unsubscribe_url(url) {
            info!(url = %url, "url unsubscribed");
        }
        Ok(())
    }

    fn is_available(&self) -> bool {
        false
    }
}
