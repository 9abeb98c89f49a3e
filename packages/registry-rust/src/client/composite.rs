//! Discovery over several sources at once.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use lodestar_core::event::HIGHEST_PRIORITY;
use lodestar_core::ListenerRef;

use super::discovery::ServiceDiscovery;
use super::instance::ServiceInstance;
use crate::error::RegistryError;

/// Concatenates the results of its sources, in source order.
pub struct CompositeServiceDiscovery {
    sources: Vec<Arc<dyn ServiceDiscovery>>,
}

impl CompositeServiceDiscovery {
    /// # Errors
    ///
    /// Returns [`RegistryError::NoDiscoverySources`] if `sources` is empty.
    pub fn new(sources: Vec<Arc<dyn ServiceDiscovery>>) -> Result<Self, RegistryError> {
        if sources.is_empty() {
            return Err(RegistryError::NoDiscoverySources);
        }
        Ok(Self { sources })
    }

    #[must_use]
    pub fn sources(&self) -> &[Arc<dyn ServiceDiscovery>] {
        &self.sources
    }
}

impl ServiceDiscovery for CompositeServiceDiscovery {
    fn name(&self) -> &str {
        "composite"
    }

    fn get_services(&self) -> anyhow::Result<BTreeSet<String>> {
        let mut services = BTreeSet::new();
        for source in &self.sources {
            services.extend(source.get_services()?);
        }
        Ok(services)
    }

    fn get_instances(&self, service_name: &str) -> anyhow::Result<Vec<ServiceInstance>> {
        let mut instances = Vec::new();
        for source in &self.sources {
            instances.extend(source.get_instances(service_name)?);
        }
        Ok(instances)
    }

    fn add_change_listener(&self, service_name: &str, listener: ListenerRef) -> anyhow::Result<()> {
        for source in &self.sources {
            source.add_change_listener(service_name, Arc::clone(&listener))?;
        }
        Ok(())
    }

    fn remove_change_listener(&self, service_name: &str, listener: &ListenerRef) {
        for source in &self.sources {
            source.remove_change_listener(service_name, listener);
        }
    }

    /// Always the smallest value; selection defers to the sources' own
    /// priorities.
    fn priority(&self) -> i32 {
        HIGHEST_PRIORITY
    }
}

impl fmt::Display for CompositeServiceDiscovery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.sources.iter().map(|source| source.name()).collect();
        write!(
            f,
            "CompositeServiceDiscovery [composite : [{}]]",
            names.join(", ")
        )
    }
}
