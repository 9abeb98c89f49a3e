//! Registry and discovery contracts.
//!
//! Both traits are synchronous: implementations backed by a remote store
//! block the calling thread, and their failures surface as `anyhow::Error`
//! unchanged.

use std::collections::BTreeSet;

use lodestar_core::event::DEFAULT_PRIORITY;
use lodestar_core::ListenerRef;

use super::instance::ServiceInstance;
use super::page::Page;

/// Write side: registers instances of the local service.
pub trait ServiceRegistry: Send + Sync {
    /// # Errors
    ///
    /// Propagates backend failures.
    fn register(&self, instance: ServiceInstance) -> anyhow::Result<()>;

    /// Replaces the stored record that has the same identity.
    ///
    /// # Errors
    ///
    /// Propagates backend failures.
    fn update(&self, instance: ServiceInstance) -> anyhow::Result<()>;

    /// # Errors
    ///
    /// Propagates backend failures.
    fn unregister(&self, instance: &ServiceInstance) -> anyhow::Result<()>;

    /// # Errors
    ///
    /// Propagates backend failures.
    fn start(&self) -> anyhow::Result<()> {
        Ok(())
    }

    /// # Errors
    ///
    /// Propagates backend failures.
    fn stop(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Read side: finds instances by service name.
pub trait ServiceDiscovery: Send + Sync {
    fn name(&self) -> &str;

    /// Distinct service names currently known.
    ///
    /// # Errors
    ///
    /// Propagates backend failures.
    fn get_services(&self) -> anyhow::Result<BTreeSet<String>>;

    /// Every known instance of `service_name`.
    ///
    /// # Errors
    ///
    /// Propagates backend failures.
    fn get_instances(&self, service_name: &str) -> anyhow::Result<Vec<ServiceInstance>>;

    /// One window of [`ServiceDiscovery::get_instances`].
    ///
    /// # Errors
    ///
    /// Propagates backend failures.
    fn get_instances_page(
        &self,
        service_name: &str,
        offset: usize,
        size: usize,
    ) -> anyhow::Result<Page<ServiceInstance>> {
        self.get_instances_page_filtered(service_name, offset, size, false)
    }

    /// One window of the instances. With `healthy_only` the window is cut
    /// first and its unhealthy entries are then dropped, so `total_size`
    /// counts every instance and `data` may hold fewer than `size` items.
    ///
    /// # Errors
    ///
    /// Propagates backend failures.
    fn get_instances_page_filtered(
        &self,
        service_name: &str,
        offset: usize,
        size: usize,
        healthy_only: bool,
    ) -> anyhow::Result<Page<ServiceInstance>> {
        let page = Page::window(self.get_instances(service_name)?, offset, size);
        if healthy_only {
            return Ok(page.retain(|instance| instance.healthy));
        }
        Ok(page)
    }

    /// Registers `listener` for membership changes of `service_name`.
    ///
    /// # Errors
    ///
    /// Propagates failures installing a backend watch.
    fn add_change_listener(&self, service_name: &str, listener: ListenerRef) -> anyhow::Result<()>;

    fn remove_change_listener(&self, service_name: &str, listener: &ListenerRef);

    /// Smaller values are preferred.
    fn priority(&self) -> i32 {
        DEFAULT_PRIORITY
    }
}
