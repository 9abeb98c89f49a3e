//! Metadata service contract and its in-memory store.
//!
//! The store keeps two tables, exported and subscribed, each mapping a
//! service key (see [`build_service_key`]) to the canonical strings of the
//! URLs recorded under it. Within a key, strings are unique and keep their
//! insertion order. Across keys, listings follow the order in which each key
//! was first created.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use tracing::debug;

use crate::url::{build_service_key, Url};

/// Interface wildcard selecting every exported key.
pub const ALL_SERVICE_INTERFACES: &str = "*";

/// Contract version reported by every metadata service.
pub const METADATA_SERVICE_VERSION: &str = "1.0.0";

/// Interface name under which the metadata service itself is exported.
pub const METADATA_SERVICE_INTERFACE: &str = "lodestar.metadata.MetadataService";

/// Read side of a service's registration metadata.
pub trait MetadataService: Send + Sync {
    /// Name of the service (application) whose metadata this is.
    fn service_name(&self) -> &str;

    fn version(&self) -> &str {
        METADATA_SERVICE_VERSION
    }

    /// Canonical strings of every subscribed URL.
    fn get_subscribed_urls(&self) -> Vec<String>;

    /// Canonical strings of the URLs exported under the key built from
    /// `interface`, `group` and `version`, or of every exported URL when
    /// `interface` is [`ALL_SERVICE_INTERFACES`].
    fn get_exported_urls(
        &self,
        interface: &str,
        group: Option<&str>,
        version: Option<&str>,
    ) -> Vec<String>;
}

/// Every exported URL.
pub fn exported_urls(service: &dyn MetadataService) -> Vec<String> {
    service.get_exported_urls(ALL_SERVICE_INTERFACES, None, None)
}

/// URLs exported for `interface` with no group or version.
pub fn exported_urls_for(service: &dyn MetadataService, interface: &str) -> Vec<String> {
    service.get_exported_urls(interface, None, None)
}

/// One key -> URL-list table.
///
/// Per-key lists sit behind their own mutex so appenders on the same key
/// are serialized while different keys proceed independently.
#[derive(Default)]
struct UrlTable {
    entries: DashMap<String, Arc<Mutex<Vec<String>>>>,
    /// Keys in first-creation order.
    key_order: RwLock<Vec<String>>,
}

impl UrlTable {
    fn add(&self, url: &Url) -> bool {
        let urls = self.urls_or_insert(&url.service_key());
        let full = url.to_full_string();
        let mut urls = urls.lock();
        if urls.contains(&full) {
            return false;
        }
        urls.push(full);
        true
    }

    fn remove(&self, url: &Url) -> bool {
        let Some(urls) = self.urls(&url.service_key()) else {
            return false;
        };
        let full = url.to_full_string();
        let mut urls = urls.lock();
        match urls.iter().position(|u| *u == full) {
            Some(index) => {
                urls.remove(index);
                true
            }
            None => false,
        }
    }

    fn get(&self, key: &str) -> Vec<String> {
        self.urls(key)
            .map(|urls| urls.lock().clone())
            .unwrap_or_default()
    }

    fn all(&self) -> Vec<String> {
        // Snapshot the order first; `urls_or_insert` takes the shard lock
        // before `key_order`, so the two must not be held together here.
        let keys = self.key_order.read().clone();
        keys.iter().flat_map(|key| self.get(key)).collect()
    }

    fn urls(&self, key: &str) -> Option<Arc<Mutex<Vec<String>>>> {
        self.entries.get(key).map(|entry| Arc::clone(entry.value()))
    }

    fn urls_or_insert(&self, key: &str) -> Arc<Mutex<Vec<String>>> {
        if let Some(urls) = self.urls(key) {
            return urls;
        }
        match self.entries.entry(key.to_string()) {
            Entry::Occupied(entry) => Arc::clone(entry.get()),
            Entry::Vacant(entry) => {
                self.key_order.write().push(key.to_string());
                Arc::clone(entry.insert(Arc::default()).value())
            }
        }
    }
}

/// Metadata store held in process memory.
///
/// Registration writes here instead of to a remote registry; consumers read
/// it back through [`MetadataService`].
pub struct InMemoryMetadataService {
    service_name: String,
    exported: UrlTable,
    subscribed: UrlTable,
}

impl InMemoryMetadataService {
    #[must_use]
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            exported: UrlTable::default(),
            subscribed: UrlTable::default(),
        }
    }

    /// Records an exported URL. Returns `false` if its canonical string was
    /// already recorded under the same key.
    pub fn export_url(&self, url: &Url) -> bool {
        let added = self.exported.add(url);
        debug!(url = %url, added, "export url");
        added
    }

    /// Forgets an exported URL. Returns `false` if it was not recorded.
    pub fn unexport_url(&self, url: &Url) -> bool {
        let removed = self.exported.remove(url);
        debug!(url = %url, removed, "unexport url");
        removed
    }

    /// Records a subscribed URL. Returns `false` if already recorded.
    pub fn subscribe_service_url(&self, url: &Url) -> bool {
        let added = self.subscribed.add(url);
        debug!(url = %url, added, "subscribe url");
        added
    }

    /// Forgets a subscribed URL. Returns `false` if it was not recorded.
    pub fn unsubscribe_url(&self, url: &Url) -> bool {
        let removed = self.subscribed.remove(url);
        debug!(url = %url, removed, "unsubscribe url");
        removed
    }

    /// Like [`MetadataService::get_exported_urls`], keeping only URLs whose
    /// protocol equals `protocol` when one is given.
    #[must_use]
    pub fn get_exported_urls_by_protocol(
        &self,
        interface: &str,
        group: Option<&str>,
        version: Option<&str>,
        protocol: Option<&str>,
    ) -> Vec<String> {
        let urls = self.get_exported_urls(interface, group, version);
        match protocol.filter(|p| !p.is_empty()) {
            Some(protocol) => {
                let prefix = format!("{protocol}://");
                urls.into_iter()
                    .filter(|u| u.starts_with(&prefix))
                    .collect()
            }
            None => urls,
        }
    }
}

impl MetadataService for InMemoryMetadataService {
    fn service_name(&self) -> &str {
        &self.service_name
    }

    fn get_subscribed_urls(&self) -> Vec<String> {
        self.subscribed.all()
    }

    fn get_exported_urls(
        &self,
        interface: &str,
        group: Option<&str>,
        version: Option<&str>,
    ) -> Vec<String> {
        if interface == ALL_SERVICE_INTERFACES {
            return self.exported.all();
        }
        self.exported
            .get(&build_service_key(interface, group, version))
    }
}
