//! Key/value configuration lookup.

use dashmap::DashMap;

/// Read access to a grouped key/value store.
pub trait DynamicConfiguration: Send + Sync {
    /// The value stored under `key` in `group`, if any.
    ///
    /// # Errors
    ///
    /// Propagates failures of the underlying store.
    fn get_config(&self, key: &str, group: &str) -> anyhow::Result<Option<String>>;
}

/// Process-local configuration keyed by `(group, key)`.
#[derive(Debug, Default)]
pub struct InMemoryDynamicConfiguration {
    entries: DashMap<(String, String), String>,
}

impl InMemoryDynamicConfiguration {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `value`, returning the previous one.
    pub fn publish_config(
        &self,
        key: impl Into<String>,
        group: impl Into<String>,
        value: impl Into<String>,
    ) -> Option<String> {
        self.entries
            .insert((group.into(), key.into()), value.into())
    }

    pub fn remove_config(&self, key: &str, group: &str) -> Option<String> {
        self.entries
            .remove(&(group.to_string(), key.to_string()))
            .map(|(_, value)| value)
    }
}

impl DynamicConfiguration for InMemoryDynamicConfiguration {
    fn get_config(&self, key: &str, group: &str) -> anyhow::Result<Option<String>> {
        Ok(self
            .entries
            .get(&(group.to_string(), key.to_string()))
            .map(|value| value.clone()))
    }
}
