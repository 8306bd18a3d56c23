//! Runtime configuration properties.
//!
//! Operator-tunable values (for example the image build retry ceiling) are
//! stored as `/config/props/<key>` documents with a `value` field. Consumers
//! always pair a lookup with a hard-coded fallback.

use crate::store::{DocumentStore, ResourceKind};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

#[async_trait]
pub trait ConfigurationStore: Send + Sync {
    async fn get(&self, key: &str) -> Option<String>;
}

/// Read a property and parse it, falling back to `default` when absent or malformed
pub async fn get_or_default<T>(store: &dyn ConfigurationStore, key: &str, default: T) -> T
where
    T: std::str::FromStr + Copy + std::fmt::Display,
{
    match store.get(key).await {
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!(key = %key, value = %raw, fallback = %default, "Unparsable configuration property");
            default
        }),
        None => default,
    }
}

/// Properties backed by configuration documents in the document store
pub struct StoreConfigurationStore {
    store: Arc<dyn DocumentStore>,
}

impl StoreConfigurationStore {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    pub fn property_link(key: &str) -> String {
        ResourceKind::ConfigurationProperty.link_for(key)
    }
}

#[async_trait]
impl ConfigurationStore for StoreConfigurationStore {
    async fn get(&self, key: &str) -> Option<String> {
        match self.store.get(&Self::property_link(key)).await {
            Ok(doc) => doc.field("value").map(|value| match value.as_str() {
                Some(s) => s.to_string(),
                None => value.to_string(),
            }),
            Err(e) if e.is_not_found() => None,
            Err(e) => {
                warn!(key = %key, error = %e, "Failed to read configuration property");
                None
            }
        }
    }
}

/// In-process property map
#[derive(Debug, Default)]
pub struct StaticConfigurationStore {
    values: RwLock<HashMap<String, String>>,
}

impl StaticConfigurationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }

    pub fn set(&self, key: impl Into<String>, value: impl Into<String>) {
        self.values.write().insert(key.into(), value.into());
    }
}

#[async_trait]
impl ConfigurationStore for StaticConfigurationStore {
    async fn get(&self, key: &str) -> Option<String> {
        self.values.read().get(key).cloned()
    }
}
