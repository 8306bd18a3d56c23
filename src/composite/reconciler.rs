//! Composite aggregate reconciliation.
//!
//! Each notification updates the aggregate's `component_links` and then
//! recomputes its `tenant_links` as the union over the constituents that are
//! still alive and still reference the aggregate. Recomputing from current
//! constituent state rather than applying deltas makes out-of-order and
//! duplicated notifications converge on the same result.

use super::notification::{aggregate_links, AggregateNotifier, ChangeContext, CompositeNotification};
use crate::orchestration::error_classifier::ClassifiedError;
use crate::store::{DocumentStore, StoreError, StoredDocument};
use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Body of a composite aggregate document
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompositeComponent {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub component_links: BTreeSet<String>,
    #[serde(default)]
    pub tenant_links: BTreeSet<String>,
}

pub struct CompositeComponentReconciler {
    store: Arc<dyn DocumentStore>,
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl CompositeComponentReconciler {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            store,
            locks: DashMap::new(),
        }
    }

    fn lock_for(&self, aggregate_link: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry(aggregate_link.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Drop the aggregate's lock once no other reconcile holds or waits on it
    fn release_lock(&self, aggregate_link: &str) {
        self.locks
            .remove_if(aggregate_link, |_, lock| Arc::strong_count(lock) == 1);
    }

    /// Apply one constituent change to its aggregate
    pub async fn reconcile(&self, notification: &CompositeNotification) -> Result<(), StoreError> {
        let lock = self.lock_for(&notification.aggregate_link);
        let guard = lock.lock().await;
        let result = self.reconcile_locked(notification).await;
        drop(guard);
        drop(lock);
        self.release_lock(&notification.aggregate_link);
        result
    }

    async fn reconcile_locked(&self, notification: &CompositeNotification) -> Result<(), StoreError> {
        let stored = match self.store.get(&notification.aggregate_link).await {
            Ok(stored) => stored,
            Err(e) if e.is_not_found() && notification.context == ChangeContext::Removed => {
                debug!(aggregate_link = %notification.aggregate_link, "Aggregate already gone");
                return Ok(());
            }
            Err(e) => return Err(e),
        };
        let mut aggregate: CompositeComponent = stored.body_as()?;

        match notification.context {
            ChangeContext::Added | ChangeContext::Updated => {
                aggregate
                    .component_links
                    .insert(notification.component_link.clone());
            }
            ChangeContext::Removed => {
                aggregate.component_links.remove(&notification.component_link);
            }
        }

        let mut live = BTreeSet::new();
        let mut tenant_links = BTreeSet::new();
        for component_link in &aggregate.component_links {
            let component = match self.store.get(component_link).await {
                Ok(component) => component,
                Err(e) if e.is_not_found() => continue,
                Err(e) => return Err(e),
            };
            if !aggregate_links(&component).contains(&notification.aggregate_link) {
                continue;
            }
            tenant_links.extend(component_tenant_links(&component));
            live.insert(component_link.clone());
        }

        let outcome = self
            .store
            .patch(
                &notification.aggregate_link,
                json!({
                    "component_links": live,
                    "tenant_links": tenant_links,
                }),
            )
            .await?;
        if outcome.modified {
            info!(
                aggregate_link = %notification.aggregate_link,
                components = live.len(),
                tenant_links = ?tenant_links,
                "Composite aggregate reconciled"
            );
        }
        Ok(())
    }
}

fn component_tenant_links(component: &StoredDocument) -> impl Iterator<Item = String> + '_ {
    component
        .field("tenant_links")
        .and_then(|links| links.as_array())
        .into_iter()
        .flatten()
        .filter_map(|link| link.as_str())
        .map(str::to_string)
}

#[async_trait]
impl AggregateNotifier for CompositeComponentReconciler {
    async fn notify(&self, notification: CompositeNotification) -> Result<(), ClassifiedError> {
        self.reconcile(&notification)
            .await
            .map_err(|e| ClassifiedError::from_status(e.status_code(), e.to_string()))
    }
}
