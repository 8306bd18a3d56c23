//! # Composite Notification Fan-out
//!
//! Turns completed store operations on constituent resources into
//! notifications for the composite aggregates they reference.
//!
//! A constituent names its aggregate through `composite_component_link` (or
//! several through `composite_component_links`). Creates notify with an
//! addition context and deletes with a removal context. Patches and puts
//! compare the aggregate links before and after the write so a re-parented
//! constituent notifies both its old and its new aggregate. Not-modified and
//! failed completions notify nobody.
//!
//! Delivery is fire-and-forget: the constituent's operation has already
//! completed, failures are logged and never retried here.

use crate::orchestration::error_classifier::ClassifiedError;
use crate::store::{Action, CompletedOperation, ResourceKind, StoredDocument};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub const COMPOSITE_COMPONENT_LINK_FIELD: &str = "composite_component_link";
pub const COMPOSITE_COMPONENT_LINKS_FIELD: &str = "composite_component_links";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeContext {
    Added,
    Updated,
    Removed,
}

impl fmt::Display for ChangeContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Added => write!(f, "added"),
            Self::Updated => write!(f, "updated"),
            Self::Removed => write!(f, "removed"),
        }
    }
}

/// Change of one constituent as seen by one aggregate
#[derive(Debug, Clone, PartialEq)]
pub struct CompositeNotification {
    pub aggregate_link: String,
    pub component_link: String,
    pub component_kind: ResourceKind,
    pub action: Action,
    pub context: ChangeContext,
    /// Constituent state after the operation (before it, for deletes)
    pub state: Option<Value>,
}

/// Receiver side of the fan-out, implemented by the aggregate's reconciliation
#[async_trait]
pub trait AggregateNotifier: Send + Sync {
    async fn notify(&self, notification: CompositeNotification) -> Result<(), ClassifiedError>;
}

/// Aggregate links referenced by a constituent document
pub fn aggregate_links(document: &StoredDocument) -> BTreeSet<String> {
    let single = document
        .field(COMPOSITE_COMPONENT_LINK_FIELD)
        .and_then(Value::as_str)
        .map(str::to_string);
    let many = document
        .field(COMPOSITE_COMPONENT_LINKS_FIELD)
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(Value::as_str)
        .map(str::to_string);
    single
        .into_iter()
        .chain(many)
        .filter(|link| !link.is_empty())
        .collect()
}

fn links_of(document: Option<&StoredDocument>) -> BTreeSet<String> {
    document.map(aggregate_links).unwrap_or_default()
}

/// Notifications owed for one completed operation
pub fn plan_notifications(operation: &CompletedOperation) -> Vec<CompositeNotification> {
    let Some(kind) = operation.kind.filter(ResourceKind::tracks_composite) else {
        return Vec::new();
    };
    if operation.is_not_modified() || !operation.is_success() {
        return Vec::new();
    }

    let previous = operation.previous.as_ref();
    let current = operation.current.as_ref();
    let notification = |aggregate_link: &String, context, state: Option<&StoredDocument>| {
        CompositeNotification {
            aggregate_link: aggregate_link.clone(),
            component_link: operation.link.clone(),
            component_kind: kind,
            action: operation.action,
            context,
            state: state.map(|doc| doc.body.clone()),
        }
    };

    match operation.action {
        Action::Post => links_of(current)
            .iter()
            .map(|link| notification(link, ChangeContext::Added, current))
            .collect(),
        Action::Delete => links_of(previous.or(current))
            .iter()
            .map(|link| notification(link, ChangeContext::Removed, previous.or(current)))
            .collect(),
        Action::Patch | Action::Put => {
            let before = links_of(previous);
            let after = links_of(current);
            let removed = before
                .difference(&after)
                .map(|link| notification(link, ChangeContext::Removed, current));
            let added = after
                .difference(&before)
                .map(|link| notification(link, ChangeContext::Added, current));
            let updated = after
                .intersection(&before)
                .map(|link| notification(link, ChangeContext::Updated, current));
            removed.chain(added).chain(updated).collect()
        }
    }
}

/// Subscribes to store completions and delivers composite notifications
#[derive(Clone)]
pub struct CompositeNotificationChain {
    notifier: Arc<dyn AggregateNotifier>,
}

impl CompositeNotificationChain {
    pub fn new(notifier: Arc<dyn AggregateNotifier>) -> Self {
        Self { notifier }
    }

    /// Spawn delivery of the notifications owed for `operation`; returns how many
    pub fn on_completed(&self, operation: &CompletedOperation) -> usize {
        let notifications = plan_notifications(operation);
        let count = notifications.len();
        for notification in notifications {
            let notifier = Arc::clone(&self.notifier);
            tokio::spawn(async move {
                let aggregate_link = notification.aggregate_link.clone();
                let component_link = notification.component_link.clone();
                let context = notification.context;
                match notifier.notify(notification).await {
                    Ok(()) => debug!(
                        aggregate_link = %aggregate_link,
                        component_link = %component_link,
                        context = %context,
                        "Composite aggregate notified"
                    ),
                    Err(e) => warn!(
                        aggregate_link = %aggregate_link,
                        component_link = %component_link,
                        context = %context,
                        error = %e,
                        "Failed to notify composite aggregate"
                    ),
                }
            });
        }
        count
    }

    /// Consume completions until shutdown or until the publisher goes away
    pub fn start(
        self,
        mut completions: broadcast::Receiver<CompletedOperation>,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!("🔗 Composite notification chain started");
            loop {
                if *shutdown.borrow() {
                    break;
                }
                tokio::select! {
                    received = completions.recv() => match received {
                        Ok(operation) => {
                            self.on_completed(&operation);
                        }
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!(skipped, "Composite notification chain lagged behind store completions");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                    changed = shutdown.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }
            }
            info!("Composite notification chain stopped");
        })
    }
}
