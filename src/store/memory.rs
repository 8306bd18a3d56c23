use super::document::{
    merge_patch, Action, CompletedOperation, StoreError, StoredDocument, UpdateOutcome,
};
use super::kinds::ResourceKind;
use super::query::QueryFilter;
use super::DocumentStore;
use crate::constants::status;
use crate::events::EventPublisher;
use async_trait::async_trait;
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::stream::{self, BoxStream, StreamExt};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::trace;

/// Process-local document store; each document is updated atomically under its map shard
#[derive(Debug, Clone, Default)]
pub struct InMemoryDocumentStore {
    documents: Arc<DashMap<String, StoredDocument>>,
    publisher: EventPublisher,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_publisher(publisher: EventPublisher) -> Self {
        Self {
            documents: Arc::new(DashMap::new()),
            publisher,
        }
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    fn publish(
        &self,
        action: Action,
        link: &str,
        previous: Option<StoredDocument>,
        current: Option<StoredDocument>,
        status_code: u16,
    ) {
        trace!(action = %action, link = %link, status_code, "store operation completed");
        self.publisher.publish(CompletedOperation {
            action,
            link: link.to_string(),
            kind: ResourceKind::from_link(link),
            previous,
            current,
            status_code,
        });
    }

    fn update<F>(&self, action: Action, link: &str, apply: F) -> Result<UpdateOutcome, StoreError>
    where
        F: FnOnce(&mut Value) -> bool,
    {
        // Publish while the shard is held so completions stay in per-document order
        let mut entry = self
            .documents
            .get_mut(link)
            .ok_or_else(|| StoreError::not_found(link))?;
        let previous = entry.value().clone();
        let mut body = entry.body.clone();
        let modified = apply(&mut body);
        if modified {
            entry.body = body;
            entry.version += 1;
            entry.update_time = Utc::now();
        }
        let outcome = UpdateOutcome {
            document: entry.value().clone(),
            modified,
        };
        let status_code = if modified {
            status::OK
        } else {
            status::NOT_MODIFIED
        };
        self.publish(
            action,
            link,
            Some(previous),
            Some(outcome.document.clone()),
            status_code,
        );
        drop(entry);
        Ok(outcome)
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn get(&self, link: &str) -> Result<StoredDocument, StoreError> {
        self.documents
            .get(link)
            .map(|doc| doc.value().clone())
            .ok_or_else(|| StoreError::not_found(link))
    }

    async fn create(&self, link: &str, body: Value) -> Result<StoredDocument, StoreError> {
        if !body.is_object() {
            return Err(StoreError::InvalidBody {
                link: link.to_string(),
                reason: "document body must be an object".to_string(),
            });
        }
        let document = match self.documents.entry(link.to_string()) {
            Entry::Occupied(_) => {
                return Err(StoreError::AlreadyExists {
                    link: link.to_string(),
                })
            }
            Entry::Vacant(vacant) => {
                let document = StoredDocument {
                    link: link.to_string(),
                    version: 0,
                    update_time: Utc::now(),
                    body,
                };
                let _guard = vacant.insert(document.clone());
                self.publish(Action::Post, link, None, Some(document.clone()), status::OK);
                document
            }
        };
        Ok(document)
    }

    async fn patch(&self, link: &str, partial: Value) -> Result<UpdateOutcome, StoreError> {
        self.update(Action::Patch, link, |body| merge_patch(body, &partial))
    }

    async fn put(&self, link: &str, body: Value) -> Result<UpdateOutcome, StoreError> {
        if !body.is_object() {
            return Err(StoreError::InvalidBody {
                link: link.to_string(),
                reason: "document body must be an object".to_string(),
            });
        }
        self.update(Action::Put, link, |current| {
            if *current == body {
                false
            } else {
                *current = body;
                true
            }
        })
    }

    async fn delete(&self, link: &str) -> Result<StoredDocument, StoreError> {
        let (_, removed) = self
            .documents
            .remove(link)
            .ok_or_else(|| StoreError::not_found(link))?;
        self.publish(Action::Delete, link, Some(removed.clone()), None, status::OK);
        Ok(removed)
    }

    fn query(&self, filter: QueryFilter) -> BoxStream<'static, StoredDocument> {
        let matches: Vec<StoredDocument> = self
            .documents
            .iter()
            .filter(|doc| filter.matches(doc.value()))
            .map(|doc| doc.value().clone())
            .collect();
        stream::iter(matches).boxed()
    }

    fn subscribe(&self) -> broadcast::Receiver<CompletedOperation> {
        self.publisher.subscribe()
    }
}
