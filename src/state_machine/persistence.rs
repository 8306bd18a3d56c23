use super::document::TaskDocument;
use super::errors::{StateMachineError, StateMachineResult};
use crate::store::{DocumentStore, StoredDocument};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;

/// Reads and writes task documents through the document store
#[derive(Clone)]
pub struct TaskPersistence {
    store: Arc<dyn DocumentStore>,
}

impl TaskPersistence {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    pub async fn load<S, I, R>(&self, link: &str) -> StateMachineResult<TaskDocument<S, I, R>>
    where
        TaskDocument<S, I, R>: DeserializeOwned,
    {
        let stored = self.store.get(link).await?;
        Self::decode(&stored)
    }

    pub async fn insert<S, I, R>(&self, task: &mut TaskDocument<S, I, R>) -> StateMachineResult<()>
    where
        TaskDocument<S, I, R>: Serialize,
    {
        let body = serde_json::to_value(&*task)?;
        let stored = self.store.create(&task.link, body).await?;
        task.document_version = stored.version;
        Ok(())
    }

    /// Replace the persisted document; `document_version` is refreshed from the store
    pub async fn save<S, I, R>(&self, task: &mut TaskDocument<S, I, R>) -> StateMachineResult<()>
    where
        TaskDocument<S, I, R>: Serialize,
    {
        let current = self.store.get(&task.link).await?;
        if current.version != task.document_version {
            return Err(StateMachineError::Persistence(
                crate::store::StoreError::VersionConflict {
                    link: task.link.clone(),
                    expected: task.document_version,
                    actual: current.version,
                },
            ));
        }
        let body = serde_json::to_value(&*task)?;
        let outcome = self.store.put(&task.link, body).await?;
        task.document_version = outcome.document.version;
        Ok(())
    }

    pub fn decode<S, I, R>(stored: &StoredDocument) -> StateMachineResult<TaskDocument<S, I, R>>
    where
        TaskDocument<S, I, R>: DeserializeOwned,
    {
        let mut task: TaskDocument<S, I, R> = serde_json::from_value(stored.body.clone())?;
        task.document_version = stored.version;
        Ok(task)
    }
}
