//! Parent task notification.

use super::document::{TaskCallback, TaskFailure};
use super::states::TaskStage;
use crate::store::{DocumentStore, StoreError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

/// Message delivered to a parent task when a child reaches FINISHED or FAILED
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallbackResponse {
    pub parent_link: String,
    pub task_link: String,
    pub stage: TaskStage,
    /// The parent's configured finished or failed sub-stage
    pub sub_stage: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<TaskFailure>,
    #[serde(default)]
    pub resource_links: Vec<String>,
}

impl CallbackResponse {
    pub fn finished(callback: &TaskCallback, task_link: &str, resource_links: Vec<String>) -> Self {
        Self {
            parent_link: callback.parent_link.clone(),
            task_link: task_link.to_string(),
            stage: TaskStage::Finished,
            sub_stage: callback.finished_sub_stage.clone(),
            failure: None,
            resource_links,
        }
    }

    pub fn failed(callback: &TaskCallback, task_link: &str, failure: TaskFailure) -> Self {
        Self {
            parent_link: callback.parent_link.clone(),
            task_link: task_link.to_string(),
            stage: TaskStage::Failed,
            sub_stage: callback.failed_sub_stage.clone(),
            failure: Some(failure),
            resource_links: Vec::new(),
        }
    }
}

#[async_trait]
pub trait CallbackNotifier: Send + Sync {
    async fn notify(&self, response: CallbackResponse) -> Result<(), StoreError>;
}

/// Delivers callbacks by patching the parent document's `callback_response` field
pub struct StoreCallbackNotifier {
    store: Arc<dyn DocumentStore>,
}

impl StoreCallbackNotifier {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl CallbackNotifier for StoreCallbackNotifier {
    async fn notify(&self, response: CallbackResponse) -> Result<(), StoreError> {
        let body = serde_json::to_value(&response).map_err(|e| StoreError::InvalidBody {
            link: response.parent_link.clone(),
            reason: e.to_string(),
        })?;
        self.store
            .patch(&response.parent_link, json!({ "callback_response": body }))
            .await?;
        Ok(())
    }
}
