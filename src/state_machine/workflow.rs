//! Workflow definitions plugged into the task engine.

use super::document::{TaskDocument, TaskFailure, TaskResults};
use super::errors::StateMachineResult;
use super::states::SubStage;
use crate::store::ResourceKind;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Debug;

pub type WorkflowTask<W> =
    TaskDocument<<W as Workflow>::SubStage, <W as Workflow>::Input, <W as Workflow>::Results>;

/// What a sub-stage handler wants the engine to do next
#[derive(Debug, Clone, PartialEq)]
pub enum StageOutcome<S, R> {
    /// Self-patch to a later sub-stage
    Proceed { sub_stage: S, results: R },
    /// Finish the task
    Complete { results: R },
    Fail(TaskFailure),
    /// Record bookkeeping without moving; an external tick resumes the task
    Record { results: R },
    /// Nothing to do until an external tick
    Wait,
}

impl<S, R> StageOutcome<S, R> {
    pub fn fail(message: impl Into<String>) -> Self {
        Self::Fail(TaskFailure::permanent(message))
    }
}

#[async_trait]
pub trait Workflow: Send + Sync + 'static {
    type SubStage: SubStage;
    type Input: Clone + Debug + PartialEq + Serialize + DeserializeOwned + Send + Sync + 'static;
    type Results: TaskResults;

    /// Document kind (and therefore factory link) of this workflow's tasks
    const KIND: ResourceKind;

    /// Required-input checks run before anything is persisted
    fn validate(&self, task: &WorkflowTask<Self>) -> StateMachineResult<()>;

    /// Handler for the task's current sub-stage
    async fn handle(&self, task: &WorkflowTask<Self>) -> StageOutcome<Self::SubStage, Self::Results>;

    /// Periodic poll for tasks waiting on an external system
    async fn poll(&self, _task: &WorkflowTask<Self>) -> StageOutcome<Self::SubStage, Self::Results> {
        StageOutcome::Wait
    }

    /// Results kept when the task is reset to `checkpoint`
    fn retained_results(&self, _results: &Self::Results, _checkpoint: Self::SubStage) -> Self::Results {
        Self::Results::default()
    }

    /// Resource links reported to the parent on completion
    fn resource_links(&self, _results: &Self::Results) -> Vec<String> {
        Vec::new()
    }
}
