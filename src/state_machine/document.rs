//! Durable task document.
//!
//! One orchestration instance: coarse stage, workflow sub-stage, immutable
//! input, incrementally accumulated results, failure, and an optional parent
//! callback. The logical store version is mirrored in `document_version`.

use super::errors::{StateMachineError, StateMachineResult};
use super::states::{SubStage, TaskStage};
use crate::error::AdmiralError;
use crate::orchestration::error_classifier::{ClassifiedError, ErrorKind};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Debug;

/// Cause of a FAILED task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskFailure {
    pub message: String,
    pub kind: ErrorKind,
    pub status_code: u16,
}

impl TaskFailure {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind,
            status_code: kind.default_status_code(),
        }
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Permanent, message)
    }
}

impl From<ClassifiedError> for TaskFailure {
    fn from(err: ClassifiedError) -> Self {
        Self {
            status_code: err.effective_status_code(),
            kind: err.kind,
            message: err.message,
        }
    }
}

impl From<&AdmiralError> for TaskFailure {
    fn from(err: &AdmiralError) -> Self {
        err.classify().into()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskInfo {
    pub stage: TaskStage,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<TaskFailure>,
}

/// Parent task to notify once this task reaches FINISHED or FAILED
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskCallback {
    pub parent_link: String,
    pub finished_sub_stage: String,
    pub failed_sub_stage: String,
}

/// Accumulated workflow results; merging enforces the workflow's assignment rules
pub trait TaskResults:
    Clone + Debug + Default + PartialEq + Serialize + DeserializeOwned + Send + Sync + 'static
{
    fn merge(&mut self, update: Self) -> StateMachineResult<()>;
}

impl TaskResults for () {
    fn merge(&mut self, _update: Self) -> StateMachineResult<()> {
        Ok(())
    }
}

/// Single-assignment merge of one result field
pub fn assign_once<T>(field: &str, current: &mut Option<T>, update: Option<T>) -> StateMachineResult<()>
where
    T: PartialEq,
{
    match (current.as_ref(), update) {
        (_, None) => Ok(()),
        (None, Some(value)) => {
            *current = Some(value);
            Ok(())
        }
        (Some(existing), Some(value)) if *existing == value => Ok(()),
        (Some(_), Some(_)) => Err(StateMachineError::ResultAlreadyAssigned {
            field: field.to_string(),
        }),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskDocument<S, I, R> {
    pub id: String,
    pub link: String,
    pub task_info: TaskInfo,
    pub sub_stage: S,
    pub input: I,
    pub results: R,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub callback: Option<TaskCallback>,
    #[serde(default)]
    pub tenant_links: Vec<String>,
    #[serde(default)]
    pub custom_properties: BTreeMap<String, String>,
    /// Logical store version, filled in on load
    #[serde(skip)]
    pub document_version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl<S: SubStage, I, R> TaskDocument<S, I, R> {
    pub fn stage(&self) -> TaskStage {
        self.task_info.stage
    }

    pub fn is_terminal(&self) -> bool {
        self.task_info.stage.is_terminal()
    }

    pub fn failure(&self) -> Option<&TaskFailure> {
        self.task_info.failure.as_ref()
    }

    pub fn project_links(&self) -> impl Iterator<Item = &String> {
        use crate::constants::tenancy;
        self.tenant_links.iter().filter(|link| {
            link.starts_with(tenancy::PROJECT_PREFIX)
                || (link.starts_with(tenancy::TENANT_PREFIX)
                    && link.contains(tenancy::GROUP_SEGMENT))
        })
    }

    pub fn status(&self) -> TaskStatus {
        TaskStatus {
            link: self.link.clone(),
            stage: self.task_info.stage,
            sub_stage: self.sub_stage.to_string(),
            progress: self.sub_stage.progress(),
            failure: self.task_info.failure.clone(),
        }
    }
}

/// Inbound provisioning request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRequest<I> {
    /// Explicit id; generated when absent
    #[serde(default)]
    pub id: Option<String>,
    pub input: I,
    #[serde(default)]
    pub tenant_links: Vec<String>,
    #[serde(default)]
    pub callback: Option<TaskCallback>,
    #[serde(default)]
    pub custom_properties: BTreeMap<String, String>,
}

impl<I> TaskRequest<I> {
    pub fn new(input: I) -> Self {
        Self {
            id: None,
            input,
            tenant_links: Vec::new(),
            callback: None,
            custom_properties: BTreeMap::new(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_tenant_links<L: Into<String>>(mut self, links: impl IntoIterator<Item = L>) -> Self {
        self.tenant_links = links.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_callback(mut self, callback: TaskCallback) -> Self {
        self.callback = Some(callback);
        self
    }
}

/// Read-only view surfaced to callers polling a task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskStatus {
    pub link: String,
    pub stage: TaskStage,
    pub sub_stage: String,
    pub progress: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<TaskFailure>,
}
