//! # Task State Machine
//!
//! Generic engine for durable, multi-stage provisioning tasks.
//!
//! ## Overview
//!
//! A task document moves through a coarse [`TaskStage`] and a workflow-specific
//! [`SubStage`]. Workflows supply validation, one handler per sub-stage and an
//! optional poll; the [`TaskService`] owns ordering, persistence, expiration
//! and parent callbacks.
//!
//! ## Architecture
//!
//! - [`guards`] decides whether an event applies, is ignored or is rejected
//! - [`task_state_machine`] mutates a document for an accepted event
//! - [`persistence`] maps documents onto the [`crate::store::DocumentStore`]
//! - [`service`] serializes events per task and dispatches handlers

pub mod callback;
pub mod document;
pub mod errors;
pub mod events;
pub mod guards;
pub mod persistence;
pub mod service;
pub mod states;
pub mod task_state_machine;
pub mod workflow;

pub use callback::{CallbackNotifier, CallbackResponse, StoreCallbackNotifier};
pub use document::{
    assign_once, TaskCallback, TaskDocument, TaskFailure, TaskInfo, TaskRequest, TaskResults,
    TaskStatus,
};
pub use errors::{StateMachineError, StateMachineResult};
pub use events::TaskEvent;
pub use guards::TransitionDecision;
pub use persistence::TaskPersistence;
pub use service::{TaskService, TransitionResult};
pub use states::{SubStage, TaskStage};
pub use task_state_machine::{transition, AppliedTransition, TransitionOutcome};
pub use workflow::{StageOutcome, Workflow, WorkflowTask};
