//! Task engine behavior against a scripted two-step workflow.

use crate::common::{as_dyn, eventually, new_store, parent_callback, RecordingCallbackNotifier, WAIT};
use admiral_core::config::TaskConfig;
use admiral_core::orchestration::ErrorKind;
use admiral_core::state_machine::{
    assign_once, StageOutcome, StateMachineError, StateMachineResult, SubStage, TaskEvent,
    TaskFailure, TaskRequest, TaskResults, TaskService, TaskStage, Workflow, WorkflowTask,
};
use admiral_core::store::{DocumentStore, InMemoryDocumentStore, ResourceKind};
use admiral_core::web::ApiResponse;
use admiral_core::AdmiralError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
enum ReservationStage {
    Created,
    Reserved,
    Completed,
    Error,
}

impl fmt::Display for ReservationStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Created => "CREATED",
            Self::Reserved => "RESERVED",
            Self::Completed => "COMPLETED",
            Self::Error => "ERROR",
        };
        f.write_str(name)
    }
}

impl SubStage for ReservationStage {
    const ALL: &'static [Self] = &[Self::Created, Self::Reserved, Self::Completed, Self::Error];
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct ReservationInput {
    name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct ReservationResults {
    compute_link: Option<String>,
}

impl TaskResults for ReservationResults {
    fn merge(&mut self, update: Self) -> StateMachineResult<()> {
        assign_once("compute_link", &mut self.compute_link, update.compute_link)
    }
}

/// Reserves a compute link, then completes unless told to hold. With a gate,
/// the first reserved-stage run blocks until the gate opens and then completes.
#[derive(Default)]
struct ReservationWorkflow {
    failure: Option<String>,
    hold: bool,
    gate: Option<Arc<Notify>>,
    reserved_runs: AtomicU32,
    gated_runs_finished: AtomicU32,
}

#[async_trait]
impl Workflow for ReservationWorkflow {
    type SubStage = ReservationStage;
    type Input = ReservationInput;
    type Results = ReservationResults;

    const KIND: ResourceKind = ResourceKind::ImageProvisioningTask;

    fn validate(&self, task: &WorkflowTask<Self>) -> StateMachineResult<()> {
        if task.input.name.trim().is_empty() {
            return Err(StateMachineError::validation("name is required"));
        }
        Ok(())
    }

    async fn handle(&self, task: &WorkflowTask<Self>) -> StageOutcome<ReservationStage, ReservationResults> {
        match task.sub_stage {
            ReservationStage::Created => match &self.failure {
                Some(message) => StageOutcome::fail(message.clone()),
                None => StageOutcome::Proceed {
                    sub_stage: ReservationStage::Reserved,
                    results: ReservationResults {
                        compute_link: Some(ResourceKind::Compute.link_for(&task.input.name)),
                    },
                },
            },
            ReservationStage::Reserved => {
                let first = self.reserved_runs.fetch_add(1, Ordering::SeqCst) == 0;
                match &self.gate {
                    Some(gate) if first => {
                        gate.notified().await;
                        self.gated_runs_finished.fetch_add(1, Ordering::SeqCst);
                        StageOutcome::Complete {
                            results: ReservationResults::default(),
                        }
                    }
                    _ if self.hold => StageOutcome::Wait,
                    _ => StageOutcome::Complete {
                        results: ReservationResults::default(),
                    },
                }
            }
            _ => StageOutcome::Wait,
        }
    }

    fn resource_links(&self, results: &ReservationResults) -> Vec<String> {
        results.compute_link.iter().cloned().collect()
    }
}

struct Harness {
    store: Arc<InMemoryDocumentStore>,
    notifier: Arc<RecordingCallbackNotifier>,
    service: TaskService<ReservationWorkflow>,
}

fn harness(workflow: ReservationWorkflow, config: TaskConfig) -> Harness {
    let store = new_store();
    let notifier = Arc::new(RecordingCallbackNotifier::new());
    let service = TaskService::new(workflow, as_dyn(&store), notifier.clone(), config);
    Harness {
        store,
        notifier,
        service,
    }
}

fn request(name: &str) -> TaskRequest<ReservationInput> {
    TaskRequest::new(ReservationInput {
        name: name.to_string(),
    })
    .with_callback(parent_callback())
}

async fn wait_for_sub_stage(
    service: &TaskService<ReservationWorkflow>,
    link: &str,
    sub_stage: ReservationStage,
) -> WorkflowTask<ReservationWorkflow> {
    for _ in 0..500 {
        let task = service.get(link).await.unwrap();
        if task.sub_stage == sub_stage {
            return task;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("task {link} never reached {sub_stage}");
}

#[tokio::test]
async fn test_invalid_request_persists_nothing() {
    let h = harness(ReservationWorkflow::default(), TaskConfig::default());

    let err = h.service.create(request("  ")).await.unwrap_err();

    assert_eq!(err.status_code(), 400);
    assert!(err.to_string().contains("name is required"));
    assert!(h.store.is_empty());
    assert!(h.notifier.responses().is_empty());
}

#[tokio::test]
async fn test_task_runs_to_finished_and_notifies_parent() {
    let h = harness(ReservationWorkflow::default(), TaskConfig::default());

    let created = h.service.create(request("h1").with_id("t1")).await.unwrap();
    assert_eq!(created.link, "/request/image-provisioning-tasks/t1");
    assert_eq!(created.stage(), TaskStage::Started);

    let task = h.service.wait_for_terminal(&created.link, WAIT).await.unwrap();
    assert_eq!(task.stage(), TaskStage::Finished);
    assert_eq!(task.sub_stage, ReservationStage::Completed);
    assert_eq!(task.results.compute_link.as_deref(), Some("/resources/compute/h1"));
    assert_eq!(task.status().progress, 100);
    assert_eq!(ApiResponse::from_task(&task).status_code, 200);

    let notifier = h.notifier.clone();
    eventually("parent notified", || notifier.responses().len() == 1).await;
    let responses = h.notifier.responses();
    let response = &responses[0];
    assert_eq!(response.parent_link, "/request/parent-tasks/p1");
    assert_eq!(response.stage, TaskStage::Finished);
    assert_eq!(response.sub_stage, "RESOURCES_PROVISIONED");
    assert_eq!(response.resource_links, vec!["/resources/compute/h1".to_string()]);
}

#[tokio::test]
async fn test_handler_failure_keeps_specific_message() {
    let workflow = ReservationWorkflow {
        failure: Some("Quota exceeded for project".to_string()),
        ..ReservationWorkflow::default()
    };
    let h = harness(workflow, TaskConfig::default());

    let created = h.service.create(request("h1")).await.unwrap();
    let task = h.service.wait_for_terminal(&created.link, WAIT).await.unwrap();

    assert_eq!(task.stage(), TaskStage::Failed);
    assert_eq!(task.sub_stage, ReservationStage::Error);
    let failure = task.failure().unwrap();
    assert_eq!(failure.message, "Quota exceeded for project");
    assert_eq!(failure.kind, ErrorKind::Permanent);

    let response = ApiResponse::from_task(&task);
    assert!(!response.is_success());
    assert_eq!(response.body["error"]["message"], "Quota exceeded for project");

    let notifier = h.notifier.clone();
    eventually("parent notified of failure", || notifier.responses().len() == 1).await;
    let responses = h.notifier.responses();
    let response = &responses[0];
    assert_eq!(response.stage, TaskStage::Failed);
    assert_eq!(response.sub_stage, "ERROR");
    assert_eq!(
        response.failure.as_ref().map(|f| f.message.as_str()),
        Some("Quota exceeded for project")
    );
}

#[tokio::test]
async fn test_terminal_task_ignores_later_events() {
    let h = harness(ReservationWorkflow::default(), TaskConfig::default());
    let created = h.service.create(request("h1")).await.unwrap();
    let finished = h.service.wait_for_terminal(&created.link, WAIT).await.unwrap();

    let cancel = h.service.cancel(&created.link).await.unwrap();
    assert!(!cancel.was_applied());
    let fail = h
        .service
        .apply_event(
            &created.link,
            TaskEvent::Fail(TaskFailure::permanent("late")),
        )
        .await
        .unwrap();
    assert!(!fail.was_applied());

    let after = h.service.get(&created.link).await.unwrap();
    assert_eq!(after.stage(), TaskStage::Finished);
    assert_eq!(after.document_version, finished.document_version);
    assert!(after.failure().is_none());
}

#[tokio::test]
async fn test_redelivered_advance_is_ignored() {
    let workflow = ReservationWorkflow {
        hold: true,
        ..ReservationWorkflow::default()
    };
    let h = harness(workflow, TaskConfig::default());
    let created = h.service.create(request("h1")).await.unwrap();
    let reserved = wait_for_sub_stage(&h.service, &created.link, ReservationStage::Reserved).await;

    let redelivered = h
        .service
        .apply_event(
            &created.link,
            TaskEvent::Advance {
                sub_stage: ReservationStage::Reserved,
                results: reserved.results.clone(),
            },
        )
        .await
        .unwrap();

    assert!(!redelivered.was_applied());
    let after = h.service.get(&created.link).await.unwrap();
    assert_eq!(after.document_version, reserved.document_version);
    assert_eq!(after.sub_stage, ReservationStage::Reserved);
}

#[tokio::test]
async fn test_conflicting_result_assignment_is_rejected() {
    let workflow = ReservationWorkflow {
        hold: true,
        ..ReservationWorkflow::default()
    };
    let h = harness(workflow, TaskConfig::default());
    let created = h.service.create(request("h1")).await.unwrap();
    let reserved = wait_for_sub_stage(&h.service, &created.link, ReservationStage::Reserved).await;

    let err = h
        .service
        .apply_event(
            &created.link,
            TaskEvent::UpdateResults {
                results: ReservationResults {
                    compute_link: Some("/resources/compute/other".to_string()),
                },
            },
        )
        .await
        .err()
        .unwrap();

    assert!(matches!(
        err,
        AdmiralError::StateMachine(StateMachineError::ResultAlreadyAssigned { .. })
    ));
    assert_eq!(err.status_code(), 409);
    let after = h.service.get(&created.link).await.unwrap();
    assert_eq!(after.results, reserved.results);
    assert_eq!(after.document_version, reserved.document_version);
}

#[tokio::test]
async fn test_cancel_running_task_skips_parent_notification() {
    let workflow = ReservationWorkflow {
        hold: true,
        ..ReservationWorkflow::default()
    };
    let h = harness(workflow, TaskConfig::default());
    let created = h.service.create(request("h1")).await.unwrap();
    wait_for_sub_stage(&h.service, &created.link, ReservationStage::Reserved).await;

    let cancelled = h.service.cancel(&created.link).await.unwrap();
    assert!(cancelled.was_applied());
    assert_eq!(cancelled.task.stage(), TaskStage::Cancelled);
    assert_eq!(ApiResponse::from_task(&cancelled.task).status_code, 409);

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(h.notifier.responses().is_empty());
}

#[tokio::test]
async fn test_retry_from_checkpoint_reruns_handlers() {
    let workflow = ReservationWorkflow {
        hold: true,
        ..ReservationWorkflow::default()
    };
    let h = harness(workflow, TaskConfig::default());
    let created = h.service.create(request("h1")).await.unwrap();
    let reserved = wait_for_sub_stage(&h.service, &created.link, ReservationStage::Reserved).await;

    let reset = h
        .service
        .retry_from(&created.link, ReservationStage::Created)
        .await
        .unwrap();
    assert!(reset.was_applied());
    assert_eq!(reset.task.results.compute_link, None);

    let again = wait_for_sub_stage(&h.service, &created.link, ReservationStage::Reserved).await;
    assert!(again.document_version > reserved.document_version);
    assert_eq!(again.results.compute_link, reserved.results.compute_link);
}

#[tokio::test]
async fn test_handler_outliving_a_reset_cannot_complete_the_task() {
    let gate = Arc::new(Notify::new());
    let workflow = ReservationWorkflow {
        hold: true,
        gate: Some(Arc::clone(&gate)),
        ..ReservationWorkflow::default()
    };
    let h = harness(workflow, TaskConfig::default());
    let created = h.service.create(request("h1")).await.unwrap();
    // the first reserved-stage handler is now parked on the gate
    let reserved = wait_for_sub_stage(&h.service, &created.link, ReservationStage::Reserved).await;

    let reset = h
        .service
        .retry_from(&created.link, ReservationStage::Created)
        .await
        .unwrap();
    assert!(reset.was_applied());
    assert_eq!(reset.task.sub_stage, ReservationStage::Created);
    let rerun = wait_for_sub_stage(&h.service, &created.link, ReservationStage::Reserved).await;
    assert!(rerun.document_version > reserved.document_version);
    eventually("second reserved run", || {
        h.service.workflow().reserved_runs.load(Ordering::SeqCst) == 2
    })
    .await;

    gate.notify_one();
    eventually("gated handler returned", || {
        h.service.workflow().gated_runs_finished.load(Ordering::SeqCst) == 1
    })
    .await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    let after = h.service.get(&created.link).await.unwrap();
    assert_eq!(after.stage(), TaskStage::Started);
    assert_eq!(after.sub_stage, ReservationStage::Reserved);
    assert_eq!(after.document_version, rerun.document_version);
    assert!(h.notifier.responses().is_empty());
}

#[tokio::test]
async fn test_retry_from_later_sub_stage_is_rejected() {
    let workflow = ReservationWorkflow {
        hold: true,
        ..ReservationWorkflow::default()
    };
    let h = harness(workflow, TaskConfig::default());
    let created = h.service.create(request("h1")).await.unwrap();
    wait_for_sub_stage(&h.service, &created.link, ReservationStage::Reserved).await;

    let err = h
        .service
        .retry_from(&created.link, ReservationStage::Completed)
        .await
        .err()
        .unwrap();
    assert_eq!(err.status_code(), 409);
}

#[tokio::test]
async fn test_overdue_task_expires() {
    let workflow = ReservationWorkflow {
        hold: true,
        ..ReservationWorkflow::default()
    };
    let config = TaskConfig {
        expiration_seconds: 0,
        ..TaskConfig::default()
    };
    let h = harness(workflow, config);
    let created = h.service.create(request("h1")).await.unwrap();
    wait_for_sub_stage(&h.service, &created.link, ReservationStage::Reserved).await;

    let expired = h.service.expire_overdue().await.unwrap();
    assert_eq!(expired, 1);

    let task = h.service.get(&created.link).await.unwrap();
    assert_eq!(task.stage(), TaskStage::Failed);
    let failure = task.failure().unwrap();
    assert_eq!(failure.kind, ErrorKind::Timeout);
    assert_eq!(failure.message, "Task expired in stage: RESERVED");

    // already terminal
    assert_eq!(h.service.expire_overdue().await.unwrap(), 0);
}

#[tokio::test]
async fn test_document_version_grows_with_each_transition() {
    let h = harness(ReservationWorkflow::default(), TaskConfig::default());
    let created = h.service.create(request("h1")).await.unwrap();
    let task = h.service.wait_for_terminal(&created.link, WAIT).await.unwrap();

    let stored = h.store.get(&created.link).await.unwrap();
    assert_eq!(stored.version, task.document_version);
    // created, started, reserved, finished
    assert!(task.document_version >= created.document_version + 2);
}
