//! # Task Service
//!
//! Drives task documents of one workflow through their sub-stages.
//!
//! ## Lifecycle
//!
//! ```text
//! create ──validate──▶ CREATED ──Start──▶ STARTED(sub-stage 0)
//!                                             │ handler
//!                         ┌───────────────────┼──────────────────┐
//!                         ▼                   ▼                  ▼
//!                  Advance (self-patch)   Complete            Fail
//!                  STARTED(next)          FINISHED            FAILED
//! ```
//!
//! Every event is applied under a per-task lock, so updates to one document
//! are strictly ordered. Handlers run on spawned tasks; their outcome is fed
//! back through the same `apply_event` path as any other patch, which makes a
//! redelivered self-patch a no-op. An outcome only lands if the task is still
//! in the sub-stage entered by the dispatch that produced it; a handler that
//! finishes after a reset or a newer dispatch is discarded. Parent callbacks
//! are fire-and-forget.

use super::callback::{CallbackNotifier, CallbackResponse};
use super::document::{TaskDocument, TaskFailure, TaskInfo, TaskRequest, TaskStatus};
use super::errors::StateMachineError;
use super::events::TaskEvent;
use super::persistence::TaskPersistence;
use super::states::{SubStage, TaskStage};
use super::task_state_machine::{transition, AppliedTransition, TransitionOutcome};
use super::workflow::{StageOutcome, Workflow, WorkflowTask};
use crate::config::TaskConfig;
use crate::error::{AdmiralError, Result};
use crate::logging::{log_error, log_task_operation};
use crate::store::{DocumentStore, QueryFilter};
use chrono::Utc;
use dashmap::DashMap;
use futures::future::BoxFuture;
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

type WorkflowEvent<W> = TaskEvent<<W as Workflow>::SubStage, <W as Workflow>::Results>;

/// Result of offering one event to a task
pub struct TransitionResult<W: Workflow> {
    pub task: WorkflowTask<W>,
    /// `None` when the event was ignored (terminal task or redelivery)
    pub applied: Option<AppliedTransition<W::SubStage>>,
}

impl<W: Workflow> TransitionResult<W> {
    pub fn was_applied(&self) -> bool {
        self.applied.is_some()
    }
}

/// Where an outcome came from: the sub-stage it was computed for and, for
/// handler runs, the document version the dispatch was issued at
#[derive(Debug, Clone, Copy)]
struct OutcomeOrigin<S> {
    sub_stage: S,
    dispatch_version: Option<u64>,
}

struct TaskServiceInner<W: Workflow> {
    workflow: W,
    persistence: TaskPersistence,
    notifier: Arc<dyn CallbackNotifier>,
    locks: DashMap<String, Arc<Mutex<()>>>,
    /// latest handler dispatch per running task
    dispatches: DashMap<String, u64>,
    config: TaskConfig,
}

pub struct TaskService<W: Workflow> {
    inner: Arc<TaskServiceInner<W>>,
}

impl<W: Workflow> Clone for TaskService<W> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<W: Workflow> TaskService<W> {
    pub fn new(
        workflow: W,
        store: Arc<dyn DocumentStore>,
        notifier: Arc<dyn CallbackNotifier>,
        config: TaskConfig,
    ) -> Self {
        info!(kind = %W::KIND, factory_link = W::KIND.factory_link(), "🚀 Task service initialized");
        Self {
            inner: Arc::new(TaskServiceInner {
                workflow,
                persistence: TaskPersistence::new(store),
                notifier,
                locks: DashMap::new(),
                dispatches: DashMap::new(),
                config,
            }),
        }
    }

    pub fn workflow(&self) -> &W {
        &self.inner.workflow
    }

    pub fn factory_link(&self) -> &'static str {
        W::KIND.factory_link()
    }

    /// Validate, persist and start a task. Invalid input persists nothing.
    pub async fn create(&self, request: TaskRequest<W::Input>) -> Result<WorkflowTask<W>> {
        let id = request.id.unwrap_or_else(|| Uuid::new_v4().to_string());
        let link = W::KIND.link_for(&id);
        let now = Utc::now();
        let expiration = chrono::Duration::seconds(self.inner.config.expiration_seconds as i64);

        let mut task: WorkflowTask<W> = TaskDocument {
            id,
            link,
            task_info: TaskInfo::default(),
            sub_stage: W::SubStage::created(),
            input: request.input,
            results: Default::default(),
            callback: request.callback,
            tenant_links: request.tenant_links,
            custom_properties: request.custom_properties,
            document_version: 0,
            created_at: now,
            updated_at: now,
            expires_at: now + expiration,
        };

        if let Err(err) = self.inner.workflow.validate(&task) {
            warn!(kind = %W::KIND, task_link = %task.link, error = %err, "Task validation failed");
            return Err(err.into());
        }

        self.inner.persistence.insert(&mut task).await?;
        log_task_operation("create", &task.link, "created", &task.sub_stage.to_string(), None);

        let started = self.apply_event(&task.link, TaskEvent::Start).await?;
        Ok(started.task)
    }

    pub async fn get(&self, link: &str) -> Result<WorkflowTask<W>> {
        Ok(self.inner.persistence.load(link).await?)
    }

    pub async fn status(&self, link: &str) -> Result<TaskStatus> {
        Ok(self.get(link).await?.status())
    }

    /// Offer an event to a task; ignored events leave the document untouched
    pub async fn apply_event(&self, link: &str, event: WorkflowEvent<W>) -> Result<TransitionResult<W>> {
        self.apply_event_from(link, event, None).await
    }

    async fn apply_event_from(
        &self,
        link: &str,
        event: WorkflowEvent<W>,
        origin: Option<OutcomeOrigin<W::SubStage>>,
    ) -> Result<TransitionResult<W>> {
        let lock = self.lock_for(link);
        let guard = lock.lock().await;

        let mut task: WorkflowTask<W> = self.inner.persistence.load(link).await?;
        let event_type = event.event_type();

        if let Some(origin) = origin {
            if self.is_stale(&task, &origin) {
                debug!(
                    task_link = %link,
                    event = event_type,
                    computed_for = %origin.sub_stage,
                    sub_stage = %task.sub_stage,
                    "Discarding outcome computed for a superseded sub-stage"
                );
                return Ok(TransitionResult {
                    task,
                    applied: None,
                });
            }
        }

        let applied = match transition(&mut task, event)? {
            TransitionOutcome::Ignored(reason) => {
                debug!(
                    task_link = %link,
                    event = event_type,
                    stage = %task.task_info.stage,
                    sub_stage = %task.sub_stage,
                    reason,
                    "Ignoring task event"
                );
                return Ok(TransitionResult {
                    task,
                    applied: None,
                });
            }
            TransitionOutcome::Applied(applied) => applied,
        };

        self.inner.persistence.save(&mut task).await?;
        let dispatch = applied.dispatch && applied.to_stage == TaskStage::Started;
        if dispatch {
            self.inner
                .dispatches
                .insert(link.to_string(), task.document_version);
        }
        drop(guard);
        drop(lock);

        log_task_operation(
            event_type,
            link,
            &applied.to_stage.to_string(),
            &applied.to_sub_stage.to_string(),
            task.failure().map(|f| f.message.as_str()),
        );

        if applied.reached_terminal() {
            self.release_lock(link);
            self.notify_parent(&task);
        } else if dispatch {
            self.dispatch(
                link.to_string(),
                OutcomeOrigin {
                    sub_stage: applied.to_sub_stage,
                    dispatch_version: Some(task.document_version),
                },
            );
        }

        Ok(TransitionResult {
            task,
            applied: Some(applied),
        })
    }

    pub async fn cancel(&self, link: &str) -> Result<TransitionResult<W>> {
        self.apply_event(link, TaskEvent::Cancel).await
    }

    /// Externally triggered reset to an earlier checkpoint of a running task
    pub async fn retry_from(&self, link: &str, checkpoint: W::SubStage) -> Result<TransitionResult<W>> {
        let task = self.get(link).await?;
        let results = self
            .inner
            .workflow
            .retained_results(&task.results, checkpoint);
        info!(task_link = %link, from = %task.sub_stage, checkpoint = %checkpoint, "Retrying task from checkpoint");
        self.apply_event(
            link,
            TaskEvent::RetryFrom {
                sub_stage: checkpoint,
                results,
            },
        )
        .await
    }

    /// Run the workflow's poll for every started task; returns how many were polled
    pub async fn poll_active(&self) -> Result<usize> {
        let tasks = self.tasks_in_stage(TaskStage::Started).await?;
        let count = tasks.len();
        for task in tasks {
            let outcome = self.inner.workflow.poll(&task).await;
            let origin = OutcomeOrigin {
                sub_stage: task.sub_stage,
                dispatch_version: None,
            };
            self.apply_outcome(&task.link, origin, outcome).await;
        }
        Ok(count)
    }

    /// Fail non-terminal tasks past their expiration; returns how many expired
    pub async fn expire_overdue(&self) -> Result<usize> {
        let now = Utc::now();
        let mut expired = 0;
        for stage in [TaskStage::Created, TaskStage::Started] {
            for task in self.tasks_in_stage(stage).await? {
                if task.expires_at <= now {
                    let result = self.apply_event(&task.link, TaskEvent::Expire).await?;
                    if result.was_applied() {
                        expired += 1;
                    }
                }
            }
        }
        if expired > 0 {
            info!(kind = %W::KIND, expired, "⏰ Expired overdue tasks");
        }
        Ok(expired)
    }

    /// Wait until the task reaches FINISHED, FAILED or CANCELLED
    pub async fn wait_for_terminal(&self, link: &str, timeout: Duration) -> Result<WorkflowTask<W>> {
        let store = Arc::clone(self.inner.persistence.store());
        let mut operations = store.subscribe();

        let wait = async {
            loop {
                let task = self.get(link).await?;
                if task.is_terminal() {
                    return Ok(task);
                }
                loop {
                    match operations.recv().await {
                        Ok(op) if op.link == link => break,
                        Ok(_) => continue,
                        Err(RecvError::Lagged(_)) => break,
                        Err(RecvError::Closed) => {
                            return Err(AdmiralError::Internal(
                                "document store subscription closed".to_string(),
                            ))
                        }
                    }
                }
            }
        };

        tokio::time::timeout(timeout, wait).await.map_err(|_| {
            AdmiralError::from(StateMachineError::WaitTimeout {
                link: link.to_string(),
            })
        })?
    }

    async fn tasks_in_stage(&self, stage: TaskStage) -> Result<Vec<WorkflowTask<W>>> {
        let filter = QueryFilter::of_kind(W::KIND).field_eq("task_info.stage", stage.to_string());
        let documents: Vec<_> = self.inner.persistence.store().query(filter).collect().await;
        let mut tasks = Vec::with_capacity(documents.len());
        for document in &documents {
            match TaskPersistence::decode(document) {
                Ok(task) => tasks.push(task),
                Err(e) => warn!(link = %document.link, error = %e, "Skipping undecodable task document"),
            }
        }
        Ok(tasks)
    }

    fn dispatch(&self, link: String, origin: OutcomeOrigin<W::SubStage>) {
        tokio::spawn(self.clone().run_handler(link, origin));
    }

    // Boxed so the spawned handler future has a nameable Send type.
    fn run_handler(self, link: String, origin: OutcomeOrigin<W::SubStage>) -> BoxFuture<'static, ()> {
        Box::pin(async move {
            let task = match self.get(&link).await {
                Ok(task) => task,
                Err(e) => {
                    log_error("task_service", "run_handler", &e.to_string(), Some(&link));
                    return;
                }
            };
            if self.is_stale(&task, &origin) {
                debug!(task_link = %link, expected = %origin.sub_stage, actual = %task.sub_stage, "Skipping stale handler dispatch");
                return;
            }

            debug!(task_link = %link, sub_stage = %origin.sub_stage, "Running sub-stage handler");
            let outcome = self.inner.workflow.handle(&task).await;
            self.apply_outcome(&link, origin, outcome).await;
        })
    }

    /// Whether the task has moved on since `origin` was issued
    fn is_stale(&self, task: &WorkflowTask<W>, origin: &OutcomeOrigin<W::SubStage>) -> bool {
        if task.task_info.stage != TaskStage::Started || task.sub_stage != origin.sub_stage {
            return true;
        }
        match origin.dispatch_version {
            Some(version) => self
                .inner
                .dispatches
                .get(&task.link)
                .map_or(true, |latest| *latest != version),
            None => false,
        }
    }

    async fn apply_outcome(
        &self,
        link: &str,
        origin: OutcomeOrigin<W::SubStage>,
        outcome: StageOutcome<W::SubStage, W::Results>,
    ) {
        let event = match outcome {
            StageOutcome::Proceed { sub_stage, results } => TaskEvent::Advance { sub_stage, results },
            StageOutcome::Complete { results } => TaskEvent::Complete { results },
            StageOutcome::Fail(failure) => TaskEvent::Fail(failure),
            StageOutcome::Record { results } => TaskEvent::UpdateResults { results },
            StageOutcome::Wait => return,
        };

        if let Err(err) = self.apply_event_from(link, event, Some(origin)).await {
            // the self-patch itself failed; the task must not hang in its current sub-stage
            let failure = TaskFailure::from(&err);
            if let Err(fail_err) = self
                .apply_event_from(link, TaskEvent::Fail(failure), Some(origin))
                .await
            {
                log_error(
                    "task_service",
                    "apply_outcome",
                    &fail_err.to_string(),
                    Some(link),
                );
            }
        }
    }

    fn notify_parent(&self, task: &WorkflowTask<W>) {
        let Some(callback) = task.callback.as_ref() else {
            return;
        };
        let response = match task.task_info.stage {
            TaskStage::Finished => CallbackResponse::finished(
                callback,
                &task.link,
                self.inner.workflow.resource_links(&task.results),
            ),
            TaskStage::Failed => CallbackResponse::failed(
                callback,
                &task.link,
                task.failure()
                    .cloned()
                    .unwrap_or_else(|| TaskFailure::permanent("task failed")),
            ),
            // cancelled tasks never notify
            _ => return,
        };

        let notifier = Arc::clone(&self.inner.notifier);
        tokio::spawn(async move {
            let parent_link = response.parent_link.clone();
            let task_link = response.task_link.clone();
            if let Err(e) = notifier.notify(response).await {
                warn!(parent_link = %parent_link, task_link = %task_link, error = %e, "Failed to notify parent task");
            }
        });
    }

    fn lock_for(&self, link: &str) -> Arc<Mutex<()>> {
        Arc::clone(self.inner.locks.entry(link.to_string()).or_default().value())
    }

    fn release_lock(&self, link: &str) {
        self.inner.dispatches.remove(link);
        self.inner
            .locks
            .remove_if(link, |_, lock| Arc::strong_count(lock) == 1);
    }
}
