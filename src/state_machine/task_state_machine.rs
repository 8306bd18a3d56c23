use super::document::{TaskDocument, TaskResults};
use super::errors::StateMachineResult;
use super::events::TaskEvent;
use super::guards::{self, TransitionDecision};
use super::states::{SubStage, TaskStage};
use chrono::Utc;

/// What an applied event changed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppliedTransition<S> {
    pub from_stage: TaskStage,
    pub to_stage: TaskStage,
    pub from_sub_stage: S,
    pub to_sub_stage: S,
    /// The handler for `to_sub_stage` should run
    pub dispatch: bool,
}

impl<S> AppliedTransition<S> {
    pub fn reached_terminal(&self) -> bool {
        !self.from_stage.is_terminal() && self.to_stage.is_terminal()
    }
}

/// Outcome of offering an event to a task document
#[derive(Debug)]
pub enum TransitionOutcome<S> {
    Applied(AppliedTransition<S>),
    Ignored(&'static str),
}

/// Check guards, then mutate `task` in place.
///
/// Nothing is changed when the event is ignored or rejected, so callers can
/// persist only on `Applied`.
pub fn transition<S, I, R>(
    task: &mut TaskDocument<S, I, R>,
    event: TaskEvent<S, R>,
) -> StateMachineResult<TransitionOutcome<S>>
where
    S: SubStage,
    R: TaskResults,
{
    match guards::evaluate(task, &event) {
        TransitionDecision::Apply => {}
        TransitionDecision::Ignore(reason) => return Ok(TransitionOutcome::Ignored(reason)),
        TransitionDecision::Reject(err) => return Err(err),
    }

    let from_stage = task.task_info.stage;
    let from_sub_stage = task.sub_stage;
    let (to_stage, to_sub_stage, dispatch) = determine_target(task, event)?;

    task.task_info.stage = to_stage;
    task.sub_stage = to_sub_stage;
    task.updated_at = Utc::now();

    Ok(TransitionOutcome::Applied(AppliedTransition {
        from_stage,
        to_stage,
        from_sub_stage,
        to_sub_stage,
        dispatch,
    }))
}

/// Determine the target stage/sub-stage, merging results and failure as a side effect
fn determine_target<S, I, R>(
    task: &mut TaskDocument<S, I, R>,
    event: TaskEvent<S, R>,
) -> StateMachineResult<(TaskStage, S, bool)>
where
    S: SubStage,
    R: TaskResults,
{
    let target = match event {
        TaskEvent::Start => (TaskStage::Started, task.sub_stage, true),

        TaskEvent::Advance { sub_stage, results } => {
            // merge on a copy so a conflicting assignment leaves the document untouched
            let mut merged = task.results.clone();
            merged.merge(results)?;
            task.results = merged;
            (TaskStage::Started, sub_stage, true)
        }

        TaskEvent::UpdateResults { results } => {
            let mut merged = task.results.clone();
            merged.merge(results)?;
            task.results = merged;
            (task.task_info.stage, task.sub_stage, false)
        }

        TaskEvent::Complete { results } => {
            let mut merged = task.results.clone();
            merged.merge(results)?;
            task.results = merged;
            (TaskStage::Finished, S::completed(), false)
        }

        TaskEvent::Fail(failure) => {
            task.task_info.failure = Some(failure);
            (TaskStage::Failed, S::error(), false)
        }

        TaskEvent::Expire => {
            let failure = super::document::TaskFailure::new(
                crate::orchestration::error_classifier::ErrorKind::Timeout,
                format!("Task expired in stage: {}", task.sub_stage),
            );
            task.task_info.failure = Some(failure);
            (TaskStage::Failed, S::error(), false)
        }

        TaskEvent::Cancel => (TaskStage::Cancelled, task.sub_stage, false),

        TaskEvent::RetryFrom { sub_stage, results } => {
            task.results = results;
            (TaskStage::Started, sub_stage, true)
        }
    };

    Ok(target)
}
