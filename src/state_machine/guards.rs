//! Transition guards.
//!
//! Decides, before anything is persisted, whether an event applies to the
//! current document. Redelivered or late events are ignored rather than
//! rejected so at-least-once delivery of self-patches stays harmless.

use super::document::TaskDocument;
use super::errors::StateMachineError;
use super::events::TaskEvent;
use super::states::{SubStage, TaskStage};

#[derive(Debug)]
pub enum TransitionDecision {
    Apply,
    Ignore(&'static str),
    Reject(StateMachineError),
}

impl TransitionDecision {
    pub fn is_apply(&self) -> bool {
        matches!(self, Self::Apply)
    }
}

pub fn evaluate<S, I, R>(task: &TaskDocument<S, I, R>, event: &TaskEvent<S, R>) -> TransitionDecision
where
    S: SubStage,
{
    let stage = task.task_info.stage;
    if stage.is_terminal() {
        return TransitionDecision::Ignore("task already in a terminal stage");
    }

    match (stage, event) {
        (TaskStage::Created, TaskEvent::Start) => TransitionDecision::Apply,
        (_, TaskEvent::Start) => TransitionDecision::Ignore("task already started"),

        (TaskStage::Started, TaskEvent::Advance { sub_stage, .. }) => {
            if *sub_stage <= task.sub_stage {
                TransitionDecision::Ignore("sub-stage already processed")
            } else if sub_stage.is_final() {
                reject(task, event)
            } else {
                TransitionDecision::Apply
            }
        }

        (TaskStage::Started, TaskEvent::UpdateResults { .. }) => TransitionDecision::Apply,
        (TaskStage::Started, TaskEvent::Complete { .. }) => TransitionDecision::Apply,

        (_, TaskEvent::Fail(_)) | (_, TaskEvent::Cancel) | (_, TaskEvent::Expire) => {
            TransitionDecision::Apply
        }

        (TaskStage::Started, TaskEvent::RetryFrom { sub_stage, .. }) => {
            if *sub_stage < task.sub_stage && !sub_stage.is_final() {
                TransitionDecision::Apply
            } else {
                reject(task, event)
            }
        }

        _ => reject(task, event),
    }
}

fn reject<S: SubStage, I, R>(task: &TaskDocument<S, I, R>, event: &TaskEvent<S, R>) -> TransitionDecision {
    let to = match event {
        TaskEvent::Advance { sub_stage, .. } | TaskEvent::RetryFrom { sub_stage, .. } => {
            format!("{} ({})", sub_stage, event.event_type())
        }
        other => other.event_type().to_string(),
    };
    TransitionDecision::Reject(StateMachineError::InvalidTransition {
        from: format!("{}/{}", task.task_info.stage, task.sub_stage),
        to,
    })
}
