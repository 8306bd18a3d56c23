use super::document::TaskFailure;
use serde::{Deserialize, Serialize};

/// Events that can trigger task transitions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum TaskEvent<S, R> {
    /// Move a CREATED task to STARTED at its first sub-stage
    Start,
    /// Self-issued advance to a later sub-stage, merging results
    Advance { sub_stage: S, results: R },
    /// Record bookkeeping results without changing sub-stage
    UpdateResults { results: R },
    /// Finish successfully
    Complete { results: R },
    Fail(TaskFailure),
    Cancel,
    /// Externally triggered reset to an earlier checkpoint; `results` replace the accumulated ones
    RetryFrom { sub_stage: S, results: R },
    /// Expiration detected by maintenance
    Expire,
}

impl<S, R> TaskEvent<S, R> {
    /// Get a string representation of the event type for logging
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Advance { .. } => "advance",
            Self::UpdateResults { .. } => "update_results",
            Self::Complete { .. } => "complete",
            Self::Fail(_) => "fail",
            Self::Cancel => "cancel",
            Self::RetryFrom { .. } => "retry_from",
            Self::Expire => "expire",
        }
    }

    /// Extract error message if this is a failure event
    pub fn error_message(&self) -> Option<&str> {
        match self {
            Self::Fail(failure) => Some(&failure.message),
            _ => None,
        }
    }

    /// Check if this event represents a terminal transition
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Complete { .. } | Self::Fail(_) | Self::Cancel | Self::Expire
        )
    }
}
