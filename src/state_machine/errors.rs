use crate::constants::status;
use crate::store::StoreError;
use thiserror::Error;

/// Error types for task state machine operations
#[derive(Error, Debug)]
pub enum StateMachineError {
    #[error("Invalid task input: {reason}")]
    ValidationFailed { reason: String },

    #[error("Invalid state transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Result field '{field}' is already assigned")]
    ResultAlreadyAssigned { field: String },

    #[error(transparent)]
    Persistence(#[from] StoreError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Timed out waiting for task {link} to reach a terminal stage")]
    WaitTimeout { link: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl StateMachineError {
    pub fn validation(reason: impl Into<String>) -> Self {
        Self::ValidationFailed {
            reason: reason.into(),
        }
    }

    pub fn status_code(&self) -> u16 {
        match self {
            Self::ValidationFailed { .. } | Self::Serialization(_) => status::BAD_REQUEST,
            Self::InvalidTransition { .. } | Self::ResultAlreadyAssigned { .. } => {
                status::CONFLICT
            }
            Self::Persistence(e) => e.status_code(),
            Self::WaitTimeout { .. } => status::REQUEST_TIMEOUT,
            Self::Internal(_) => status::INTERNAL_SERVER_ERROR,
        }
    }
}

pub type StateMachineResult<T> = Result<T, StateMachineError>;
