//! # Response Types
//!
//! Translation of task outcomes and engine errors into HTTP-like responses.
//! A failed task always yields a non-2xx response carrying the exact failure
//! message recorded on the task.

use crate::constants::status;
use crate::error::AdmiralError;
use crate::state_machine::{SubStage, TaskDocument, TaskStage, TaskStatus};
use crate::store::StoreError;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

/// Errors surfaced to callers of the provisioning API
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    #[error("Resource not found: {link}")]
    NotFound { link: String },

    #[error("Invalid request: {message}")]
    BadRequest { message: String },

    #[error("{message}")]
    Unauthorized { message: String },

    #[error("{message}")]
    Conflict { message: String },

    #[error("Request timeout: {message}")]
    Timeout { message: String },

    #[error("Service temporarily unavailable: {message}")]
    ServiceUnavailable { message: String },

    #[error("{message}")]
    Internal { message: String },
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest {
            message: message.into(),
        }
    }

    pub fn status_code(&self) -> u16 {
        match self {
            Self::NotFound { .. } => status::NOT_FOUND,
            Self::BadRequest { .. } => status::BAD_REQUEST,
            Self::Unauthorized { .. } => status::UNAUTHORIZED,
            Self::Conflict { .. } => status::CONFLICT,
            Self::Timeout { .. } => status::REQUEST_TIMEOUT,
            Self::ServiceUnavailable { .. } => status::SERVICE_UNAVAILABLE,
            Self::Internal { .. } => status::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "NOT_FOUND",
            Self::BadRequest { .. } => "BAD_REQUEST",
            Self::Unauthorized { .. } => "UNAUTHORIZED",
            Self::Conflict { .. } => "CONFLICT",
            Self::Timeout { .. } => "TIMEOUT",
            Self::ServiceUnavailable { .. } => "SERVICE_UNAVAILABLE",
            Self::Internal { .. } => "INTERNAL_ERROR",
        }
    }

    pub fn into_response(self) -> ApiResponse {
        ApiResponse {
            status_code: self.status_code(),
            body: json!({
                "error": {
                    "code": self.error_code(),
                    "message": self.to_string(),
                }
            }),
        }
    }
}

impl From<&AdmiralError> for ApiError {
    fn from(err: &AdmiralError) -> Self {
        let message = err.to_string();
        match err.status_code() {
            status::NOT_FOUND => match err {
                AdmiralError::Store(StoreError::NotFound { link }) => {
                    Self::NotFound { link: link.clone() }
                }
                _ => Self::Internal { message },
            },
            status::BAD_REQUEST => Self::BadRequest { message },
            status::UNAUTHORIZED => Self::Unauthorized { message },
            status::CONFLICT => Self::Conflict { message },
            status::REQUEST_TIMEOUT | status::GATEWAY_TIMEOUT => Self::Timeout { message },
            status::SERVICE_UNAVAILABLE => Self::ServiceUnavailable { message },
            _ => Self::Internal { message },
        }
    }
}

impl From<AdmiralError> for ApiError {
    fn from(err: AdmiralError) -> Self {
        Self::from(&err)
    }
}

/// Status code plus JSON body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiResponse {
    pub status_code: u16,
    pub body: Value,
}

impl ApiResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }

    /// 200 once finished, the recorded failure status when failed, 202 while in flight
    pub fn from_task<S, I, R>(task: &TaskDocument<S, I, R>) -> Self
    where
        S: SubStage,
    {
        let view = task.status();
        match task.stage() {
            TaskStage::Finished => Self::with_status(status::OK, &view),
            TaskStage::Failed => {
                let (code, message) = match task.failure() {
                    Some(failure) => (failure_status(failure.status_code), failure.message.clone()),
                    None => (status::INTERNAL_SERVER_ERROR, "Task failed".to_string()),
                };
                Self {
                    status_code: code,
                    body: json!({
                        "error": { "message": message },
                        "task": view,
                    }),
                }
            }
            TaskStage::Cancelled => Self {
                status_code: status::CONFLICT,
                body: json!({
                    "error": { "message": format!("Task {} was cancelled", task.link) },
                    "task": view,
                }),
            },
            TaskStage::Created | TaskStage::Started => Self::with_status(status::ACCEPTED, &view),
        }
    }

    fn with_status(code: u16, view: &TaskStatus) -> Self {
        Self {
            status_code: code,
            body: json!({ "task": view }),
        }
    }
}

/// Failure statuses callers act on are kept; everything else reports as 500
fn failure_status(code: u16) -> u16 {
    match code {
        status::UNAUTHORIZED | status::NOT_FOUND | status::BAD_REQUEST => code,
        _ => status::INTERNAL_SERVER_ERROR,
    }
}
