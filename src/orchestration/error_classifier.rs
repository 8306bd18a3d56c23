//! # Remote Operation Error Classification
//!
//! Every fallible remote operation (adapter calls, logins, build triggers)
//! returns `Result<T, ClassifiedError>`. The classification decides whether a
//! failure is eligible for the retry executor; it never travels as a panic or
//! a rethrown wrapper.
//!
//! ## Taxonomy
//!
//! | Kind | Typical status | Retryable |
//! |------|----------------|-----------|
//! | `Validation` | 400 | no |
//! | `AuthenticationExpired` | 401 | yes (after session refresh) |
//! | `NotFound` | 404 | no |
//! | `Conflict` | 409 | no |
//! | `ResourceNotReady` | - | no (handled by polling) |
//! | `NoCapacity` | 503 | no |
//! | `Timeout` | 408/504 | no |
//! | `Connection` | 502/503 | no |
//! | `Permanent` | anything else | no |

use crate::constants::status;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Primary error category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    AuthenticationExpired,
    NotFound,
    Conflict,
    ResourceNotReady,
    NoCapacity,
    Timeout,
    Connection,
    Permanent,
}

impl ErrorKind {
    /// Status code used when the failure did not carry one
    pub fn default_status_code(&self) -> u16 {
        match self {
            Self::Validation => status::BAD_REQUEST,
            Self::AuthenticationExpired => status::UNAUTHORIZED,
            Self::NotFound => status::NOT_FOUND,
            Self::Conflict => status::CONFLICT,
            Self::NoCapacity | Self::Connection => status::SERVICE_UNAVAILABLE,
            Self::Timeout => status::GATEWAY_TIMEOUT,
            Self::ResourceNotReady | Self::Permanent => status::INTERNAL_SERVER_ERROR,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Validation => write!(f, "validation"),
            Self::AuthenticationExpired => write!(f, "authentication_expired"),
            Self::NotFound => write!(f, "not_found"),
            Self::Conflict => write!(f, "conflict"),
            Self::ResourceNotReady => write!(f, "resource_not_ready"),
            Self::NoCapacity => write!(f, "no_capacity"),
            Self::Timeout => write!(f, "timeout"),
            Self::Connection => write!(f, "connection"),
            Self::Permanent => write!(f, "permanent"),
        }
    }
}

/// Failure of a remote operation together with its retry eligibility
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{message}")]
pub struct ClassifiedError {
    pub kind: ErrorKind,
    pub status_code: Option<u16>,
    pub message: String,
    pub retryable: bool,
}

impl ClassifiedError {
    pub fn new(
        kind: ErrorKind,
        status_code: Option<u16>,
        message: impl Into<String>,
        retryable: bool,
    ) -> Self {
        Self {
            kind,
            status_code,
            message: message.into(),
            retryable,
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, Some(status::BAD_REQUEST), message, false)
    }

    pub fn authentication_expired(message: impl Into<String>) -> Self {
        Self::new(
            ErrorKind::AuthenticationExpired,
            Some(status::UNAUTHORIZED),
            message,
            true,
        )
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, Some(status::NOT_FOUND), message, false)
    }

    pub fn no_capacity(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NoCapacity, None, message, false)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Timeout, None, message, false)
    }

    pub fn connection(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Connection, None, message, false)
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Permanent, None, message, false)
    }

    /// Classify a raw status code returned by an external system
    pub fn from_status(status_code: u16, message: impl Into<String>) -> Self {
        StatusCodeClassifier.classify(Some(status_code), &message.into())
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status_code == Some(status::UNAUTHORIZED)
            || self.kind == ErrorKind::AuthenticationExpired
    }

    pub fn effective_status_code(&self) -> u16 {
        self.status_code
            .unwrap_or_else(|| self.kind.default_status_code())
    }

    /// Same failure, never eligible for automatic retry
    pub fn non_retryable(mut self) -> Self {
        self.retryable = false;
        self
    }
}

/// Strategy deciding the kind and retry eligibility of a raw failure
pub trait ErrorClassifier: Send + Sync {
    fn classify(&self, status_code: Option<u16>, message: &str) -> ClassifiedError;
}

/// Classifies purely by HTTP-like status code; only 401 is retryable
#[derive(Debug, Clone, Copy, Default)]
pub struct StatusCodeClassifier;

impl ErrorClassifier for StatusCodeClassifier {
    fn classify(&self, status_code: Option<u16>, message: &str) -> ClassifiedError {
        let kind = match status_code {
            Some(status::BAD_REQUEST) => ErrorKind::Validation,
            Some(status::UNAUTHORIZED) => ErrorKind::AuthenticationExpired,
            Some(status::NOT_FOUND) => ErrorKind::NotFound,
            Some(status::CONFLICT) => ErrorKind::Conflict,
            Some(status::REQUEST_TIMEOUT) | Some(status::GATEWAY_TIMEOUT) => ErrorKind::Timeout,
            Some(status::BAD_GATEWAY) | Some(status::SERVICE_UNAVAILABLE) => ErrorKind::Connection,
            _ => ErrorKind::Permanent,
        };
        ClassifiedError::new(
            kind,
            status_code,
            message,
            kind == ErrorKind::AuthenticationExpired,
        )
    }
}
