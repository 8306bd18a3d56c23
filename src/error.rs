//! # Error Types
//!
//! Crate-wide error type. Module errors wrap transparently so the message that
//! ends up in a failed task document is the most specific one available.

use crate::config::ConfigurationError;
use crate::constants::status;
use crate::images::SeedingError;
use crate::orchestration::error_classifier::{ClassifiedError, ErrorKind};
use crate::pks::PksAdapterError;
use crate::state_machine::StateMachineError;
use crate::store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AdmiralError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    StateMachine(#[from] StateMachineError),

    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    Classified(#[from] ClassifiedError),

    #[error(transparent)]
    Seeding(#[from] SeedingError),

    #[error(transparent)]
    Pks(#[from] PksAdapterError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AdmiralError {
    /// HTTP-like status code surfaced to callers of the orchestration
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Store(e) => e.status_code(),
            Self::StateMachine(e) => e.status_code(),
            Self::Configuration(_) => status::INTERNAL_SERVER_ERROR,
            Self::Classified(e) => e.effective_status_code(),
            Self::Seeding(e) => ClassifiedError::from(e.clone()).effective_status_code(),
            Self::Pks(e) => e.status_code(),
            Self::Serialization(_) => status::BAD_REQUEST,
            Self::Internal(_) => status::INTERNAL_SERVER_ERROR,
        }
    }

    /// Collapse into a classified error, preserving the specific message
    pub fn classify(&self) -> ClassifiedError {
        match self {
            Self::Classified(e) => e.clone(),
            Self::Seeding(e) => ClassifiedError::from(e.clone()),
            Self::Pks(e) => e.classify(),
            other => {
                let code = other.status_code();
                let kind = match code {
                    status::BAD_REQUEST => ErrorKind::Validation,
                    status::NOT_FOUND => ErrorKind::NotFound,
                    status::CONFLICT => ErrorKind::Conflict,
                    status::SERVICE_UNAVAILABLE => ErrorKind::Connection,
                    _ => ErrorKind::Permanent,
                };
                ClassifiedError::new(kind, Some(code), other.to_string(), false)
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, AdmiralError>;
