use crate::orchestration::error_classifier::ClassifiedError;
use crate::store::StoreError;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum SeedingError {
    #[error("No available hosts configured")]
    NoAvailableHosts,

    #[error("Failed to build image {image} on host {host}: {reason}")]
    BuildFailed {
        image: String,
        host: String,
        reason: String,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<SeedingError> for ClassifiedError {
    fn from(err: SeedingError) -> Self {
        match &err {
            SeedingError::NoAvailableHosts => ClassifiedError::no_capacity(err.to_string()),
            SeedingError::BuildFailed { .. } => ClassifiedError::permanent(err.to_string()),
            SeedingError::Store(e) => ClassifiedError::from_status(e.status_code(), err.to_string()),
        }
    }
}
