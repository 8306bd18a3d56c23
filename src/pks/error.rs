use crate::orchestration::error_classifier::ClassifiedError;
use crate::store::StoreError;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum PksAdapterError {
    #[error("Unable to get PKS endpoint state {link}, reason: {source}")]
    EndpointUnavailable { link: String, source: StoreError },

    #[error("{0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Remote(#[from] ClassifiedError),
}

impl PksAdapterError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidRequest(message.into())
    }

    pub fn classify(&self) -> ClassifiedError {
        match self {
            Self::EndpointUnavailable { source, .. } => {
                ClassifiedError::from_status(source.status_code(), self.to_string())
            }
            Self::InvalidRequest(message) => ClassifiedError::validation(message.clone()),
            Self::Remote(err) => err.clone(),
        }
    }

    pub fn status_code(&self) -> u16 {
        self.classify().effective_status_code()
    }
}

impl From<PksAdapterError> for ClassifiedError {
    fn from(err: PksAdapterError) -> Self {
        err.classify()
    }
}
