use super::kinds::ResourceKind;
use crate::constants::status;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use thiserror::Error;

/// A persisted document with its logical version
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredDocument {
    pub link: String,
    /// Monotonic, bumped by one on every modifying write
    pub version: u64,
    pub update_time: DateTime<Utc>,
    pub body: Value,
}

impl StoredDocument {
    pub fn kind(&self) -> Option<ResourceKind> {
        ResourceKind::from_link(&self.link)
    }

    /// Deserialize the body into a typed record
    pub fn body_as<T: DeserializeOwned>(&self) -> Result<T, StoreError> {
        serde_json::from_value(self.body.clone()).map_err(|e| StoreError::InvalidBody {
            link: self.link.clone(),
            reason: e.to_string(),
        })
    }

    /// Read a (possibly nested, dot separated) field of the body
    pub fn field(&self, path: &str) -> Option<&Value> {
        let pointer = format!("/{}", path.replace('.', "/"));
        self.body.pointer(&pointer)
    }
}

/// Modifying operation kinds reported to subscribers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Action {
    Post,
    Patch,
    Put,
    Delete,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Post => write!(f, "POST"),
            Self::Patch => write!(f, "PATCH"),
            Self::Put => write!(f, "PUT"),
            Self::Delete => write!(f, "DELETE"),
        }
    }
}

/// Completion of a modifying store operation, with pre- and post-state
#[derive(Debug, Clone, PartialEq)]
pub struct CompletedOperation {
    pub action: Action,
    pub link: String,
    pub kind: Option<ResourceKind>,
    pub previous: Option<StoredDocument>,
    pub current: Option<StoredDocument>,
    pub status_code: u16,
}

impl CompletedOperation {
    pub fn is_not_modified(&self) -> bool {
        self.status_code == status::NOT_MODIFIED
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }
}

/// Result of a patch or put
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateOutcome {
    pub document: StoredDocument,
    pub modified: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("Document not found: {link}")]
    NotFound { link: String },

    #[error("Document already exists: {link}")]
    AlreadyExists { link: String },

    #[error("Version conflict on {link}: expected {expected}, found {actual}")]
    VersionConflict {
        link: String,
        expected: u64,
        actual: u64,
    },

    #[error("Invalid document body for {link}: {reason}")]
    InvalidBody { link: String, reason: String },

    #[error("Document store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    pub fn not_found(link: impl Into<String>) -> Self {
        Self::NotFound { link: link.into() }
    }

    pub fn status_code(&self) -> u16 {
        match self {
            Self::NotFound { .. } => status::NOT_FOUND,
            Self::AlreadyExists { .. } | Self::VersionConflict { .. } => status::CONFLICT,
            Self::InvalidBody { .. } => status::BAD_REQUEST,
            Self::Unavailable(_) => status::SERVICE_UNAVAILABLE,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Merge `patch` into `target`, skipping nulls. Returns whether anything changed.
pub fn merge_patch(target: &mut Value, patch: &Value) -> bool {
    match (target, patch) {
        (Value::Object(target_map), Value::Object(patch_map)) => {
            let mut changed = false;
            for (key, value) in patch_map {
                if value.is_null() {
                    continue;
                }
                match target_map.get_mut(key) {
                    Some(existing) if existing.is_object() && value.is_object() => {
                        changed |= merge_patch(existing, value);
                    }
                    Some(existing) => {
                        if existing != value {
                            *existing = value.clone();
                            changed = true;
                        }
                    }
                    None => {
                        target_map.insert(key.clone(), value.clone());
                        changed = true;
                    }
                }
            }
            changed
        }
        (target, patch) => {
            if patch.is_null() || *target == *patch {
                false
            } else {
                *target = patch.clone();
                true
            }
        }
    }
}
