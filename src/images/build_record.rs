//! Image build records.
//!
//! One record per (image, host) pair at a deterministic link, so every
//! workflow and seeding attempt interested in the same build converges on the
//! same document.

use crate::store::ResourceKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

pub const GENERAL_BUILD_ERROR: &str = "General error";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildStage {
    Started,
    Finished,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildTaskInfo {
    pub stage: BuildStage,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageBuildRecord {
    pub name: String,
    pub compute_link: String,
    pub task_info: BuildTaskInfo,
    pub touched_at: DateTime<Utc>,
    /// Restarts after failed attempts
    #[serde(default)]
    pub attempts: u32,
}

impl ImageBuildRecord {
    pub fn new(image: &str, compute_link: &str) -> Self {
        Self {
            name: image.to_string(),
            compute_link: compute_link.to_string(),
            task_info: BuildTaskInfo {
                stage: BuildStage::Started,
                failure: None,
            },
            touched_at: Utc::now(),
            attempts: 0,
        }
    }

    pub fn link(image: &str, compute_link: &str) -> String {
        ResourceKind::ImageBuildRecord.link_for(&build_record_id(image, compute_link))
    }

    pub fn stage(&self) -> BuildStage {
        self.task_info.stage
    }

    pub fn failure_message(&self) -> &str {
        self.task_info
            .failure
            .as_deref()
            .unwrap_or(GENERAL_BUILD_ERROR)
    }
}

/// Hex SHA-256 of `image + "/" + compute_link`
pub fn build_record_id(image: &str, compute_link: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(image.as_bytes());
    hasher.update(b"/");
    hasher.update(compute_link.as_bytes());
    hex::encode(hasher.finalize())
}
