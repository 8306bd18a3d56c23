//! # Image Provisioning
//!
//! Workflow placing an image-dependent request on a compute host that holds
//! (or is made to hold) the image.
//!
//! ```text
//! CREATED ──zone lookup──▶ RESOURCE_POOL_RESERVED
//! RESOURCE_POOL_RESERVED ──live hosts, select, seed peers──▶ COMPUTE_STATE_SELECTED
//! COMPUTE_STATE_SELECTED ──build if absent──▶ IMAGE_BUILT
//! IMAGE_BUILT ──▶ COMPLETED
//! ```

use super::build_record::ImageBuildRecord;
use super::coordinator::SeedingCoordinator;
use crate::constants::POWER_STATE_ON;
use crate::error::AdmiralError;
use crate::orchestration::error_classifier::ClassifiedError;
use crate::state_machine::{
    assign_once, StageOutcome, StateMachineError, StateMachineResult, SubStage, TaskFailure,
    TaskResults, Workflow, WorkflowTask,
};
use crate::store::{DocumentStore, QueryFilter, ResourceKind};
use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ImageProvisioningStage {
    Created,
    ResourcePoolReserved,
    ComputeStateSelected,
    ImageBuilt,
    Completed,
    Error,
}

impl fmt::Display for ImageProvisioningStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => write!(f, "CREATED"),
            Self::ResourcePoolReserved => write!(f, "RESOURCE_POOL_RESERVED"),
            Self::ComputeStateSelected => write!(f, "COMPUTE_STATE_SELECTED"),
            Self::ImageBuilt => write!(f, "IMAGE_BUILT"),
            Self::Completed => write!(f, "COMPLETED"),
            Self::Error => write!(f, "ERROR"),
        }
    }
}

impl SubStage for ImageProvisioningStage {
    const ALL: &'static [Self] = &[
        Self::Created,
        Self::ResourcePoolReserved,
        Self::ComputeStateSelected,
        Self::ImageBuilt,
        Self::Completed,
        Self::Error,
    ];
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageProvisioningInput {
    pub image: String,
    #[serde(default)]
    pub placement_zone_link: Option<String>,
    /// Explicit candidate hosts; when empty the zone's powered-on hosts are used
    #[serde(default)]
    pub host_selections: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageProvisioningResults {
    #[serde(default)]
    pub resource_pool_link: Option<String>,
    #[serde(default)]
    pub selected_compute_link: Option<String>,
    #[serde(default)]
    pub image_build_link: Option<String>,
}

impl TaskResults for ImageProvisioningResults {
    fn merge(&mut self, update: Self) -> StateMachineResult<()> {
        assign_once(
            "resource_pool_link",
            &mut self.resource_pool_link,
            update.resource_pool_link,
        )?;
        assign_once(
            "selected_compute_link",
            &mut self.selected_compute_link,
            update.selected_compute_link,
        )?;
        assign_once(
            "image_build_link",
            &mut self.image_build_link,
            update.image_build_link,
        )
    }
}

type ImageTask = WorkflowTask<ImageProvisioningWorkflow>;
type ImageOutcome = StageOutcome<ImageProvisioningStage, ImageProvisioningResults>;

pub struct ImageProvisioningWorkflow {
    coordinator: SeedingCoordinator,
    store: Arc<dyn DocumentStore>,
}

impl ImageProvisioningWorkflow {
    pub fn new(coordinator: SeedingCoordinator, store: Arc<dyn DocumentStore>) -> Self {
        Self { coordinator, store }
    }

    async fn reserve_pool(&self, task: &ImageTask) -> ImageOutcome {
        let resource_pool_link = match &task.input.placement_zone_link {
            Some(zone) => match self.store.get(zone).await {
                Ok(stored) => Some(stored.link),
                Err(e) => return StageOutcome::Fail(TaskFailure::from(&AdmiralError::from(e))),
            },
            None => None,
        };
        StageOutcome::Proceed {
            sub_stage: ImageProvisioningStage::ResourcePoolReserved,
            results: ImageProvisioningResults {
                resource_pool_link,
                ..ImageProvisioningResults::default()
            },
        }
    }

    /// Powered-on compute hosts of the reserved pool
    async fn zone_hosts(&self, pool_link: &str) -> Vec<String> {
        let filter = QueryFilter::of_kind(ResourceKind::Compute)
            .field_eq("resource_pool_link", pool_link)
            .field_eq("power_state", POWER_STATE_ON);
        self.store
            .query(filter)
            .map(|doc| doc.link)
            .collect()
            .await
    }

    async fn select_compute(&self, task: &ImageTask) -> ImageOutcome {
        let candidates = if !task.input.host_selections.is_empty() {
            task.input.host_selections.clone()
        } else if let Some(pool) = &task.results.resource_pool_link {
            self.zone_hosts(pool).await
        } else {
            Vec::new()
        };

        match self
            .coordinator
            .select_host(&candidates, &task.input.image)
            .await
        {
            Ok(selection) => StageOutcome::Proceed {
                sub_stage: ImageProvisioningStage::ComputeStateSelected,
                results: ImageProvisioningResults {
                    selected_compute_link: Some(selection.selected),
                    ..ImageProvisioningResults::default()
                },
            },
            Err(e) => StageOutcome::Fail(ClassifiedError::from(e).into()),
        }
    }

    async fn build_image(&self, task: &ImageTask) -> ImageOutcome {
        let Some(host) = task.results.selected_compute_link.as_deref() else {
            return StageOutcome::fail("Selected compute link is missing");
        };
        match self.coordinator.ensure_built(&task.input.image, host).await {
            Ok(_) => {
                info!(task_id = %task.id, image = %task.input.image, host, "Image available on selected host");
                StageOutcome::Proceed {
                    sub_stage: ImageProvisioningStage::ImageBuilt,
                    results: ImageProvisioningResults {
                        image_build_link: Some(ImageBuildRecord::link(&task.input.image, host)),
                        ..ImageProvisioningResults::default()
                    },
                }
            }
            Err(e) => StageOutcome::Fail(ClassifiedError::from(e).into()),
        }
    }
}

#[async_trait]
impl Workflow for ImageProvisioningWorkflow {
    type SubStage = ImageProvisioningStage;
    type Input = ImageProvisioningInput;
    type Results = ImageProvisioningResults;

    const KIND: ResourceKind = ResourceKind::ImageProvisioningTask;

    fn validate(&self, task: &ImageTask) -> StateMachineResult<()> {
        if task.input.image.trim().is_empty() {
            return Err(StateMachineError::validation("image is required"));
        }
        if task.input.placement_zone_link.is_none() && task.input.host_selections.is_empty() {
            return Err(StateMachineError::validation(
                "placementZoneLink or hostSelections is required",
            ));
        }
        Ok(())
    }

    async fn handle(&self, task: &ImageTask) -> ImageOutcome {
        match task.sub_stage {
            ImageProvisioningStage::Created => self.reserve_pool(task).await,
            ImageProvisioningStage::ResourcePoolReserved => self.select_compute(task).await,
            ImageProvisioningStage::ComputeStateSelected => self.build_image(task).await,
            ImageProvisioningStage::ImageBuilt => StageOutcome::Complete {
                results: ImageProvisioningResults::default(),
            },
            ImageProvisioningStage::Completed | ImageProvisioningStage::Error => StageOutcome::Wait,
        }
    }

    fn retained_results(
        &self,
        results: &ImageProvisioningResults,
        checkpoint: ImageProvisioningStage,
    ) -> ImageProvisioningResults {
        let keep = |produced_by: ImageProvisioningStage| checkpoint > produced_by;
        ImageProvisioningResults {
            resource_pool_link: results
                .resource_pool_link
                .clone()
                .filter(|_| keep(ImageProvisioningStage::Created)),
            selected_compute_link: results
                .selected_compute_link
                .clone()
                .filter(|_| keep(ImageProvisioningStage::ResourcePoolReserved)),
            image_build_link: results
                .image_build_link
                .clone()
                .filter(|_| keep(ImageProvisioningStage::ComputeStateSelected)),
        }
    }

    fn resource_links(&self, results: &ImageProvisioningResults) -> Vec<String> {
        results.selected_compute_link.iter().cloned().collect()
    }
}
