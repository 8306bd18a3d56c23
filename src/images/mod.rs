//! # Image Placement and Seeding
//!
//! Host selection for image-dependent requests, build-if-absent coordination
//! over per-host build records, and best-effort warm-up of peer hosts.
//!
//! ## Architecture
//!
//! - [`selection`]: pure host choice over live candidates
//! - [`build_record::ImageBuildRecord`]: one document per (image, host) pair
//! - [`coordinator::SeedingCoordinator`]: selection, seeding and build polling
//! - [`provisioning::ImageProvisioningWorkflow`]: task workflow placing a request
//!   on a host that holds the image

pub mod build_record;
pub mod coordinator;
pub mod error;
pub mod host_adapter;
pub mod provisioning;
pub mod selection;

pub use build_record::{build_record_id, BuildStage, BuildTaskInfo, ImageBuildRecord};
pub use coordinator::{HostSelection, SeedingCoordinator};
pub use error::SeedingError;
pub use host_adapter::ImageHostAdapter;
pub use provisioning::{
    ImageProvisioningInput, ImageProvisioningResults, ImageProvisioningStage,
    ImageProvisioningWorkflow,
};
