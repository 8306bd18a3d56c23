//! # PKS Integration
//!
//! Session-cached, retried operations against PKS endpoints and the cluster
//! provisioning workflow built on them.
//!
//! ## Architecture
//!
//! - [`client::PksClient`]: the remote API, implemented outside this crate
//! - [`adapter::PksAdapterService`]: endpoint lookup, login caching, retries
//! - [`provisioning::PksClusterProvisioningWorkflow`]: task workflow driving
//!   cluster creation to a registered, ready cluster record

pub mod adapter;
pub mod client;
pub mod error;
pub mod provisioning;
pub mod types;

pub use adapter::{PksAdapterService, PksSessionCache, SessionKey};
pub use client::PksClient;
pub use error::PksAdapterError;
pub use provisioning::{
    PksClusterProvisioningWorkflow, PksProvisioningInput, PksProvisioningResults,
    PksProvisioningStage,
};
pub use types::{
    AdapterRequest, AdapterResponse, ClusterParameters, ClusterSpec, Credentials,
    CredentialsType, KubeUser, PksCluster, PksContext, PksEndpoint, PksOperation,
    PlanAssignment, UaaToken,
};
