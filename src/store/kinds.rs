//! Closed table of document kinds, keyed by factory link prefix.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Container,
    Network,
    Volume,
    Compute,
    Cluster,
    ResourcePool,
    CompositeComponent,
    ImageBuildRecord,
    PksEndpoint,
    Credentials,
    ConfigurationProperty,
    PksClusterProvisioningTask,
    ImageProvisioningTask,
}

impl ResourceKind {
    pub const ALL: &'static [ResourceKind] = &[
        Self::Container,
        Self::Network,
        Self::Volume,
        Self::Compute,
        Self::Cluster,
        Self::ResourcePool,
        Self::CompositeComponent,
        Self::ImageBuildRecord,
        Self::PksEndpoint,
        Self::Credentials,
        Self::ConfigurationProperty,
        Self::PksClusterProvisioningTask,
        Self::ImageProvisioningTask,
    ];

    pub fn factory_link(&self) -> &'static str {
        match self {
            Self::Container => "/resources/containers",
            Self::Network => "/resources/container-networks",
            Self::Volume => "/resources/container-volumes",
            Self::Compute => "/resources/compute",
            Self::Cluster => "/resources/clusters",
            Self::ResourcePool => "/resources/pools",
            Self::CompositeComponent => "/resources/composite-components",
            Self::ImageBuildRecord => "/resources/images",
            Self::PksEndpoint => "/resources/pks/endpoints",
            Self::Credentials => "/core/auth/credentials",
            Self::ConfigurationProperty => "/config/props",
            Self::PksClusterProvisioningTask => "/request/pks/cluster-provisioning-tasks",
            Self::ImageProvisioningTask => "/request/image-provisioning-tasks",
        }
    }

    /// Resolve the kind of a document from its link
    pub fn from_link(link: &str) -> Option<Self> {
        Self::ALL
            .iter()
            .copied()
            .filter(|kind| {
                link.strip_prefix(kind.factory_link())
                    .is_some_and(|rest| rest.starts_with('/') && rest.len() > 1)
            })
            .max_by_key(|kind| kind.factory_link().len())
    }

    pub fn link_for(&self, id: &str) -> String {
        format!("{}/{}", self.factory_link(), id)
    }

    /// Constituent kinds whose changes are fanned out to composite aggregates
    pub fn tracks_composite(&self) -> bool {
        matches!(
            self,
            Self::Container | Self::Network | Self::Volume | Self::Compute
        )
    }

    pub fn is_task(&self) -> bool {
        matches!(
            self,
            Self::PksClusterProvisioningTask | Self::ImageProvisioningTask
        )
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Container => "container",
            Self::Network => "network",
            Self::Volume => "volume",
            Self::Compute => "compute",
            Self::Cluster => "cluster",
            Self::ResourcePool => "resource_pool",
            Self::CompositeComponent => "composite_component",
            Self::ImageBuildRecord => "image_build_record",
            Self::PksEndpoint => "pks_endpoint",
            Self::Credentials => "credentials",
            Self::ConfigurationProperty => "configuration_property",
            Self::PksClusterProvisioningTask => "pks_cluster_provisioning_task",
            Self::ImageProvisioningTask => "image_provisioning_task",
        };
        write!(f, "{name}")
    }
}
