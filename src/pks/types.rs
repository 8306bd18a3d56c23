//! PKS endpoint, session and cluster records.

use super::error::PksAdapterError;
use crate::constants::pks_properties;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

pub const LAST_ACTION_CREATE: &str = "CREATE";
pub const LAST_ACTION_STATE_SUCCEEDED: &str = "succeeded";
pub const LAST_ACTION_STATE_FAILED: &str = "failed";
pub const LAST_ACTION_STATE_IN_PROGRESS: &str = "in progress";

/// Plans a project may provision
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanAssignment {
    #[serde(default)]
    pub plans: BTreeSet<String>,
}

/// Registered PKS endpoint document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PksEndpoint {
    pub name: String,
    pub uaa_endpoint: String,
    pub api_endpoint: String,
    pub auth_credentials_link: String,
    /// Keyed by project (or tenant group) link
    #[serde(default)]
    pub plan_assignments: BTreeMap<String, PlanAssignment>,
}

impl PksEndpoint {
    pub fn allows_plan(&self, project_link: &str, plan_name: &str) -> bool {
        self.plan_assignments
            .get(project_link)
            .is_some_and(|assignment| assignment.plans.contains(plan_name))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CredentialsType {
    Password,
    PublicKey,
    Bearer,
}

impl fmt::Display for CredentialsType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    #[serde(rename = "type")]
    pub credentials_type: CredentialsType,
    #[serde(default)]
    pub user_email: Option<String>,
    #[serde(default)]
    pub private_key: Option<String>,
}

/// UAA login response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UaaToken {
    pub access_token: String,
    pub expires_in_seconds: i64,
}

impl UaaToken {
    /// How long the token stays valid from now; negative lifetimes count as already expired
    pub fn lifetime(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.expires_in_seconds.max(0).unsigned_abs())
    }
}

/// Authenticated session against one endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PksContext {
    pub endpoint_link: String,
    pub api_endpoint: String,
    pub access_token: String,
    pub expires_at: DateTime<Utc>,
}

impl PksContext {
    pub fn create(endpoint_link: &str, endpoint: &PksEndpoint, token: UaaToken) -> Self {
        Self {
            endpoint_link: endpoint_link.to_string(),
            api_endpoint: endpoint.api_endpoint.clone(),
            access_token: token.access_token,
            expires_at: Utc::now() + chrono::Duration::seconds(token.expires_in_seconds),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterParameters {
    #[serde(default)]
    pub kubernetes_master_host: Option<String>,
    #[serde(default)]
    pub kubernetes_worker_instances: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PksCluster {
    pub uuid: String,
    pub name: String,
    pub plan_name: String,
    pub last_action: String,
    pub last_action_state: String,
    #[serde(default)]
    pub last_action_description: String,
    #[serde(default)]
    pub master_ips: Vec<String>,
    #[serde(default)]
    pub parameters: ClusterParameters,
}

impl PksCluster {
    /// Address to register for the cluster's master
    pub fn master_address(&self, prefer_ip: bool) -> Option<&str> {
        let ip = self.master_ips.first().map(String::as_str);
        let host = self.parameters.kubernetes_master_host.as_deref();
        if prefer_ip {
            ip.or(host)
        } else {
            host.or(ip)
        }
    }
}

/// Cluster creation request sent to the endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterSpec {
    pub name: String,
    pub plan_name: String,
    pub parameters: ClusterParameters,
}

/// Kubernetes user issued for a cluster
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KubeUser {
    pub cluster: String,
    pub user: String,
    pub token: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PksOperation {
    ListClusters,
    GetCluster,
    CreateCluster,
    DeleteCluster,
    ResizeCluster,
    CreateUser,
}

impl PksOperation {
    pub fn id(&self) -> &'static str {
        match self {
            Self::ListClusters => "PKS.ListClusters",
            Self::GetCluster => "PKS.GetCluster",
            Self::CreateCluster => "PKS.CreateCluster",
            Self::DeleteCluster => "PKS.DeleteCluster",
            Self::ResizeCluster => "PKS.ResizeCluster",
            Self::CreateUser => "PKS.CreateUser",
        }
    }

    pub fn requires_cluster_name(&self) -> bool {
        !matches!(self, Self::ListClusters)
    }
}

impl fmt::Display for PksOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for PksOperation {
    type Err = PksAdapterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [
            Self::ListClusters,
            Self::GetCluster,
            Self::CreateCluster,
            Self::DeleteCluster,
            Self::ResizeCluster,
            Self::CreateUser,
        ]
        .into_iter()
        .find(|op| op.id() == s)
        .ok_or_else(|| PksAdapterError::invalid("unsupported operation"))
    }
}

/// Request handled by the PKS adapter service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdapterRequest {
    pub operation: PksOperation,
    pub endpoint_link: String,
    #[serde(default)]
    pub custom_properties: BTreeMap<String, String>,
}

impl AdapterRequest {
    pub fn new(operation: PksOperation, endpoint_link: impl Into<String>) -> Self {
        Self {
            operation,
            endpoint_link: endpoint_link.into(),
            custom_properties: BTreeMap::new(),
        }
    }

    pub fn with_properties(mut self, properties: BTreeMap<String, String>) -> Self {
        self.custom_properties = properties;
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.custom_properties.insert(key.into(), value.into());
        self
    }

    fn property(&self, key: &str) -> Option<&str> {
        self.custom_properties
            .get(key)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    pub fn cluster_name(&self) -> Option<&str> {
        self.property(pks_properties::CLUSTER_NAME)
    }

    pub fn worker_instances(&self) -> Result<Option<u32>, PksAdapterError> {
        self.property(pks_properties::WORKER_INSTANCES)
            .map(|raw| {
                raw.parse().map_err(|_| {
                    PksAdapterError::invalid(format!("invalid worker instances value: {raw}"))
                })
            })
            .transpose()
    }

    /// Reject malformed requests before any remote call is made
    pub fn validate(&self) -> Result<(), PksAdapterError> {
        if self.endpoint_link.trim().is_empty() {
            return Err(PksAdapterError::invalid("endpoint link is required"));
        }
        if self.operation.requires_cluster_name() && self.cluster_name().is_none() {
            return Err(PksAdapterError::invalid("cluster name is required"));
        }
        match self.operation {
            PksOperation::CreateCluster if self.property(pks_properties::PLAN_NAME).is_none() => {
                Err(PksAdapterError::invalid("plan name is required"))
            }
            PksOperation::ResizeCluster if self.worker_instances()?.is_none() => {
                Err(PksAdapterError::invalid("worker instances are required"))
            }
            _ => {
                self.worker_instances()?;
                Ok(())
            }
        }
    }

    /// Cluster specification assembled from the request properties
    pub fn cluster_spec(&self) -> Result<ClusterSpec, PksAdapterError> {
        let name = self
            .cluster_name()
            .ok_or_else(|| PksAdapterError::invalid("cluster name is required"))?;
        let plan_name = self
            .property(pks_properties::PLAN_NAME)
            .ok_or_else(|| PksAdapterError::invalid("plan name is required"))?;
        Ok(ClusterSpec {
            name: name.to_string(),
            plan_name: plan_name.to_string(),
            parameters: ClusterParameters {
                kubernetes_master_host: self
                    .property(pks_properties::MASTER_HOST)
                    .map(str::to_string),
                kubernetes_worker_instances: self.worker_instances()?,
            },
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "body", rename_all = "snake_case")]
pub enum AdapterResponse {
    Clusters(Vec<PksCluster>),
    Cluster(PksCluster),
    Deleted,
    User(KubeUser),
}
