//! # PKS Cluster Provisioning
//!
//! Workflow creating a Kubernetes cluster through a PKS endpoint.
//!
//! ```text
//! CREATED ──plan check, CreateCluster, cluster record──▶ PROCESSING
//! PROCESSING ──poll: GetCluster──▶ COMPLETED | ERROR
//! ```
//!
//! PROCESSING does nothing on entry; the periodic poll resumes it. Poll
//! failures are counted in the task results and the task fails once the
//! counter passes the configured ceiling.

use super::adapter::PksAdapterService;
use super::types::{
    AdapterRequest, AdapterResponse, PksCluster, PksEndpoint, PksOperation, LAST_ACTION_CREATE,
    LAST_ACTION_STATE_FAILED, LAST_ACTION_STATE_SUCCEEDED,
};
use crate::config::PksConfig;
use crate::error::AdmiralError;
use crate::orchestration::error_classifier::ErrorKind;
use crate::constants::pks_properties;
use crate::state_machine::{
    assign_once, StageOutcome, StateMachineError, StateMachineResult, SubStage, TaskFailure,
    TaskResults, Workflow, WorkflowTask,
};
use crate::store::{DocumentStore, ResourceKind};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const CLUSTER_STATUS_PROVISIONING: &str = "PROVISIONING";
pub const CLUSTER_STATUS_READY: &str = "READY";

pub const INVALID_PLAN_SELECTION_MESSAGE: &str =
    "Plan selection [{plan}] is not valid in the context of PKS cluster provisioning task [{task}]";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PksProvisioningStage {
    Created,
    Processing,
    Completed,
    Error,
}

impl fmt::Display for PksProvisioningStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => write!(f, "CREATED"),
            Self::Processing => write!(f, "PROCESSING"),
            Self::Completed => write!(f, "COMPLETED"),
            Self::Error => write!(f, "ERROR"),
        }
    }
}

impl SubStage for PksProvisioningStage {
    const ALL: &'static [Self] = &[Self::Created, Self::Processing, Self::Completed, Self::Error];
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PksProvisioningInput {
    pub endpoint_link: String,
    /// Register the cluster by master IP instead of master host name
    #[serde(default)]
    pub prefer_master_ip: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PksProvisioningResults {
    #[serde(default)]
    pub cluster_link: Option<String>,
    #[serde(default)]
    pub cluster_uuid: Option<String>,
    /// Consecutive failed status polls
    #[serde(default)]
    pub failure_counter: Option<u32>,
}

impl PksProvisioningResults {
    fn failures(&self) -> u32 {
        self.failure_counter.unwrap_or(0)
    }

    fn with_failures(count: u32) -> Self {
        Self {
            failure_counter: Some(count),
            ..Self::default()
        }
    }
}

impl TaskResults for PksProvisioningResults {
    fn merge(&mut self, update: Self) -> StateMachineResult<()> {
        assign_once("cluster_link", &mut self.cluster_link, update.cluster_link)?;
        assign_once("cluster_uuid", &mut self.cluster_uuid, update.cluster_uuid)?;
        if update.failure_counter.is_some() {
            self.failure_counter = update.failure_counter;
        }
        Ok(())
    }
}

type PksTask = WorkflowTask<PksClusterProvisioningWorkflow>;
type PksOutcome = StageOutcome<PksProvisioningStage, PksProvisioningResults>;

pub struct PksClusterProvisioningWorkflow {
    adapter: Arc<PksAdapterService>,
    store: Arc<dyn DocumentStore>,
    config: PksConfig,
}

impl PksClusterProvisioningWorkflow {
    pub fn new(adapter: Arc<PksAdapterService>, store: Arc<dyn DocumentStore>, config: PksConfig) -> Self {
        Self {
            adapter,
            store,
            config,
        }
    }

    fn property<'t>(task: &'t PksTask, key: &str) -> Option<&'t str> {
        task.custom_properties
            .get(key)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    fn adapter_request(task: &PksTask, operation: PksOperation) -> AdapterRequest {
        AdapterRequest::new(operation, task.input.endpoint_link.clone())
            .with_properties(task.custom_properties.clone())
    }

    async fn validate_plan_selection(&self, task: &PksTask) -> Result<(), String> {
        let plan = Self::property(task, pks_properties::PLAN_NAME).unwrap_or_default();
        let stored = self
            .store
            .get(&task.input.endpoint_link)
            .await
            .map_err(|e| e.to_string())?;
        let endpoint: PksEndpoint = stored.body_as().map_err(|e| e.to_string())?;

        if task
            .project_links()
            .any(|project| endpoint.allows_plan(project, plan))
        {
            debug!(plan, task_id = %task.id, "Valid plan selection for PKS cluster provisioning task");
            Ok(())
        } else {
            Err(INVALID_PLAN_SELECTION_MESSAGE
                .replace("{plan}", plan)
                .replace("{task}", &task.id))
        }
    }

    async fn start_provisioning(&self, task: &PksTask) -> PksOutcome {
        if let Err(reason) = self.validate_plan_selection(task).await {
            return StageOutcome::Fail(TaskFailure::new(
                ErrorKind::Validation,
                format!("Plan selection validation failed: {reason}"),
            ));
        }

        let cluster = match self
            .adapter
            .handle(Self::adapter_request(task, PksOperation::CreateCluster))
            .await
        {
            Ok(AdapterResponse::Cluster(cluster)) => cluster,
            Ok(other) => {
                return StageOutcome::fail(format!(
                    "Unexpected PKS adapter response for cluster creation: {other:?}"
                ))
            }
            Err(e) => return StageOutcome::Fail(e.classify().into()),
        };
        info!(task_id = %task.id, endpoint_link = %task.input.endpoint_link, cluster_uuid = %cluster.uuid, "PKS cluster provisioning started");

        let record = json!({
            "name": Self::property(task, pks_properties::CLUSTER_NAME),
            "endpoint_link": task.input.endpoint_link,
            "cluster_uuid": cluster.uuid,
            "plan_name": Self::property(task, pks_properties::PLAN_NAME),
            "status": CLUSTER_STATUS_PROVISIONING,
            "tenant_links": task.tenant_links,
        });
        match self
            .store
            .post(ResourceKind::Cluster.factory_link(), record)
            .await
        {
            Ok(created) => StageOutcome::Proceed {
                sub_stage: PksProvisioningStage::Processing,
                results: PksProvisioningResults {
                    cluster_link: Some(created.link),
                    cluster_uuid: Some(cluster.uuid),
                    failure_counter: None,
                },
            },
            Err(e) => {
                warn!(task_id = %task.id, error = %e, "Error creating cluster state");
                StageOutcome::Fail(TaskFailure::from(&AdmiralError::from(e)))
            }
        }
    }

    async fn check_status(&self, task: &PksTask, cluster: PksCluster) -> PksOutcome {
        if cluster.last_action != LAST_ACTION_CREATE {
            return StageOutcome::fail(format!(
                "Unexpected last action returned: {}",
                cluster.last_action
            ));
        }

        match cluster.last_action_state.as_str() {
            LAST_ACTION_STATE_SUCCEEDED => self.register_cluster(task, &cluster).await,
            LAST_ACTION_STATE_FAILED => StageOutcome::fail(format!(
                "Create PKS cluster failed: {}",
                cluster.last_action_description
            )),
            _ if task.results.failures() > 0 => StageOutcome::Record {
                results: PksProvisioningResults::with_failures(0),
            },
            _ => StageOutcome::Wait,
        }
    }

    async fn register_cluster(&self, task: &PksTask, cluster: &PksCluster) -> PksOutcome {
        let Some(cluster_link) = task.results.cluster_link.as_deref() else {
            return StageOutcome::fail("Cluster record link is missing");
        };
        let address = cluster.master_address(task.input.prefer_master_ip);
        let patch = json!({
            "status": CLUSTER_STATUS_READY,
            "address": address,
            "master_ips": cluster.master_ips,
        });
        match self.store.patch(cluster_link, patch).await {
            Ok(_) => {
                info!(task_id = %task.id, cluster_link, address = ?address, "PKS cluster provisioned");
                StageOutcome::Complete {
                    results: PksProvisioningResults::with_failures(0),
                }
            }
            Err(e) => StageOutcome::Fail(TaskFailure::from(&AdmiralError::from(e))),
        }
    }
}

#[async_trait]
impl Workflow for PksClusterProvisioningWorkflow {
    type SubStage = PksProvisioningStage;
    type Input = PksProvisioningInput;
    type Results = PksProvisioningResults;

    const KIND: ResourceKind = ResourceKind::PksClusterProvisioningTask;

    fn validate(&self, task: &PksTask) -> StateMachineResult<()> {
        for key in [
            pks_properties::CLUSTER_NAME,
            pks_properties::PLAN_NAME,
            pks_properties::MASTER_HOST,
        ] {
            if Self::property(task, key).is_none() {
                return Err(StateMachineError::validation(format!(
                    "customProperties [{key}] is required"
                )));
            }
        }
        if task.input.endpoint_link.trim().is_empty() {
            return Err(StateMachineError::validation("endpointLink is required"));
        }
        if task.project_links().next().is_none() {
            return Err(StateMachineError::validation(
                "tenantLinks(project/group links only) is required",
            ));
        }
        Ok(())
    }

    async fn handle(&self, task: &PksTask) -> PksOutcome {
        match task.sub_stage {
            PksProvisioningStage::Created => self.start_provisioning(task).await,
            // resumed by the periodic status poll
            _ => StageOutcome::Wait,
        }
    }

    async fn poll(&self, task: &PksTask) -> PksOutcome {
        if task.sub_stage != PksProvisioningStage::Processing {
            return StageOutcome::Wait;
        }

        match self
            .adapter
            .handle(Self::adapter_request(task, PksOperation::GetCluster))
            .await
        {
            Ok(AdapterResponse::Cluster(cluster)) => self.check_status(task, cluster).await,
            Ok(other) => StageOutcome::fail(format!(
                "Unexpected PKS adapter response for cluster status: {other:?}"
            )),
            Err(e) => {
                let failures = task.results.failures();
                warn!(
                    task_id = %task.id,
                    endpoint_link = %task.input.endpoint_link,
                    failures,
                    error = %e,
                    "Failed getting PKS cluster status"
                );
                if failures >= self.config.max_poll_failures {
                    StageOutcome::Fail(TaskFailure::new(
                        e.classify().kind,
                        format!(
                            "PKS adapter request failed for: {}, max failures reached: {}",
                            task.input.endpoint_link, e
                        ),
                    ))
                } else {
                    StageOutcome::Record {
                        results: PksProvisioningResults::with_failures(failures + 1),
                    }
                }
            }
        }
    }

    fn resource_links(&self, results: &PksProvisioningResults) -> Vec<String> {
        results.cluster_link.iter().cloned().collect()
    }
}
