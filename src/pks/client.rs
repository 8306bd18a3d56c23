use super::types::{ClusterSpec, KubeUser, PksCluster, PksContext, UaaToken};
use crate::orchestration::error_classifier::ClassifiedError;
use async_trait::async_trait;

/// Remote PKS API. Failures carry the HTTP status the endpoint answered with.
#[async_trait]
pub trait PksClient: Send + Sync {
    async fn login(
        &self,
        uaa_endpoint: &str,
        username: &str,
        password: &str,
    ) -> Result<UaaToken, ClassifiedError>;

    async fn list_clusters(&self, context: &PksContext) -> Result<Vec<PksCluster>, ClassifiedError>;

    async fn get_cluster(&self, context: &PksContext, name: &str) -> Result<PksCluster, ClassifiedError>;

    async fn create_cluster(
        &self,
        context: &PksContext,
        spec: &ClusterSpec,
    ) -> Result<PksCluster, ClassifiedError>;

    async fn delete_cluster(&self, context: &PksContext, name: &str) -> Result<(), ClassifiedError>;

    async fn resize_cluster(
        &self,
        context: &PksContext,
        name: &str,
        worker_instances: u32,
    ) -> Result<PksCluster, ClassifiedError>;

    async fn create_user(&self, context: &PksContext, cluster: &str) -> Result<KubeUser, ClassifiedError>;
}
