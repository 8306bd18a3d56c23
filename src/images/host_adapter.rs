use crate::orchestration::error_classifier::ClassifiedError;
use async_trait::async_trait;

/// Container host operations needed to materialize an image on a host
#[async_trait]
pub trait ImageHostAdapter: Send + Sync {
    /// Load the runtime base image the build starts from
    async fn load_base_image(&self, image: &str, host_link: &str) -> Result<(), ClassifiedError>;

    async fn build_image(&self, image: &str, host_link: &str) -> Result<(), ClassifiedError>;
}
