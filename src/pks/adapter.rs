//! # PKS Adapter Service
//!
//! Executes [`AdapterRequest`]s against a PKS endpoint.
//!
//! ## Sessions
//!
//! Logins are cached in an [`ExpiringResourceCache`] keyed by the endpoint link
//! and the endpoint document's logical version, so editing an endpoint (for
//! example rotating its credentials) routes the next request to a fresh login
//! without an explicit invalidation.
//!
//! ## Retries
//!
//! Each operation runs inside a [`RetriableTask`] using the operation policy.
//! A 401 answer invalidates the cached session and is retried with a new
//! login; every other failure prevents further retries. Session acquisition
//! has its own, longer-delay policy.

use super::client::PksClient;
use super::error::PksAdapterError;
use super::types::{
    AdapterRequest, AdapterResponse, Credentials, CredentialsType, PksContext, PksEndpoint,
    PksOperation,
};
use crate::cache::ExpiringResourceCache;
use crate::config::RetryConfig;
use crate::logging::log_adapter_operation;
use crate::orchestration::error_classifier::{ClassifiedError, ErrorKind};
use crate::orchestration::maintenance::ServiceAvailability;
use crate::resilience::RetriableTask;
use crate::store::DocumentStore;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Cache key of a PKS session
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionKey {
    pub endpoint_link: String,
    /// Logical version of the endpoint document the session was created from
    pub version: u64,
}

pub type PksSessionCache = ExpiringResourceCache<SessionKey, PksContext>;

pub struct PksAdapterService {
    store: Arc<dyn DocumentStore>,
    client: Arc<dyn PksClient>,
    sessions: Arc<PksSessionCache>,
    retry: RetryConfig,
    availability: ServiceAvailability,
}

impl PksAdapterService {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        client: Arc<dyn PksClient>,
        sessions: Arc<PksSessionCache>,
        retry: RetryConfig,
    ) -> Self {
        Self {
            store,
            client,
            sessions,
            retry,
            availability: ServiceAvailability::available(),
        }
    }

    pub fn sessions(&self) -> &Arc<PksSessionCache> {
        &self.sessions
    }

    pub fn availability(&self) -> &ServiceAvailability {
        &self.availability
    }

    pub async fn handle(&self, request: AdapterRequest) -> Result<AdapterResponse, PksAdapterError> {
        request.validate()?;

        let stored = self
            .store
            .get(&request.endpoint_link)
            .await
            .map_err(|source| PksAdapterError::EndpointUnavailable {
                link: request.endpoint_link.clone(),
                source,
            })?;
        let endpoint: PksEndpoint = stored.body_as().map_err(|source| {
            PksAdapterError::EndpointUnavailable {
                link: request.endpoint_link.clone(),
                source,
            }
        })?;
        let key = SessionKey {
            endpoint_link: stored.link.clone(),
            version: stored.version,
        };

        info!(
            operation = %request.operation,
            endpoint = %endpoint.name,
            endpoint_link = %key.endpoint_link,
            "Received PKS adapter request"
        );

        let sessions = &self.sessions;
        let (key, endpoint, request) = (&key, &endpoint, &request);
        let result = RetriableTask::from_policy(
            format!("process-pks-operation-{}", request.operation),
            &self.retry.operation,
        )
        .on_failure(move |err: &ClassifiedError, context| {
            if err.is_unauthorized() {
                info!(
                    endpoint_link = %key.endpoint_link,
                    attempt = context.attempt(),
                    "Operation returned 401, invalidating session and retrying"
                );
                sessions.invalidate(key);
            } else {
                context.prevent_retries();
            }
        })
        .retry_if(|err: &ClassifiedError| err.is_unauthorized())
        .execute(move |attempt| async move {
            let session = self.session(key, endpoint).await?;
            let response = self.invoke(request, &session).await;
            log_adapter_operation(
                "pks",
                request.operation.id(),
                &key.endpoint_link,
                attempt,
                if response.is_ok() { "succeeded" } else { "failed" },
                response.as_ref().err().map(|e| e.message.as_str()),
            );
            response
        })
        .await;

        result.map_err(PksAdapterError::from)
    }

    /// Drop sessions that are expired or about to expire
    pub fn maintenance(&self) -> usize {
        if !self.availability.is_available() {
            debug!("Skipping PKS session maintenance since service is not available");
            return 0;
        }
        let removed = self.sessions.sweep();
        if removed > 0 {
            info!(removed, "Removed expiring PKS sessions");
        }
        removed
    }

    async fn session(
        &self,
        key: &SessionKey,
        endpoint: &PksEndpoint,
    ) -> Result<PksContext, ClassifiedError> {
        RetriableTask::from_policy(
            format!("get-token-from-{}", endpoint.uaa_endpoint),
            &self.retry.login,
        )
        .retry_if(|err: &ClassifiedError| {
            matches!(
                err.kind,
                ErrorKind::Connection | ErrorKind::Timeout | ErrorKind::AuthenticationExpired
            )
        })
        .execute(move |_| {
            self.sessions
                .get_or_create_bounded(key.clone(), move || self.login(key, endpoint))
        })
        .await
    }

    async fn login(
        &self,
        key: &SessionKey,
        endpoint: &PksEndpoint,
    ) -> Result<(PksContext, Duration), ClassifiedError> {
        let link = &endpoint.auth_credentials_link;
        let stored = self.store.get(link).await.map_err(|e| {
            ClassifiedError::from_status(
                e.status_code(),
                format!("Unable to get PKS endpoint credentials state {link}, reason: {e}"),
            )
        })?;
        let credentials: Credentials = stored
            .body_as()
            .map_err(|e| ClassifiedError::validation(e.to_string()))?;

        let (username, password) = match credentials.credentials_type {
            CredentialsType::Password => (
                credentials.user_email.unwrap_or_default(),
                credentials.private_key.unwrap_or_default(),
            ),
            other => {
                return Err(ClassifiedError::validation(format!(
                    "Credential type {other} is not supported"
                )))
            }
        };

        let token = self
            .client
            .login(&endpoint.uaa_endpoint, &username, &password)
            .await?;
        let lifetime = token.lifetime();
        info!(
            endpoint_link = %key.endpoint_link,
            version = key.version,
            expires_in_seconds = lifetime.as_secs(),
            "🔑 Obtained PKS session"
        );
        Ok((PksContext::create(&key.endpoint_link, endpoint, token), lifetime))
    }

    async fn invoke(
        &self,
        request: &AdapterRequest,
        session: &PksContext,
    ) -> Result<AdapterResponse, ClassifiedError> {
        let cluster_name = || {
            request
                .cluster_name()
                .ok_or_else(|| ClassifiedError::validation("cluster name is required"))
        };

        match request.operation {
            PksOperation::ListClusters => self
                .client
                .list_clusters(session)
                .await
                .map(AdapterResponse::Clusters),
            PksOperation::GetCluster => self
                .client
                .get_cluster(session, cluster_name()?)
                .await
                .map(AdapterResponse::Cluster),
            PksOperation::CreateCluster => {
                let spec = request.cluster_spec().map_err(ClassifiedError::from)?;
                self.client
                    .create_cluster(session, &spec)
                    .await
                    .map(AdapterResponse::Cluster)
            }
            PksOperation::DeleteCluster => self
                .client
                .delete_cluster(session, cluster_name()?)
                .await
                .map(|_| AdapterResponse::Deleted),
            PksOperation::ResizeCluster => {
                let workers = request
                    .worker_instances()
                    .map_err(ClassifiedError::from)?
                    .ok_or_else(|| ClassifiedError::validation("worker instances are required"))?;
                self.client
                    .resize_cluster(session, cluster_name()?, workers)
                    .await
                    .map(AdapterResponse::Cluster)
            }
            PksOperation::CreateUser => self
                .client
                .create_user(session, cluster_name()?)
                .await
                .map(AdapterResponse::User),
        }
    }
}
