//! Documents and wiring shared by the integration suites.

use super::mocks::MockPksClient;
use admiral_core::cache::ExpiringResourceCache;
use admiral_core::config::{AdmiralConfig, RetryConfig, RetryPolicy};
use admiral_core::constants::pks_properties;
use admiral_core::images::{BuildStage, ImageBuildRecord};
use admiral_core::pks::{PksAdapterService, PksProvisioningInput};
use admiral_core::state_machine::{TaskCallback, TaskRequest};
use admiral_core::store::{DocumentStore, InMemoryDocumentStore, ResourceKind};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

pub const PROJECT_LINK: &str = "/projects/provisioning";
pub const PLAN: &str = "small";
pub const PARENT_LINK: &str = "/request/parent-tasks/p1";

/// Defaults with instant retries so failure paths run without real delays
pub fn test_config() -> AdmiralConfig {
    let mut config = AdmiralConfig::default();
    config.retry = RetryConfig {
        operation: RetryPolicy::new(1, 0),
        login: RetryPolicy::new(1, 0),
    };
    config.seeding.build_poll_interval_seconds = 1;
    config.seeding.base_image_poll_interval_seconds = 1;
    config.seeding.max_polls_per_attempt = 5;
    config
}

pub fn new_store() -> Arc<InMemoryDocumentStore> {
    Arc::new(InMemoryDocumentStore::new())
}

pub fn as_dyn(store: &Arc<InMemoryDocumentStore>) -> Arc<dyn DocumentStore> {
    Arc::clone(store) as Arc<dyn DocumentStore>
}

pub fn parent_callback() -> TaskCallback {
    TaskCallback {
        parent_link: PARENT_LINK.to_string(),
        finished_sub_stage: "RESOURCES_PROVISIONED".to_string(),
        failed_sub_stage: "ERROR".to_string(),
    }
}

/// Credentials plus an endpoint allowing `PLAN` for `PROJECT_LINK`; returns the endpoint link
pub async fn register_pks_endpoint(store: &dyn DocumentStore, id: &str) -> String {
    let credentials_link = ResourceKind::Credentials.link_for(&format!("{id}-credentials"));
    store
        .create(
            &credentials_link,
            json!({
                "type": "Password",
                "user_email": "admin@example.com",
                "private_key": "secret",
            }),
        )
        .await
        .unwrap();

    let mut plan_assignments = serde_json::Map::new();
    plan_assignments.insert(PROJECT_LINK.to_string(), json!({ "plans": [PLAN] }));

    let endpoint_link = ResourceKind::PksEndpoint.link_for(id);
    store
        .create(
            &endpoint_link,
            json!({
                "name": id,
                "uaa_endpoint": format!("https://{id}.uaa.local:8443"),
                "api_endpoint": format!("https://{id}.api.local:9021"),
                "auth_credentials_link": credentials_link,
                "plan_assignments": plan_assignments,
            }),
        )
        .await
        .unwrap();
    endpoint_link
}

pub fn pks_adapter(
    store: Arc<dyn DocumentStore>,
    client: Arc<MockPksClient>,
    config: &AdmiralConfig,
) -> Arc<PksAdapterService> {
    let sessions = Arc::new(ExpiringResourceCache::new(
        "test-pks-sessions",
        config.session_cache.ttl(),
        config.session_cache.sweep_margin(&config.maintenance),
    ));
    Arc::new(PksAdapterService::new(
        store,
        client,
        sessions,
        config.retry.clone(),
    ))
}

pub fn cluster_request(endpoint_link: &str, cluster: &str, plan: &str) -> TaskRequest<PksProvisioningInput> {
    let mut request = TaskRequest::new(PksProvisioningInput {
        endpoint_link: endpoint_link.to_string(),
        prefer_master_ip: true,
    })
    .with_tenant_links([PROJECT_LINK]);
    for (key, value) in [
        (pks_properties::CLUSTER_NAME, cluster),
        (pks_properties::PLAN_NAME, plan),
        (pks_properties::MASTER_HOST, "master.local"),
    ] {
        request
            .custom_properties
            .insert(key.to_string(), value.to_string());
    }
    request
}

/// Resource pool document standing in for a placement zone; returns its link
pub async fn register_zone(store: &dyn DocumentStore, id: &str) -> String {
    let link = ResourceKind::ResourcePool.link_for(id);
    store.create(&link, json!({ "name": id })).await.unwrap();
    link
}

/// Compute hosts in `pool_link`; returns their links in input order
pub async fn register_hosts(
    store: &dyn DocumentStore,
    pool_link: &str,
    hosts: &[(&str, &str)],
) -> Vec<String> {
    let mut links = Vec::new();
    for (id, power_state) in hosts {
        let link = ResourceKind::Compute.link_for(id);
        store
            .create(
                &link,
                json!({
                    "name": id,
                    "resource_pool_link": pool_link,
                    "power_state": power_state,
                }),
            )
            .await
            .unwrap();
        links.push(link);
    }
    links
}

/// Build record at the deterministic link in the given stage
pub async fn record_build(store: &dyn DocumentStore, image: &str, host: &str, stage: BuildStage) {
    let mut record = ImageBuildRecord::new(image, host);
    record.task_info.stage = stage;
    store
        .create(
            &ImageBuildRecord::link(image, host),
            serde_json::to_value(record).unwrap(),
        )
        .await
        .unwrap();
}

pub async fn build_stage(store: &dyn DocumentStore, image: &str, host: &str) -> Option<BuildStage> {
    let stored = store.get(&ImageBuildRecord::link(image, host)).await.ok()?;
    stored.body_as::<ImageBuildRecord>().ok().map(|r| r.stage())
}

pub const WAIT: Duration = Duration::from_secs(30);
