//! Bootstrap wiring of the whole engine over in-memory collaborators.

use crate::common::{
    record_build, register_hosts, register_zone, test_config, MockImageHostAdapter,
    MockPksClient, WAIT,
};
use admiral_core::config::{ConfigManager, ConfigurationError, StoreConfigurationStore};
use admiral_core::constants::properties::BUILD_IMAGE_RETRIES_COUNT;
use admiral_core::images::{BuildStage, ImageProvisioningInput};
use admiral_core::orchestration::{OrchestrationDependencies, OrchestrationSystem};
use admiral_core::state_machine::{TaskRequest, TaskStage};
use admiral_core::store::ResourceKind;
use admiral_core::AdmiralConfig;
use serde_json::json;
use std::sync::Arc;

const IMAGE: &str = "admiral/closure-runtime:nodejs-20";

fn bootstrap(config: AdmiralConfig) -> (OrchestrationSystem, Arc<MockImageHostAdapter>) {
    let adapter = Arc::new(MockImageHostAdapter::new());
    let dependencies =
        OrchestrationDependencies::in_memory(&config, Arc::new(MockPksClient::new()), adapter.clone());
    let manager = ConfigManager::from_config(config, "test").unwrap();
    let system = OrchestrationSystem::bootstrap(manager, dependencies).unwrap();
    (system, adapter)
}

#[tokio::test]
async fn test_bootstrap_starts_background_work_and_shuts_down() {
    let (system, _) = bootstrap(test_config());

    let status = system.status();
    assert_eq!(status.environment, "test");
    assert!(status.running);
    assert!(status.composite_enabled);
    // session sweep, status poll, expiration and the composite chain
    assert_eq!(status.background_tasks, 4);
    assert_eq!(status.cached_sessions, 0);

    system.shutdown().await;
}

#[tokio::test]
async fn test_disabled_composite_chain_is_not_started() {
    let mut config = test_config();
    config.composite.enabled = false;
    let (system, _) = bootstrap(config);

    let status = system.status();
    assert!(!status.composite_enabled);
    assert_eq!(status.background_tasks, 3);

    system.shutdown().await;
}

#[test]
fn test_invalid_configuration_is_rejected() {
    let mut config = test_config();
    config.pks.poll_interval_seconds = 0;

    let err = ConfigManager::from_config(config, "test").err().unwrap();

    assert!(matches!(err, ConfigurationError::InvalidValue { .. }));
}

#[tokio::test]
async fn test_wired_system_reconciles_composites() {
    let (system, _) = bootstrap(test_config());
    let store = Arc::clone(system.store());
    let aggregate = ResourceKind::CompositeComponent.link_for("shop");
    store
        .create(&aggregate, json!({ "name": "shop" }))
        .await
        .unwrap();

    store
        .create(
            &ResourceKind::Network.link_for("frontend"),
            json!({ "composite_component_link": aggregate, "tenant_links": ["/tenants/retail"] }),
        )
        .await
        .unwrap();

    let mut converged = false;
    for _ in 0..500 {
        let body = store.get(&aggregate).await.unwrap().body;
        if body["tenant_links"] == json!(["/tenants/retail"]) {
            converged = true;
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    assert!(converged, "aggregate never picked up its constituent's tenant");

    system.shutdown().await;
}

#[tokio::test]
async fn test_wired_image_task_reads_properties_from_store() {
    let (system, adapter) = bootstrap(test_config());
    let store = Arc::clone(system.store());
    store
        .create(
            &StoreConfigurationStore::property_link(BUILD_IMAGE_RETRIES_COUNT),
            json!({ "value": "6" }),
        )
        .await
        .unwrap();
    assert_eq!(system.seeding().max_build_retries().await, 6);

    let pool = register_zone(store.as_ref(), "zone-c").await;
    let hosts = register_hosts(store.as_ref(), &pool, &[("h1", "ON")]).await;
    record_build(store.as_ref(), IMAGE, &hosts[0], BuildStage::Finished).await;

    let created = system
        .image_tasks()
        .create(TaskRequest::new(ImageProvisioningInput {
            image: IMAGE.to_string(),
            placement_zone_link: Some(pool.clone()),
            host_selections: Vec::new(),
        }))
        .await
        .unwrap();
    let task = system
        .image_tasks()
        .wait_for_terminal(&created.link, WAIT)
        .await
        .unwrap();

    assert_eq!(task.stage(), TaskStage::Finished);
    assert_eq!(task.results.selected_compute_link.as_deref(), Some(hosts[0].as_str()));
    assert_eq!(adapter.builds(), 0);

    system.shutdown().await;
}
