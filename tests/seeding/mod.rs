//! Host selection, build-if-absent and image provisioning tasks.
//!
//! Runs on paused time so build polls advance instantly.

use crate::common::{
    as_dyn, build_stage, eventually, new_store, parent_callback, record_build, register_hosts,
    register_zone, test_config, MockImageHostAdapter, RecordingCallbackNotifier, WAIT,
};
use admiral_core::config::StaticConfigurationStore;
use admiral_core::constants::properties::BUILD_IMAGE_RETRIES_COUNT;
use admiral_core::images::{
    BuildStage, ImageBuildRecord, ImageProvisioningInput, ImageProvisioningStage,
    ImageProvisioningWorkflow, SeedingCoordinator, SeedingError,
};
use admiral_core::orchestration::ErrorKind;
use admiral_core::state_machine::{TaskRequest, TaskService, TaskStage};
use admiral_core::store::InMemoryDocumentStore;
use std::sync::Arc;
use std::time::Duration;

const IMAGE: &str = "admiral/closure-runtime:python-3.11";

fn coordinator(
    store: &Arc<InMemoryDocumentStore>,
    adapter: &Arc<MockImageHostAdapter>,
    properties: &Arc<StaticConfigurationStore>,
) -> SeedingCoordinator {
    let config = test_config();
    SeedingCoordinator::new(
        as_dyn(store),
        adapter.clone(),
        properties.clone(),
        config.seeding.clone(),
        config.task.long_operation_timeout(),
    )
}

#[tokio::test(start_paused = true)]
async fn test_selection_prefers_cached_host_and_seeds_peers() {
    let store = new_store();
    let adapter = Arc::new(MockImageHostAdapter::new());
    let properties = Arc::new(StaticConfigurationStore::new());
    let pool = register_zone(store.as_ref(), "zone-a").await;
    let hosts = register_hosts(store.as_ref(), &pool, &[("h1", "ON"), ("h2", "ON"), ("h3", "ON")]).await;
    record_build(store.as_ref(), IMAGE, &hosts[1], BuildStage::Finished).await;
    let seeding = coordinator(&store, &adapter, &properties);

    let selection = seeding.select_host(&hosts, IMAGE).await.unwrap();

    assert_eq!(selection.selected, hosts[1]);
    assert_eq!(selection.seeding, vec![hosts[0].clone(), hosts[2].clone()]);

    let expected = vec![hosts[0].clone(), hosts[2].clone()];
    let seeded = adapter.clone();
    eventually("peers seeded", || seeded.built_on() == expected).await;
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(build_stage(store.as_ref(), IMAGE, &hosts[0]).await, Some(BuildStage::Finished));
    assert_eq!(build_stage(store.as_ref(), IMAGE, &hosts[2]).await, Some(BuildStage::Finished));
    assert_eq!(seeding.known_hosts(IMAGE).await.len(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_no_live_candidates_is_no_capacity() {
    let store = new_store();
    let adapter = Arc::new(MockImageHostAdapter::new());
    let seeding = coordinator(&store, &adapter, &Arc::new(StaticConfigurationStore::new()));

    let err = seeding
        .select_host(&[String::new(), String::new()], IMAGE)
        .await
        .unwrap_err();

    assert!(matches!(err, SeedingError::NoAvailableHosts));
    assert_eq!(adapter.builds(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_finished_build_is_reused() {
    let store = new_store();
    let adapter = Arc::new(MockImageHostAdapter::new());
    let seeding = coordinator(&store, &adapter, &Arc::new(StaticConfigurationStore::new()));
    record_build(store.as_ref(), IMAGE, "/resources/compute/h1", BuildStage::Finished).await;

    let record = seeding.ensure_built(IMAGE, "/resources/compute/h1").await.unwrap();

    assert_eq!(record.stage(), BuildStage::Finished);
    assert_eq!(adapter.builds(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_failed_build_is_retried_within_ceiling() {
    let store = new_store();
    let adapter = Arc::new(MockImageHostAdapter::failing(2, "base image pull failed"));
    let properties = Arc::new(StaticConfigurationStore::new().with(BUILD_IMAGE_RETRIES_COUNT, "3"));
    let seeding = coordinator(&store, &adapter, &properties);

    let record = seeding.ensure_built(IMAGE, "/resources/compute/h1").await.unwrap();

    assert_eq!(record.stage(), BuildStage::Finished);
    assert_eq!(record.attempts, 2);
    assert_eq!(adapter.builds(), 3);
    assert_eq!(adapter.base_loads(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_build_failure_after_ceiling_reports_reason() {
    let store = new_store();
    let adapter = Arc::new(MockImageHostAdapter::failing(10, "disk full"));
    let properties = Arc::new(StaticConfigurationStore::new().with(BUILD_IMAGE_RETRIES_COUNT, "1"));
    let seeding = coordinator(&store, &adapter, &properties);

    let err = seeding
        .ensure_built(IMAGE, "/resources/compute/h1")
        .await
        .unwrap_err();

    match err {
        SeedingError::BuildFailed { reason, host, .. } => {
            assert_eq!(reason, "disk full");
            assert_eq!(host, "/resources/compute/h1");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(adapter.builds(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_waiters_share_one_build() {
    let store = new_store();
    let adapter = Arc::new(MockImageHostAdapter::new());
    let seeding = coordinator(&store, &adapter, &Arc::new(StaticConfigurationStore::new()));

    let (first, second) = tokio::join!(
        seeding.ensure_built(IMAGE, "/resources/compute/h1"),
        seeding.ensure_built(IMAGE, "/resources/compute/h1"),
    );

    assert_eq!(first.unwrap().stage(), BuildStage::Finished);
    assert_eq!(second.unwrap().stage(), BuildStage::Finished);
    assert_eq!(adapter.builds(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_stuck_build_counts_as_failed_attempt() {
    let store = new_store();
    let adapter = Arc::new(MockImageHostAdapter::new());
    let seeding = coordinator(&store, &adapter, &Arc::new(StaticConfigurationStore::new()));
    // a build whose worker went away
    record_build(store.as_ref(), IMAGE, "/resources/compute/h1", BuildStage::Started).await;

    let record = seeding.ensure_built(IMAGE, "/resources/compute/h1").await.unwrap();

    assert_eq!(record.stage(), BuildStage::Finished);
    assert_eq!(record.attempts, 1);
    assert_eq!(adapter.builds(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_retry_ceiling_is_read_once() {
    let store = new_store();
    let adapter = Arc::new(MockImageHostAdapter::new());
    let properties = Arc::new(StaticConfigurationStore::new().with(BUILD_IMAGE_RETRIES_COUNT, "4"));
    let seeding = coordinator(&store, &adapter, &properties);

    assert_eq!(seeding.max_build_retries().await, 4);
    properties.set(BUILD_IMAGE_RETRIES_COUNT, "9");
    assert_eq!(seeding.max_build_retries().await, 4);
}

#[tokio::test(start_paused = true)]
async fn test_unparsable_ceiling_falls_back_to_configured_default() {
    let store = new_store();
    let adapter = Arc::new(MockImageHostAdapter::new());
    let properties = Arc::new(StaticConfigurationStore::new().with(BUILD_IMAGE_RETRIES_COUNT, "lots"));
    let seeding = coordinator(&store, &adapter, &properties);

    assert_eq!(
        seeding.max_build_retries().await,
        test_config().seeding.max_build_retries
    );
}

fn image_service(
    store: &Arc<InMemoryDocumentStore>,
    seeding: SeedingCoordinator,
    notifier: Arc<RecordingCallbackNotifier>,
) -> TaskService<ImageProvisioningWorkflow> {
    TaskService::new(
        ImageProvisioningWorkflow::new(seeding, as_dyn(store)),
        as_dyn(store),
        notifier,
        test_config().task,
    )
}

fn zone_request(zone: &str) -> TaskRequest<ImageProvisioningInput> {
    TaskRequest::new(ImageProvisioningInput {
        image: IMAGE.to_string(),
        placement_zone_link: Some(zone.to_string()),
        host_selections: Vec::new(),
    })
}

#[tokio::test(start_paused = true)]
async fn test_image_provisioning_task_runs_on_cached_host() {
    let store = new_store();
    let adapter = Arc::new(MockImageHostAdapter::new());
    let notifier = Arc::new(RecordingCallbackNotifier::new());
    let pool = register_zone(store.as_ref(), "zone-a").await;
    let hosts = register_hosts(store.as_ref(), &pool, &[("h1", "ON"), ("h2", "ON"), ("h3", "OFF")]).await;
    record_build(store.as_ref(), IMAGE, &hosts[1], BuildStage::Finished).await;
    let seeding = coordinator(&store, &adapter, &Arc::new(StaticConfigurationStore::new()));
    let service = image_service(&store, seeding, notifier.clone());

    let created = service
        .create(zone_request(&pool).with_callback(parent_callback()))
        .await
        .unwrap();
    let task = service.wait_for_terminal(&created.link, WAIT).await.unwrap();

    assert_eq!(task.stage(), TaskStage::Finished);
    assert_eq!(task.sub_stage, ImageProvisioningStage::Completed);
    assert_eq!(task.results.resource_pool_link.as_deref(), Some(pool.as_str()));
    assert_eq!(task.results.selected_compute_link.as_deref(), Some(hosts[1].as_str()));
    assert_eq!(
        task.results.image_build_link,
        Some(ImageBuildRecord::link(IMAGE, &hosts[1]))
    );

    let callbacks = notifier.clone();
    eventually("parent notified", || callbacks.responses().len() == 1).await;
    assert_eq!(notifier.responses()[0].resource_links, vec![hosts[1].clone()]);

    // the powered-on peer is warmed, the powered-off one is left alone
    let seeded = adapter.clone();
    eventually("peer seeded", || seeded.built_on() == vec![hosts[0].clone()]).await;
    assert_eq!(build_stage(store.as_ref(), IMAGE, &hosts[2]).await, None);
}

#[tokio::test(start_paused = true)]
async fn test_image_provisioning_without_powered_on_hosts_fails() {
    let store = new_store();
    let adapter = Arc::new(MockImageHostAdapter::new());
    let pool = register_zone(store.as_ref(), "zone-b").await;
    register_hosts(store.as_ref(), &pool, &[("h1", "OFF")]).await;
    let seeding = coordinator(&store, &adapter, &Arc::new(StaticConfigurationStore::new()));
    let service = image_service(&store, seeding, Arc::new(RecordingCallbackNotifier::new()));

    let created = service.create(zone_request(&pool)).await.unwrap();
    let task = service.wait_for_terminal(&created.link, WAIT).await.unwrap();

    assert_eq!(task.stage(), TaskStage::Failed);
    let failure = task.failure().unwrap();
    assert_eq!(failure.kind, ErrorKind::NoCapacity);
    assert_eq!(failure.message, "No available hosts configured");
    assert_eq!(adapter.builds(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_image_provisioning_requires_placement() {
    let store = new_store();
    let adapter = Arc::new(MockImageHostAdapter::new());
    let seeding = coordinator(&store, &adapter, &Arc::new(StaticConfigurationStore::new()));
    let service = image_service(&store, seeding, Arc::new(RecordingCallbackNotifier::new()));

    let err = service
        .create(TaskRequest::new(ImageProvisioningInput {
            image: IMAGE.to_string(),
            placement_zone_link: None,
            host_selections: Vec::new(),
        }))
        .await
        .unwrap_err();

    assert_eq!(err.status_code(), 400);
    assert!(store.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_image_provisioning_without_cached_host_builds_and_seeds_pool() {
    let store = new_store();
    let adapter = Arc::new(MockImageHostAdapter::new());
    let pool = register_zone(store.as_ref(), "zone-c").await;
    let hosts = register_hosts(store.as_ref(), &pool, &[("h1", "ON"), ("h2", "ON"), ("h3", "ON")]).await;
    let seeding = coordinator(&store, &adapter, &Arc::new(StaticConfigurationStore::new()));
    let service = image_service(&store, seeding, Arc::new(RecordingCallbackNotifier::new()));

    let created = service.create(zone_request(&pool)).await.unwrap();
    let task = service.wait_for_terminal(&created.link, WAIT).await.unwrap();

    assert_eq!(task.stage(), TaskStage::Finished);
    let selected = task.results.selected_compute_link.clone().unwrap();
    assert!(hosts.contains(&selected));
    assert_eq!(task.results.image_build_link, Some(ImageBuildRecord::link(IMAGE, &selected)));
    assert_eq!(build_stage(store.as_ref(), IMAGE, &selected).await, Some(BuildStage::Finished));

    // every other powered-on host gets the image too
    let seeded = adapter.clone();
    eventually("whole pool seeded", || seeded.built_on() == hosts).await;
    for host in &hosts {
        let mut stage = None;
        for _ in 0..10 {
            stage = build_stage(store.as_ref(), IMAGE, host).await;
            if stage == Some(BuildStage::Finished) {
                break;
            }
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
        assert_eq!(stage, Some(BuildStage::Finished), "host {host}");
    }
    assert_eq!(adapter.builds(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_image_provisioning_build_failure_fails_task_with_reason() {
    let store = new_store();
    let adapter = Arc::new(MockImageHostAdapter::failing(100, "disk full"));
    let notifier = Arc::new(RecordingCallbackNotifier::new());
    let properties = Arc::new(StaticConfigurationStore::new().with(BUILD_IMAGE_RETRIES_COUNT, "1"));
    let pool = register_zone(store.as_ref(), "zone-d").await;
    let hosts = register_hosts(store.as_ref(), &pool, &[("h1", "ON")]).await;
    let seeding = coordinator(&store, &adapter, &properties);
    let service = image_service(&store, seeding, notifier.clone());

    let created = service
        .create(zone_request(&pool).with_callback(parent_callback()))
        .await
        .unwrap();
    let task = service.wait_for_terminal(&created.link, WAIT).await.unwrap();

    assert_eq!(task.stage(), TaskStage::Failed);
    assert_eq!(task.sub_stage, ImageProvisioningStage::Error);
    let failure = task.failure().unwrap();
    assert_eq!(failure.kind, ErrorKind::Permanent);
    assert_eq!(
        failure.message,
        format!("Failed to build image {IMAGE} on host {}: disk full", hosts[0])
    );
    assert_eq!(build_stage(store.as_ref(), IMAGE, &hosts[0]).await, Some(BuildStage::Failed));
    assert_eq!(adapter.builds(), 2);

    let callbacks = notifier.clone();
    eventually("parent notified of failure", || callbacks.responses().len() == 1).await;
}
