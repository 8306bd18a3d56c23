//! PKS adapter session handling and cluster provisioning.

use crate::common::{
    as_dyn, cluster_request, new_store, parent_callback, pks_adapter, register_pks_endpoint,
    test_config, MockPksClient, RecordingCallbackNotifier, PLAN,
};
use admiral_core::constants::pks_properties;
use admiral_core::pks::{
    AdapterRequest, AdapterResponse, PksAdapterError, PksClusterProvisioningWorkflow, PksOperation,
    PksProvisioningStage,
};
use admiral_core::state_machine::{TaskService, TaskStage};
use admiral_core::store::{DocumentStore, ResourceKind};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn test_expired_session_is_refreshed_once() {
    let store = new_store();
    let endpoint = register_pks_endpoint(store.as_ref(), "pks-1").await;
    let client = Arc::new(MockPksClient::new());
    let adapter = pks_adapter(as_dyn(&store), client.clone(), &test_config());

    // warm the session, then let the endpoint reject it
    adapter
        .handle(AdapterRequest::new(PksOperation::ListClusters, &endpoint))
        .await
        .unwrap();
    client.reject_next_operations(1);

    let response = adapter
        .handle(AdapterRequest::new(PksOperation::ListClusters, &endpoint))
        .await
        .unwrap();

    assert_eq!(response, AdapterResponse::Clusters(Vec::new()));
    assert_eq!(client.logins(), 2);
    assert_eq!(client.operations(), 3);
    assert_eq!(client.tokens_used(), vec!["token-1", "token-1", "token-2"]);
}

#[tokio::test]
async fn test_repeated_unauthorized_exhausts_budget() {
    let store = new_store();
    let endpoint = register_pks_endpoint(store.as_ref(), "pks-1").await;
    let client = Arc::new(MockPksClient::new());
    let adapter = pks_adapter(as_dyn(&store), client.clone(), &test_config());
    client.reject_next_operations(10);

    let err = adapter
        .handle(AdapterRequest::new(PksOperation::ListClusters, &endpoint))
        .await
        .unwrap_err();

    assert_eq!(err.status_code(), 401);
    // one retry allowed by the operation budget
    assert_eq!(client.operations(), 2);
    assert_eq!(client.logins(), 2);
}

#[tokio::test]
async fn test_sessions_are_shared_across_requests() {
    let store = new_store();
    let endpoint = register_pks_endpoint(store.as_ref(), "pks-1").await;
    let client = Arc::new(MockPksClient::new());
    let adapter = pks_adapter(as_dyn(&store), client.clone(), &test_config());

    let requests = (0..8).map(|_| adapter.handle(AdapterRequest::new(PksOperation::ListClusters, &endpoint)));
    for result in futures::future::join_all(requests).await {
        result.unwrap();
    }

    assert_eq!(client.logins(), 1);
    assert_eq!(client.operations(), 8);
    assert_eq!(adapter.sessions().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_session_follows_token_expiry() {
    let store = new_store();
    let endpoint = register_pks_endpoint(store.as_ref(), "pks-1").await;
    let client = Arc::new(MockPksClient::with_token_lifetime(600));
    let adapter = pks_adapter(as_dyn(&store), client.clone(), &test_config());
    let margin = adapter.sessions().sweep_margin();
    assert!(margin < Duration::from_secs(600));

    adapter
        .handle(AdapterRequest::new(PksOperation::ListClusters, &endpoint))
        .await
        .unwrap();
    assert_eq!(adapter.maintenance(), 0);

    // well inside the cache TTL but within the margin of the token's expiry
    tokio::time::advance(Duration::from_secs(600) - margin + Duration::from_secs(1)).await;
    assert_eq!(adapter.maintenance(), 1);
    assert!(adapter.sessions().is_empty());

    adapter
        .handle(AdapterRequest::new(PksOperation::ListClusters, &endpoint))
        .await
        .unwrap();
    assert_eq!(client.logins(), 2);

    // without a sweep, an expired token is still never handed out
    tokio::time::advance(Duration::from_secs(601)).await;
    adapter
        .handle(AdapterRequest::new(PksOperation::ListClusters, &endpoint))
        .await
        .unwrap();
    assert_eq!(client.logins(), 3);
    assert_eq!(client.tokens_used(), vec!["token-1", "token-2", "token-3"]);
}

#[tokio::test]
async fn test_endpoint_update_starts_a_new_session() {
    let store = new_store();
    let endpoint = register_pks_endpoint(store.as_ref(), "pks-1").await;
    let client = Arc::new(MockPksClient::new());
    let adapter = pks_adapter(as_dyn(&store), client.clone(), &test_config());

    adapter
        .handle(AdapterRequest::new(PksOperation::ListClusters, &endpoint))
        .await
        .unwrap();
    store
        .patch(&endpoint, json!({ "api_endpoint": "https://pks-1.api.local:9022" }))
        .await
        .unwrap();
    adapter
        .handle(AdapterRequest::new(PksOperation::ListClusters, &endpoint))
        .await
        .unwrap();

    assert_eq!(client.logins(), 2);
}

#[tokio::test]
async fn test_non_auth_failure_is_not_retried() {
    let store = new_store();
    let endpoint = register_pks_endpoint(store.as_ref(), "pks-1").await;
    let client = Arc::new(MockPksClient::new());
    let adapter = pks_adapter(as_dyn(&store), client.clone(), &test_config());

    let err = adapter
        .handle(
            AdapterRequest::new(PksOperation::GetCluster, &endpoint)
                .with_property(pks_properties::CLUSTER_NAME, "missing"),
        )
        .await
        .unwrap_err();

    assert_eq!(err.status_code(), 404);
    assert_eq!(client.operations(), 1);
}

#[tokio::test]
async fn test_malformed_request_never_reaches_endpoint() {
    let store = new_store();
    let endpoint = register_pks_endpoint(store.as_ref(), "pks-1").await;
    let client = Arc::new(MockPksClient::new());
    let adapter = pks_adapter(as_dyn(&store), client.clone(), &test_config());

    let err = adapter
        .handle(
            AdapterRequest::new(PksOperation::ResizeCluster, &endpoint)
                .with_property(pks_properties::CLUSTER_NAME, "prod")
                .with_property(pks_properties::WORKER_INSTANCES, "many"),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, PksAdapterError::InvalidRequest(_)));
    assert_eq!(err.status_code(), 400);
    assert_eq!(client.logins(), 0);
    assert_eq!(client.operations(), 0);
}

#[tokio::test]
async fn test_unknown_endpoint_is_not_found() {
    let store = new_store();
    let client = Arc::new(MockPksClient::new());
    let adapter = pks_adapter(as_dyn(&store), client.clone(), &test_config());

    let err = adapter
        .handle(AdapterRequest::new(
            PksOperation::ListClusters,
            ResourceKind::PksEndpoint.link_for("nope"),
        ))
        .await
        .unwrap_err();

    assert_eq!(err.status_code(), 404);
    assert_eq!(client.logins(), 0);
}

fn cluster_service(
    store: Arc<dyn DocumentStore>,
    client: Arc<MockPksClient>,
    notifier: Arc<RecordingCallbackNotifier>,
) -> TaskService<PksClusterProvisioningWorkflow> {
    let config = test_config();
    let adapter = pks_adapter(Arc::clone(&store), client, &config);
    TaskService::new(
        PksClusterProvisioningWorkflow::new(adapter, Arc::clone(&store), config.pks.clone()),
        store,
        notifier,
        config.task.clone(),
    )
}

async fn wait_for_processing(service: &TaskService<PksClusterProvisioningWorkflow>, link: &str) {
    for _ in 0..500 {
        let task = service.get(link).await.unwrap();
        if task.sub_stage == PksProvisioningStage::Processing || task.is_terminal() {
            return;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    panic!("task {link} never left CREATED");
}

#[tokio::test]
async fn test_cluster_provisioning_end_to_end() {
    let store = new_store();
    let endpoint = register_pks_endpoint(store.as_ref(), "pks-1").await;
    let client = Arc::new(MockPksClient::new());
    let notifier = Arc::new(RecordingCallbackNotifier::new());
    let service = cluster_service(as_dyn(&store), client.clone(), notifier.clone());

    let created = service
        .create(cluster_request(&endpoint, "prod", PLAN).with_callback(parent_callback()))
        .await
        .unwrap();
    wait_for_processing(&service, &created.link).await;

    // still provisioning remotely
    assert_eq!(service.poll_active().await.unwrap(), 1);
    let task = service.get(&created.link).await.unwrap();
    assert_eq!(task.stage(), TaskStage::Started);
    assert_eq!(task.sub_stage, PksProvisioningStage::Processing);
    let cluster_link = task.results.cluster_link.clone().unwrap();
    let record = store.get(&cluster_link).await.unwrap();
    assert_eq!(record.body["status"], "PROVISIONING");
    assert_eq!(record.body["cluster_uuid"], "uuid-prod");

    client.finish_cluster("prod", "10.0.0.7");
    service.poll_active().await.unwrap();

    let task = service.get(&created.link).await.unwrap();
    assert_eq!(task.stage(), TaskStage::Finished);
    assert_eq!(task.sub_stage, PksProvisioningStage::Completed);
    let record = store.get(&cluster_link).await.unwrap();
    assert_eq!(record.body["status"], "READY");
    assert_eq!(record.body["address"], "10.0.0.7");
    assert_eq!(client.logins(), 1);
}

#[tokio::test]
async fn test_remote_failure_fails_task_with_description() {
    let store = new_store();
    let endpoint = register_pks_endpoint(store.as_ref(), "pks-1").await;
    let client = Arc::new(MockPksClient::new());
    let service = cluster_service(
        as_dyn(&store),
        client.clone(),
        Arc::new(RecordingCallbackNotifier::new()),
    );

    let created = service
        .create(cluster_request(&endpoint, "prod", PLAN))
        .await
        .unwrap();
    wait_for_processing(&service, &created.link).await;
    client.fail_cluster("prod", "no capacity in availability zone");
    service.poll_active().await.unwrap();

    let task = service.get(&created.link).await.unwrap();
    assert_eq!(task.stage(), TaskStage::Failed);
    assert_eq!(
        task.failure().unwrap().message,
        "Create PKS cluster failed: no capacity in availability zone"
    );
}

#[tokio::test]
async fn test_unassigned_plan_fails_task() {
    let store = new_store();
    let endpoint = register_pks_endpoint(store.as_ref(), "pks-1").await;
    let client = Arc::new(MockPksClient::new());
    let service = cluster_service(
        as_dyn(&store),
        client.clone(),
        Arc::new(RecordingCallbackNotifier::new()),
    );

    let created = service
        .create(cluster_request(&endpoint, "prod", "xlarge"))
        .await
        .unwrap();
    let task = service
        .wait_for_terminal(&created.link, crate::common::WAIT)
        .await
        .unwrap();

    assert_eq!(task.stage(), TaskStage::Failed);
    let message = &task.failure().unwrap().message;
    assert!(message.starts_with("Plan selection validation failed"));
    assert!(message.contains("xlarge"));
    assert!(client.cluster("prod").is_none());
}

#[tokio::test]
async fn test_missing_cluster_name_is_rejected_before_persisting() {
    let store = new_store();
    let endpoint = register_pks_endpoint(store.as_ref(), "pks-1").await;
    let documents_before = store.len();
    let service = cluster_service(
        as_dyn(&store),
        Arc::new(MockPksClient::new()),
        Arc::new(RecordingCallbackNotifier::new()),
    );

    let mut request = cluster_request(&endpoint, "prod", PLAN);
    request.custom_properties.remove(pks_properties::CLUSTER_NAME);
    let err = service.create(request).await.unwrap_err();

    assert_eq!(err.status_code(), 400);
    assert!(err.to_string().contains(pks_properties::CLUSTER_NAME));
    assert_eq!(store.len(), documents_before);
}
