//! Integration tests for the Compute REST implementation using wiremock
//!
//! These tests verify request routing and error classification against
//! mocked Compute Engine endpoints.

use psclink::error::ApiError;
use psclink::gcp::auth::GcpCredentials;
use psclink::gcp::client::GcpClient;
use psclink::operation::{Backoff, OperationStatus, OperationWaiter};
use psclink::provider::{ComputeApi, GcpCompute};
use psclink::provision::{Completed, Provisioner};
use psclink::resource::{HealthCheckSpec, ResourceDescriptor, ResourceKind, ResourceSpec, Scope};
use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{bearer_token, body_partial_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const PROJECT_PATH: &str = "/compute/v1/projects/test-project";

fn compute(server: &MockServer) -> GcpCompute {
    let client = GcpClient::with_credentials("test-project", GcpCredentials::from_access_token("test-token"))
        .unwrap()
        .with_base_url(&format!("{}/compute/v1", server.uri()))
        .unwrap();
    GcpCompute::new(client)
}

fn region() -> Scope {
    Scope::Regional("us-central1".to_string())
}

fn error_body(code: u16, reason: &str, message: &str) -> serde_json::Value {
    json!({
        "error": {
            "code": code,
            "message": message,
            "errors": [{"reason": reason, "message": message}]
        }
    })
}

/// Test module for request routing
mod routing_tests {
    use super::*;

    /// Insert posts to the scoped collection and parses the operation
    #[tokio::test]
    async fn test_insert_posts_to_collection() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(format!("{}/regions/us-central1/addresses", PROJECT_PATH)))
            .and(bearer_token("test-token"))
            .and(body_partial_json(json!({"name": "customer-psc-endpoint-ip"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "kind": "compute#operation",
                "name": "operation-123",
                "status": "RUNNING",
                "region": "https://www.googleapis.com/compute/v1/projects/test-project/regions/us-central1"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let op = compute(&server)
            .insert(
                ResourceKind::Address,
                &region(),
                &json!({"name": "customer-psc-endpoint-ip", "addressType": "INTERNAL"}),
            )
            .await
            .expect("insert should succeed");

        assert_eq!(op.name, "operation-123");
        assert_eq!(op.status, OperationStatus::Running);
        assert_eq!(op.scope, region());
    }

    /// Operations are polled in the scope they belong to
    #[tokio::test]
    async fn test_get_operation_uses_zonal_path() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path(format!("{}/zones/us-central1-a/operations/operation-9", PROJECT_PATH)))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "name": "operation-9",
                "status": "DONE",
                "zone": "https://www.googleapis.com/compute/v1/projects/test-project/zones/us-central1-a"
            })))
            .mount(&server)
            .await;

        let op = compute(&server)
            .get_operation(&Scope::Zonal("us-central1-a".to_string()), "operation-9")
            .await
            .unwrap();
        assert!(op.is_done());
    }

    /// Custom verbs are posted to `<resource>/<verb>`
    #[tokio::test]
    async fn test_invoke_posts_to_verb() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(format!(
                "{}/zones/us-central1-a/instanceGroups/redhat-service-group/setNamedPorts",
                PROJECT_PATH
            )))
            .and(body_partial_json(json!({"namedPorts": [{"name": "http", "port": 8080}]})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "name": "operation-ports",
                "status": "DONE"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let op = compute(&server)
            .invoke(
                ResourceKind::InstanceGroup,
                &Scope::Zonal("us-central1-a".to_string()),
                "redhat-service-group",
                "setNamedPorts",
                &json!({"namedPorts": [{"name": "http", "port": 8080}]}),
            )
            .await
            .unwrap();
        assert_eq!(op.name, "operation-ports");
    }

    /// listInstances follows nextPageToken until exhausted
    #[tokio::test]
    async fn test_list_group_instances_paginates() {
        let server = MockServer::start().await;
        let list_path = format!(
            "{}/zones/us-central1-a/instanceGroups/redhat-service-group/listInstances",
            PROJECT_PATH
        );

        Mock::given(method("POST"))
            .and(path(list_path.clone()))
            .and(query_param("pageToken", "page-2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "items": [{"instance": "projects/test-project/zones/us-central1-a/instances/vm-2"}]
            })))
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path(list_path))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "items": [{"instance": "projects/test-project/zones/us-central1-a/instances/vm-1"}],
                "nextPageToken": "page-2"
            })))
            .mount(&server)
            .await;

        let instances = compute(&server)
            .list_group_instances(&Scope::Zonal("us-central1-a".to_string()), "redhat-service-group")
            .await
            .unwrap();

        assert_eq!(instances.len(), 2);
        assert!(instances[0].ends_with("vm-1"));
        assert!(instances[1].ends_with("vm-2"));
    }
}

/// Test module for error classification
mod error_tests {
    use super::*;

    #[tokio::test]
    async fn test_404_is_not_found() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path(format!("{}/global/healthChecks/missing", PROJECT_PATH)))
            .respond_with(ResponseTemplate::new(404).set_body_json(error_body(
                404,
                "notFound",
                "The resource 'missing' was not found",
            )))
            .mount(&server)
            .await;

        let err = compute(&server)
            .get(ResourceKind::HealthCheck, &Scope::Global, "missing")
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_412_is_precondition_failed() {
        let server = MockServer::start().await;

        Mock::given(method("PUT"))
            .and(path(format!("{}/regions/us-central1/backendServices/bs", PROJECT_PATH)))
            .respond_with(ResponseTemplate::new(412).set_body_json(error_body(
                412,
                "conditionNotMet",
                "Supplied fingerprint does not match current metadata fingerprint.",
            )))
            .mount(&server)
            .await;

        let err = compute(&server)
            .update(ResourceKind::BackendService, &region(), "bs", &json!({"fingerprint": "old"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::PreconditionFailed(_)));
    }

    #[tokio::test]
    async fn test_in_use_reason_is_recognized() {
        let server = MockServer::start().await;

        Mock::given(method("DELETE"))
            .and(path(format!("{}/global/healthChecks/hc", PROJECT_PATH)))
            .respond_with(ResponseTemplate::new(400).set_body_json(error_body(
                400,
                "resourceInUseByAnotherResource",
                "The health_check resource 'hc' is already being used by 'bs'",
            )))
            .mount(&server)
            .await;

        let err = compute(&server)
            .delete(ResourceKind::HealthCheck, &Scope::Global, "hc")
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::ResourceInUse(msg) if msg.contains("'bs'")));
    }

    #[tokio::test]
    async fn test_403_is_plain_status() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path(format!("{}/global/networks/net", PROJECT_PATH)))
            .respond_with(ResponseTemplate::new(403).set_body_json(error_body(
                403,
                "forbidden",
                "Required 'compute.networks.get' permission",
            )))
            .mount(&server)
            .await;

        let err = compute(&server)
            .get(ResourceKind::Network, &Scope::Global, "net")
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Status { status: 403, .. }));
    }

    /// Transport errors while polling are not retried
    #[tokio::test]
    async fn test_poll_error_is_not_retried() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path(format!("{}/global/operations/operation-1", PROJECT_PATH)))
            .respond_with(ResponseTemplate::new(503).set_body_string("unavailable"))
            .expect(1)
            .mount(&server)
            .await;

        let api = compute(&server);
        let pending = psclink::operation::Operation {
            name: "operation-1".to_string(),
            scope: Scope::Global,
            status: OperationStatus::Running,
            error: None,
        };
        let waiter = OperationWaiter::new(&api, Backoff::new(Duration::from_millis(1), Duration::from_millis(5)));
        assert!(waiter.wait(&pending).await.is_err());
    }
}

/// Test module for the provisioner over REST
mod provisioner_tests {
    use super::*;

    fn health_check() -> ResourceDescriptor {
        ResourceDescriptor::new(
            "hc",
            "redhat-service-health-check",
            Scope::Global,
            ResourceSpec::HealthCheck(HealthCheckSpec {
                port: 8080,
                check_interval_sec: 10,
                timeout_sec: 5,
                healthy_threshold: 2,
                unhealthy_threshold: 3,
            }),
        )
    }

    /// A 409 on insert means someone else created it: read and report as existing
    #[tokio::test]
    async fn test_insert_conflict_is_already_existed() {
        let server = MockServer::start().await;
        let resource_path = format!("{}/global/healthChecks/redhat-service-health-check", PROJECT_PATH);

        // First GET (probe) misses, later GETs see the concurrently created resource
        Mock::given(method("GET"))
            .and(path(resource_path.clone()))
            .respond_with(ResponseTemplate::new(404).set_body_json(error_body(404, "notFound", "not found")))
            .up_to_n_times(1)
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path(format!("{}/global/healthChecks", PROJECT_PATH)))
            .respond_with(ResponseTemplate::new(409).set_body_json(error_body(
                409,
                "alreadyExists",
                "The resource 'redhat-service-health-check' already exists",
            )))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path(resource_path))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "name": "redhat-service-health-check",
                "selfLink": "https://www.googleapis.com/compute/v1/projects/test-project/global/healthChecks/redhat-service-health-check"
            })))
            .mount(&server)
            .await;

        let api = compute(&server);
        let result = Provisioner::new(&api, Backoff::default())
            .provision(&health_check(), &Completed::new())
            .await
            .unwrap();

        assert!(result.already_existed);
        assert!(result.self_link.ends_with("/healthChecks/redhat-service-health-check"));
    }

    /// Create, poll the operation to DONE, then re-read
    #[tokio::test]
    async fn test_create_waits_then_rereads() {
        let server = MockServer::start().await;
        let resource_path = format!("{}/global/healthChecks/redhat-service-health-check", PROJECT_PATH);

        Mock::given(method("GET"))
            .and(path(resource_path.clone()))
            .respond_with(ResponseTemplate::new(404).set_body_json(error_body(404, "notFound", "not found")))
            .up_to_n_times(1)
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path(format!("{}/global/healthChecks", PROJECT_PATH)))
            .and(body_partial_json(json!({"type": "TCP", "tcpHealthCheck": {"port": 8080}})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "name": "operation-hc",
                "status": "RUNNING"
            })))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path(format!("{}/global/operations/operation-hc", PROJECT_PATH)))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "name": "operation-hc",
                "status": "DONE"
            })))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path(resource_path))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "name": "redhat-service-health-check",
                "selfLink": "https://www.googleapis.com/compute/v1/projects/test-project/global/healthChecks/redhat-service-health-check"
            })))
            .mount(&server)
            .await;

        let api = compute(&server);
        let backoff = Backoff::new(Duration::from_millis(1), Duration::from_millis(5));
        let result = Provisioner::new(&api, backoff)
            .provision(&health_check(), &Completed::new())
            .await
            .unwrap();

        assert!(!result.already_existed);
    }
}

/// Test module for deletion over REST
mod decommission_tests {
    use super::*;
    use psclink::decommission::{Decommissioner, TeardownOutcome};
    use psclink::error::ProvisionError;

    fn health_check() -> ResourceDescriptor {
        ResourceDescriptor::new(
            "hc",
            "hc",
            Scope::Global,
            ResourceSpec::HealthCheck(HealthCheckSpec {
                port: 8080,
                check_interval_sec: 10,
                timeout_sec: 5,
                healthy_threshold: 2,
                unhealthy_threshold: 3,
            }),
        )
    }

    async fn mount_running_delete(server: &MockServer) {
        Mock::given(method("DELETE"))
            .and(path(format!("{}/global/healthChecks/hc", PROJECT_PATH)))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "name": "op-1",
                "status": "RUNNING"
            })))
            .expect(1)
            .mount(server)
            .await;
    }

    /// Losing track of the operation is not proof the resource is gone
    #[tokio::test]
    async fn test_operation_poll_404_is_not_already_absent() {
        let server = MockServer::start().await;
        mount_running_delete(&server).await;

        Mock::given(method("GET"))
            .and(path(format!("{}/global/operations/op-1", PROJECT_PATH)))
            .respond_with(ResponseTemplate::new(404).set_body_json(error_body(
                404,
                "notFound",
                "The resource 'operations/op-1' was not found",
            )))
            .expect(1)
            .mount(&server)
            .await;

        let api = compute(&server);
        let backoff = Backoff::new(Duration::from_millis(1), Duration::from_millis(5));
        let err = Decommissioner::new(&api, backoff)
            .delete(&health_check())
            .await
            .unwrap_err();

        assert!(matches!(err, ProvisionError::Transport(ApiError::NotFound(_))));
        assert!(!err.is_not_found());
    }

    #[tokio::test]
    async fn test_operation_resource_not_found_is_already_absent() {
        let server = MockServer::start().await;
        mount_running_delete(&server).await;

        Mock::given(method("GET"))
            .and(path(format!("{}/global/operations/op-1", PROJECT_PATH)))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "name": "op-1",
                "status": "DONE",
                "error": {
                    "errors": [{
                        "code": "RESOURCE_NOT_FOUND",
                        "message": "The resource 'projects/test-project/global/healthChecks/hc' was not found"
                    }]
                }
            })))
            .mount(&server)
            .await;

        let api = compute(&server);
        let backoff = Backoff::new(Duration::from_millis(1), Duration::from_millis(5));
        let outcome = Decommissioner::new(&api, backoff)
            .delete(&health_check())
            .await
            .unwrap();

        assert!(matches!(outcome, TeardownOutcome::AlreadyAbsent));
    }
}
