//! Integration tests for ServiceClient.
//!
//! Uses wiremock for HTTP mocking. Tests cover listings and pagination, the
//! "no results" answer, strict run retrieval, existence checks, upload, status
//! mapping and retry behavior.

use foldwise_client::{ServiceClient, ServiceConfig, CLIENT_USER_AGENT};
use foldwise_core::{
    run_exists, CodecError, Flow, ParameterSetting, PredictionLayout, PredictionRow, PredictionTable,
    RunFilter, RunRecord, RunService, ServiceError,
};
use serde_json::{json, Value};
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn create_test_client(mock_server: &MockServer) -> ServiceClient {
    let config = ServiceConfig::default()
        .with_url(mock_server.uri())
        .with_api_key("test-key")
        .with_max_retries(1);
    ServiceClient::new(config).expect("failed to create client")
}

fn run_entry(run_id: i64, task_id: i64, setup_id: i64) -> Value {
    json!({
        "run_id": run_id.to_string(),
        "task_id": task_id.to_string(),
        "setup_id": setup_id.to_string(),
        "flow_id": "7",
        "uploader": "16",
        "upload_time": "2019-03-14 09:26:53",
        "error_message": ""
    })
}

fn no_results() -> ResponseTemplate {
    ResponseTemplate::new(412).set_body_json(json!({
        "error": { "code": "512", "message": "No results" }
    }))
}

fn remote_run() -> Value {
    json!({
        "run": {
            "run_id": "100",
            "uploader": "16",
            "uploader_name": "Jane Doe",
            "task_id": "31",
            "task_type": "Supervised Classification",
            "flow_id": "7",
            "flow_name": "forest(1)",
            "setup_id": "5",
            "setup_string": "forest -n 10",
            "parameter_setting": [{ "name": "n_estimators", "value": "10" }],
            "input_data": { "dataset": { "did": "61" } },
            "output_data": {
                "file": [
                    { "name": "description", "file_id": "900" },
                    { "name": "predictions", "file_id": "901" }
                ],
                "evaluation": [
                    { "name": "predictive_accuracy", "repeat": "0", "fold": "0", "value": "0.75" }
                ]
            }
        }
    })
}

#[tokio::test]
async fn test_list_runs_single_page() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/run/list/limit/10000/offset/0/task/31/setup/5"))
        .and(query_param("api_key", "test-key"))
        .and(header("user-agent", CLIENT_USER_AGENT))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "runs": { "run": [run_entry(10, 31, 5), run_entry(11, 31, 5)] }
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = create_test_client(&mock_server);
    let runs = client
        .list_runs(&RunFilter::new().with_tasks([31]).with_setups([5]))
        .await
        .expect("list failed");

    assert_eq!(runs.keys().copied().collect::<Vec<_>>(), vec![10, 11]);
    assert_eq!(runs[&10].uploader, 16);
}

#[tokio::test]
async fn test_list_runs_paginates_until_no_results() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/run/list/limit/2/offset/0/task/31"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "runs": { "run": [run_entry(10, 31, 5), run_entry(11, 31, 6)] }
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/run/list/limit/2/offset/2/task/31"))
        .respond_with(no_results())
        .expect(1)
        .mount(&mock_server)
        .await;

    let config = ServiceConfig::default()
        .with_url(mock_server.uri())
        .with_list_batch_size(2);
    let client = ServiceClient::new(config).expect("failed to create client");
    let runs = client
        .list_runs(&RunFilter::new().with_tasks([31]))
        .await
        .expect("list failed");

    assert_eq!(runs.len(), 2);
}

#[tokio::test]
async fn test_explicit_page_is_a_single_request() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/run/list/limit/1/offset/5/uploader/16"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "runs": { "run": [run_entry(42, 31, 5)] }
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = create_test_client(&mock_server);
    let runs = client
        .list_runs(&RunFilter::new().with_uploaders([16]).page(5, 1))
        .await
        .expect("list failed");
    assert!(runs.contains_key(&42));
}

#[tokio::test]
async fn test_no_results_means_no_duplicates() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/run/list/limit/10000/offset/0/task/31/setup/5"))
        .respond_with(no_results())
        .expect(2)
        .mount(&mock_server)
        .await;

    let client = create_test_client(&mock_server);

    let err = client
        .list_runs(&RunFilter::new().with_tasks([31]).with_setups([5]))
        .await
        .expect_err("no results expected");
    assert!(err.is_no_results());

    let ids = run_exists(&client, 31, 5).await.expect("run_exists failed");
    assert!(ids.is_empty());
}

#[tokio::test]
async fn test_get_run_strict() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/run/100"))
        .respond_with(ResponseTemplate::new(200).set_body_json(remote_run()))
        .mount(&mock_server)
        .await;

    let mut incomplete = remote_run();
    incomplete["run"]
        .as_object_mut()
        .expect("run object")
        .remove("uploader");
    Mock::given(method("GET"))
        .and(path("/run/101"))
        .respond_with(ResponseTemplate::new(200).set_body_json(incomplete))
        .mount(&mock_server)
        .await;

    let client = create_test_client(&mock_server);
    let run = client.get_run(100).await.expect("get failed");
    assert_eq!(run.run_id, Some(100));
    assert_eq!(run.setup_id, Some(5));
    assert_eq!(run.fold_evaluations["predictive_accuracy"][&0][&0], 0.75);

    let err = client.get_run(101).await.expect_err("strict decode must fail");
    assert!(matches!(
        err,
        ServiceError::Codec(CodecError::IncompleteRemoteDocument { .. })
    ));
}

#[tokio::test]
async fn test_get_run_trace() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/run/trace/100"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "trace": {
                "run_id": "100",
                "trace_iteration": [
                    { "repeat": "0", "fold": "0", "iteration": "0",
                      "setup_string": "{\"k\": 1}", "evaluation": "0.7", "selected": "false" },
                    { "repeat": "0", "fold": "0", "iteration": "1",
                      "setup_string": "{\"k\": 2}", "evaluation": "0.9", "selected": "true" }
                ]
            }
        })))
        .mount(&mock_server)
        .await;

    let client = create_test_client(&mock_server);
    let trace = client.get_run_trace(100).await.expect("trace failed");
    assert_eq!(trace.len(), 2);
    assert_eq!(trace.selected_iteration(0, 0).expect("selected"), 1);
}

#[tokio::test]
async fn test_flow_and_setup_exists() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/flow/exists/forest/1.0"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "flow_exists": { "exists": "true", "id": "7" }
        })))
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/setup/exists"))
        .and(body_partial_json(json!({ "setup": { "flow_id": "7" } })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "setup_exists": { "exists": "false", "id": "-1" }
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = create_test_client(&mock_server);
    assert_eq!(
        client.flow_exists("forest", "1.0").await.expect("flow"),
        Some(7)
    );
    let setup = client
        .setup_exists(7, &[ParameterSetting::new("n_estimators", "10")])
        .await
        .expect("setup");
    assert_eq!(setup, None);
}

#[tokio::test]
async fn test_user_strings_are_single_path_segments() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/flow/exists/sk%2Fforest%3Fv=2/1.0%231"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "flow_exists": { "exists": "true", "id": "8" }
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/run/list/limit/10/offset/0/tag/study%2F14"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "runs": { "run": [run_entry(12, 31, 5)] }
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = create_test_client(&mock_server);
    assert_eq!(
        client
            .flow_exists("sk/forest?v=2", "1.0#1")
            .await
            .expect("flow"),
        Some(8)
    );

    let runs = client
        .list_runs(&RunFilter::new().with_tag("study/14").page(0, 10))
        .await
        .expect("list failed");
    assert_eq!(runs.keys().copied().collect::<Vec<_>>(), vec![12]);
}

#[tokio::test]
async fn test_publish_flow() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/flow"))
        .and(body_partial_json(json!({
            "flow": { "name": "forest", "external_version": "1.0", "tag": ["study_14"] }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "upload_flow": { "id": "77" }
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = create_test_client(&mock_server);
    let flow = Flow::new("forest", "1.0").with_parameter("n_estimators", "10");
    let flow_id = client
        .publish_flow(&flow, &["study_14".to_string()])
        .await
        .expect("publish failed");
    assert_eq!(flow_id, 77);
}

#[tokio::test]
async fn test_publish_run() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/run"))
        .and(body_partial_json(json!({ "description": { "run": { "task_id": "34" } } })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "upload_run": { "run_id": "1001" }
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = create_test_client(&mock_server);

    let mut run = RunRecord::new(34);
    let err = client
        .publish_run(&run)
        .await
        .expect_err("predictions are required");
    assert!(matches!(err, ServiceError::Codec(_)));

    run.predictions = Some(PredictionTable::new(
        PredictionLayout::Clustering,
        vec![PredictionRow::Clustering {
            row_id: 0,
            cluster: 1,
        }],
    ));
    let run_id = client.publish_run(&run).await.expect("publish failed");
    assert_eq!(run_id, 1001);
}

#[tokio::test]
async fn test_unauthorized() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/run/100"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = create_test_client(&mock_server);
    let result = client.get_run(100).await;
    assert!(matches!(result, Err(ServiceError::Unauthorized { .. })));
}

#[tokio::test]
async fn test_server_error_code_is_not_retried() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/flow/exists/forest/1.0"))
        .respond_with(ResponseTemplate::new(412).set_body_json(json!({
            "error": { "code": "480", "message": "Illegal flow name" }
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = create_test_client(&mock_server);
    let result = client.flow_exists("forest", "1.0").await;
    assert!(matches!(
        result,
        Err(ServiceError::Server {
            status: 412,
            code: Some(480),
            ..
        })
    ));
}

#[tokio::test]
async fn test_retry_on_503_then_success() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/run/100"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/run/100"))
        .respond_with(ResponseTemplate::new(200).set_body_json(remote_run()))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = create_test_client(&mock_server);
    let run = client.get_run(100).await.expect("retry should succeed");
    assert_eq!(run.run_id, Some(100));
}

#[tokio::test]
async fn test_retry_on_429_gives_up() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/run/trace/100"))
        .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "0"))
        .expect(2)
        .mount(&mock_server)
        .await;

    let client = create_test_client(&mock_server);
    let result = client.get_run_trace(100).await;
    assert!(matches!(result, Err(ServiceError::RateLimited { .. })));
}
