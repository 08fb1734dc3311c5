//! Tests for the reqwest transport against a local mock server


use gantry_core::http::{
    ErrorClassification, Method, OutboundRequest, ReqwestTransport, ReqwestTransportFactory,
    RetryPolicy, Transport, TransportConfig, TransportSettings,
};
use gantry_core::{
    ActionConfig, CallInvocation, Dispatcher, EndpointTable, Headers, RequestBody, RequestParams,
    ServiceConfig,
};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use test_support::{settings, CountingContext};
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn fast_retries() -> RetryPolicy {
    RetryPolicy::new(0)
        .with_base_delay(Duration::from_millis(5))
        .with_jitter(false)
}

fn transport(timeout: Duration, retries: u32) -> ReqwestTransport {
    let settings = TransportSettings::new(timeout, retries, TransportConfig::default());
    ReqwestTransport::new(&settings)
        .unwrap()
        .with_retry_policy(fast_retries())
}

fn get(url: String) -> OutboundRequest {
    OutboundRequest {
        method: Method::GET,
        url,
        query: None,
        headers: BTreeMap::new(),
        body: None,
    }
}

#[tokio::test]
async fn test_successful_json_response() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/users"))
        .and(query_param("page", "2"))
        .and(header("x-tenant", "acme"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("x-total", "1")
                .set_body_json(json!([{"id": 1}])),
        )
        .expect(1)
        .mount(&server)
        .await;

    let mut request = get(format!("{}/users", server.uri()));
    request.query = Some("page=2".to_string());
    request.headers.insert("x-tenant".to_string(), "acme".to_string());

    let response = transport(Duration::from_secs(5), 0)
        .request(request)
        .await
        .unwrap();

    assert_eq!(response.status, 200);
    assert_eq!(response.data, json!([{"id": 1}]));
    assert_eq!(response.headers.get("x-total"), Some("1"));
}

#[tokio::test]
async fn test_non_json_body_is_kept_as_text() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("pong"))
        .mount(&server)
        .await;

    let response = transport(Duration::from_secs(5), 0)
        .request(get(format!("{}/ping", server.uri())))
        .await
        .unwrap();
    assert_eq!(response.data, Value::String("pong".to_string()));
}

#[tokio::test]
async fn test_error_status_carries_response() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(404)
                .set_body_json(json!({"error": {"code": "missing", "message": "no such user"}})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let error = transport(Duration::from_secs(5), 3)
        .request(get(format!("{}/users/9", server.uri())))
        .await
        .unwrap_err();

    assert_eq!(error.status_code, Some(404));
    assert_eq!(error.classification, ErrorClassification::ClientError);
    let response = error.response.expect("upstream answered");
    assert_eq!(response.status, 404);
    assert_eq!(response.data["error"]["code"], "missing");
}

#[tokio::test]
async fn test_server_errors_are_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .expect(1)
        .mount(&server)
        .await;

    let response = transport(Duration::from_secs(5), 2)
        .request(get(format!("{}/flaky", server.uri())))
        .await
        .unwrap();
    assert_eq!(response.data, json!({"ok": true}));
}

#[tokio::test]
async fn test_retries_stop_at_configured_count() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(502))
        .expect(2)
        .mount(&server)
        .await;

    let error = transport(Duration::from_secs(5), 1)
        .request(get(format!("{}/down", server.uri())))
        .await
        .unwrap_err();
    assert_eq!(error.status_code, Some(502));
}

#[tokio::test]
async fn test_dispatch_through_reqwest() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/users"))
        .and(header("content-type", "application/json"))
        .and(header("idempotency-key", "client-key"))
        .and(header("x-gateway-version", "9.9.9"))
        .and(body_json(json!({"name": "Ada"})))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": 1, "name": "Ada"})))
        .expect(1)
        .mount(&server)
        .await;

    let factory = ReqwestTransportFactory::new().with_retry_policy(fast_retries());
    let mut dispatcher = Dispatcher::new(settings(), Arc::new(factory));
    let service = Arc::new(ServiceConfig::new(
        "users",
        EndpointTable::new().with("default", format!("{}/api", server.uri()).as_str()),
    ));
    let action = ActionConfig::new("create", Method::POST, "/users")
        .idempotent(true)
        .with_params(Arc::new(
            |args: &Value, _: &Headers| -> anyhow::Result<RequestParams> {
                Ok(RequestParams {
                    body: Some(RequestBody::Json(args.clone())),
                    ..Default::default()
                })
            },
        ));
    dispatcher.register(service, action).unwrap();

    let ctx = CountingContext::new();
    let invocation = CallInvocation::new(json!({"name": "Ada"}), ctx.clone())
        .with_headers(Headers::from_pairs([("idempotency-key", "client-key")]));
    let success = dispatcher.dispatch("users", "create", &invocation).await.unwrap();

    assert_eq!(success.response_data, json!({"id": 1, "name": "Ada"}));
    assert_eq!(ctx.stats()[0].status, 201);
}

#[tokio::test]
#[cfg_attr(not(feature = "flaky"), ignore)]
async fn test_slow_upstream_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(800)))
        .mount(&server)
        .await;

    let mut dispatcher = Dispatcher::new(settings(), Arc::new(ReqwestTransportFactory::new()));
    let service = Arc::new(ServiceConfig::new(
        "users",
        EndpointTable::new().with("default", server.uri().as_str()),
    ));
    dispatcher
        .register(service, ActionConfig::new("list", Method::GET, "/users"))
        .unwrap();

    let ctx = CountingContext::new();
    let invocation = CallInvocation::new(json!({}), ctx.clone()).with_timeout(Duration::from_millis(100));
    let failure = dispatcher.dispatch("users", "list", &invocation).await.unwrap_err();

    assert_eq!(failure.error.status, 504);
    assert_eq!(failure.error.code, "UPSTREAM_TIMEOUT");
    assert_eq!(ctx.ends(), 1);
}
