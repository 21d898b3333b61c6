//! Integration tests for the request/response lifecycle
//!
//! # Test Coverage
//!
//! - Blocking and suspending handlers bound through [`Api::bind`]
//! - Stage ordering: parse and secure before the handler, validate after
//! - Handler errors and panics become 500s
//! - `RequestResponseDecorator` + `HttpAdapter` producing native responses and
//!   RFC 7807 problem documents

mod common;

use brrtguard::adapter::{HttpAdapter, PathParams, REQUEST_ID_HEADER};
use brrtguard::error::APPLICATION_PROBLEM_JSON;
use brrtguard::lifecycle::RequestResponseDecorator;
use brrtguard::security::{SecurityHandlerFactory, StaticApiKeys, StaticBasicCredentials};
use brrtguard::{Api, GuardConfig, GuardError, Handler, NormalizedRequest, NormalizedResponse};
use common::fixtures;
use futures::FutureExt;
use http::header::CONTENT_TYPE;
use http::{Method, StatusCode};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn pet_store_api(config: GuardConfig) -> Api {
    Api::new(fixtures::pet_store(), config).with_security_factory(
        SecurityHandlerFactory::new()
            .with_api_key_info("api_key", StaticApiKeys::new().key("k-alice", "alice"))
            .with_basic_info("basic", StaticBasicCredentials::new().user("bob", "hunter2")),
    )
}

/// Lists pets owned by the caller and records the principal for the ownership check
fn list_own_pets(req: &mut NormalizedRequest) -> anyhow::Result<NormalizedResponse> {
    let user = req.user().unwrap_or_default().to_string();
    let limit = req.query.get("limit").and_then(Value::as_u64).unwrap_or(1);
    let pets: Vec<Value> = (0..limit)
        .map(|i| json!({"id": i, "name": format!("pet-{i}"), "owner": user}))
        .collect();
    req.insert_authz("sub", json!(user));
    Ok(NormalizedResponse::json(StatusCode::OK, Value::Array(pets)).with_header("X-Rate-Limit", "100"))
}

#[test]
fn test_blocking_handler_runs_full_pipeline() {
    let api = pet_store_api(GuardConfig::default());
    let op = api.bind("list_pets", Handler::blocking(list_own_pets)).unwrap();

    let mut req = NormalizedRequest::new(Method::GET, "/pets")
        .header("X-Api-Key", "k-alice")
        .query_string("limit=3&letters=a,b");
    let resp = op.handle_blocking(&mut req).unwrap();

    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(req.user(), Some("alice"));
    assert_eq!(req.query["letters"], json!(["a", "b"]));
    match resp.body {
        brrtguard::lifecycle::ResponseBody::Json(Value::Array(items)) => assert_eq!(items.len(), 3),
        other => panic!("unexpected body {other:?}"),
    }
}

#[tokio::test]
async fn test_suspending_handler_is_awaited() {
    let api = pet_store_api(GuardConfig::default());
    let op = api
        .bind(
            "list_pets",
            Handler::suspending(|req| {
                async move {
                    tokio::task::yield_now().await;
                    list_own_pets(req)
                }
                .boxed()
            }),
        )
        .unwrap();

    let mut req = NormalizedRequest::new(Method::GET, "/pets").header("x-api-key", "k-alice");
    let pending = op.invoke(&mut req);
    assert!(!pending.is_ready());
    let resp = pending.await.unwrap();
    assert_eq!(resp.status, StatusCode::OK);
}

#[test]
fn test_suspending_handler_from_blocking_caller() {
    let api = pet_store_api(GuardConfig::default());
    let op = api
        .bind(
            "list_pets",
            Handler::suspending(|req| async move { list_own_pets(req) }.boxed()),
        )
        .unwrap();
    let mut req = NormalizedRequest::new(Method::GET, "/pets").header("x-api-key", "k-alice");
    assert_eq!(op.handle_blocking(&mut req).unwrap().status, StatusCode::OK);
}

#[test]
fn test_blocking_handler_is_ready_immediately() {
    let api = pet_store_api(GuardConfig::default());
    let op = api.bind("list_pets", Handler::blocking(list_own_pets)).unwrap();
    let mut req = NormalizedRequest::new(Method::GET, "/pets").header("x-api-key", "k-alice");
    let outcome = op.invoke(&mut req);
    assert!(outcome.is_ready());
    assert!(outcome.wait().is_ok());
}

#[tokio::test]
async fn test_security_failure_skips_handler() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let api = pet_store_api(GuardConfig::default());
    let op = api
        .bind(
            "list_pets",
            Handler::suspending(move |req| {
                counter.fetch_add(1, Ordering::SeqCst);
                async move { list_own_pets(req) }.boxed()
            }),
        )
        .unwrap();

    let mut req = NormalizedRequest::new(Method::GET, "/pets").header("x-api-key", "wrong");
    let err = op.handle(&mut req).await.unwrap_err();
    assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert!(req.security_context.is_none());
}

#[test]
fn test_validation_failure_after_handler() {
    let api = pet_store_api(GuardConfig::default());
    let op = api
        .bind(
            "list_pets",
            Handler::blocking(|req| {
                req.insert_authz("sub", json!("alice"));
                Ok(NormalizedResponse::json(StatusCode::OK, json!([])))
            }),
        )
        .unwrap();
    let mut req = NormalizedRequest::new(Method::GET, "/pets").header("x-api-key", "k-alice");
    assert!(matches!(
        op.handle_blocking(&mut req),
        Err(GuardError::NonConformingResponseHeaders(_))
    ));
}

#[test]
fn test_validation_can_be_disabled() {
    let config = GuardConfig {
        validate_responses: false,
        ..GuardConfig::default()
    };
    let api = pet_store_api(config);
    let op = api
        .bind(
            "list_pets",
            Handler::blocking(|_req| Ok(NormalizedResponse::json(StatusCode::OK, json!("not a list")))),
        )
        .unwrap();
    let mut req = NormalizedRequest::new(Method::GET, "/pets").header("x-api-key", "k-alice");
    assert!(op.handle_blocking(&mut req).is_ok());
}

#[test]
fn test_handler_panic_becomes_internal_error() {
    let api = pet_store_api(GuardConfig::default());
    let op = api
        .bind("get_health", Handler::blocking(|_req| panic!("boom")))
        .unwrap();
    let mut req = NormalizedRequest::new(Method::GET, "/health");
    match op.handle_blocking(&mut req) {
        Err(e @ GuardError::Handler(_)) => {
            assert_eq!(e.status(), StatusCode::INTERNAL_SERVER_ERROR);
            assert!(e.to_string().contains("boom"), "{e}");
        }
        other => panic!("expected handler error, got {other:?}"),
    }
}

fn explode(req: &mut NormalizedRequest) -> anyhow::Result<NormalizedResponse> {
    panic!("async boom at {}", req.url)
}

#[tokio::test]
async fn test_suspending_panic_becomes_internal_error() {
    let api = pet_store_api(GuardConfig::default());
    let op = api
        .bind(
            "get_health",
            Handler::suspending(|req| async move { explode(req) }.boxed()),
        )
        .unwrap();
    let mut req = NormalizedRequest::new(Method::GET, "/health");
    assert!(matches!(op.handle(&mut req).await, Err(GuardError::Handler(_))));
}

#[test]
fn test_suspending_panic_while_building_future_becomes_internal_error() {
    let api = pet_store_api(GuardConfig::default());
    let op = api
        .bind(
            "get_health",
            Handler::suspending(|req| {
                let outcome = explode(req);
                async move { outcome }.boxed()
            }),
        )
        .unwrap();
    let mut req = NormalizedRequest::new(Method::GET, "/health");
    match op.handle_blocking(&mut req) {
        Err(GuardError::Handler(e)) => assert!(e.to_string().contains("async boom at /health"), "{e}"),
        other => panic!("expected handler error, got {other:?}"),
    }
}

fn problem_body(resp: &http::Response<Vec<u8>>) -> Value {
    assert_eq!(resp.headers()[CONTENT_TYPE], APPLICATION_PROBLEM_JSON);
    serde_json::from_slice(resp.body()).unwrap()
}

fn get_pet_decorator() -> RequestResponseDecorator<HttpAdapter> {
    let api = pet_store_api(GuardConfig::default());
    let op = api
        .bind(
            "get_pet",
            Handler::blocking(|req| {
                let id = req.path_params["id"].clone();
                req.insert_authz("sub", json!("bob"));
                Ok(NormalizedResponse::json(
                    StatusCode::OK,
                    json!({"id": id, "name": "rex", "owner": "bob"}),
                ))
            }),
        )
        .unwrap();
    RequestResponseDecorator::new(Arc::new(HttpAdapter::new()), Arc::new(op))
}

fn get_pet_request(authorization: Option<&str>) -> http::Request<Vec<u8>> {
    let mut builder = http::Request::builder()
        .method(Method::GET)
        .uri("/pets/7")
        .extension(PathParams::new().with("id", "7"));
    if let Some(value) = authorization {
        builder = builder.header("authorization", value);
    }
    builder.body(Vec::new()).unwrap()
}

#[test]
fn test_decorator_success_response() {
    let decorator = get_pet_decorator();
    // "bob:hunter2"
    let resp = decorator.call_blocking(get_pet_request(Some("Basic Ym9iOmh1bnRlcjI=")));
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers()[CONTENT_TYPE], "application/json");
    assert!(resp.headers().contains_key(REQUEST_ID_HEADER));
    let body: Value = serde_json::from_slice(resp.body()).unwrap();
    assert_eq!(body, json!({"id": 7, "name": "rex", "owner": "bob"}));
}

#[test]
fn test_decorator_renders_unauthorized_problem() {
    let decorator = get_pet_decorator();
    let resp = decorator.call_blocking(get_pet_request(None));
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let problem = problem_body(&resp);
    assert_eq!(problem["title"], "Unauthorized");
    assert_eq!(problem["detail"], "No authorization token provided");
    assert_eq!(problem["instance"], "/pets/7");
}

#[tokio::test]
async fn test_decorator_async_call_renders_forbidden_ownership() {
    let api = pet_store_api(GuardConfig::default());
    let op = api
        .bind(
            "get_pet",
            Handler::suspending(|req| {
                async move {
                    req.insert_authz("sub", json!("bob"));
                    Ok(NormalizedResponse::json(
                        StatusCode::OK,
                        json!({"id": 7, "name": "rex", "owner": "mallory"}),
                    ))
                }
                .boxed()
            }),
        )
        .unwrap();
    let decorator = RequestResponseDecorator::new(Arc::new(HttpAdapter), Arc::new(op));
    let resp = decorator.call(get_pet_request(Some("Basic Ym9iOmh1bnRlcjI="))).await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    assert_eq!(problem_body(&resp)["status"], 403);
}

#[test]
fn test_decorator_renders_handler_error_as_500() {
    let api = pet_store_api(GuardConfig::default());
    let op = api
        .bind("get_health", Handler::blocking(|_req| Err(anyhow::anyhow!("database unavailable"))))
        .unwrap();
    let decorator = RequestResponseDecorator::new(Arc::new(HttpAdapter), Arc::new(op));
    let native = http::Request::builder().uri("/health").body(Vec::new()).unwrap();
    let resp = decorator.call_blocking(native);
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let problem = problem_body(&resp);
    assert_eq!(problem["title"], "Internal Server Error");
    assert!(problem["detail"].as_str().unwrap().contains("database unavailable"));
}

#[test]
fn test_decorator_echoes_request_id() {
    let api = pet_store_api(GuardConfig::default());
    let op = api
        .bind("get_health", Handler::blocking(|_req| Ok(NormalizedResponse::new(StatusCode::NO_CONTENT))))
        .unwrap();
    let decorator = RequestResponseDecorator::new(Arc::new(HttpAdapter), Arc::new(op));
    let id = brrtguard::ids::RequestId::new().to_string();
    let native = http::Request::builder()
        .uri("/health")
        .header(REQUEST_ID_HEADER, id.as_str())
        .body(Vec::new())
        .unwrap();
    let resp = decorator.call_blocking(native);
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);
    assert_eq!(resp.headers()[REQUEST_ID_HEADER], id.as_str());
}
