//! Integration tests for response validation
//!
//! # Test Coverage
//!
//! - Body schema conformance (JSON and `text/plain`)
//! - Required response headers
//! - `x-ft-security` ownership checks for `object` and `list` formats
//! - Named access resolvers (registered, failing, panicking, unregistered)
//! - Streamed responses skip validation

mod common;

use brrtguard::response_validator::{AccessResolver, AccessResolvers, AuthzQuery, ResponseValidator};
use brrtguard::spec::ApiDocument;
use brrtguard::validator_cache::ValidatorCache;
use brrtguard::{GuardError, NormalizedRequest, NormalizedResponse};
use common::fixtures;
use http::{Method, StatusCode};
use serde_json::{json, Value};
use std::sync::Arc;

fn validator(doc: &ApiDocument, operation_id: &str) -> ResponseValidator {
    validator_with(doc, operation_id, AccessResolvers::new())
}

fn validator_with(doc: &ApiDocument, operation_id: &str, resolvers: AccessResolvers) -> ResponseValidator {
    let op = doc.operation(operation_id).unwrap().clone();
    ResponseValidator::new(Arc::new(op), ValidatorCache::new(true), Arc::new(resolvers))
}

fn request_as(principal: &str) -> NormalizedRequest {
    let mut req = NormalizedRequest::new(Method::GET, "/pets");
    req.insert_authz("sub", json!(principal));
    req
}

fn pets(owners: &[&str]) -> Value {
    Value::Array(
        owners
            .iter()
            .enumerate()
            .map(|(i, owner)| json!({"id": i, "name": format!("pet-{i}"), "owner": owner}))
            .collect(),
    )
}

#[test]
fn test_conforming_list_response_passes() {
    let doc = fixtures::pet_store();
    let resp = NormalizedResponse::json(StatusCode::OK, pets(&["u1", "u1"])).with_header("X-Rate-Limit", "10");
    assert!(validator(&doc, "list_pets").validate(&resp, &request_as("u1")).is_ok());
}

#[test]
fn test_missing_required_header_is_named() {
    let doc = fixtures::pet_store();
    let resp = NormalizedResponse::json(StatusCode::OK, pets(&["u1"]));
    match validator(&doc, "list_pets").validate(&resp, &request_as("u1")) {
        Err(GuardError::NonConformingResponseHeaders(message)) => {
            assert!(message.contains("X-Rate-Limit"), "{message}");
        }
        other => panic!("expected header error, got {other:?}"),
    }
}

#[test]
fn test_header_names_compare_case_insensitively() {
    let doc = fixtures::pet_store();
    let resp = NormalizedResponse::json(StatusCode::OK, pets(&["u1"])).with_header("x-rate-limit", "1");
    assert!(validator(&doc, "list_pets").validate(&resp, &request_as("u1")).is_ok());
}

#[test]
fn test_schema_violation_is_reported() {
    let doc = fixtures::pet_store();
    // name is required by the Pet definition
    let body = json!([{"id": 1, "owner": "u1"}]);
    let resp = NormalizedResponse::json(StatusCode::OK, body).with_header("X-Rate-Limit", "10");
    let err = validator(&doc, "list_pets")
        .validate(&resp, &request_as("u1"))
        .unwrap_err();
    assert!(matches!(err, GuardError::NonConformingResponseBody(_)), "{err:?}");
    assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[test]
fn test_malformed_json_bytes_are_rejected() {
    let doc = fixtures::pet_store();
    let resp = NormalizedResponse::bytes(StatusCode::OK, b"[{".to_vec()).with_header("X-Rate-Limit", "10");
    assert!(matches!(
        validator(&doc, "list_pets").validate(&resp, &request_as("u1")),
        Err(GuardError::NonConformingResponseBody(_))
    ));
}

#[test]
fn test_list_ownership_requires_every_element() {
    let doc = fixtures::pet_store();
    let resp = NormalizedResponse::json(StatusCode::OK, pets(&["u1", "u2"])).with_header("X-Rate-Limit", "10");
    assert!(matches!(
        validator(&doc, "list_pets").validate(&resp, &request_as("u1")),
        Err(GuardError::AuthzFailed)
    ));
}

#[test]
fn test_object_ownership() {
    let doc = fixtures::pet_store();
    let v = validator(&doc, "get_pet");
    let pet = json!({"id": 1, "name": "rex", "owner": "u1"});

    let resp = NormalizedResponse::json(StatusCode::OK, pet.clone());
    assert!(v.validate(&resp, &request_as("u1")).is_ok());

    let resp = NormalizedResponse::json(StatusCode::OK, pet);
    assert!(matches!(v.validate(&resp, &request_as("u2")), Err(GuardError::AuthzFailed)));

    // Missing resource key counts as not owned
    let resp = NormalizedResponse::json(StatusCode::OK, json!({"id": 1, "name": "rex"}));
    assert!(matches!(v.validate(&resp, &request_as("u1")), Err(GuardError::AuthzFailed)));
}

#[test]
fn test_authz_context_must_be_populated() {
    let doc = fixtures::pet_store();
    let v = validator(&doc, "get_pet");
    let pet = json!({"id": 1, "name": "rex", "owner": "u1"});

    let resp = NormalizedResponse::json(StatusCode::OK, pet.clone());
    match v.validate(&resp, &NormalizedRequest::new(Method::GET, "/pets/1")) {
        Err(GuardError::AuthzNotPopulated(message)) => {
            assert!(message.starts_with("No Authz data returned from the handler"), "{message}");
        }
        other => panic!("expected AuthzNotPopulated, got {other:?}"),
    }

    let mut req = NormalizedRequest::new(Method::GET, "/pets/1");
    req.insert_authz("tenant", json!("t1"));
    let resp = NormalizedResponse::json(StatusCode::OK, pet);
    match v.validate(&resp, &req) {
        Err(GuardError::AuthzNotPopulated(message)) => {
            assert!(message.contains("does not contain expected key"), "{message}");
        }
        other => panic!("expected AuthzNotPopulated, got {other:?}"),
    }
}

#[test]
fn test_default_response_without_schema_passes() {
    let doc = fixtures::pet_store();
    let resp = NormalizedResponse::json(StatusCode::NOT_FOUND, json!({"anything": true}));
    assert!(validator(&doc, "get_pet")
        .validate(&resp, &NormalizedRequest::new(Method::GET, "/pets/9"))
        .is_ok());
}

#[test]
fn test_streamed_response_skips_every_check() {
    let doc = fixtures::pet_store();
    let stream = futures::stream::iter(vec![b"not json".to_vec()]);
    // No header, no authz, body not JSON
    let resp = NormalizedResponse::streamed(StatusCode::OK, Box::pin(stream));
    assert!(validator(&doc, "list_pets")
        .validate(&resp, &NormalizedRequest::new(Method::GET, "/pets"))
        .is_ok());
}

#[test]
fn test_text_plain_body_is_validated_as_string() {
    let doc = fixtures::orders();
    let v = validator(&doc, "list_orders");
    let req = NormalizedRequest::new(Method::GET, "/orders");

    assert!(v.validate(&NormalizedResponse::text(StatusCode::OK, "hello"), &req).is_ok());
    assert!(matches!(
        v.validate(&NormalizedResponse::text(StatusCode::OK, "too long"), &req),
        Err(GuardError::NonConformingResponseBody(_))
    ));
}

fn order(owner: &str) -> NormalizedResponse {
    NormalizedResponse::json(StatusCode::OK, json!({"id": "o1", "owner": {"id": owner}}))
}

fn owner_resolver(query: &AuthzQuery<'_>) -> anyhow::Result<()> {
    let owner = brrtguard::response_validator::extract_path(query.body, query.resource_path);
    if owner == Some(query.principal) {
        Ok(())
    } else {
        anyhow::bail!("order belongs to someone else")
    }
}

#[test]
fn test_registered_access_resolver_decides() {
    let doc = fixtures::orders();
    let mut resolvers = AccessResolvers::new();
    resolvers.insert(
        "order_owner".to_string(),
        Arc::new(owner_resolver) as Arc<dyn AccessResolver>,
    );
    let v = validator_with(&doc, "get_order", resolvers);

    assert!(v.validate(&order("u1"), &request_as("u1")).is_ok());
    assert!(matches!(v.validate(&order("u2"), &request_as("u1")), Err(GuardError::AuthzFailed)));
}

#[test]
fn test_resolver_replaces_builtin_comparison() {
    let doc = fixtures::orders();
    let mut resolvers = AccessResolvers::new();
    let allow_all = |_: &AuthzQuery<'_>| -> anyhow::Result<()> { Ok(()) };
    resolvers.insert("order_owner".to_string(), Arc::new(allow_all) as Arc<dyn AccessResolver>);
    let v = validator_with(&doc, "get_order", resolvers);
    assert!(v.validate(&order("someone-else"), &request_as("u1")).is_ok());
}

#[test]
fn test_unregistered_or_panicking_resolver_fails_closed() {
    let doc = fixtures::orders();
    let v = validator(&doc, "get_order");
    assert!(matches!(v.validate(&order("u1"), &request_as("u1")), Err(GuardError::AuthzFailed)));

    let mut resolvers = AccessResolvers::new();
    let explode = |_: &AuthzQuery<'_>| -> anyhow::Result<()> { panic!("resolver bug") };
    resolvers.insert("order_owner".to_string(), Arc::new(explode) as Arc<dyn AccessResolver>);
    let v = validator_with(&doc, "get_order", resolvers);
    assert!(matches!(v.validate(&order("u1"), &request_as("u1")), Err(GuardError::AuthzFailed)));
}

#[test]
fn test_validate_response_reads_content_type_header() {
    let doc = fixtures::orders();
    let v = validator(&doc, "list_orders");
    let mut headers = http::HeaderMap::new();
    headers.insert(http::header::CONTENT_TYPE, "text/plain; charset=utf-8".parse().unwrap());
    let body = brrtguard::lifecycle::ResponseBody::Bytes(b"way too long".to_vec());
    assert!(matches!(
        v.validate_response(&body, StatusCode::OK, &headers, "/orders", None),
        Err(GuardError::NonConformingResponseBody(_))
    ));
}

fn charset_documents() -> [ApiDocument; 2] {
    let oas3 = brrtguard::spec::load_spec_str(
        r#"
openapi: 3.0.0
info: { title: charset, version: "1" }
paths:
  /x:
    get:
      operationId: get_x
      responses:
        "200":
          description: ok
          content:
            "Application/JSON; charset=utf-8":
              schema: { type: object, required: [id], properties: { id: { type: integer } } }
"#,
    )
    .unwrap();
    let swagger2 = brrtguard::spec::load_spec_str(
        r#"
swagger: "2.0"
info: { title: charset, version: "1" }
produces: ["application/json; charset=utf-8"]
paths:
  /x:
    get:
      operationId: get_x
      responses:
        "200":
          description: ok
          schema: { type: object, required: [id], properties: { id: { type: integer } } }
"#,
    )
    .unwrap();
    [oas3, swagger2]
}

#[test]
fn test_declared_mimetype_parameters_do_not_skip_body_validation() {
    for doc in charset_documents() {
        let op = doc.operation("get_x").unwrap();
        assert_eq!(op.mimetype(), "application/json");
        assert!(op.responses[0].schema_for("application/json").is_some());

        let v = validator(&doc, "get_x");
        let bad = NormalizedResponse::json(StatusCode::OK, json!({"id": "not-int"}));
        assert!(
            matches!(v.validate(&bad, &request_as("u1")), Err(GuardError::NonConformingResponseBody(_))),
            "{:?}",
            doc.version
        );
        let good = NormalizedResponse::json(StatusCode::OK, json!({"id": 1}))
            .with_header("content-type", "application/json; charset=utf-8");
        assert!(v.validate(&good, &request_as("u1")).is_ok());
    }
}
