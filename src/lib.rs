//! # BRRTGuard
//!
//! **BRRTGuard** wraps business handlers with the request and response
//! contract declared in a Swagger 2.0 or OpenAPI 3.x document.
//!
//! ## Overview
//!
//! For every operation in the document, BRRTGuard compiles once:
//!
//! - a **parameter parser** that turns repeated and delimiter-joined query,
//!   form, path and header values into typed JSON according to a configurable
//!   policy (`swagger2`, `first_value`, `always_multi`, `openapi`)
//! - a **security decision** that turns the declared requirement (OR of AND
//!   groups of schemes) into verifiers backed by injected capabilities
//! - a **response validator** that checks the handler's body against the
//!   declared schema, its headers against the required ones, and that returned
//!   resources belong to the authenticated principal
//!
//! and then runs them around the handler for each request. Handlers may be
//! blocking or async; both go through the same pipeline.
//!
//! ## Architecture
//!
//! - **[`spec`]** - Document loading, `$ref` resolution and operation extraction
//! - **[`uri_parsing`]** - Collection parsing policies and type coercion
//! - **[`security`]** - Scheme-to-verifier compilation and authentication
//! - **[`response_validator`]** - Schema, header and ownership checks
//! - **[`validator_cache`]** - Compiled JSON Schema cache
//! - **[`lifecycle`]** - Normalized request/response types and the per-request pipeline
//! - **[`adapter`]** - Framework conversion seam and an `http` crate adapter
//! - **[`api`]** - Binds document operations to handlers
//! - **[`config`]** / **[`logging`]** - Runtime configuration and log setup
//!
//! ### Request Flow
//!
//! ```mermaid
//! sequenceDiagram
//!     participant F as Framework
//!     participant A as FrameworkAdapter
//!     participant P as UriParser
//!     participant S as ComposedAuth
//!     participant H as Handler
//!     participant V as ResponseValidator
//!
//!     F->>A: native request
//!     A->>P: NormalizedRequest
//!     P->>S: path_params / query / form / header_params
//!     S-->>F: 401 / 403 problem (handler not called)
//!     S->>H: security_context
//!     H->>V: NormalizedResponse (+ authz context)
//!     V-->>F: 500 / 403 problem
//!     V->>A: validated response
//!     A->>F: native response
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use brrtguard::adapter::{HttpAdapter, PathParams};
//! use brrtguard::lifecycle::{Handler, NormalizedResponse, RequestResponseDecorator};
//! use brrtguard::spec::load_spec_str;
//! use brrtguard::{Api, GuardConfig};
//! use http::StatusCode;
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! let doc = load_spec_str(r#"
//! openapi: 3.0.0
//! info: { title: pets, version: "1" }
//! paths:
//!   /pets/{id}:
//!     get:
//!       operationId: get_pet
//!       parameters:
//!         - { name: id, in: path, required: true, schema: { type: integer } }
//!       responses:
//!         "200":
//!           description: ok
//!           content:
//!             application/json:
//!               schema: { type: object, required: [id], properties: { id: { type: integer } } }
//! "#).unwrap();
//!
//! let api = Api::new(doc, GuardConfig::default());
//! let op = api
//!     .bind("get_pet", Handler::blocking(|req| {
//!         Ok(NormalizedResponse::json(StatusCode::OK, json!({ "id": req.path_params["id"] })))
//!     }))
//!     .unwrap();
//! let decorated = RequestResponseDecorator::new(Arc::new(HttpAdapter), Arc::new(op));
//!
//! let native = http::Request::builder()
//!     .uri("/pets/7")
//!     .extension(PathParams::new().with("id", "7"))
//!     .body(Vec::new())
//!     .unwrap();
//! let resp = decorated.call_blocking(native);
//! assert_eq!(resp.status(), StatusCode::OK);
//! assert_eq!(resp.body().as_slice(), br#"{"id":7}"#);
//! ```

pub mod adapter;
pub mod api;
pub mod config;
pub mod error;
pub mod ids;
pub mod lifecycle;
pub mod logging;
pub mod response_validator;
pub mod security;
pub mod spec;
pub mod uri_parsing;
pub mod validator_cache;

pub use api::Api;
pub use config::GuardConfig;
pub use error::{GuardError, Problem, SecurityError, SpecError};
pub use lifecycle::{Eventual, Handler, NormalizedRequest, NormalizedResponse, OperationHandler};
pub use uri_parsing::UriParsingPolicy;
