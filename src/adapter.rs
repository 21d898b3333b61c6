//! # Framework Adapter Module
//!
//! Converts between a web framework's native request/response types and the
//! normalized types the pipeline works on.
//!
//! Routing is not done here: the framework matches the route, binds the
//! [`crate::lifecycle::OperationHandler`] and hands over the raw path
//! parameters. [`HttpAdapter`] covers any framework built on the `http`
//! crate; path parameters travel in a [`PathParams`] request extension.

use crate::error::{GuardError, Problem, APPLICATION_PROBLEM_JSON};
use crate::ids::RequestId;
use crate::lifecycle::{Eventual, NormalizedRequest, NormalizedResponse, ResponseBody};
use crate::spec::strip_mimetype_params;
use crate::uri_parsing::ParamVec;
use futures::StreamExt;
use http::header::{HeaderValue, CONTENT_TYPE, COOKIE};
use http::HeaderMap;
use std::collections::HashMap;
use tracing::{debug, error};

/// Header carrying the request id in both directions
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Conversion seam between a framework and the pipeline.
///
/// Both conversions return an [`Eventual`] so adapters may read bodies or
/// write responses asynchronously.
pub trait FrameworkAdapter: Send + Sync {
    type Request: Send;
    type Response: Send;

    /// Build a normalized request from the native one
    fn get_request(&self, native: Self::Request) -> Eventual<'_, Result<NormalizedRequest, GuardError>>;

    /// Build the native response. `mimetype` is the operation default used
    /// when the handler did not choose one.
    fn get_response<'a>(
        &'a self,
        response: NormalizedResponse,
        mimetype: &'a str,
        request: &'a NormalizedRequest,
    ) -> Eventual<'a, Result<Self::Response, GuardError>>;

    /// Render a pipeline error. `request` is absent when conversion itself failed.
    fn error_response(&self, error: &GuardError, request: Option<&NormalizedRequest>) -> Self::Response;
}

/// Path parameters matched by the router, stored as a request extension
#[derive(Debug, Clone, Default)]
pub struct PathParams(pub ParamVec);

impl PathParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.push((name.into(), value.into()));
        self
    }
}

/// Parse a `Cookie` header into name/value pairs
#[must_use]
pub fn parse_cookies(headers: &HeaderMap) -> HashMap<String, String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|raw| raw.split(';'))
        .filter_map(|pair| {
            let mut parts = pair.trim().splitn(2, '=');
            let name = parts.next()?.trim();
            if name.is_empty() {
                return None;
            }
            let value = parts.next().unwrap_or("").trim();
            Some((name.to_string(), value.to_string()))
        })
        .collect()
}

fn parse_urlencoded(raw: &[u8]) -> ParamVec {
    url::form_urlencoded::parse(raw)
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect()
}

fn is_form_body(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(strip_mimetype_params)
        .is_some_and(|ct| ct.eq_ignore_ascii_case("application/x-www-form-urlencoded"))
}

/// Render a problem document as an `application/problem+json` response
#[must_use]
pub fn render_problem(problem: &Problem) -> http::Response<Vec<u8>> {
    let body = serde_json::to_vec(problem).unwrap_or_default();
    let mut response = http::Response::new(body);
    *response.status_mut() = http::StatusCode::from_u16(problem.status)
        .unwrap_or(http::StatusCode::INTERNAL_SERVER_ERROR);
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(APPLICATION_PROBLEM_JSON));
    response
}

/// Render a pipeline error as an RFC 7807 response
#[must_use]
pub fn problem_response(error: &GuardError) -> http::Response<Vec<u8>> {
    render_problem(&error.to_problem())
}

/// Adapter for `http::Request<Vec<u8>>` / `http::Response<Vec<u8>>`
#[derive(Debug, Clone, Copy, Default)]
pub struct HttpAdapter;

impl HttpAdapter {
    pub fn new() -> Self {
        Self
    }

    fn convert_request(native: http::Request<Vec<u8>>) -> NormalizedRequest {
        let (mut parts, body) = native.into_parts();
        let request_id = RequestId::from_header_or_new(
            parts
                .headers
                .get(REQUEST_ID_HEADER)
                .and_then(|v| v.to_str().ok()),
        );

        let mut req = NormalizedRequest::new(parts.method, parts.uri.path()).with_request_id(request_id);
        if let Some(query) = parts.uri.query() {
            req.raw_query = parse_urlencoded(query.as_bytes());
        }
        if let Some(PathParams(params)) = parts.extensions.remove::<PathParams>() {
            req.raw_path_params = params;
        }
        req.cookies = parse_cookies(&parts.headers);
        if is_form_body(&parts.headers) {
            req.raw_form = parse_urlencoded(&body);
        }
        req.headers = parts.headers;

        debug!(
            request_id = %req.request_id,
            method = %req.method,
            url = %req.url,
            query_count = req.raw_query.len(),
            cookie_count = req.cookies.len(),
            body_size_bytes = body.len(),
            "HTTP request converted"
        );
        req.body(body)
    }
}

impl FrameworkAdapter for HttpAdapter {
    type Request = http::Request<Vec<u8>>;
    type Response = http::Response<Vec<u8>>;

    fn get_request(&self, native: Self::Request) -> Eventual<'_, Result<NormalizedRequest, GuardError>> {
        Eventual::ready(Ok(Self::convert_request(native)))
    }

    fn get_response<'a>(
        &'a self,
        response: NormalizedResponse,
        mimetype: &'a str,
        request: &'a NormalizedRequest,
    ) -> Eventual<'a, Result<Self::Response, GuardError>> {
        let NormalizedResponse {
            status,
            mimetype: own_mimetype,
            mut headers,
            body,
        } = response;

        if !headers.contains_key(CONTENT_TYPE) {
            let content_type = own_mimetype.as_deref().unwrap_or(mimetype);
            match HeaderValue::from_str(content_type) {
                Ok(v) => {
                    headers.insert(CONTENT_TYPE, v);
                }
                Err(_) => {
                    return Eventual::ready(Err(GuardError::Adapter(format!(
                        "invalid content type `{content_type}`"
                    ))))
                }
            }
        }
        if let Ok(id) = HeaderValue::from_str(&request.request_id.to_string()) {
            headers.insert(REQUEST_ID_HEADER, id);
        }

        let build = move |bytes: Vec<u8>| {
            let mut native = http::Response::new(bytes);
            *native.status_mut() = status;
            *native.headers_mut() = headers;
            native
        };

        match body {
            ResponseBody::Empty => Eventual::ready(Ok(build(Vec::new()))),
            ResponseBody::Bytes(bytes) => Eventual::ready(Ok(build(bytes))),
            ResponseBody::Json(value) => Eventual::ready(
                serde_json::to_vec(&value)
                    .map(build)
                    .map_err(|e| GuardError::Adapter(format!("failed to serialize response body: {e}"))),
            ),
            // http::Response<Vec<u8>> has no streaming body, so chunks are collected
            ResponseBody::Streamed(stream) => Eventual::pending(async move {
                let bytes: Vec<u8> = stream.concat().await;
                Ok(build(bytes))
            }),
        }
    }

    fn error_response(&self, error: &GuardError, request: Option<&NormalizedRequest>) -> Self::Response {
        let mut problem = error.to_problem();
        if let Some(req) = request {
            problem = problem.with_instance(req.url.as_str());
            error!(
                request_id = %req.request_id,
                url = %req.url,
                status = problem.status,
                error = %error,
                "Request failed"
            );
        } else {
            error!(status = problem.status, error = %error, "Request conversion failed");
        }
        let mut response = render_problem(&problem);
        if let Some(id) = request.and_then(|r| HeaderValue::from_str(&r.request_id.to_string()).ok()) {
            response.headers_mut().insert(REQUEST_ID_HEADER, id);
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::{Method, StatusCode};
    use serde_json::json;

    #[test]
    fn test_parse_cookies() {
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_static("a=b; c=d; empty="));
        let cookies = parse_cookies(&headers);
        assert_eq!(cookies.get("a").map(String::as_str), Some("b"));
        assert_eq!(cookies.get("c").map(String::as_str), Some("d"));
        assert_eq!(cookies.get("empty").map(String::as_str), Some(""));
    }

    #[test]
    fn test_convert_request_collects_raw_inputs() {
        let native = http::Request::builder()
            .method(Method::POST)
            .uri("/pets/7?tags=a&tags=b%20c")
            .header("content-type", "application/x-www-form-urlencoded")
            .header("cookie", "session=abc")
            .extension(PathParams::new().with("id", "7"))
            .body(b"name=rex&age=3".to_vec())
            .unwrap();
        let req = HttpAdapter.get_request(native).wait().unwrap();
        assert_eq!(req.url, "/pets/7");
        assert_eq!(req.raw_query.len(), 2);
        assert_eq!(req.raw_query[1].1, "b c");
        assert_eq!(req.raw_path_params[0], ("id".to_string(), "7".to_string()));
        assert_eq!(req.raw_form.len(), 2);
        assert_eq!(req.cookies.get("session").map(String::as_str), Some("abc"));
    }

    #[test]
    fn test_request_id_is_taken_from_header() {
        let id = RequestId::new();
        let native = http::Request::builder()
            .uri("/x")
            .header(REQUEST_ID_HEADER, id.to_string())
            .body(Vec::new())
            .unwrap();
        let req = HttpAdapter.get_request(native).wait().unwrap();
        assert_eq!(req.request_id, id);
    }

    #[test]
    fn test_get_response_defaults_content_type() {
        let req = NormalizedRequest::new(Method::GET, "/x");
        let resp = NormalizedResponse::json(StatusCode::CREATED, json!({"id": 1}));
        let native = HttpAdapter
            .get_response(resp, "application/json", &req)
            .wait()
            .unwrap();
        assert_eq!(native.status(), StatusCode::CREATED);
        assert_eq!(native.headers()[CONTENT_TYPE], "application/json");
        assert_eq!(native.body().as_slice(), br#"{"id":1}"#);
        assert!(native.headers().contains_key(REQUEST_ID_HEADER));
    }

    #[test]
    fn test_streamed_body_is_collected() {
        let req = NormalizedRequest::new(Method::GET, "/x");
        let stream = futures::stream::iter(vec![b"ab".to_vec(), b"cd".to_vec()]);
        let resp = NormalizedResponse::streamed(StatusCode::OK, Box::pin(stream)).with_mimetype("text/plain");
        let pending = HttpAdapter.get_response(resp, "application/json", &req);
        assert!(!pending.is_ready());
        let native = pending.wait().unwrap();
        assert_eq!(native.body().as_slice(), b"abcd");
        assert_eq!(native.headers()[CONTENT_TYPE], "text/plain");
    }

    #[test]
    fn test_problem_response() {
        let resp = problem_response(&GuardError::AuthzFailed);
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
        assert_eq!(resp.headers()[CONTENT_TYPE], APPLICATION_PROBLEM_JSON);
        let body: serde_json::Value = serde_json::from_slice(resp.body()).unwrap();
        assert_eq!(body["status"], 403);
        assert_eq!(body["title"], "Forbidden");
    }
}
