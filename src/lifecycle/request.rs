use crate::ids::RequestId;
use crate::security::SecurityContext;
use crate::uri_parsing::ParamVec;
use http::header::{HeaderName, HeaderValue};
use http::{HeaderMap, Method};
use once_cell::sync::OnceCell;
use serde_json::{Map, Value};
use std::collections::HashMap;
use tracing::{debug, warn};

/// Framework independent view of one in-flight request.
///
/// Raw inputs (`raw_*`, `headers`, `cookies`, `body`) are filled by the
/// framework adapter. The parser fills `path_params`, `query`, `form` and
/// `header_params`; the security check fills `security_context`; the business
/// handler may fill the authz context read by the response validator.
#[derive(Debug)]
pub struct NormalizedRequest {
    pub request_id: RequestId,
    pub url: String,
    pub method: Method,
    pub raw_path_params: ParamVec,
    pub raw_query: ParamVec,
    pub raw_form: ParamVec,
    pub headers: HeaderMap,
    pub cookies: HashMap<String, String>,
    pub body: Vec<u8>,
    json: OnceCell<Option<Value>>,
    pub path_params: Map<String, Value>,
    pub query: Map<String, Value>,
    pub form: Map<String, Value>,
    pub header_params: Map<String, Value>,
    pub security_context: Option<SecurityContext>,
    authz: Option<Map<String, Value>>,
}

impl NormalizedRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            request_id: RequestId::new(),
            url: url.into(),
            method,
            raw_path_params: ParamVec::new(),
            raw_query: ParamVec::new(),
            raw_form: ParamVec::new(),
            headers: HeaderMap::new(),
            cookies: HashMap::new(),
            body: Vec::new(),
            json: OnceCell::new(),
            path_params: Map::new(),
            query: Map::new(),
            form: Map::new(),
            header_params: Map::new(),
            security_context: None,
            authz: None,
        }
    }

    pub fn with_request_id(mut self, id: RequestId) -> Self {
        self.request_id = id;
        self
    }

    /// Append a header; invalid names or values are skipped with a warning
    pub fn header(mut self, name: &str, value: &str) -> Self {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(n), Ok(v)) => {
                self.headers.append(n, v);
            }
            _ => warn!(header = %name, "Skipping invalid header"),
        }
        self
    }

    pub fn path_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.raw_path_params.push((name.into(), value.into()));
        self
    }

    pub fn query_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.raw_query.push((name.into(), value.into()));
        self
    }

    /// Append every pair of an `application/x-www-form-urlencoded` query string
    pub fn query_string(mut self, query: &str) -> Self {
        self.raw_query.extend(
            url::form_urlencoded::parse(query.as_bytes()).map(|(k, v)| (k.into_owned(), v.into_owned())),
        );
        self
    }

    pub fn form_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.raw_form.push((name.into(), value.into()));
        self
    }

    pub fn cookie(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.cookies.insert(name.into(), value.into());
        self
    }

    /// Set the raw body. Resets the memoized JSON.
    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self.json = OnceCell::new();
        self
    }

    /// Set a JSON body and its content type
    pub fn json_body(self, value: &Value) -> Self {
        let bytes = serde_json::to_vec(value).unwrap_or_default();
        self.header("content-type", "application/json").body(bytes)
    }

    /// The body parsed as JSON, computed once per request.
    ///
    /// `None` for empty or malformed bodies.
    pub fn json(&self) -> Option<&Value> {
        self.json
            .get_or_init(|| {
                if self.body.is_empty() {
                    return None;
                }
                match serde_json::from_slice(&self.body) {
                    Ok(v) => Some(v),
                    Err(e) => {
                        debug!(request_id = %self.request_id, error = %e, "Request body is not JSON");
                        None
                    }
                }
            })
            .as_ref()
    }

    /// Authenticated principal, if the security check identified one
    pub fn user(&self) -> Option<&str> {
        self.security_context.as_ref().and_then(|c| c.user.as_deref())
    }

    /// Record the values the response ownership check compares against
    pub fn set_authz(&mut self, authz: Map<String, Value>) {
        self.authz = Some(authz);
    }

    /// Insert one authz value, creating the context if needed
    pub fn insert_authz(&mut self, key: impl Into<String>, value: Value) {
        self.authz
            .get_or_insert_with(Map::new)
            .insert(key.into(), value);
    }

    pub fn authz(&self) -> Option<&Map<String, Value>> {
        self.authz.as_ref()
    }
}
