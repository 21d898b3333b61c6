//! # Response Validator Module
//!
//! Checks what a business handler produced before it reaches the wire.
//!
//! Three checks run in order, the first failure wins:
//!
//! 1. **Body schema**: when the matched response definition declares a schema for
//!    the response content type and that type is JSON or `text/plain`, the body
//!    is deserialized and validated with `jsonschema`. Violations raise
//!    [`GuardError::NonConformingResponseBody`].
//! 2. **Required headers**: every header marked `required` must be present.
//!    Missing ones raise [`GuardError::NonConformingResponseHeaders`] naming them.
//! 3. **Ownership** (`x-ft-security`): the principal stored in the request authz
//!    context must equal the value found at a dotted path in the body (once for
//!    `object`, for every element for `list`). A named custom
//!    [`AccessResolver`] replaces the built-in comparison.
//!
//! Streamed responses skip every check.

use crate::error::GuardError;
use crate::lifecycle::{NormalizedRequest, NormalizedResponse, ResponseBody};
use crate::spec::{is_json_mimetype, AuthzFormat, AuthzRule, Operation, ResponseDefinition};
use crate::validator_cache::ValidatorCache;
use http::header::CONTENT_TYPE;
use http::{HeaderMap, StatusCode};
use serde_json::{Map, Value};
use std::borrow::Cow;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Arguments handed to a custom access resolver
#[derive(Debug, Clone, Copy)]
pub struct AuthzQuery<'a> {
    pub body: &'a Value,
    /// Principal value read from the request authz context
    pub principal: &'a Value,
    pub principal_path: &'a str,
    pub resource_path: &'a str,
    pub format: AuthzFormat,
}

/// Custom ownership check named by `access-resolver`.
///
/// Any error (or panic) is treated as an authorization failure.
pub trait AccessResolver: Send + Sync {
    fn resolve(&self, query: &AuthzQuery<'_>) -> anyhow::Result<()>;
}

impl<F> AccessResolver for F
where
    F: Fn(&AuthzQuery<'_>) -> anyhow::Result<()> + Send + Sync,
{
    fn resolve(&self, query: &AuthzQuery<'_>) -> anyhow::Result<()> {
        self(query)
    }
}

/// Registered resolvers by name
pub type AccessResolvers = HashMap<String, Arc<dyn AccessResolver>>;

/// Follow a dotted path (`owner.id`, `items.0.owner`) into a JSON value
#[must_use]
pub fn extract_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(value, |current, segment| match current {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

/// Validates responses of one operation
#[derive(Clone)]
pub struct ResponseValidator {
    operation: Arc<Operation>,
    cache: ValidatorCache,
    resolvers: Arc<AccessResolvers>,
}

impl std::fmt::Debug for ResponseValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseValidator")
            .field("operation_id", &self.operation.operation_id)
            .field("resolvers", &self.resolvers.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl ResponseValidator {
    pub fn new(operation: Arc<Operation>, cache: ValidatorCache, resolvers: Arc<AccessResolvers>) -> Self {
        Self {
            operation,
            cache,
            resolvers,
        }
    }

    /// Validate a handler response in the context of its request
    pub fn validate(&self, response: &NormalizedResponse, request: &NormalizedRequest) -> Result<(), GuardError> {
        let content_type = response.content_type(self.operation.mimetype());
        self.check(
            &response.body,
            response.status,
            content_type,
            &response.headers,
            &request.url,
            request.authz(),
        )
    }

    /// Validate a response given its parts.
    ///
    /// The content type comes from the `Content-Type` header, falling back to the
    /// operation mimetype.
    pub fn validate_response(
        &self,
        body: &ResponseBody,
        status: StatusCode,
        headers: &HeaderMap,
        url: &str,
        authz: Option<&Map<String, Value>>,
    ) -> Result<(), GuardError> {
        let raw = headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or(self.operation.mimetype());
        let content_type = crate::spec::strip_mimetype_params(raw);
        self.check(body, status, content_type, headers, url, authz)
    }

    fn check(
        &self,
        body: &ResponseBody,
        status: StatusCode,
        content_type: &str,
        headers: &HeaderMap,
        url: &str,
        authz: Option<&Map<String, Value>>,
    ) -> Result<(), GuardError> {
        if matches!(body, ResponseBody::Streamed(_)) {
            debug!(
                operation_id = %self.operation.operation_id,
                url = %url,
                "Streamed response, skipping validation"
            );
            return Ok(());
        }

        let Some(definition) = self.operation.response_definition(status.as_u16()) else {
            debug!(
                operation_id = %self.operation.operation_id,
                status = status.as_u16(),
                "No response definition, skipping validation"
            );
            return Ok(());
        };

        let mut parsed: Option<Cow<'_, Value>> = None;
        if let Some(schema) = definition.schema_for(content_type) {
            if is_json_mimetype(content_type) || content_type.eq_ignore_ascii_case("text/plain") {
                let instance = body_value(body, content_type)?;
                self.validate_schema(definition, content_type, schema, &instance, url)?;
                parsed = Some(instance);
            }
        }

        self.validate_headers(definition, headers, url)?;

        if let Some(rule) = &definition.authz {
            let instance = match parsed {
                Some(v) => v,
                None => body_value(body, content_type).map_err(|_| GuardError::AuthzFailed)?,
            };
            self.validate_authz(rule, &instance, authz, url)?;
        }
        Ok(())
    }

    fn validate_schema(
        &self,
        definition: &ResponseDefinition,
        content_type: &str,
        schema: &Value,
        instance: &Value,
        url: &str,
    ) -> Result<(), GuardError> {
        let Some(validator) =
            self.cache
                .get_or_compile(&self.operation.operation_id, &definition.status, content_type, schema)
        else {
            warn!(
                operation_id = %self.operation.operation_id,
                "Response schema does not compile, skipping body validation"
            );
            return Ok(());
        };

        let errors: Vec<String> = validator.iter_errors(instance).map(|e| e.to_string()).collect();
        if errors.is_empty() {
            return Ok(());
        }
        error!(
            operation_id = %self.operation.operation_id,
            url = %url,
            status = %definition.status,
            errors = ?errors,
            "Response body does not conform to specification"
        );
        Err(GuardError::NonConformingResponseBody(errors.join("; ")))
    }

    fn validate_headers(&self, definition: &ResponseDefinition, headers: &HeaderMap, url: &str) -> Result<(), GuardError> {
        let missing: Vec<&str> = definition
            .required_headers
            .iter()
            .filter(|name| !headers.contains_key(name.as_str()))
            .map(String::as_str)
            .collect();
        if missing.is_empty() {
            return Ok(());
        }
        let message = format!(
            "Keys in header don't match response specification. Difference: {}",
            missing.join(", ")
        );
        error!(
            operation_id = %self.operation.operation_id,
            url = %url,
            missing = ?missing,
            "Response is missing required headers"
        );
        Err(GuardError::NonConformingResponseHeaders(message))
    }

    fn validate_authz(
        &self,
        rule: &AuthzRule,
        body: &Value,
        authz: Option<&Map<String, Value>>,
        url: &str,
    ) -> Result<(), GuardError> {
        let Some(authz) = authz else {
            error!(
                operation_id = %self.operation.operation_id,
                url = %url,
                "Authz rule declared but handler did not populate the authz context"
            );
            return Err(GuardError::AuthzNotPopulated(
                "No Authz data returned from the handler - it must populate IDs to compare in Authz".to_string(),
            ));
        };
        let Some(principal) = authz.get(&rule.principal_path) else {
            return Err(GuardError::AuthzNotPopulated(
                "Authz data does not contain expected key for authz to be evaluated".to_string(),
            ));
        };

        if let Some(name) = &rule.resolver {
            return self.run_resolver(name, rule, body, principal, url);
        }

        let owned = |item: &Value| extract_path(item, &rule.resource_path) == Some(principal);
        let allowed = match rule.format {
            AuthzFormat::Object => owned(body),
            AuthzFormat::List => match body {
                Value::Array(items) => items.iter().all(owned),
                _ => false,
            },
        };
        if allowed {
            Ok(())
        } else {
            warn!(
                operation_id = %self.operation.operation_id,
                url = %url,
                resource_path = %rule.resource_path,
                format = %rule.format,
                "Response resource not owned by principal"
            );
            Err(GuardError::AuthzFailed)
        }
    }

    fn run_resolver(
        &self,
        name: &str,
        rule: &AuthzRule,
        body: &Value,
        principal: &Value,
        url: &str,
    ) -> Result<(), GuardError> {
        let Some(resolver) = self.resolvers.get(name) else {
            error!(resolver = %name, "Access resolver is not registered");
            return Err(GuardError::AuthzFailed);
        };
        let query = AuthzQuery {
            body,
            principal,
            principal_path: &rule.principal_path,
            resource_path: &rule.resource_path,
            format: rule.format,
        };
        match catch_unwind(AssertUnwindSafe(|| resolver.resolve(&query))) {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => {
                warn!(resolver = %name, url = %url, error = %e, "Access resolver denied response");
                Err(GuardError::AuthzFailed)
            }
            Err(_) => {
                error!(resolver = %name, url = %url, "Access resolver panicked");
                Err(GuardError::AuthzFailed)
            }
        }
    }
}

/// Deserialize a response body for validation
fn body_value<'a>(body: &'a ResponseBody, content_type: &str) -> Result<Cow<'a, Value>, GuardError> {
    match body {
        ResponseBody::Json(v) => Ok(Cow::Borrowed(v)),
        ResponseBody::Empty | ResponseBody::Streamed(_) => Ok(Cow::Owned(Value::Null)),
        ResponseBody::Bytes(bytes) if is_json_mimetype(content_type) => serde_json::from_slice(bytes)
            .map(Cow::Owned)
            .map_err(|e| GuardError::NonConformingResponseBody(format!("body is not valid JSON: {e}"))),
        ResponseBody::Bytes(bytes) => Ok(Cow::Owned(Value::String(
            String::from_utf8_lossy(bytes).into_owned(),
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_extract_path() {
        let v = json!({"owner": {"id": "u1"}, "items": [{"o": 1}, {"o": 2}]});
        assert_eq!(extract_path(&v, "owner.id"), Some(&json!("u1")));
        assert_eq!(extract_path(&v, "items.1.o"), Some(&json!(2)));
        assert_eq!(extract_path(&v, "owner.missing"), None);
        assert_eq!(extract_path(&json!("scalar"), "a"), None);
    }

    #[test]
    fn test_body_value_text_and_json() {
        let text = ResponseBody::Bytes(b"hello".to_vec());
        assert_eq!(body_value(&text, "text/plain").unwrap().as_ref(), &json!("hello"));
        let raw = ResponseBody::Bytes(br#"{"a":1}"#.to_vec());
        assert_eq!(body_value(&raw, "application/json").unwrap().as_ref(), &json!({"a": 1}));
        let bad = ResponseBody::Bytes(b"{".to_vec());
        assert!(matches!(
            body_value(&bad, "application/json"),
            Err(GuardError::NonConformingResponseBody(_))
        ));
    }
}
