//! # Error Module
//!
//! Typed errors raised by the validation pipeline.
//!
//! The core never writes to the wire. Every failure is surfaced as a [`GuardError`]
//! and the framework adapter (or its error handler) turns it into a response, usually
//! via [`GuardError::to_problem`] which produces RFC 7807 Problem Details.
//!
//! | Error | Status | Meaning |
//! |-------|--------|---------|
//! | `ParameterParse` | 400 | Malformed collection input (normally recovered by the parser) |
//! | `Authentication` | 401 | No security alternative identified the caller |
//! | `Authorization` | 403 | Caller identified but lacks scope |
//! | `NonConformingResponseBody` | 500 | Handler produced a body that violates the schema |
//! | `NonConformingResponseHeaders` | 500 | Handler omitted required response headers |
//! | `AuthzNotPopulated` | 500 | Handler did not populate the authz context |
//! | `AuthzFailed` | 403 | Response resource does not belong to the principal |

use http::StatusCode;
use serde::Serialize;
use thiserror::Error;

/// Content type for Problem Details documents.
pub const APPLICATION_PROBLEM_JSON: &str = "application/problem+json";

/// Failure produced by a security verifier.
///
/// `Unauthorized` means the caller could not be identified (401), `Forbidden`
/// means the caller was identified but is not allowed (403).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SecurityError {
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Forbidden(String),
}

impl SecurityError {
    /// HTTP status carried by this failure
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            SecurityError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            SecurityError::Forbidden(_) => StatusCode::FORBIDDEN,
        }
    }

    /// Human readable detail
    #[must_use]
    pub fn detail(&self) -> &str {
        match self {
            SecurityError::Unauthorized(d) | SecurityError::Forbidden(d) => d,
        }
    }
}

/// Errors raised while loading a specification or building operations from it.
#[derive(Debug, Error)]
pub enum SpecError {
    #[error("failed to read spec file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse spec document: {0}")]
    Parse(String),
    #[error("document is neither Swagger 2.0 nor OpenAPI 3.x")]
    UnknownVersion,
    #[error("unresolvable reference `{0}`")]
    UnresolvedRef(String),
    #[error("operation `{0}` not found")]
    UnknownOperation(String),
    #[error("security requirement of `{operation_id}` dropped: {reason}")]
    DroppedSecurity { operation_id: String, reason: String },
}

/// Errors raised by the request/response pipeline.
#[derive(Debug, Error)]
pub enum GuardError {
    #[error("malformed parameter `{name}`: {reason}")]
    ParameterParse { name: String, reason: String },

    #[error("authentication failed: {0}")]
    Authentication(String),

    #[error("authorization failed: {0}")]
    Authorization(String),

    #[error("response body does not conform to specification: {0}")]
    NonConformingResponseBody(String),

    #[error("{0}")]
    NonConformingResponseHeaders(String),

    #[error("{0}")]
    AuthzNotPopulated(String),

    #[error("response resource is not owned by the authenticated principal")]
    AuthzFailed,

    #[error("handler failed: {0}")]
    Handler(#[source] anyhow::Error),

    #[error("framework adapter failed: {0}")]
    Adapter(String),
}

impl From<SecurityError> for GuardError {
    fn from(err: SecurityError) -> Self {
        match err {
            SecurityError::Unauthorized(detail) => GuardError::Authentication(detail),
            SecurityError::Forbidden(detail) => GuardError::Authorization(detail),
        }
    }
}

impl GuardError {
    /// HTTP status the error handler should answer with
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            GuardError::ParameterParse { .. } => StatusCode::BAD_REQUEST,
            GuardError::Authentication(_) => StatusCode::UNAUTHORIZED,
            GuardError::Authorization(_) | GuardError::AuthzFailed => StatusCode::FORBIDDEN,
            GuardError::NonConformingResponseBody(_)
            | GuardError::NonConformingResponseHeaders(_)
            | GuardError::AuthzNotPopulated(_)
            | GuardError::Handler(_)
            | GuardError::Adapter(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Short title used in problem documents
    #[must_use]
    pub fn title(&self) -> &'static str {
        match self {
            GuardError::ParameterParse { .. } => "Bad Request",
            GuardError::Authentication(_) => "Unauthorized",
            GuardError::Authorization(_) | GuardError::AuthzFailed => "Forbidden",
            GuardError::NonConformingResponseBody(_)
            | GuardError::NonConformingResponseHeaders(_) => "Response body does not conform to specification",
            GuardError::AuthzNotPopulated(_) => "Authorization context not populated",
            GuardError::Handler(_) | GuardError::Adapter(_) => "Internal Server Error",
        }
    }

    /// Build an RFC 7807 problem document for this error
    pub fn to_problem(&self) -> Problem {
        let detail = match self {
            GuardError::Authentication(d) | GuardError::Authorization(d) => d.clone(),
            other => other.to_string(),
        };
        Problem::new(self.status(), self.title(), detail)
    }
}

/// RFC 7807 Problem Details
#[derive(Debug, Clone, PartialEq, Serialize)]
#[must_use]
pub struct Problem {
    #[serde(rename = "type")]
    pub type_url: String,
    pub title: String,
    pub status: u16,
    pub detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance: Option<String>,
}

impl Problem {
    pub fn new(status: StatusCode, title: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            type_url: "about:blank".to_string(),
            title: title.into(),
            status: status.as_u16(),
            detail: detail.into(),
            instance: None,
        }
    }

    pub fn with_instance(mut self, instance: impl Into<String>) -> Self {
        self.instance = Some(instance.into());
        self
    }

    /// Serialize into a JSON body
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_else(|_| serde_json::json!({ "status": self.status }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_security_error_maps_to_status() {
        let e: GuardError = SecurityError::Unauthorized("No authorization token provided".into()).into();
        assert_eq!(e.status(), StatusCode::UNAUTHORIZED);
        let e: GuardError = SecurityError::Forbidden("scope".into()).into();
        assert_eq!(e.status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn test_problem_document() {
        let err = GuardError::NonConformingResponseHeaders(
            "Keys in header don't match response specification. Difference: x-rate".into(),
        );
        let problem = err.to_problem().with_instance("/pets");
        let json = problem.to_json();
        assert_eq!(json["status"], 500);
        assert_eq!(json["type"], "about:blank");
        assert_eq!(json["instance"], "/pets");
        assert!(json["detail"].as_str().unwrap_or_default().contains("x-rate"));
    }

    #[test]
    fn test_authz_failed_is_forbidden() {
        assert_eq!(GuardError::AuthzFailed.status(), StatusCode::FORBIDDEN);
        assert_eq!(
            GuardError::AuthzNotPopulated("missing".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
