//! # Security Module
//!
//! Compiles an operation's declarative security requirement into a single
//! [`ComposedAuth`] decision and runs it against incoming requests.
//!
//! ## Overview
//!
//! A requirement is an ordered list of alternatives (logical OR). Each
//! alternative names one or more schemes that must all pass (logical AND).
//! Every scheme maps to one [`Verifier`] variant:
//!
//! | Scheme | Verifier | Capability |
//! |--------|----------|------------|
//! | `apiKey` | [`Verifier::ApiKey`] | [`ApiKeyInfo`] |
//! | `apiKey` + `x-authentication-scheme: bearer` | [`Verifier::Bearer`] | [`BearerInfo`] |
//! | `basic`, `http`/`basic` | [`Verifier::Basic`] | [`BasicInfo`] |
//! | `http`/`bearer` | [`Verifier::Bearer`] | [`BearerInfo`] |
//! | `oauth2` | [`Verifier::OAuth`] | [`TokenInfo`] + [`ScopeValidator`] |
//!
//! Capabilities are registered per scheme name on a [`SecurityHandlerFactory`].
//! An alternative whose capability is missing, or which uses an unsupported
//! scheme, is dropped when the operation is compiled and a warning is logged.
//! Remaining alternatives keep working.
//!
//! ## Example
//!
//! ```rust
//! use brrtguard::security::{SecurityHandlerFactory, StaticApiKeys};
//!
//! let factory = SecurityHandlerFactory::new()
//!     .with_api_key_info("api_key", StaticApiKeys::new().key("s3cr3t", "alice"))
//!     .with_bearer_info("jwt", |token: &str| {
//!         (token == "letmein").then(|| serde_json::json!({ "sub": "bob" }))
//!     });
//! assert!(factory.api_key_info("api_key").is_some());
//! ```
//!
//! ## Verifier results
//!
//! A verifier returns `Ok(Some(token_info))` when it identified the caller,
//! `Ok(None)` when the request carries no credentials for it, and
//! `Err(SecurityError)` when credentials were present but rejected.

mod builtin;
mod compiler;
mod verifier;

pub use builtin::{DefaultScopeValidator, JwtBearerInfo, StaticApiKeys, StaticBasicCredentials};
pub use compiler::{compile_security, CompiledSecurity, ComposedAuth, DroppedAlternative};
pub use verifier::Verifier;

use crate::lifecycle::NormalizedRequest;
use http::HeaderMap;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Resolves an API key to token info
pub trait ApiKeyInfo: Send + Sync {
    fn api_key_info(&self, api_key: &str, required_scopes: &[String]) -> Option<Value>;
}

/// Resolves basic credentials to token info
pub trait BasicInfo: Send + Sync {
    fn basic_info(&self, username: &str, password: &str) -> Option<Value>;
}

/// Resolves a bearer token to token info
pub trait BearerInfo: Send + Sync {
    fn bearer_info(&self, token: &str) -> Option<Value>;
}

/// Resolves an OAuth2 access token to token info
pub trait TokenInfo: Send + Sync {
    fn token_info(&self, token: &str) -> Option<Value>;
}

/// Decides whether token info grants the required scopes
pub trait ScopeValidator: Send + Sync {
    fn validate_scopes(&self, required_scopes: &[String], token_info: &Value) -> bool;
}

impl<F> ApiKeyInfo for F
where
    F: Fn(&str, &[String]) -> Option<Value> + Send + Sync,
{
    fn api_key_info(&self, api_key: &str, required_scopes: &[String]) -> Option<Value> {
        self(api_key, required_scopes)
    }
}

impl<F> BasicInfo for F
where
    F: Fn(&str, &str) -> Option<Value> + Send + Sync,
{
    fn basic_info(&self, username: &str, password: &str) -> Option<Value> {
        self(username, password)
    }
}

impl<F> BearerInfo for F
where
    F: Fn(&str) -> Option<Value> + Send + Sync,
{
    fn bearer_info(&self, token: &str) -> Option<Value> {
        self(token)
    }
}

impl<F> TokenInfo for F
where
    F: Fn(&str) -> Option<Value> + Send + Sync,
{
    fn token_info(&self, token: &str) -> Option<Value> {
        self(token)
    }
}

impl<F> ScopeValidator for F
where
    F: Fn(&[String], &Value) -> bool + Send + Sync,
{
    fn validate_scopes(&self, required_scopes: &[String], token_info: &Value) -> bool {
        self(required_scopes, token_info)
    }
}

/// Borrowed view of the parts of a request verifiers may read
#[derive(Debug, Clone, Copy)]
pub struct SecurityRequest<'a> {
    pub headers: &'a HeaderMap,
    pub query: &'a [(String, String)],
    pub cookies: &'a HashMap<String, String>,
}

impl<'a> SecurityRequest<'a> {
    /// Get a header by name (case-insensitive)
    #[inline]
    #[must_use]
    pub fn get_header(&self, name: &str) -> Option<&'a str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Get a query parameter by name; the first occurrence wins
    #[inline]
    #[must_use]
    pub fn get_query(&self, name: &str) -> Option<&'a str> {
        self.query
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    #[inline]
    #[must_use]
    pub fn get_cookie(&self, name: &str) -> Option<&'a str> {
        self.cookies.get(name).map(String::as_str)
    }
}

impl<'a> From<&'a NormalizedRequest> for SecurityRequest<'a> {
    fn from(req: &'a NormalizedRequest) -> Self {
        Self {
            headers: &req.headers,
            query: &req.raw_query,
            cookies: &req.cookies,
        }
    }
}

/// Identity established by a successful security check
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SecurityContext {
    /// `sub`, or failing that `uid`, of the token info
    pub user: Option<String>,
    pub token_info: Value,
}

impl SecurityContext {
    pub fn from_token_info(token_info: Value) -> Self {
        let user = ["sub", "uid"].iter().find_map(|k| match token_info.get(*k) {
            Some(Value::String(s)) => Some(s.clone()),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        });
        Self { user, token_info }
    }
}

/// Registry of verifier capabilities keyed by security scheme name.
///
/// Cheap to clone; capabilities are shared behind `Arc`.
#[derive(Clone, Default)]
pub struct SecurityHandlerFactory {
    api_key: HashMap<String, Arc<dyn ApiKeyInfo>>,
    basic: HashMap<String, Arc<dyn BasicInfo>>,
    bearer: HashMap<String, Arc<dyn BearerInfo>>,
    token_info: HashMap<String, Arc<dyn TokenInfo>>,
    scope_validators: HashMap<String, Arc<dyn ScopeValidator>>,
}

fn sorted_keys<V: ?Sized>(map: &HashMap<String, Arc<V>>) -> Vec<&str> {
    let mut keys: Vec<&str> = map.keys().map(String::as_str).collect();
    keys.sort_unstable();
    keys
}

impl std::fmt::Debug for SecurityHandlerFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecurityHandlerFactory")
            .field("api_key", &sorted_keys(&self.api_key))
            .field("basic", &sorted_keys(&self.basic))
            .field("bearer", &sorted_keys(&self.bearer))
            .field("token_info", &sorted_keys(&self.token_info))
            .field("scope_validators", &sorted_keys(&self.scope_validators))
            .finish()
    }
}

impl SecurityHandlerFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_api_key_info(mut self, scheme: impl Into<String>, info: impl ApiKeyInfo + 'static) -> Self {
        self.api_key.insert(scheme.into(), Arc::new(info));
        self
    }

    pub fn with_basic_info(mut self, scheme: impl Into<String>, info: impl BasicInfo + 'static) -> Self {
        self.basic.insert(scheme.into(), Arc::new(info));
        self
    }

    pub fn with_bearer_info(mut self, scheme: impl Into<String>, info: impl BearerInfo + 'static) -> Self {
        self.bearer.insert(scheme.into(), Arc::new(info));
        self
    }

    pub fn with_token_info(mut self, scheme: impl Into<String>, info: impl TokenInfo + 'static) -> Self {
        self.token_info.insert(scheme.into(), Arc::new(info));
        self
    }

    pub fn with_scope_validator(
        mut self,
        scheme: impl Into<String>,
        validator: impl ScopeValidator + 'static,
    ) -> Self {
        self.scope_validators.insert(scheme.into(), Arc::new(validator));
        self
    }

    #[must_use]
    pub fn api_key_info(&self, scheme: &str) -> Option<Arc<dyn ApiKeyInfo>> {
        self.api_key.get(scheme).cloned()
    }

    #[must_use]
    pub fn basic_info(&self, scheme: &str) -> Option<Arc<dyn BasicInfo>> {
        self.basic.get(scheme).cloned()
    }

    #[must_use]
    pub fn bearer_info(&self, scheme: &str) -> Option<Arc<dyn BearerInfo>> {
        self.bearer.get(scheme).cloned()
    }

    #[must_use]
    pub fn token_info(&self, scheme: &str) -> Option<Arc<dyn TokenInfo>> {
        self.token_info.get(scheme).cloned()
    }

    /// Scope validator for a scheme, [`DefaultScopeValidator`] when none is registered
    #[must_use]
    pub fn scope_validator(&self, scheme: &str) -> Arc<dyn ScopeValidator> {
        self.scope_validators
            .get(scheme)
            .cloned()
            .unwrap_or_else(|| Arc::new(DefaultScopeValidator))
    }
}
