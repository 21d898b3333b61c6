//! Ready-made verifier capabilities for common setups and tests.

use super::{ApiKeyInfo, BasicInfo, BearerInfo, ScopeValidator, TokenInfo};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde_json::{json, Value};
use std::collections::HashMap;
use tracing::debug;

/// Static map of API keys to principals
#[derive(Debug, Clone, Default)]
pub struct StaticApiKeys {
    keys: HashMap<String, String>,
}

impl StaticApiKeys {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept `key` as belonging to `principal`
    pub fn key(mut self, key: impl Into<String>, principal: impl Into<String>) -> Self {
        self.keys.insert(key.into(), principal.into());
        self
    }
}

impl ApiKeyInfo for StaticApiKeys {
    fn api_key_info(&self, api_key: &str, _required_scopes: &[String]) -> Option<Value> {
        self.keys.get(api_key).map(|principal| json!({ "sub": principal }))
    }
}

/// Static username/password table
#[derive(Debug, Clone, Default)]
pub struct StaticBasicCredentials {
    users: HashMap<String, String>,
}

impl StaticBasicCredentials {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn user(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.users.insert(username.into(), password.into());
        self
    }
}

impl BasicInfo for StaticBasicCredentials {
    fn basic_info(&self, username: &str, password: &str) -> Option<Value> {
        match self.users.get(username) {
            Some(expected) if expected == password => Some(json!({ "sub": username })),
            _ => None,
        }
    }
}

/// Validates signed JWTs and returns their claims as token info.
///
/// Usable both as a [`BearerInfo`] and as an OAuth2 [`TokenInfo`].
#[derive(Clone)]
pub struct JwtBearerInfo {
    key: DecodingKey,
    validation: Validation,
}

impl std::fmt::Debug for JwtBearerInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtBearerInfo")
            .field("algorithms", &self.validation.algorithms)
            .finish_non_exhaustive()
    }
}

impl JwtBearerInfo {
    /// HMAC-SHA256 signed tokens with a shared secret. `exp` is required.
    pub fn hs256(secret: impl AsRef<[u8]>) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_required_spec_claims(&["exp"]);
        Self {
            key: DecodingKey::from_secret(secret.as_ref()),
            validation,
        }
    }

    /// Require a matching `iss` claim
    pub fn issuer(mut self, issuer: &str) -> Self {
        self.validation.set_issuer(&[issuer]);
        self
    }

    /// Require a matching `aud` claim
    pub fn audience(mut self, audience: &str) -> Self {
        self.validation.set_audience(&[audience]);
        self
    }

    /// Clock skew tolerance in seconds for `exp`/`nbf`
    pub fn leeway(mut self, seconds: u64) -> Self {
        self.validation.leeway = seconds;
        self
    }

    fn claims(&self, token: &str) -> Option<Value> {
        match decode::<Value>(token, &self.key, &self.validation) {
            Ok(data) => Some(data.claims),
            Err(e) => {
                debug!(error = %e, "JWT validation failed");
                None
            }
        }
    }
}

impl BearerInfo for JwtBearerInfo {
    fn bearer_info(&self, token: &str) -> Option<Value> {
        self.claims(token)
    }
}

impl TokenInfo for JwtBearerInfo {
    fn token_info(&self, token: &str) -> Option<Value> {
        self.claims(token)
    }
}

/// Checks that every required scope is granted.
///
/// Granted scopes come from a space separated `scope` string or a `scopes`/`scp`
/// list (or string).
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultScopeValidator;

impl DefaultScopeValidator {
    fn granted(token_info: &Value) -> Vec<&str> {
        for key in ["scope", "scopes", "scp"] {
            match token_info.get(key) {
                Some(Value::String(s)) => return s.split_whitespace().collect(),
                Some(Value::Array(items)) => return items.iter().filter_map(Value::as_str).collect(),
                _ => {}
            }
        }
        Vec::new()
    }
}

impl ScopeValidator for DefaultScopeValidator {
    fn validate_scopes(&self, required_scopes: &[String], token_info: &Value) -> bool {
        let granted = Self::granted(token_info);
        required_scopes.iter().all(|s| granted.contains(&s.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};

    fn now() -> u64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_secs()
    }

    #[test]
    fn test_static_api_keys() {
        let keys = StaticApiKeys::new().key("k1", "alice");
        assert_eq!(keys.api_key_info("k1", &[]), Some(json!({"sub": "alice"})));
        assert_eq!(keys.api_key_info("k2", &[]), None);
    }

    #[test]
    fn test_static_basic_credentials() {
        let creds = StaticBasicCredentials::new().user("foo", "bar");
        assert!(creds.basic_info("foo", "bar").is_some());
        assert!(creds.basic_info("foo", "baz").is_none());
        assert!(creds.basic_info("nobody", "bar").is_none());
    }

    #[test]
    fn test_jwt_bearer_info_roundtrip() {
        let claims = json!({"sub": "alice", "scope": "read", "exp": now() + 600});
        let token = encode(&Header::default(), &claims, &EncodingKey::from_secret(b"secret")).unwrap();
        let info = JwtBearerInfo::hs256("secret");
        let decoded = info.bearer_info(&token).unwrap();
        assert_eq!(decoded["sub"], "alice");

        let other = JwtBearerInfo::hs256("other-secret");
        assert!(other.token_info(&token).is_none());
    }

    #[test]
    fn test_jwt_expired_token_rejected() {
        let claims = json!({"sub": "alice", "exp": now() - 3600});
        let token = encode(&Header::default(), &claims, &EncodingKey::from_secret(b"secret")).unwrap();
        assert!(JwtBearerInfo::hs256("secret").bearer_info(&token).is_none());
    }

    #[test]
    fn test_default_scope_validator_sources() {
        let v = DefaultScopeValidator;
        let req = vec!["read".to_string(), "write".to_string()];
        assert!(v.validate_scopes(&req, &json!({"scope": "read write admin"})));
        assert!(v.validate_scopes(&req, &json!({"scopes": ["write", "read"]})));
        assert!(v.validate_scopes(&req, &json!({"scp": "read write"})));
        assert!(!v.validate_scopes(&req, &json!({"scp": ["read"]})));
        assert!(v.validate_scopes(&[], &json!({})));
    }
}
