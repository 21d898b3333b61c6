use super::{ApiKeyInfo, BasicInfo, BearerInfo, ScopeValidator, SecurityRequest, TokenInfo};
use crate::error::SecurityError;
use crate::spec::ApiKeyLocation;
use base64::{engine::general_purpose, Engine as _};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::debug;

pub(crate) const NO_TOKEN: &str = "No authorization token provided";
const INVALID_TOKEN: &str = "Provided token is not valid";
const INVALID_API_KEY: &str = "Provided apikey is not valid";
const INVALID_BASIC: &str = "Provided authorization is not valid";
const INVALID_HEADER: &str = "Invalid authorization header";
const MISSING_SCOPE: &str = "Provided token doesn't have the required scope";

/// One compiled security check.
///
/// Built once per operation by [`compile_security`](super::compile_security)
/// and shared by every request. `verify` returns `Ok(None)` when the request
/// carries no credentials for this check.
#[derive(Clone)]
pub enum Verifier {
    /// Empty alternative `{}`; always succeeds with empty token info
    None,
    ApiKey {
        info: Arc<dyn ApiKeyInfo>,
        location: ApiKeyLocation,
        name: String,
    },
    Basic {
        info: Arc<dyn BasicInfo>,
    },
    Bearer {
        info: Arc<dyn BearerInfo>,
    },
    OAuth {
        token_info: Arc<dyn TokenInfo>,
        scopes: Arc<dyn ScopeValidator>,
        required_scopes: Vec<String>,
    },
    /// Every named verifier must succeed; token info is keyed by scheme name
    Multiple(Vec<(String, Verifier)>),
}

impl std::fmt::Debug for Verifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Verifier::None => write!(f, "None"),
            Verifier::ApiKey { location, name, .. } => f
                .debug_struct("ApiKey")
                .field("location", location)
                .field("name", name)
                .finish(),
            Verifier::Basic { .. } => write!(f, "Basic"),
            Verifier::Bearer { .. } => write!(f, "Bearer"),
            Verifier::OAuth { required_scopes, .. } => f
                .debug_struct("OAuth")
                .field("required_scopes", required_scopes)
                .finish(),
            Verifier::Multiple(list) => f
                .debug_list()
                .entries(list.iter().map(|(name, v)| (name, v)))
                .finish(),
        }
    }
}

/// Split an `Authorization` header into `(type, credentials)`
fn split_authorization(header: &str) -> Option<(&str, &str)> {
    let header = header.trim();
    let (auth_type, rest) = header.split_once(char::is_whitespace)?;
    Some((auth_type, rest.trim()))
}

/// The credentials of a `Bearer` authorization header, if any
fn bearer_token<'a>(req: &SecurityRequest<'a>) -> Option<&'a str> {
    let header = req.get_header("authorization")?;
    let (auth_type, token) = split_authorization(header)?;
    if auth_type.eq_ignore_ascii_case("bearer") && !token.is_empty() {
        Some(token)
    } else {
        None
    }
}

impl Verifier {
    /// Run the check against a request
    pub fn verify(&self, req: &SecurityRequest<'_>) -> Result<Option<Value>, SecurityError> {
        match self {
            Verifier::None => Ok(Some(Value::Object(Map::new()))),
            Verifier::ApiKey { info, location, name } => {
                let key = match location {
                    ApiKeyLocation::Header => req.get_header(name),
                    ApiKeyLocation::Query => req.get_query(name),
                    ApiKeyLocation::Cookie => req.get_cookie(name),
                };
                let Some(key) = key else {
                    return Ok(None);
                };
                match info.api_key_info(key, &[]) {
                    Some(token_info) => Ok(Some(token_info)),
                    None => Err(SecurityError::Unauthorized(INVALID_API_KEY.to_string())),
                }
            }
            Verifier::Basic { info } => {
                let Some(header) = req.get_header("authorization") else {
                    return Ok(None);
                };
                let Some((auth_type, encoded)) = split_authorization(header) else {
                    return Err(SecurityError::Unauthorized(INVALID_HEADER.to_string()));
                };
                if !auth_type.eq_ignore_ascii_case("basic") {
                    return Ok(None);
                }
                let decoded = general_purpose::STANDARD
                    .decode(encoded)
                    .ok()
                    .and_then(|bytes| String::from_utf8(bytes).ok())
                    .ok_or_else(|| SecurityError::Unauthorized(INVALID_HEADER.to_string()))?;
                let Some((username, password)) = decoded.split_once(':') else {
                    return Err(SecurityError::Unauthorized(INVALID_HEADER.to_string()));
                };
                match info.basic_info(username, password) {
                    Some(token_info) => Ok(Some(token_info)),
                    None => Err(SecurityError::Unauthorized(INVALID_BASIC.to_string())),
                }
            }
            Verifier::Bearer { info } => {
                let Some(token) = bearer_token(req) else {
                    return Ok(None);
                };
                match info.bearer_info(token) {
                    Some(token_info) => Ok(Some(token_info)),
                    None => Err(SecurityError::Unauthorized(INVALID_TOKEN.to_string())),
                }
            }
            Verifier::OAuth {
                token_info,
                scopes,
                required_scopes,
            } => {
                let Some(token) = bearer_token(req) else {
                    return Ok(None);
                };
                let Some(info) = token_info.token_info(token) else {
                    return Err(SecurityError::Unauthorized(INVALID_TOKEN.to_string()));
                };
                if !scopes.validate_scopes(required_scopes, &info) {
                    debug!(required = ?required_scopes, "Token lacks required scopes");
                    return Err(SecurityError::Forbidden(MISSING_SCOPE.to_string()));
                }
                Ok(Some(info))
            }
            Verifier::Multiple(verifiers) => {
                let mut accumulated = Map::new();
                for (name, verifier) in verifiers {
                    match verifier.verify(req)? {
                        Some(info) => {
                            accumulated.insert(name.clone(), info);
                        }
                        None => return Ok(None),
                    }
                }
                Ok(Some(Value::Object(accumulated)))
            }
        }
    }
}
