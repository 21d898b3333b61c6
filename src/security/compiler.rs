use super::verifier::NO_TOKEN;
use super::{SecurityContext, SecurityHandlerFactory, SecurityRequest, Verifier};
use crate::error::SecurityError;
use crate::spec::{SecurityAlternative, SecurityRequirement, SecurityScheme, SecuritySchemes};
use tracing::{debug, warn};

/// The compiled security decision of one operation
#[derive(Debug, Clone)]
pub enum ComposedAuth {
    /// No security declared; every request passes untouched
    Passthrough,
    /// OR over verifiers, tried in declaration order
    Alternatives(Vec<Verifier>),
}

impl ComposedAuth {
    #[must_use]
    pub fn is_passthrough(&self) -> bool {
        matches!(self, ComposedAuth::Passthrough)
    }

    /// Number of usable alternatives; zero for passthrough
    #[must_use]
    pub fn alternatives(&self) -> usize {
        match self {
            ComposedAuth::Passthrough => 0,
            ComposedAuth::Alternatives(v) => v.len(),
        }
    }

    /// Try every alternative in order.
    ///
    /// The first one that identifies the caller wins. Alternatives that find no
    /// credentials are skipped. When all fail the error of the last rejecting
    /// alternative is returned, or 401 `No authorization token provided` when
    /// none of them found credentials at all.
    pub fn authenticate(&self, req: &SecurityRequest<'_>) -> Result<Option<SecurityContext>, SecurityError> {
        let verifiers = match self {
            ComposedAuth::Passthrough => return Ok(None),
            ComposedAuth::Alternatives(v) => v,
        };

        let mut last_error = None;
        for (index, verifier) in verifiers.iter().enumerate() {
            match verifier.verify(req) {
                Ok(Some(token_info)) => {
                    debug!(alternative = index, "Security alternative accepted");
                    return Ok(Some(SecurityContext::from_token_info(token_info)));
                }
                Ok(None) => continue,
                Err(e) => {
                    debug!(alternative = index, error = %e, "Security alternative rejected");
                    last_error = Some(e);
                }
            }
        }
        Err(last_error.unwrap_or_else(|| SecurityError::Unauthorized(NO_TOKEN.to_string())))
    }
}

/// An alternative removed at compile time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DroppedAlternative {
    /// Position in the declared requirement
    pub index: usize,
    pub reason: String,
}

/// Result of compiling a requirement
#[derive(Debug, Clone)]
pub struct CompiledSecurity {
    pub auth: ComposedAuth,
    pub dropped: Vec<DroppedAlternative>,
}

/// Compile a security requirement into a [`ComposedAuth`].
///
/// An empty requirement compiles to [`ComposedAuth::Passthrough`]. An empty
/// alternative compiles to [`Verifier::None`]. Alternatives that cannot be
/// built are dropped with a warning and reported in
/// [`CompiledSecurity::dropped`]; if every alternative is dropped the result
/// rejects all requests.
pub fn compile_security(
    operation_id: &str,
    requirement: &SecurityRequirement,
    schemes: &SecuritySchemes,
    factory: &SecurityHandlerFactory,
) -> CompiledSecurity {
    if requirement.is_empty() {
        debug!(operation_id = %operation_id, "No security declared, using passthrough");
        return CompiledSecurity {
            auth: ComposedAuth::Passthrough,
            dropped: Vec::new(),
        };
    }

    let mut verifiers = Vec::new();
    let mut dropped = Vec::new();
    for (index, alternative) in requirement.alternatives().iter().enumerate() {
        match compile_alternative(alternative, schemes, factory) {
            Ok(verifier) => verifiers.push(verifier),
            Err(reason) => {
                warn!(
                    operation_id = %operation_id,
                    alternative = index,
                    reason = %reason,
                    "Dropping security alternative"
                );
                dropped.push(DroppedAlternative { index, reason });
            }
        }
    }

    CompiledSecurity {
        auth: ComposedAuth::Alternatives(verifiers),
        dropped,
    }
}

fn compile_alternative(
    alternative: &SecurityAlternative,
    schemes: &SecuritySchemes,
    factory: &SecurityHandlerFactory,
) -> Result<Verifier, String> {
    if alternative.is_empty() {
        return Ok(Verifier::None);
    }

    let mut verifiers: Vec<(String, Verifier)> = Vec::new();
    let mut seen_oauth = false;
    for (name, required_scopes) in alternative.iter() {
        let scheme = schemes
            .get(name)
            .ok_or_else(|| format!("security scheme `{name}` is not defined"))?;
        let verifier = match scheme {
            SecurityScheme::OAuth2 { .. } => {
                if seen_oauth {
                    return Err("multiple OAuth2 security schemes in one alternative are not supported".to_string());
                }
                seen_oauth = true;
                let token_info = factory
                    .token_info(name)
                    .ok_or_else(|| format!("no token info capability for `{name}`"))?;
                Verifier::OAuth {
                    token_info,
                    scopes: factory.scope_validator(name),
                    required_scopes: required_scopes.to_vec(),
                }
            }
            SecurityScheme::Basic => basic_verifier(name, factory)?,
            SecurityScheme::Http { scheme, .. } => match scheme.as_str() {
                "basic" => basic_verifier(name, factory)?,
                "bearer" => bearer_verifier(name, factory)?,
                other => return Err(format!("unsupported http authorization scheme `{other}`")),
            },
            SecurityScheme::ApiKey {
                name: key_name,
                location,
                authentication_scheme,
            } => {
                if authentication_scheme.as_deref() == Some("bearer") {
                    bearer_verifier(name, factory)?
                } else {
                    let info = factory
                        .api_key_info(name)
                        .ok_or_else(|| format!("no api key capability for `{name}`"))?;
                    Verifier::ApiKey {
                        info,
                        location: *location,
                        name: key_name.clone(),
                    }
                }
            }
            SecurityScheme::Unsupported { scheme_type } => {
                return Err(format!("unsupported security scheme type `{scheme_type}`"));
            }
        };
        verifiers.push((name.to_string(), verifier));
    }

    if verifiers.len() == 1 {
        if let Some((_, verifier)) = verifiers.pop() {
            return Ok(verifier);
        }
    }
    Ok(Verifier::Multiple(verifiers))
}

fn basic_verifier(name: &str, factory: &SecurityHandlerFactory) -> Result<Verifier, String> {
    factory
        .basic_info(name)
        .map(|info| Verifier::Basic { info })
        .ok_or_else(|| format!("no basic auth capability for `{name}`"))
}

fn bearer_verifier(name: &str, factory: &SecurityHandlerFactory) -> Result<Verifier, String> {
    factory
        .bearer_info(name)
        .map(|info| Verifier::Bearer { info })
        .ok_or_else(|| format!("no bearer capability for `{name}`"))
}
