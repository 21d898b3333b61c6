//! # Api Module
//!
//! Entry point tying a loaded document to its runtime pieces.
//!
//! An [`Api`] holds the document's operations and security schemes, the
//! security capabilities, access resolvers and configuration. Binding an
//! operation compiles its parameter parser, security decision and response
//! validator once and returns an [`OperationHandler`] that serves every
//! request for it.
//!
//! ```rust
//! use brrtguard::lifecycle::{Handler, NormalizedRequest, NormalizedResponse};
//! use brrtguard::security::{SecurityHandlerFactory, StaticApiKeys};
//! use brrtguard::spec::load_spec_str;
//! use brrtguard::{Api, GuardConfig};
//! use http::{Method, StatusCode};
//!
//! let doc = load_spec_str(r#"
//! swagger: "2.0"
//! info: { title: pets, version: "1" }
//! securityDefinitions:
//!   key: { type: apiKey, in: header, name: X-Api-Key }
//! security: [ { key: [] } ]
//! paths:
//!   /pets:
//!     get:
//!       operationId: list_pets
//!       responses:
//!         "200": { description: ok }
//! "#).unwrap();
//!
//! let api = Api::new(doc, GuardConfig::default()).with_security_factory(
//!     SecurityHandlerFactory::new().with_api_key_info("key", StaticApiKeys::new().key("s3cr3t", "alice")),
//! );
//! let op = api
//!     .bind("list_pets", Handler::blocking(|_req| Ok(NormalizedResponse::new(StatusCode::OK))))
//!     .unwrap();
//!
//! let mut req = NormalizedRequest::new(Method::GET, "/pets").header("x-api-key", "s3cr3t");
//! assert_eq!(op.handle_blocking(&mut req).unwrap().status, StatusCode::OK);
//! assert_eq!(req.user(), Some("alice"));
//! ```

use crate::config::GuardConfig;
use crate::error::SpecError;
use crate::lifecycle::{Handler, OperationHandler};
use crate::response_validator::{AccessResolver, AccessResolvers, ResponseValidator};
use crate::security::{compile_security, CompiledSecurity, SecurityHandlerFactory};
use crate::spec::{load_spec, ApiDocument, Operation};
use crate::uri_parsing::{UriParser, UriParsingPolicy};
use crate::validator_cache::ValidatorCache;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

/// A loaded document plus everything needed to bind its operations
pub struct Api {
    document: ApiDocument,
    factory: SecurityHandlerFactory,
    config: GuardConfig,
    cache: ValidatorCache,
    resolvers: Arc<AccessResolvers>,
}

impl std::fmt::Debug for Api {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Api")
            .field("title", &self.document.title)
            .field("operations", &self.document.operations.len())
            .field("factory", &self.factory)
            .field("config", &self.config)
            .field("resolvers", &self.resolvers.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl Api {
    pub fn new(document: ApiDocument, config: GuardConfig) -> Self {
        let cache = ValidatorCache::new(config.schema_cache);
        Self {
            document,
            factory: SecurityHandlerFactory::new(),
            config,
            cache,
            resolvers: Arc::new(AccessResolvers::new()),
        }
    }

    /// Load a document from disk
    pub fn load(path: impl AsRef<Path>, config: GuardConfig) -> Result<Self, SpecError> {
        Ok(Self::new(load_spec(path)?, config))
    }

    pub fn with_security_factory(mut self, factory: SecurityHandlerFactory) -> Self {
        self.factory = factory;
        self
    }

    /// Register a custom ownership check referenced by `access-resolver`
    pub fn with_access_resolver(mut self, name: impl Into<String>, resolver: impl AccessResolver + 'static) -> Self {
        Arc::make_mut(&mut self.resolvers).insert(name.into(), Arc::new(resolver));
        self
    }

    pub fn document(&self) -> &ApiDocument {
        &self.document
    }

    pub fn config(&self) -> &GuardConfig {
        &self.config
    }

    pub fn validator_cache(&self) -> &ValidatorCache {
        &self.cache
    }

    /// The collection parsing policy operations are bound with
    #[must_use]
    pub fn uri_policy(&self) -> UriParsingPolicy {
        self.config.policy_for(self.document.version)
    }

    /// Compile the security requirement of one operation
    pub fn compile_security(&self, operation: &Operation) -> CompiledSecurity {
        compile_security(
            &operation.operation_id,
            &operation.security,
            &self.document.security_schemes,
            &self.factory,
        )
    }

    /// Compile an operation and attach its business handler.
    ///
    /// # Errors
    ///
    /// [`SpecError::UnknownOperation`] when no operation has that id, and
    /// [`SpecError::DroppedSecurity`] when `strict_security` is set and a
    /// security alternative could not be compiled.
    pub fn bind(&self, operation_id: &str, handler: Handler) -> Result<OperationHandler, SpecError> {
        let mut operation = self
            .document
            .operation(operation_id)
            .cloned()
            .ok_or_else(|| SpecError::UnknownOperation(operation_id.to_string()))?;
        if operation.produces.is_empty() {
            operation.produces.push(self.config.default_mimetype.clone());
        }

        let compiled = self.compile_security(&operation);
        if let Some(first) = compiled.dropped.first() {
            if self.config.strict_security {
                return Err(SpecError::DroppedSecurity {
                    operation_id: operation_id.to_string(),
                    reason: first.reason.clone(),
                });
            }
            if compiled.auth.alternatives() == 0 {
                warn!(
                    operation_id = %operation_id,
                    "Every security alternative was dropped, all requests will be rejected"
                );
            }
        }

        let parser = UriParser::new(self.uri_policy(), operation.parameters.clone());
        let precompiled = self.cache.precompile(&operation);
        let operation = Arc::new(operation);
        let validator = self.config.validate_responses.then(|| {
            ResponseValidator::new(Arc::clone(&operation), self.cache.clone(), Arc::clone(&self.resolvers))
        });

        info!(
            operation_id = %operation_id,
            method = %operation.method,
            path = %operation.path,
            policy = %parser.policy(),
            security_alternatives = compiled.auth.alternatives(),
            dropped_alternatives = compiled.dropped.len(),
            precompiled_schemas = precompiled,
            validate_responses = validator.is_some(),
            "Operation bound"
        );
        Ok(OperationHandler::new(operation, parser, compiled.auth, validator, handler))
    }
}
