//! # Validator Cache Module
//!
//! Caches compiled JSON Schema validators for response bodies so a schema is
//! compiled once instead of on every response.
//!
//! ## Design
//!
//! - **Thread-safe**: `Arc<RwLock<HashMap>>` shared by every operation handler
//! - **Zero-copy sharing**: validators are handed out as `Arc<Validator>`
//! - **Precompilation**: [`ValidatorCache::precompile`] runs when an operation
//!   is bound, so schema errors surface at startup
//! - **Lazy fallback**: anything not precompiled is compiled on first use
//!
//! Entries are keyed by `operation_id:status:content_type`, where `status` is the
//! declared response key (`200`, `2XX`, `default`).
//!
//! The cache can be disabled with `BRRTG_SCHEMA_CACHE=false` (see
//! [`GuardConfig`](crate::config::GuardConfig)); schemas are then compiled on
//! every call.

use crate::spec::Operation;
use jsonschema::Validator;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, error, info};

/// Thread-safe cache of compiled response validators
#[derive(Clone)]
pub struct ValidatorCache {
    cache: Arc<RwLock<HashMap<String, Arc<Validator>>>>,
    enabled: bool,
}

impl std::fmt::Debug for ValidatorCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValidatorCache")
            .field("enabled", &self.enabled)
            .field("size", &self.size())
            .finish()
    }
}

impl Default for ValidatorCache {
    fn default() -> Self {
        Self::new(true)
    }
}

impl ValidatorCache {
    pub fn new(enabled: bool) -> Self {
        info!(enabled = enabled, "Initializing JSON Schema validator cache");
        Self {
            cache: Arc::new(RwLock::new(HashMap::new())),
            enabled,
        }
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn cache_key(operation_id: &str, status: &str, content_type: &str) -> String {
        format!("{operation_id}:{status}:{content_type}")
    }

    /// Get a cached validator or compile and cache it.
    ///
    /// Returns `None` when the schema does not compile; the failure is logged.
    pub fn get_or_compile(
        &self,
        operation_id: &str,
        status: &str,
        content_type: &str,
        schema: &Value,
    ) -> Option<Arc<Validator>> {
        if !self.enabled {
            return compile(operation_id, status, content_type, schema).map(Arc::new);
        }

        let key = Self::cache_key(operation_id, status, content_type);
        {
            let cache = self.cache.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(validator) = cache.get(&key) {
                debug!(cache_key = %key, "Schema validator cache hit");
                return Some(Arc::clone(validator));
            }
        }

        let validator = Arc::new(compile(operation_id, status, content_type, schema)?);
        let mut cache = self.cache.write().unwrap_or_else(PoisonError::into_inner);
        // Another thread may have compiled it while we did
        if let Some(existing) = cache.get(&key) {
            return Some(Arc::clone(existing));
        }
        cache.insert(key.clone(), Arc::clone(&validator));
        debug!(cache_key = %key, cache_size = cache.len(), "Schema validator compiled and cached");
        Some(validator)
    }

    /// Compile every response schema of an operation.
    ///
    /// Returns the number of validators compiled. A no-op when disabled.
    pub fn precompile(&self, operation: &Operation) -> usize {
        if !self.enabled {
            return 0;
        }
        let mut compiled = 0;
        for response in &operation.responses {
            for (content_type, schema) in &response.content_schemas {
                if self
                    .get_or_compile(&operation.operation_id, &response.status, content_type, schema)
                    .is_some()
                {
                    compiled += 1;
                }
            }
        }
        debug!(
            operation_id = %operation.operation_id,
            compiled = compiled,
            "Response schemas precompiled"
        );
        compiled
    }

    #[must_use]
    pub fn size(&self) -> usize {
        self.cache.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn clear(&self) {
        let mut cache = self.cache.write().unwrap_or_else(PoisonError::into_inner);
        let dropped = cache.len();
        cache.clear();
        info!(dropped = dropped, "Schema validator cache cleared");
    }
}

fn compile(operation_id: &str, status: &str, content_type: &str, schema: &Value) -> Option<Validator> {
    match jsonschema::validator_for(schema) {
        Ok(v) => Some(v),
        Err(e) => {
            error!(
                operation_id = %operation_id,
                status = %status,
                content_type = %content_type,
                error = %e,
                "Failed to compile JSON Schema"
            );
            None
        }
    }
}
