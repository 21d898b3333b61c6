use super::build::{build_operations, extract_security_schemes};
use super::types::{Operation, SecuritySchemes, SpecVersion};
use crate::error::SpecError;
use serde_json::Value;
use std::path::Path;

/// A parsed specification together with everything built from it.
#[derive(Debug, Clone)]
pub struct ApiDocument {
    pub version: SpecVersion,
    /// `info.title`, empty when absent
    pub title: String,
    pub operations: Vec<Operation>,
    pub security_schemes: SecuritySchemes,
    /// The raw document, kept for `$ref` lookups by collaborators
    pub document: Value,
}

impl ApiDocument {
    /// Build operations and schemes from an already parsed document
    pub fn from_value(document: Value) -> Result<Self, SpecError> {
        let version = detect_version(&document)?;
        let title = document
            .pointer("/info/title")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let operations = build_operations(&document, version)?;
        let security_schemes = extract_security_schemes(&document, version);
        tracing::debug!(
            title = %title,
            version = ?version,
            operations = operations.len(),
            security_schemes = security_schemes.len(),
            "Specification loaded"
        );
        Ok(Self {
            version,
            title,
            operations,
            security_schemes,
            document,
        })
    }

    #[must_use]
    pub fn operation(&self, operation_id: &str) -> Option<&Operation> {
        self.operations
            .iter()
            .find(|op| op.operation_id == operation_id)
    }
}

/// Determine whether a document is Swagger 2.0 or OpenAPI 3.x
pub fn detect_version(document: &Value) -> Result<SpecVersion, SpecError> {
    if let Some(v) = document.get("swagger").and_then(Value::as_str) {
        if v.starts_with('2') {
            return Ok(SpecVersion::Swagger2);
        }
    }
    if let Some(v) = document.get("openapi").and_then(Value::as_str) {
        if v.starts_with('3') {
            return Ok(SpecVersion::OpenApi3);
        }
    }
    Err(SpecError::UnknownVersion)
}

/// Parse a YAML or JSON document from a string.
///
/// YAML is a superset of JSON so a single parser handles both.
pub fn load_spec_str(content: &str) -> Result<ApiDocument, SpecError> {
    let value: Value =
        serde_yaml::from_str(content).map_err(|e| SpecError::Parse(e.to_string()))?;
    ApiDocument::from_value(value)
}

/// Load a specification file from disk.
///
/// Files ending in `.json` are parsed as JSON, everything else as YAML.
///
/// # Errors
///
/// Returns [`SpecError::Io`] when the file cannot be read, [`SpecError::Parse`]
/// when it is not valid YAML/JSON and [`SpecError::UnknownVersion`] when it is
/// neither Swagger 2.0 nor OpenAPI 3.x.
pub fn load_spec(path: impl AsRef<Path>) -> Result<ApiDocument, SpecError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)?;
    let is_json = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("json"));
    let value: Value = if is_json {
        serde_json::from_str(&content).map_err(|e| SpecError::Parse(e.to_string()))?
    } else {
        serde_yaml::from_str(&content).map_err(|e| SpecError::Parse(e.to_string()))?
    };
    ApiDocument::from_value(value)
}
