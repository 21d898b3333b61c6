//! # Configuration Module
//!
//! Settings that shape how operations are compiled.
//!
//! Configuration comes from environment variables ([`GuardConfig::from_env`])
//! or a YAML file ([`GuardConfig::load`]):
//!
//! ```yaml
//! uri_parser: first_value      # swagger2 | first_value | always_multi | openapi
//! validate_responses: true
//! schema_cache: true
//! default_mimetype: application/json
//! strict_security: false
//! logging:
//!   log_level: info
//!   format: json
//! ```
//!
//! | Variable | Field |
//! |----------|-------|
//! | `BRRTG_URI_PARSER` | `uri_parser` |
//! | `BRRTG_VALIDATE_RESPONSES` | `validate_responses` |
//! | `BRRTG_SCHEMA_CACHE` | `schema_cache` |
//! | `BRRTG_DEFAULT_MIMETYPE` | `default_mimetype` |
//! | `BRRTG_STRICT_SECURITY` | `strict_security` |
//! | `BRRTG_LOG_*` | `logging` (see [`crate::logging`]) |
//!
//! When `uri_parser` is unset the policy follows the document version:
//! Swagger 2.0 documents use `swagger2`, OpenAPI 3 documents use `openapi`.

use crate::logging::LogConfig;
use crate::spec::{SpecVersion, DEFAULT_MIMETYPE};
use crate::uri_parsing::UriParsingPolicy;
use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer};
use std::path::Path;
use tracing::warn;

/// Compilation settings shared by every bound operation
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct GuardConfig {
    /// Collection parsing policy; `None` picks one from the document version
    #[serde(deserialize_with = "deserialize_policy")]
    pub uri_parser: Option<UriParsingPolicy>,
    pub validate_responses: bool,
    /// Cache compiled response schemas
    pub schema_cache: bool,
    /// Mimetype for operations that declare none
    pub default_mimetype: String,
    /// Treat a dropped security alternative as a bind error
    pub strict_security: bool,
    pub logging: LogConfig,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            uri_parser: None,
            validate_responses: true,
            schema_cache: true,
            default_mimetype: DEFAULT_MIMETYPE.to_string(),
            strict_security: false,
            logging: LogConfig::default(),
        }
    }
}

fn deserialize_policy<'de, D>(deserializer: D) -> std::result::Result<Option<UriParsingPolicy>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer)?
        .map(|s| s.parse().map_err(serde::de::Error::custom))
        .transpose()
}

fn parse_bool(key: &str, value: Option<String>, default: bool) -> bool {
    match value {
        None => default,
        Some(raw) => raw.parse().unwrap_or_else(|_| {
            warn!(variable = %key, value = %raw, "Ignoring non-boolean value");
            default
        }),
    }
}

impl GuardConfig {
    /// Defaults overridden by `BRRTG_*` environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`GuardConfig::from_env`] with a custom variable source
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let uri_parser = match lookup("BRRTG_URI_PARSER") {
            Some(raw) => match raw.parse() {
                Ok(policy) => Some(policy),
                Err(e) => {
                    warn!(value = %raw, error = %e, "Ignoring unknown BRRTG_URI_PARSER");
                    None
                }
            },
            None => None,
        };
        Self {
            uri_parser,
            validate_responses: parse_bool(
                "BRRTG_VALIDATE_RESPONSES",
                lookup("BRRTG_VALIDATE_RESPONSES"),
                defaults.validate_responses,
            ),
            schema_cache: parse_bool("BRRTG_SCHEMA_CACHE", lookup("BRRTG_SCHEMA_CACHE"), defaults.schema_cache),
            default_mimetype: lookup("BRRTG_DEFAULT_MIMETYPE").unwrap_or(defaults.default_mimetype),
            strict_security: parse_bool(
                "BRRTG_STRICT_SECURITY",
                lookup("BRRTG_STRICT_SECURITY"),
                defaults.strict_security,
            ),
            logging: LogConfig::from_lookup(&lookup),
        }
    }

    /// Parse a YAML document; missing fields take their defaults
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        serde_yaml::from_str(content).context("Failed to parse configuration")
    }

    /// Load a YAML configuration file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read configuration file {}", path.display()))?;
        Self::from_yaml_str(&content)
    }

    /// The parsing policy to use for a document version
    #[must_use]
    pub fn policy_for(&self, version: SpecVersion) -> UriParsingPolicy {
        self.uri_parser
            .unwrap_or_else(|| UriParsingPolicy::for_version(version))
    }
}
