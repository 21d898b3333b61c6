//! # URI Parsing Module
//!
//! Turns raw, possibly repeated, string parameters into typed values according to
//! the declared [`ParameterSpec`]s of an operation.
//!
//! ## Policies
//!
//! How repeated keys and delimiter-joined values combine is decided by a
//! [`UriParsingPolicy`]:
//!
//! | Policy | Array handling (`csv`, `pipes`, `ssv`, `tsv`) | Scalars |
//! |--------|-----------------------------------------------|---------|
//! | `Swagger2` | last occurrence split on the delimiter | last wins |
//! | `FirstValue` | first occurrence, returned whole | first wins |
//! | `AlwaysMulti` | every occurrence split, union in source order | last wins |
//! | `OpenApi` | `explode` → one element per occurrence, else last occurrence split on the style delimiter | last wins |
//!
//! `multi` yields one element per occurrence and never splits further, except
//! under `AlwaysMulti`, which splits every occurrence on `,`.
//!
//! Path parameters are a single string; arrays are split with the declared
//! delimiter (or `label`/`matrix` style rules under `OpenApi`).
//!
//! ## Invariants
//!
//! Parsing only ever reads the raw inputs (`raw_path_params`, `raw_query`,
//! `raw_form`, `headers`) and writes the normalized maps, so parsing the same
//! request twice produces the same result. Missing required parameters are not
//! this module's concern.

use crate::error::GuardError;
use crate::lifecycle::NormalizedRequest;
use crate::spec::{
    CollectionFormat, ParameterLocation, ParameterSpec, ParameterStyle, SpecVersion,
};
use http::HeaderMap;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use smallvec::SmallVec;
use std::borrow::Cow;
use std::str::FromStr;
use tracing::debug;

/// Inline capacity for raw parameter lists before spilling to the heap
pub const MAX_INLINE_PARAMS: usize = 8;

/// Raw `(key, value)` pairs in source order
pub type ParamVec = SmallVec<[(String, String); MAX_INLINE_PARAMS]>;

static IDENTIFIER_ILLEGAL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^A-Za-z0-9_]").expect("identifier regex should be valid"));

/// Strategy for combining repeated and delimiter-joined parameter values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UriParsingPolicy {
    #[default]
    Swagger2,
    FirstValue,
    AlwaysMulti,
    OpenApi,
}

impl UriParsingPolicy {
    /// Natural policy for a document version
    #[must_use]
    pub fn for_version(version: SpecVersion) -> Self {
        match version {
            SpecVersion::Swagger2 => UriParsingPolicy::Swagger2,
            SpecVersion::OpenApi3 => UriParsingPolicy::OpenApi,
        }
    }
}

impl FromStr for UriParsingPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_ascii_lowercase();
        match normalized.as_str() {
            "swagger2" | "swagger2uriparser" => Ok(UriParsingPolicy::Swagger2),
            "firstvalue" | "firstvalueuriparser" => Ok(UriParsingPolicy::FirstValue),
            "alwaysmulti" | "alwaysmultiuriparser" => Ok(UriParsingPolicy::AlwaysMulti),
            "openapi" | "openapi3" | "openapiuriparser" => Ok(UriParsingPolicy::OpenApi),
            _ => Err(format!("unknown uri parsing policy `{s}`")),
        }
    }
}

impl std::fmt::Display for UriParsingPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            UriParsingPolicy::Swagger2 => "swagger2",
            UriParsingPolicy::FirstValue => "first_value",
            UriParsingPolicy::AlwaysMulti => "always_multi",
            UriParsingPolicy::OpenApi => "openapi",
        };
        write!(f, "{s}")
    }
}

/// Borrowed raw inputs of one request
#[derive(Debug, Clone, Copy)]
pub struct RawParameters<'a> {
    pub path: &'a [(String, String)],
    pub query: &'a [(String, String)],
    pub form: &'a [(String, String)],
    pub headers: &'a HeaderMap,
}

/// Normalized parameter values, one map per location
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NormalizedValues {
    pub path_params: Map<String, Value>,
    pub query: Map<String, Value>,
    pub form: Map<String, Value>,
    pub header_params: Map<String, Value>,
}

/// Parameter parser for one operation. Stateless after construction and safe
/// to share between threads.
#[derive(Debug, Clone)]
pub struct UriParser {
    policy: UriParsingPolicy,
    parameters: Vec<ParameterSpec>,
    /// Precompiled `name[prop]` matchers for deepObject parameters
    deep_objects: Vec<(usize, Regex)>,
}

impl UriParser {
    pub fn new(policy: UriParsingPolicy, parameters: Vec<ParameterSpec>) -> Self {
        let deep_objects = parameters
            .iter()
            .enumerate()
            .filter(|(_, p)| p.style == Some(ParameterStyle::DeepObject))
            .filter_map(|(i, p)| {
                let pattern = format!(r"^{}\[([^\[\]]+)\]$", regex::escape(&p.name));
                Regex::new(&pattern).ok().map(|re| (i, re))
            })
            .collect();
        Self {
            policy,
            parameters,
            deep_objects,
        }
    }

    #[must_use]
    pub fn policy(&self) -> UriParsingPolicy {
        self.policy
    }

    #[must_use]
    pub fn parameters(&self) -> &[ParameterSpec] {
        &self.parameters
    }

    /// Parse raw inputs into normalized values. Pure; performs no I/O.
    #[must_use]
    pub fn parse(&self, raw: &RawParameters<'_>) -> NormalizedValues {
        NormalizedValues {
            path_params: self.parse_path(raw.path),
            query: self.parse_collection(ParameterLocation::Query, raw.query),
            form: self.parse_collection(ParameterLocation::FormData, raw.form),
            header_params: self.parse_headers(raw.headers),
        }
    }

    /// Parse a request's raw inputs and store the normalized maps on it
    pub fn parse_request(&self, req: &mut NormalizedRequest) {
        let values = self.parse(&RawParameters {
            path: &req.raw_path_params,
            query: &req.raw_query,
            form: &req.raw_form,
            headers: &req.headers,
        });
        debug!(
            request_id = %req.request_id,
            policy = %self.policy,
            path_params = values.path_params.len(),
            query = values.query.len(),
            form = values.form.len(),
            "Parameters normalized"
        );
        req.path_params = values.path_params;
        req.query = values.query;
        req.form = values.form;
        req.header_params = values.header_params;
    }

    fn declared(&self, location: ParameterLocation) -> impl Iterator<Item = (usize, &ParameterSpec)> {
        self.parameters
            .iter()
            .enumerate()
            .filter(move |(_, p)| p.location == location)
    }

    fn parse_collection(&self, location: ParameterLocation, pairs: &[(String, String)]) -> Map<String, Value> {
        let mut out = Map::new();

        // Undeclared keys are kept verbatim as arrays of raw strings
        for (key, value) in pairs {
            if self.is_declared_key(location, key) {
                continue;
            }
            if let Value::Array(items) = out
                .entry(key.clone())
                .or_insert_with(|| Value::Array(Vec::new()))
            {
                items.push(Value::String(value.clone()));
            }
        }

        for (index, spec) in self.declared(location) {
            if spec.style == Some(ParameterStyle::DeepObject) {
                if let Some(obj) = self.resolve_deep_object(index, spec, pairs) {
                    out.insert(spec.name.clone(), Value::Object(obj));
                }
                continue;
            }

            let occurrences = occurrences(pairs, &spec.name);
            if spec.is_object() && self.policy == UriParsingPolicy::OpenApi {
                if let Some(obj) = resolve_form_object(spec, &occurrences, pairs) {
                    out.insert(spec.name.clone(), Value::Object(obj));
                }
                continue;
            }
            if occurrences.is_empty() {
                continue;
            }

            if spec.is_array() {
                let items = resolve_array(self.policy, spec, &occurrences);
                out.insert(spec.name.clone(), coerce_items(spec, &items));
            } else if let Some(raw) = resolve_scalar(self.policy, &occurrences) {
                out.insert(
                    sanitize_identifier(&spec.name).into_owned(),
                    coerce(&spec.name, raw, spec.param_type.as_deref()),
                );
            }
        }
        out
    }

    fn is_declared_key(&self, location: ParameterLocation, key: &str) -> bool {
        self.declared(location).any(|(index, spec)| {
            spec.name == key
                || self
                    .deep_objects
                    .iter()
                    .any(|(i, re)| *i == index && re.is_match(key))
        })
    }

    fn resolve_deep_object(
        &self,
        index: usize,
        spec: &ParameterSpec,
        pairs: &[(String, String)],
    ) -> Option<Map<String, Value>> {
        let (_, re) = self.deep_objects.iter().find(|(i, _)| *i == index)?;
        let mut obj = Map::new();
        for (key, value) in pairs {
            if let Some(prop) = re.captures(key).and_then(|c| c.get(1)) {
                let prop = prop.as_str();
                let ty = property_type(spec, prop);
                obj.insert(prop.to_string(), coerce(&spec.name, value, ty));
            }
        }
        if obj.is_empty() {
            None
        } else {
            Some(obj)
        }
    }

    fn parse_path(&self, pairs: &[(String, String)]) -> Map<String, Value> {
        let mut out = Map::new();
        for (_, spec) in self.declared(ParameterLocation::Path) {
            // Path parameters are single strings; a repeated key keeps the last
            let Some(raw) = pairs.iter().rev().find(|(k, _)| *k == spec.name).map(|(_, v)| v) else {
                continue;
            };
            if spec.is_array() {
                let items = split_path_value(self.policy, spec, raw);
                out.insert(spec.name.clone(), coerce_items(spec, &items));
            } else {
                let raw = strip_path_prefix(self.policy, spec, raw);
                out.insert(
                    sanitize_identifier(&spec.name).into_owned(),
                    coerce(&spec.name, raw, spec.param_type.as_deref()),
                );
            }
        }
        out
    }

    fn parse_headers(&self, headers: &HeaderMap) -> Map<String, Value> {
        let mut out = Map::new();
        for (_, spec) in self.declared(ParameterLocation::Header) {
            let values: Vec<&str> = headers
                .get_all(spec.name.as_str())
                .iter()
                .filter_map(|v| v.to_str().ok())
                .collect();
            if values.is_empty() {
                continue;
            }
            if spec.is_array() {
                let items: Vec<String> = values
                    .iter()
                    .flat_map(|v| v.split(','))
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect();
                out.insert(spec.name.clone(), coerce_items(spec, &items));
            } else if let Some(last) = values.last() {
                out.insert(
                    spec.name.clone(),
                    coerce(&spec.name, last.trim(), spec.param_type.as_deref()),
                );
            }
        }
        out
    }
}

/// All raw values for `name`, in source order. Keys match verbatim, brackets
/// included.
#[must_use]
pub fn occurrences<'a>(pairs: &'a [(String, String)], name: &str) -> Vec<&'a str> {
    pairs
        .iter()
        .filter(|(k, _)| k == name)
        .map(|(_, v)| v.as_str())
        .collect()
}

/// Combine the occurrences of an array query/form parameter under a policy
#[must_use]
pub fn resolve_array(policy: UriParsingPolicy, spec: &ParameterSpec, occurrences: &[&str]) -> Vec<String> {
    let format = spec.collection_format.unwrap_or(CollectionFormat::Csv);
    match policy {
        UriParsingPolicy::OpenApi => {
            let style = spec.effective_style();
            if spec.effective_explode() {
                occurrences.iter().map(|s| (*s).to_string()).collect()
            } else {
                occurrences
                    .last()
                    .map(|last| split(last, style.delimiter()))
                    .unwrap_or_default()
            }
        }
        _ if format == CollectionFormat::Multi => {
            if policy == UriParsingPolicy::AlwaysMulti {
                occurrences.iter().flat_map(|s| split(s, format.delimiter())).collect()
            } else {
                occurrences.iter().map(|s| (*s).to_string()).collect()
            }
        }
        UriParsingPolicy::Swagger2 => occurrences
            .last()
            .map(|last| split(last, format.delimiter()))
            .unwrap_or_default(),
        UriParsingPolicy::FirstValue => occurrences
            .first()
            .filter(|first| !first.is_empty())
            .map(|first| vec![(*first).to_string()])
            .unwrap_or_default(),
        UriParsingPolicy::AlwaysMulti => occurrences
            .iter()
            .flat_map(|s| split(s, format.delimiter()))
            .collect(),
    }
}

/// Pick the occurrence used for a scalar parameter
#[must_use]
pub fn resolve_scalar<'a>(policy: UriParsingPolicy, occurrences: &[&'a str]) -> Option<&'a str> {
    match policy {
        UriParsingPolicy::FirstValue => occurrences.first().copied(),
        _ => occurrences.last().copied(),
    }
}

/// Split a single path segment value into array items
#[must_use]
pub fn split_path_value(policy: UriParsingPolicy, spec: &ParameterSpec, raw: &str) -> Vec<String> {
    if policy != UriParsingPolicy::OpenApi {
        let delimiter = match spec.collection_format {
            Some(CollectionFormat::Multi) | None => ',',
            Some(format) => format.delimiter(),
        };
        return split(raw, delimiter);
    }

    match spec.effective_style() {
        ParameterStyle::Label => {
            let rest = raw.strip_prefix('.').unwrap_or(raw);
            split(rest, if spec.effective_explode() { '.' } else { ',' })
        }
        ParameterStyle::Matrix => {
            let prefix = format!(";{}=", spec.name);
            if spec.effective_explode() {
                raw.split(prefix.as_str())
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect()
            } else {
                split(raw.strip_prefix(prefix.as_str()).unwrap_or(raw), ',')
            }
        }
        style => split(raw, style.delimiter()),
    }
}

fn strip_path_prefix<'a>(policy: UriParsingPolicy, spec: &ParameterSpec, raw: &'a str) -> &'a str {
    if policy != UriParsingPolicy::OpenApi {
        return raw;
    }
    match spec.effective_style() {
        ParameterStyle::Label => raw.strip_prefix('.').unwrap_or(raw),
        ParameterStyle::Matrix => raw
            .strip_prefix(';')
            .and_then(|r| r.strip_prefix(spec.name.as_str()))
            .and_then(|r| r.strip_prefix('='))
            .unwrap_or(raw),
        _ => raw,
    }
}

fn resolve_form_object(
    spec: &ParameterSpec,
    occurrences: &[&str],
    pairs: &[(String, String)],
) -> Option<Map<String, Value>> {
    let mut obj = Map::new();
    if spec.effective_explode() {
        // `color[R]=100` is deepObject; exploded form objects spread properties
        // over top-level keys
        let props = spec
            .schema
            .as_ref()
            .and_then(|s| s.get("properties"))
            .and_then(Value::as_object)?;
        for prop in props.keys() {
            if let Some(raw) = occurrences_last(pairs, prop) {
                obj.insert(prop.clone(), coerce(&spec.name, raw, property_type(spec, prop)));
            }
        }
    } else {
        let last = occurrences.last()?;
        let parts: Vec<&str> = last.split(',').collect();
        for chunk in parts.chunks(2) {
            if let [key, value] = chunk {
                obj.insert((*key).to_string(), coerce(&spec.name, value, property_type(spec, key)));
            }
        }
    }
    if obj.is_empty() {
        None
    } else {
        Some(obj)
    }
}

fn occurrences_last<'a>(pairs: &'a [(String, String)], name: &str) -> Option<&'a str> {
    pairs
        .iter()
        .rev()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.as_str())
}

fn property_type<'a>(spec: &'a ParameterSpec, prop: &str) -> Option<&'a str> {
    spec.schema
        .as_ref()
        .and_then(|s| s.get("properties"))
        .and_then(|p| p.get(prop))
        .and_then(|p| p.get("type"))
        .and_then(Value::as_str)
}

fn split(raw: &str, delimiter: char) -> Vec<String> {
    if raw.is_empty() {
        return Vec::new();
    }
    raw.split(delimiter).map(str::to_string).collect()
}

fn coerce_items(spec: &ParameterSpec, items: &[String]) -> Value {
    Value::Array(
        items
            .iter()
            .map(|item| coerce(&spec.name, item, spec.item_type.as_deref()))
            .collect(),
    )
}

/// Replace characters that cannot appear in an identifier with `_`
#[must_use]
pub fn sanitize_identifier(name: &str) -> Cow<'_, str> {
    IDENTIFIER_ILLEGAL.replace_all(name, "_")
}

/// Convert a raw string to the declared primitive type
pub fn try_coerce(name: &str, raw: &str, ty: Option<&str>) -> Result<Value, GuardError> {
    let fail = |expected: &str| GuardError::ParameterParse {
        name: name.to_string(),
        reason: format!("`{raw}` is not a valid {expected}"),
    };
    match ty {
        Some("integer") => raw.parse::<i64>().map(Value::from).map_err(|_| fail("integer")),
        Some("number") => raw
            .parse::<f64>()
            .ok()
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number)
            .ok_or_else(|| fail("number")),
        Some("boolean") => match raw.to_ascii_lowercase().as_str() {
            "true" => Ok(Value::Bool(true)),
            "false" => Ok(Value::Bool(false)),
            _ => Err(fail("boolean")),
        },
        _ => Ok(Value::String(raw.to_string())),
    }
}

/// Like [`try_coerce`] but recovers by keeping the raw string
#[must_use]
pub fn coerce(name: &str, raw: &str, ty: Option<&str>) -> Value {
    try_coerce(name, raw, ty).unwrap_or_else(|e| {
        debug!(parameter = %name, error = %e, "Keeping raw parameter value");
        Value::String(raw.to_string())
    })
}
