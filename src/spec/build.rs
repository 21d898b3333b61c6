use super::types::{
    is_json_mimetype, normalize_mimetype, ApiKeyLocation, AuthzFormat, AuthzRule, CollectionFormat,
    Operation, ParameterLocation, ParameterSpec, ParameterStyle, ResponseDefinition,
    SecurityAlternative, SecurityRequirement, SecurityScheme, SecuritySchemes, SpecVersion,
    DEFAULT_MIMETYPE,
};
use crate::error::SpecError;
use http::Method;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

const METHODS: [&str; 8] = [
    "get", "put", "post", "delete", "options", "head", "patch", "trace",
];

/// Longest `$ref` chain followed; deeper references become `{}`
const MAX_REF_DEPTH: usize = 16;

const FORM_MIMETYPES: [&str; 2] = ["application/x-www-form-urlencoded", "multipart/form-data"];

/// Resolve a local `$ref` such as `#/components/schemas/Pet`.
///
/// Only document-local references are supported. The fragment is treated as a
/// JSON pointer so `~1` and `~0` escapes work.
pub fn resolve_ref<'a>(document: &'a Value, reference: &str) -> Option<&'a Value> {
    let pointer = reference.strip_prefix('#')?;
    if pointer.is_empty() {
        return Some(document);
    }
    document.pointer(pointer)
}

/// Follow a chain of `$ref` objects until a concrete value is reached
pub fn deref<'a>(document: &'a Value, value: &'a Value) -> Result<&'a Value, SpecError> {
    let mut current = value;
    for _ in 0..MAX_REF_DEPTH {
        match current.get("$ref").and_then(Value::as_str) {
            Some(reference) => {
                current = resolve_ref(document, reference)
                    .ok_or_else(|| SpecError::UnresolvedRef(reference.to_string()))?;
            }
            None => return Ok(current),
        }
    }
    Err(SpecError::UnresolvedRef("reference chain too deep".to_string()))
}

/// Recursively replace every `$ref` object inside `value` with its target.
///
/// A reference that is already being expanded further up the same branch is
/// replaced with `{}`, which accepts anything, so recursive schemas stay one
/// level deep. Chains longer than [`MAX_REF_DEPTH`] are cut the same way.
/// Unresolvable references are an error.
pub fn expand_refs(document: &Value, value: &mut Value) -> Result<(), SpecError> {
    expand_refs_at(document, value, &mut Vec::new())
}

fn expand_refs_at(document: &Value, value: &mut Value, active: &mut Vec<String>) -> Result<(), SpecError> {
    match value {
        Value::Object(obj) => {
            if let Some(reference) = obj.get("$ref").and_then(Value::as_str) {
                let reference = reference.to_string();
                let target = resolve_ref(document, &reference)
                    .ok_or_else(|| SpecError::UnresolvedRef(reference.clone()))?;
                if active.len() >= MAX_REF_DEPTH || active.contains(&reference) {
                    *value = Value::Object(Map::new());
                    return Ok(());
                }
                let mut target = target.clone();
                active.push(reference);
                let expanded = expand_refs_at(document, &mut target, active);
                active.pop();
                expanded?;
                *value = target;
                return Ok(());
            }
            for v in obj.values_mut() {
                expand_refs_at(document, v, active)?;
            }
        }
        Value::Array(arr) => {
            for v in arr.iter_mut() {
                expand_refs_at(document, v, active)?;
            }
        }
        _ => {}
    }
    Ok(())
}

/// Extract all security schemes declared by the document.
///
/// Swagger 2 reads `securityDefinitions`, OpenAPI 3 reads
/// `components.securitySchemes`. Schemes whose definition cannot be understood
/// are recorded as [`SecurityScheme::Unsupported`] so requirements referring to
/// them are dropped with a diagnostic instead of silently passing.
pub fn extract_security_schemes(document: &Value, version: SpecVersion) -> SecuritySchemes {
    let pointer = match version {
        SpecVersion::Swagger2 => "/securityDefinitions",
        SpecVersion::OpenApi3 => "/components/securitySchemes",
    };
    let Some(defs) = document.pointer(pointer).and_then(Value::as_object) else {
        return SecuritySchemes::new();
    };

    let mut schemes = SecuritySchemes::new();
    for (name, raw) in defs {
        let def = match deref(document, raw) {
            Ok(def) => def,
            Err(e) => {
                tracing::warn!(scheme = %name, error = %e, "Skipping unresolvable security scheme");
                continue;
            }
        };
        schemes.insert(name.clone(), parse_security_scheme(def));
    }
    schemes
}

fn parse_security_scheme(def: &Value) -> SecurityScheme {
    let scheme_type = def.get("type").and_then(Value::as_str).unwrap_or_default();
    match scheme_type {
        "apiKey" => {
            let name = def.get("name").and_then(Value::as_str);
            let location = def
                .get("in")
                .and_then(Value::as_str)
                .and_then(ApiKeyLocation::parse);
            match (name, location) {
                (Some(name), Some(location)) => SecurityScheme::ApiKey {
                    name: name.to_string(),
                    location,
                    authentication_scheme: def
                        .get("x-authentication-scheme")
                        .and_then(Value::as_str)
                        .map(str::to_ascii_lowercase),
                },
                _ => SecurityScheme::Unsupported {
                    scheme_type: "apiKey".to_string(),
                },
            }
        }
        "basic" => SecurityScheme::Basic,
        "http" => SecurityScheme::Http {
            scheme: def
                .get("scheme")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_ascii_lowercase(),
            bearer_format: def
                .get("bearerFormat")
                .and_then(Value::as_str)
                .map(str::to_string),
        },
        "oauth2" => {
            let mut scopes = BTreeMap::new();
            // Swagger 2 puts scopes on the scheme, OpenAPI 3 on each flow
            collect_scopes(def.get("scopes"), &mut scopes);
            if let Some(flows) = def.get("flows").and_then(Value::as_object) {
                for flow in flows.values() {
                    collect_scopes(flow.get("scopes"), &mut scopes);
                }
            }
            SecurityScheme::OAuth2 { scopes }
        }
        other => SecurityScheme::Unsupported {
            scheme_type: other.to_string(),
        },
    }
}

fn collect_scopes(value: Option<&Value>, into: &mut BTreeMap<String, String>) {
    if let Some(map) = value.and_then(Value::as_object) {
        for (scope, desc) in map {
            into.insert(
                scope.clone(),
                desc.as_str().unwrap_or_default().to_string(),
            );
        }
    }
}

/// Parse a `security` array into an OR-of-ANDs requirement.
///
/// Each array entry is one alternative mapping scheme names to scopes.
pub fn parse_security(value: &Value) -> SecurityRequirement {
    let alternatives = value
        .as_array()
        .map(|arr| {
            arr.iter()
                .filter_map(Value::as_object)
                .map(|alt| {
                    SecurityAlternative(
                        alt.iter()
                            .map(|(scheme, scopes)| {
                                let scopes = scopes
                                    .as_array()
                                    .map(|s| {
                                        s.iter()
                                            .filter_map(Value::as_str)
                                            .map(str::to_string)
                                            .collect()
                                    })
                                    .unwrap_or_default();
                                (scheme.clone(), scopes)
                            })
                            .collect(),
                    )
                })
                .collect()
        })
        .unwrap_or_default();
    SecurityRequirement(alternatives)
}

/// Extract parameter specs from a `parameters` array.
///
/// References are resolved, `in: body` parameters are skipped (they describe
/// the request body, not a collection). For OpenAPI 3 the type information
/// comes from the parameter `schema`.
pub fn extract_parameters(
    document: &Value,
    version: SpecVersion,
    params: &[Value],
) -> Result<Vec<ParameterSpec>, SpecError> {
    let mut out = Vec::new();
    for raw in params {
        let param = deref(document, raw)?;
        let Some(name) = param.get("name").and_then(Value::as_str) else {
            continue;
        };
        let location_str = param.get("in").and_then(Value::as_str).unwrap_or_default();
        let Some(location) = ParameterLocation::parse(location_str) else {
            continue;
        };

        let mut spec = ParameterSpec::new(name, location);
        spec.required = param
            .get("required")
            .and_then(Value::as_bool)
            .unwrap_or(location == ParameterLocation::Path);

        match version {
            SpecVersion::Swagger2 => {
                spec.param_type = str_field(param, "type");
                spec.item_type = param
                    .get("items")
                    .and_then(|i| deref(document, i).ok())
                    .and_then(|i| str_field(i, "type"));
                spec.collection_format = param
                    .get("collectionFormat")
                    .and_then(Value::as_str)
                    .and_then(CollectionFormat::parse);
                let mut schema = param.clone();
                expand_refs(document, &mut schema)?;
                spec.schema = Some(schema);
            }
            SpecVersion::OpenApi3 => {
                if let Some(raw_schema) = param.get("schema") {
                    let mut schema = raw_schema.clone();
                    expand_refs(document, &mut schema)?;
                    spec.param_type = str_field(&schema, "type");
                    spec.item_type = schema.get("items").and_then(|i| str_field(i, "type"));
                    spec.schema = Some(schema);
                }
                spec.style = param
                    .get("style")
                    .and_then(Value::as_str)
                    .and_then(ParameterStyle::parse);
                spec.explode = param.get("explode").and_then(Value::as_bool);
            }
        }
        out.push(spec);
    }
    Ok(out)
}

/// Turn an OpenAPI 3 form request body into `formData` parameters.
///
/// Every property of the form schema becomes one parameter. `encoding` entries
/// may override `style`/`explode`; arrays otherwise explode like `form` style.
pub fn extract_form_parameters(
    document: &Value,
    operation: &Value,
) -> Result<Vec<ParameterSpec>, SpecError> {
    let Some(body) = operation.get("requestBody") else {
        return Ok(Vec::new());
    };
    let body = deref(document, body)?;
    let Some(content) = body.get("content").and_then(Value::as_object) else {
        return Ok(Vec::new());
    };
    let Some(media) = FORM_MIMETYPES.iter().find_map(|m| content.get(*m)) else {
        return Ok(Vec::new());
    };
    let Some(raw_schema) = media.get("schema") else {
        return Ok(Vec::new());
    };

    let mut schema = raw_schema.clone();
    expand_refs(document, &mut schema)?;
    let required: Vec<&str> = schema
        .get("required")
        .and_then(Value::as_array)
        .map(|r| r.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();
    let encoding = media.get("encoding").and_then(Value::as_object);

    let mut out = Vec::new();
    if let Some(props) = schema.get("properties").and_then(Value::as_object) {
        for (name, prop) in props {
            let mut spec = ParameterSpec::new(name.clone(), ParameterLocation::FormData);
            spec.required = required.contains(&name.as_str());
            spec.param_type = str_field(prop, "type");
            spec.item_type = prop.get("items").and_then(|i| str_field(i, "type"));
            spec.schema = Some(prop.clone());
            if let Some(enc) = encoding.and_then(|e| e.get(name)) {
                spec.style = enc
                    .get("style")
                    .and_then(Value::as_str)
                    .and_then(ParameterStyle::parse);
                spec.explode = enc.get("explode").and_then(Value::as_bool);
            }
            out.push(spec);
        }
    }
    Ok(out)
}

/// Read the `x-ft-security` ownership rule of a response definition.
///
/// Both path keys are required; `resource-content-format` defaults to `object`.
pub fn extract_authz_rule(response: &Value) -> Option<AuthzRule> {
    let ext = response.get("x-ft-security")?;
    let principal_path = ext.get("authenticated-principal-path")?.as_str()?;
    let resource_path = ext.get("resource-authorized-principal-path")?.as_str()?;
    let format = match ext.get("resource-content-format").and_then(Value::as_str) {
        None => AuthzFormat::Object,
        Some(f) => match AuthzFormat::parse(f) {
            Some(format) => format,
            None => {
                tracing::warn!(format = %f, "Unknown resource-content-format, using object");
                AuthzFormat::Object
            }
        },
    };
    Some(AuthzRule {
        principal_path: principal_path.to_string(),
        resource_path: resource_path.to_string(),
        format,
        resolver: ext
            .get("access-resolver")
            .and_then(Value::as_str)
            .map(str::to_string),
    })
}

/// Build response definitions for one operation.
///
/// Swagger 2 responses carry a single `schema` which applies to every mimetype
/// in `produces`. OpenAPI 3 responses list schemas per content type. Only
/// headers marked `required: true` are enforced.
pub fn extract_responses(
    document: &Value,
    version: SpecVersion,
    operation: &Value,
    produces: &[String],
) -> Result<Vec<ResponseDefinition>, SpecError> {
    let Some(responses) = operation.get("responses").and_then(Value::as_object) else {
        return Ok(Vec::new());
    };

    let mut out = Vec::new();
    for (status, raw) in responses {
        let response = deref(document, raw)?;
        let mut def = ResponseDefinition::new(status.clone());

        match version {
            SpecVersion::Swagger2 => {
                if let Some(schema) = response.get("schema") {
                    let mut schema = schema.clone();
                    expand_refs(document, &mut schema)?;
                    for mimetype in produces {
                        def.content_schemas
                            .insert(normalize_mimetype(mimetype), schema.clone());
                    }
                }
            }
            SpecVersion::OpenApi3 => {
                if let Some(content) = response.get("content").and_then(Value::as_object) {
                    for (content_type, media) in content {
                        if let Some(schema) = media.get("schema") {
                            let mut schema = schema.clone();
                            expand_refs(document, &mut schema)?;
                            def.content_schemas
                                .insert(normalize_mimetype(content_type), schema);
                        }
                    }
                }
            }
        }

        if let Some(headers) = response.get("headers").and_then(Value::as_object) {
            for (name, header) in headers {
                let header = deref(document, header)?;
                if header.get("required").and_then(Value::as_bool).unwrap_or(false) {
                    def.required_headers.insert(name.clone());
                }
            }
        }

        def.authz = extract_authz_rule(response);
        out.push(def);
    }
    Ok(out)
}

/// Synthesize an operation id for operations that declare none: `get /pets/{id}`
/// becomes `get_pets_id`.
pub fn synthesize_operation_id(method: &str, path: &str) -> String {
    let mut id = method.to_ascii_lowercase();
    let mut last_underscore = false;
    for c in path.chars() {
        if c.is_ascii_alphanumeric() {
            if !last_underscore && id.len() == method.len() {
                id.push('_');
            }
            id.push(c);
            last_underscore = false;
        } else if !last_underscore && id.len() > method.len() {
            id.push('_');
            last_underscore = true;
        }
    }
    id.trim_end_matches('_').to_string()
}

/// Merge path-item level and operation level parameters.
///
/// An operation parameter replaces a path-item parameter with the same
/// `(name, location)`.
fn merge_parameters(path_level: Vec<ParameterSpec>, op_level: Vec<ParameterSpec>) -> Vec<ParameterSpec> {
    let mut merged: Vec<ParameterSpec> = path_level
        .into_iter()
        .filter(|p| {
            !op_level
                .iter()
                .any(|o| o.name == p.name && o.location == p.location)
        })
        .collect();
    merged.extend(op_level);
    merged
}

fn produces_for(document: &Value, version: SpecVersion, operation: &Value) -> Vec<String> {
    match version {
        SpecVersion::Swagger2 => {
            let declared = operation
                .get("produces")
                .or_else(|| document.get("produces"))
                .and_then(Value::as_array)
                .map(|arr| {
                    arr.iter()
                        .filter_map(Value::as_str)
                        .map(normalize_mimetype)
                        .fold(Vec::new(), |mut acc, m| {
                            if !acc.contains(&m) {
                                acc.push(m);
                            }
                            acc
                        })
                })
                .unwrap_or_default();
            if declared.is_empty() {
                vec![DEFAULT_MIMETYPE.to_string()]
            } else {
                declared
            }
        }
        SpecVersion::OpenApi3 => {
            let mut out: Vec<String> = Vec::new();
            if let Some(responses) = operation.get("responses").and_then(Value::as_object) {
                for raw in responses.values() {
                    let Ok(response) = deref(document, raw) else {
                        continue;
                    };
                    if let Some(content) = response.get("content").and_then(Value::as_object) {
                        for ct in content.keys().map(|ct| normalize_mimetype(ct)) {
                            if !out.contains(&ct) {
                                out.push(ct);
                            }
                        }
                    }
                }
            }
            // Prefer JSON when the operation can produce it
            if let Some(pos) = out.iter().position(|m| is_json_mimetype(m)) {
                let json = out.remove(pos);
                out.insert(0, json);
            }
            out
        }
    }
}

/// Build every operation declared under `paths`.
///
/// This is the main entry point of the builder. For each path item and method
/// it merges parameters, resolves the effective security requirement (an
/// operation level `security`, even `[]`, overrides the global one), and
/// collects response definitions.
///
/// # Errors
///
/// Returns [`SpecError::UnresolvedRef`] when a local reference points nowhere.
pub fn build_operations(document: &Value, version: SpecVersion) -> Result<Vec<Operation>, SpecError> {
    let mut operations = Vec::new();
    let Some(paths) = document.get("paths").and_then(Value::as_object) else {
        return Ok(operations);
    };
    let global_security = document.get("security").map(parse_security);

    for (path, raw_item) in paths {
        let item = deref(document, raw_item)?;
        let path_params = item
            .get("parameters")
            .and_then(Value::as_array)
            .map(|p| extract_parameters(document, version, p))
            .transpose()?
            .unwrap_or_default();

        for method_name in METHODS {
            let Some(operation) = item.get(method_name) else {
                continue;
            };
            let Ok(method) = Method::from_bytes(method_name.to_ascii_uppercase().as_bytes()) else {
                continue;
            };

            let operation_id = operation
                .get("operationId")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| synthesize_operation_id(method_name, path));

            let mut op_params = operation
                .get("parameters")
                .and_then(Value::as_array)
                .map(|p| extract_parameters(document, version, p))
                .transpose()?
                .unwrap_or_default();
            if version == SpecVersion::OpenApi3 {
                op_params.extend(extract_form_parameters(document, operation)?);
            }

            let security = match operation.get("security") {
                Some(sec) => parse_security(sec),
                None => global_security.clone().unwrap_or_default(),
            };

            let produces = produces_for(document, version, operation);
            let responses = extract_responses(document, version, operation, &produces)?;

            tracing::debug!(
                operation_id = %operation_id,
                method = %method,
                path = %path,
                alternatives = security.alternatives().len(),
                "Operation built"
            );

            operations.push(Operation {
                operation_id,
                method,
                path: path.clone(),
                parameters: merge_parameters(path_params.clone(), op_params),
                security,
                responses,
                produces,
                spec_version: version,
            });
        }
    }
    Ok(operations)
}

fn str_field(value: &Value, key: &str) -> Option<String> {
    value.get(key).and_then(Value::as_str).map(str::to_string)
}
