use http::Method;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Mimetype assumed for operations that declare none
pub const DEFAULT_MIMETYPE: &str = "application/json";

/// True for `application/json` and any `application/*+json` media type
#[must_use]
pub fn is_json_mimetype(mimetype: &str) -> bool {
    let essence = strip_mimetype_params(mimetype);
    essence.eq_ignore_ascii_case("application/json")
        || (essence.starts_with("application/") && essence.ends_with("+json"))
}

/// Drop `;charset=...` style parameters and surrounding whitespace
#[must_use]
pub fn strip_mimetype_params(mimetype: &str) -> &str {
    mimetype.split(';').next().unwrap_or(mimetype).trim()
}

/// Declared mimetype as matched at runtime: parameters dropped, lowercased
#[must_use]
pub fn normalize_mimetype(mimetype: &str) -> String {
    strip_mimetype_params(mimetype).to_ascii_lowercase()
}

/// Which flavour of document an operation was built from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpecVersion {
    Swagger2,
    OpenApi3,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParameterLocation {
    Path,
    Query,
    Header,
    FormData,
    Cookie,
}

impl ParameterLocation {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "path" => Some(ParameterLocation::Path),
            "query" => Some(ParameterLocation::Query),
            "header" => Some(ParameterLocation::Header),
            "formData" => Some(ParameterLocation::FormData),
            "cookie" => Some(ParameterLocation::Cookie),
            _ => None,
        }
    }
}

impl std::fmt::Display for ParameterLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParameterLocation::Path => write!(f, "path"),
            ParameterLocation::Query => write!(f, "query"),
            ParameterLocation::Header => write!(f, "header"),
            ParameterLocation::FormData => write!(f, "formData"),
            ParameterLocation::Cookie => write!(f, "cookie"),
        }
    }
}

/// Swagger 2 `collectionFormat`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectionFormat {
    Csv,
    Ssv,
    Tsv,
    Pipes,
    Multi,
}

impl CollectionFormat {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "csv" => Some(CollectionFormat::Csv),
            "ssv" => Some(CollectionFormat::Ssv),
            "tsv" => Some(CollectionFormat::Tsv),
            "pipes" => Some(CollectionFormat::Pipes),
            "multi" => Some(CollectionFormat::Multi),
            _ => None,
        }
    }

    /// Separator used when packing several items into one occurrence.
    ///
    /// `multi` repeats the key instead of joining, its separator only matters to
    /// policies that split every occurrence and falls back to `,`.
    #[must_use]
    pub fn delimiter(self) -> char {
        match self {
            CollectionFormat::Csv | CollectionFormat::Multi => ',',
            CollectionFormat::Ssv => ' ',
            CollectionFormat::Tsv => '\t',
            CollectionFormat::Pipes => '|',
        }
    }
}

impl std::fmt::Display for CollectionFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            CollectionFormat::Csv => "csv",
            CollectionFormat::Ssv => "ssv",
            CollectionFormat::Tsv => "tsv",
            CollectionFormat::Pipes => "pipes",
            CollectionFormat::Multi => "multi",
        };
        write!(f, "{s}")
    }
}

/// OpenAPI 3 parameter `style`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParameterStyle {
    Matrix,
    Label,
    Form,
    Simple,
    SpaceDelimited,
    PipeDelimited,
    DeepObject,
}

impl ParameterStyle {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "matrix" => Some(ParameterStyle::Matrix),
            "label" => Some(ParameterStyle::Label),
            "form" => Some(ParameterStyle::Form),
            "simple" => Some(ParameterStyle::Simple),
            "spaceDelimited" => Some(ParameterStyle::SpaceDelimited),
            "pipeDelimited" => Some(ParameterStyle::PipeDelimited),
            "deepObject" => Some(ParameterStyle::DeepObject),
            _ => None,
        }
    }

    /// Separator used for non-exploded arrays
    #[must_use]
    pub fn delimiter(self) -> char {
        match self {
            ParameterStyle::SpaceDelimited => ' ',
            ParameterStyle::PipeDelimited => '|',
            _ => ',',
        }
    }
}

impl std::fmt::Display for ParameterStyle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ParameterStyle::Matrix => "matrix",
            ParameterStyle::Label => "label",
            ParameterStyle::Form => "form",
            ParameterStyle::Simple => "simple",
            ParameterStyle::SpaceDelimited => "spaceDelimited",
            ParameterStyle::PipeDelimited => "pipeDelimited",
            ParameterStyle::DeepObject => "deepObject",
        };
        write!(f, "{}", s)
    }
}

/// One declared operation parameter. Identity is `(name, location)`.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterSpec {
    pub name: String,
    pub location: ParameterLocation,
    /// JSON type of the parameter (`string`, `integer`, `array`, ...)
    pub param_type: Option<String>,
    /// JSON type of array items
    pub item_type: Option<String>,
    pub collection_format: Option<CollectionFormat>,
    pub required: bool,
    pub explode: Option<bool>,
    pub style: Option<ParameterStyle>,
    /// Full schema, kept for validation collaborators
    pub schema: Option<Value>,
}

impl ParameterSpec {
    pub fn new(name: impl Into<String>, location: ParameterLocation) -> Self {
        Self {
            name: name.into(),
            location,
            param_type: None,
            item_type: None,
            collection_format: None,
            required: location == ParameterLocation::Path,
            explode: None,
            style: None,
            schema: None,
        }
    }

    /// Declare an array parameter with the given item type
    pub fn array(mut self, item_type: impl Into<String>) -> Self {
        self.param_type = Some("array".to_string());
        self.item_type = Some(item_type.into());
        self
    }

    pub fn typed(mut self, param_type: impl Into<String>) -> Self {
        self.param_type = Some(param_type.into());
        self
    }

    pub fn collection_format(mut self, format: CollectionFormat) -> Self {
        self.collection_format = Some(format);
        self
    }

    pub fn style(mut self, style: ParameterStyle) -> Self {
        self.style = Some(style);
        self
    }

    pub fn explode(mut self, explode: bool) -> Self {
        self.explode = Some(explode);
        self
    }

    pub fn required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }

    #[must_use]
    pub fn is_array(&self) -> bool {
        self.param_type.as_deref() == Some("array")
    }

    #[must_use]
    pub fn is_object(&self) -> bool {
        self.param_type.as_deref() == Some("object")
    }

    /// Style with the OpenAPI 3 per-location default applied
    #[must_use]
    pub fn effective_style(&self) -> ParameterStyle {
        self.style.unwrap_or(match self.location {
            ParameterLocation::Path | ParameterLocation::Header => ParameterStyle::Simple,
            _ => ParameterStyle::Form,
        })
    }

    /// `explode` defaults to true only for `form` style
    #[must_use]
    pub fn effective_explode(&self) -> bool {
        self.explode
            .unwrap_or(self.effective_style() == ParameterStyle::Form)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiKeyLocation {
    Header,
    Query,
    Cookie,
}

impl ApiKeyLocation {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "header" => Some(ApiKeyLocation::Header),
            "query" => Some(ApiKeyLocation::Query),
            "cookie" => Some(ApiKeyLocation::Cookie),
            _ => None,
        }
    }
}

/// Declared security scheme (Swagger 2 `securityDefinitions` or OpenAPI 3
/// `components.securitySchemes`).
#[derive(Debug, Clone, PartialEq)]
pub enum SecurityScheme {
    ApiKey {
        name: String,
        location: ApiKeyLocation,
        /// `x-authentication-scheme`, lowercased
        authentication_scheme: Option<String>,
    },
    /// Swagger 2 `basic`
    Basic,
    /// OpenAPI 3 `http`; `scheme` is lowercased
    Http {
        scheme: String,
        bearer_format: Option<String>,
    },
    OAuth2 {
        /// Scope name → description, merged over every flow
        scopes: BTreeMap<String, String>,
    },
    /// Anything else; alternatives using it are dropped at compile time
    Unsupported { scheme_type: String },
}

impl SecurityScheme {
    /// Scheme `type` as written in the document
    #[must_use]
    pub fn type_name(&self) -> &str {
        match self {
            SecurityScheme::ApiKey { .. } => "apiKey",
            SecurityScheme::Basic => "basic",
            SecurityScheme::Http { .. } => "http",
            SecurityScheme::OAuth2 { .. } => "oauth2",
            SecurityScheme::Unsupported { scheme_type } => scheme_type,
        }
    }
}

pub type SecuritySchemes = HashMap<String, SecurityScheme>;

/// One alternative of a security requirement: every listed scheme must pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SecurityAlternative(pub Vec<(String, Vec<String>)>);

impl SecurityAlternative {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.0.iter().map(|(n, s)| (n.as_str(), s.as_slice()))
    }

    /// Builder used mostly by tests
    pub fn with(mut self, scheme: impl Into<String>, scopes: &[&str]) -> Self {
        self.0.push((
            scheme.into(),
            scopes.iter().map(|s| (*s).to_string()).collect(),
        ));
        self
    }
}

/// OR over [`SecurityAlternative`]s
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SecurityRequirement(pub Vec<SecurityAlternative>);

impl SecurityRequirement {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn alternatives(&self) -> &[SecurityAlternative] {
        &self.0
    }
}

/// How the protected resource is laid out in the response body
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthzFormat {
    Object,
    List,
}

impl AuthzFormat {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "object" => Some(AuthzFormat::Object),
            "list" => Some(AuthzFormat::List),
            _ => None,
        }
    }
}

impl std::fmt::Display for AuthzFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthzFormat::Object => write!(f, "object"),
            AuthzFormat::List => write!(f, "list"),
        }
    }
}

/// Response ownership rule declared with `x-ft-security`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthzRule {
    /// Key into the request authz context holding the principal value
    pub principal_path: String,
    /// Dotted path into the response body (or each element of it)
    pub resource_path: String,
    pub format: AuthzFormat,
    /// Name of a registered custom access resolver
    pub resolver: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ResponseDefinition {
    /// `"200"`, `"2XX"` or `"default"`
    pub status: String,
    /// Content type (without parameters) → JSON schema
    pub content_schemas: HashMap<String, Value>,
    pub required_headers: BTreeSet<String>,
    pub authz: Option<AuthzRule>,
}

impl ResponseDefinition {
    pub fn new(status: impl Into<String>) -> Self {
        Self {
            status: status.into(),
            ..Self::default()
        }
    }

    pub fn schema(mut self, content_type: impl Into<String>, schema: Value) -> Self {
        let content_type: String = content_type.into();
        self.content_schemas.insert(normalize_mimetype(&content_type), schema);
        self
    }

    pub fn require_header(mut self, name: impl Into<String>) -> Self {
        self.required_headers.insert(name.into());
        self
    }

    pub fn authz(mut self, rule: AuthzRule) -> Self {
        self.authz = Some(rule);
        self
    }

    /// Schema for a content type, falling back to a `*/*` declaration.
    /// Parameters and case are ignored on both sides.
    #[must_use]
    pub fn schema_for(&self, content_type: &str) -> Option<&Value> {
        let essence = strip_mimetype_params(content_type);
        self.content_schemas
            .iter()
            .find(|(declared, _)| strip_mimetype_params(declared).eq_ignore_ascii_case(essence))
            .map(|(_, schema)| schema)
            .or_else(|| self.content_schemas.get("*/*"))
    }
}

/// One (path, method) pair from the document
#[derive(Debug, Clone)]
pub struct Operation {
    pub operation_id: String,
    pub method: Method,
    pub path: String,
    pub parameters: Vec<ParameterSpec>,
    pub security: SecurityRequirement,
    pub responses: Vec<ResponseDefinition>,
    /// Response mimetypes in declaration order
    pub produces: Vec<String>,
    pub spec_version: SpecVersion,
}

impl Operation {
    pub fn new(operation_id: impl Into<String>, method: Method, path: impl Into<String>) -> Self {
        Self {
            operation_id: operation_id.into(),
            method,
            path: path.into(),
            parameters: Vec::new(),
            security: SecurityRequirement::default(),
            responses: Vec::new(),
            produces: Vec::new(),
            spec_version: SpecVersion::OpenApi3,
        }
    }

    /// The operation's primary response mimetype.
    ///
    /// All-JSON `produces` lists yield their first entry, a single entry is used
    /// as-is, anything else falls back to [`DEFAULT_MIMETYPE`].
    #[must_use]
    pub fn mimetype(&self) -> &str {
        match self.produces.as_slice() {
            [] => DEFAULT_MIMETYPE,
            [only] => only,
            [first, ..] if self.produces.iter().all(|m| is_json_mimetype(m)) => first,
            _ => DEFAULT_MIMETYPE,
        }
    }

    /// Look up a response definition: exact code, then `NXX` range, then `default`
    #[must_use]
    pub fn response_definition(&self, status: u16) -> Option<&ResponseDefinition> {
        let exact = status.to_string();
        let range = format!("{}XX", status / 100);
        self.responses
            .iter()
            .find(|r| r.status == exact)
            .or_else(|| {
                self.responses
                    .iter()
                    .find(|r| r.status.eq_ignore_ascii_case(&range))
            })
            .or_else(|| self.responses.iter().find(|r| r.status == "default"))
    }

    /// Schema declared for a status and content type
    #[must_use]
    pub fn response_schema(&self, status: u16, content_type: &str) -> Option<&Value> {
        self.response_definition(status)
            .and_then(|r| r.schema_for(content_type))
    }

    #[must_use]
    pub fn parameter(&self, name: &str, location: ParameterLocation) -> Option<&ParameterSpec> {
        self.parameters
            .iter()
            .find(|p| p.name == name && p.location == location)
    }
}
