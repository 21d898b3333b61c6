use crate::spec::strip_mimetype_params;
use futures::stream::BoxStream;
use http::header::{HeaderName, HeaderValue, CONTENT_TYPE};
use http::{HeaderMap, StatusCode};
use serde_json::Value;
use tracing::warn;

/// Body produced by a business handler
pub enum ResponseBody {
    Empty,
    Json(Value),
    Bytes(Vec<u8>),
    /// Chunks produced lazily; never buffered or validated
    Streamed(BoxStream<'static, Vec<u8>>),
}

impl std::fmt::Debug for ResponseBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResponseBody::Empty => write!(f, "Empty"),
            ResponseBody::Json(v) => f.debug_tuple("Json").field(v).finish(),
            ResponseBody::Bytes(b) => write!(f, "Bytes({} bytes)", b.len()),
            ResponseBody::Streamed(_) => write!(f, "Streamed"),
        }
    }
}

/// Framework independent response returned by handlers
#[derive(Debug)]
pub struct NormalizedResponse {
    pub status: StatusCode,
    /// Mimetype set by the handler; the operation mimetype is used when absent
    pub mimetype: Option<String>,
    pub headers: HeaderMap,
    pub body: ResponseBody,
}

impl NormalizedResponse {
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            mimetype: None,
            headers: HeaderMap::new(),
            body: ResponseBody::Empty,
        }
    }

    pub fn json(status: StatusCode, body: Value) -> Self {
        Self {
            body: ResponseBody::Json(body),
            ..Self::new(status)
        }
    }

    pub fn text(status: StatusCode, body: impl Into<String>) -> Self {
        Self {
            mimetype: Some("text/plain".to_string()),
            body: ResponseBody::Bytes(body.into().into_bytes()),
            ..Self::new(status)
        }
    }

    pub fn bytes(status: StatusCode, body: Vec<u8>) -> Self {
        Self {
            body: ResponseBody::Bytes(body),
            ..Self::new(status)
        }
    }

    pub fn streamed(status: StatusCode, stream: BoxStream<'static, Vec<u8>>) -> Self {
        Self {
            body: ResponseBody::Streamed(stream),
            ..Self::new(status)
        }
    }

    pub fn with_mimetype(mut self, mimetype: impl Into<String>) -> Self {
        self.mimetype = Some(mimetype.into());
        self
    }

    /// Append a header; invalid names or values are skipped with a warning
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(n), Ok(v)) => {
                self.headers.append(n, v);
            }
            _ => warn!(header = %name, "Skipping invalid response header"),
        }
        self
    }

    #[must_use]
    pub fn is_streamed(&self) -> bool {
        matches!(self.body, ResponseBody::Streamed(_))
    }

    /// Effective content type without parameters: the `Content-Type` header,
    /// then the handler mimetype, then `fallback`
    #[must_use]
    pub fn content_type<'a>(&'a self, fallback: &'a str) -> &'a str {
        let raw = self
            .headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .or(self.mimetype.as_deref())
            .unwrap_or(fallback);
        strip_mimetype_params(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_content_type_resolution() {
        let resp = NormalizedResponse::json(StatusCode::OK, json!({}));
        assert_eq!(resp.content_type("application/json"), "application/json");

        let resp = NormalizedResponse::text(StatusCode::OK, "hi");
        assert_eq!(resp.content_type("application/json"), "text/plain");

        let resp = NormalizedResponse::new(StatusCode::OK)
            .with_mimetype("text/plain")
            .with_header("Content-Type", "application/xml; charset=utf-8");
        assert_eq!(resp.content_type("application/json"), "application/xml");
    }

    #[test]
    fn test_streamed_flag() {
        let stream = futures::stream::iter(vec![b"a".to_vec()]);
        let resp = NormalizedResponse::streamed(StatusCode::OK, Box::pin(stream));
        assert!(resp.is_streamed());
        assert!(!NormalizedResponse::new(StatusCode::NO_CONTENT).is_streamed());
    }
}
