//! Inbound request and validated event types.
//!
//! ```text
//! InboundRequest → (authenticate) → parse_payload() → WebhookEvent
//! ```

use std::fmt;
use std::str::FromStr;

use axum::body::Bytes;
use axum::http::{header, HeaderMap, HeaderName, Method};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::auth::Authenticated;
use crate::error::IngestError;

/// Structured body formats the endpoint understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BodyFormat {
    Json,
    Form,
}

impl BodyFormat {
    /// Body format declared by the `Content-Type` header, if recognised.
    pub fn from_headers(headers: &HeaderMap) -> Option<Self> {
        let content_type = headers.get(header::CONTENT_TYPE)?.to_str().ok()?;
        let mime = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();

        if mime == "application/json" || mime.ends_with("+json") {
            Some(BodyFormat::Json)
        } else if mime == "application/x-www-form-urlencoded" {
            Some(BodyFormat::Form)
        } else {
            None
        }
    }
}

impl FromStr for BodyFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" | "application/json" => Ok(BodyFormat::Json),
            "form" | "application/x-www-form-urlencoded" => Ok(BodyFormat::Form),
            other => Err(format!("unknown body format {other}")),
        }
    }
}

impl fmt::Display for BodyFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BodyFormat::Json => f.write_str("json"),
            BodyFormat::Form => f.write_str("form"),
        }
    }
}

/// A captured HTTP request. Immutable once constructed.
#[derive(Debug, Clone)]
pub struct InboundRequest {
    method: Method,
    path: String,
    headers: HeaderMap,
    body: Bytes,
    received_at: DateTime<Utc>,
}

impl InboundRequest {
    /// Capture a request, stamping it with the current time.
    pub fn new(method: Method, path: impl Into<String>, headers: HeaderMap, body: Bytes) -> Self {
        Self {
            method,
            path: path.into(),
            headers,
            body,
            received_at: Utc::now(),
        }
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn received_at(&self) -> DateTime<Utc> {
        self.received_at
    }

    /// Trimmed, non-empty value of a text header.
    pub fn header_str(&self, name: &HeaderName) -> Option<&str> {
        self.headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    }
}

/// A validated webhook event handed to the sink.
///
/// Fields are private so an event can only come from [`WebhookEvent::new`]:
///
/// ```compile_fail
/// use ingest::{BodyFormat, WebhookEvent};
///
/// let event = WebhookEvent {
///     delivery_id: None,
///     received_at: chrono::Utc::now(),
///     format: BodyFormat::Json,
///     payload: serde_json::Map::new(),
/// };
/// ```
#[derive(Debug, Clone, Serialize)]
pub struct WebhookEvent {
    delivery_id: Option<String>,
    received_at: DateTime<Utc>,
    format: BodyFormat,
    payload: Map<String, Value>,
}

impl WebhookEvent {
    /// Build an event. Requires proof that the originating request was authenticated.
    pub fn new(
        _proof: Authenticated,
        delivery_id: Option<String>,
        received_at: DateTime<Utc>,
        format: BodyFormat,
        payload: Map<String, Value>,
    ) -> Self {
        Self {
            delivery_id,
            received_at,
            format,
            payload,
        }
    }

    /// Sender-assigned delivery identifier, if one was supplied.
    pub fn delivery_id(&self) -> Option<&str> {
        self.delivery_id.as_deref()
    }

    /// When the request reached this service.
    pub fn received_at(&self) -> DateTime<Utc> {
        self.received_at
    }

    /// Format the body was decoded from.
    pub fn format(&self) -> BodyFormat {
        self.format
    }

    /// Decoded key-value document.
    pub fn payload(&self) -> &Map<String, Value> {
        &self.payload
    }
}

/// Decode a raw body into a key-value document.
pub fn parse_payload(format: BodyFormat, body: &[u8]) -> Result<Map<String, Value>, IngestError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(IngestError::Validation("empty body".to_string()));
    }

    match format {
        BodyFormat::Json => match serde_json::from_slice::<Value>(body) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(_) => Err(IngestError::Validation(
                "body must be a JSON object".to_string(),
            )),
            Err(e) => Err(IngestError::Validation(format!("malformed JSON: {e}"))),
        },
        BodyFormat::Form => parse_form(body),
    }
}

/// Decode `application/x-www-form-urlencoded` pairs. Repeated keys collect
/// into an array in arrival order.
fn parse_form(body: &[u8]) -> Result<Map<String, Value>, IngestError> {
    if std::str::from_utf8(body).is_err() {
        return Err(IngestError::Validation("form body is not UTF-8".to_string()));
    }

    let mut map = Map::new();
    for (key, value) in url::form_urlencoded::parse(body) {
        if key.is_empty() {
            return Err(IngestError::Validation("form field without a name".to_string()));
        }

        let value = Value::String(value.into_owned());
        match map.get_mut(key.as_ref()) {
            Some(Value::Array(values)) => values.push(value),
            Some(existing) => {
                let first = existing.take();
                *existing = Value::Array(vec![first, value]);
            }
            None => {
                map.insert(key.into_owned(), value);
            }
        }
    }

    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use serde_json::json;

    fn content_type(value: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(value));
        headers
    }

    #[test]
    fn test_format_from_headers() {
        assert_eq!(
            BodyFormat::from_headers(&content_type("application/json; charset=utf-8")),
            Some(BodyFormat::Json)
        );
        assert_eq!(
            BodyFormat::from_headers(&content_type("application/vnd.github+json")),
            Some(BodyFormat::Json)
        );
        assert_eq!(
            BodyFormat::from_headers(&content_type("application/x-www-form-urlencoded")),
            Some(BodyFormat::Form)
        );
        assert_eq!(BodyFormat::from_headers(&content_type("text/plain")), None);
        assert_eq!(BodyFormat::from_headers(&HeaderMap::new()), None);
    }

    #[test]
    fn test_parse_json_object() {
        let payload = parse_payload(BodyFormat::Json, br#"{"event":"ping"}"#).unwrap();
        assert_eq!(payload.get("event"), Some(&json!("ping")));
    }

    #[test]
    fn test_parse_json_rejects_malformed() {
        let err = parse_payload(BodyFormat::Json, b"not-json").unwrap_err();
        assert!(matches!(err, IngestError::Validation(_)));
    }

    #[test]
    fn test_parse_json_rejects_non_object() {
        assert!(parse_payload(BodyFormat::Json, b"[1,2,3]").is_err());
        assert!(parse_payload(BodyFormat::Json, b"\"ping\"").is_err());
    }

    #[test]
    fn test_parse_rejects_empty_body() {
        assert!(parse_payload(BodyFormat::Json, b"").is_err());
        assert!(parse_payload(BodyFormat::Form, b"  \n").is_err());
    }

    #[test]
    fn test_parse_form() {
        let payload =
            parse_payload(BodyFormat::Form, b"event=ping&tag=a&tag=b&note=hello+world").unwrap();
        assert_eq!(payload.get("event"), Some(&json!("ping")));
        assert_eq!(payload.get("tag"), Some(&json!(["a", "b"])));
        assert_eq!(payload.get("note"), Some(&json!("hello world")));
    }

    #[test]
    fn test_parse_form_rejects_unnamed_field() {
        assert!(parse_payload(BodyFormat::Form, b"=value").is_err());
    }

    #[test]
    fn test_header_str() {
        let mut headers = HeaderMap::new();
        headers.insert("x-webhook-delivery", HeaderValue::from_static("  abc-123 "));
        headers.insert("x-empty", HeaderValue::from_static(""));
        let request = InboundRequest::new(Method::POST, "/webhook", headers, Bytes::new());

        assert_eq!(
            request.header_str(&HeaderName::from_static("x-webhook-delivery")),
            Some("abc-123")
        );
        assert_eq!(request.header_str(&HeaderName::from_static("x-empty")), None);
        assert_eq!(request.header_str(&HeaderName::from_static("x-missing")), None);
    }
}
