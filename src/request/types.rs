//! Request descriptor types.
//!
//! A [`RequestDescriptor`] is one unit of work for the executor. It is immutable once built:
//! the executor only ever borrows it, and every retry of the same request re-sends the same
//! descriptor.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Result, VolleyError};

/// HTTP method of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE", try_from = "String")]
pub enum Method {
    #[default]
    Get,
    Post,
    Put,
    Delete,
    Patch,
    Head,
    Options,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
            Method::Patch => "PATCH",
            Method::Head => "HEAD",
            Method::Options => "OPTIONS",
        }
    }

    /// The equivalent reqwest method.
    pub fn as_reqwest(&self) -> reqwest::Method {
        match self {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Delete => reqwest::Method::DELETE,
            Method::Patch => reqwest::Method::PATCH,
            Method::Head => reqwest::Method::HEAD,
            Method::Options => reqwest::Method::OPTIONS,
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = VolleyError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "GET" => Ok(Method::Get),
            "POST" => Ok(Method::Post),
            "PUT" => Ok(Method::Put),
            "DELETE" => Ok(Method::Delete),
            "PATCH" => Ok(Method::Patch),
            "HEAD" => Ok(Method::Head),
            "OPTIONS" => Ok(Method::Options),
            other => Err(VolleyError::ValidationError(format!(
                "unsupported HTTP method '{}'",
                other
            ))),
        }
    }
}

impl TryFrom<String> for Method {
    type Error = VolleyError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

/// Body sent with a request.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    /// Serialized as JSON with `Content-Type: application/json`
    Json(Value),
    /// Sent verbatim
    Bytes(Vec<u8>),
}

/// One HTTP request to be executed by the fetch engine.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestDescriptor {
    /// Identifier used to match the result back to its input and to tag log events.
    pub id: String,

    /// HTTP method
    pub method: Method,

    /// Fully rendered URL (no placeholders left)
    pub url: String,

    /// Query parameters appended to the URL
    pub query: BTreeMap<String, String>,

    /// Request headers
    pub headers: BTreeMap<String, String>,

    /// Optional request body
    pub body: Option<RequestBody>,
}

impl RequestDescriptor {
    pub fn new(id: impl Into<String>, method: Method, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            method,
            url: url.into(),
            query: BTreeMap::new(),
            headers: BTreeMap::new(),
            body: None,
        }
    }

    /// Shorthand for a GET descriptor.
    pub fn get(id: impl Into<String>, url: impl Into<String>) -> Self {
        Self::new(id, Method::Get, url)
    }

    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.insert(key.into(), value.into());
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_json(mut self, body: Value) -> Self {
        self.body = Some(RequestBody::Json(body));
        self
    }

    pub fn with_bytes(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = Some(RequestBody::Bytes(body.into()));
        self
    }
}

/// Loosely-typed request input, as found in JSON request lists.
///
/// ```json
/// { "id": "Request 1", "method": "get", "url": "https://api.example.com/data",
///   "params": { "page": 1 } }
/// ```
///
/// When `id` is missing the URL is used as the identifier. Parameter and header values may be
/// strings, numbers or booleans.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestSpec {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub method: Option<String>,
    pub url: String,
    #[serde(default)]
    pub params: BTreeMap<String, Value>,
    #[serde(default)]
    pub headers: BTreeMap<String, Value>,
    /// JSON body
    #[serde(default)]
    pub json: Option<Value>,
    /// Raw body
    #[serde(default)]
    pub data: Option<String>,
}

impl RequestSpec {
    /// Identifier this spec resolves to, even if it fails validation.
    pub fn identifier(&self) -> String {
        self.id.clone().unwrap_or_else(|| self.url.clone())
    }
}

impl TryFrom<RequestSpec> for RequestDescriptor {
    type Error = VolleyError;

    fn try_from(spec: RequestSpec) -> Result<Self> {
        let id = spec.identifier();

        if spec.url.trim().is_empty() {
            return Err(VolleyError::ValidationError(format!(
                "request '{}' has an empty url",
                id
            )));
        }
        if let Err(e) = reqwest::Url::parse(&spec.url) {
            return Err(VolleyError::ValidationError(format!(
                "request '{}' has an invalid url '{}': {}",
                id, spec.url, e
            )));
        }

        let method = match spec.method.as_deref() {
            Some(m) => m.parse()?,
            None => Method::Get,
        };

        let body = match (spec.json, spec.data) {
            (Some(_), Some(_)) => {
                return Err(VolleyError::ValidationError(format!(
                    "request '{}' sets both 'json' and 'data'",
                    id
                )));
            }
            (Some(json), None) => Some(RequestBody::Json(json)),
            (None, Some(data)) => Some(RequestBody::Bytes(data.into_bytes())),
            (None, None) => None,
        };

        Ok(RequestDescriptor {
            query: render_scalar_map(&id, "params", spec.params)?,
            headers: render_scalar_map(&id, "headers", spec.headers)?,
            id,
            method,
            url: spec.url,
            body,
        })
    }
}

/// Render a JSON scalar as the string that goes on the wire.
///
/// Strings are used as-is, numbers and booleans use their JSON text. Null, arrays and objects
/// have no unambiguous rendering and return `None`.
pub(crate) fn render_scalar(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

pub(crate) fn render_scalar_map(
    id: &str,
    field: &str,
    values: BTreeMap<String, Value>,
) -> Result<BTreeMap<String, String>> {
    values
        .into_iter()
        .map(|(key, value)| match render_scalar(&value) {
            Some(rendered) => Ok((key, rendered)),
            None => Err(VolleyError::ValidationError(format!(
                "request '{}': {} value for '{}' must be a string, number or boolean",
                id, field, key
            ))),
        })
        .collect()
}
