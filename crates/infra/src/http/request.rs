//! Outbound request description and its canonical identity
//!
//! A [`RequestKey`] has the shape `METHOD:url:body:headers` where body and
//! headers are serialised canonically: object keys sorted at every depth,
//! header names lower-cased. Two requests that differ only in key insertion
//! order or header name casing therefore share a key.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use reqwest::Method;
use serde_json::Value;

/// Method, headers, body and timeout for one outbound call
#[derive(Debug, Clone, PartialEq)]
pub struct RequestOptions {
    pub method: Method,
    pub headers: Vec<(String, String)>,
    pub body: Option<Value>,
    /// Per-call deadline; callers fall back to their own default when unset
    pub timeout: Option<Duration>,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self { method: Method::GET, headers: Vec::new(), body: None, timeout: None }
    }
}

impl RequestOptions {
    /// Bodyless GET with no extra headers
    pub fn get() -> Self {
        Self::default()
    }

    /// POST carrying `body` as JSON
    pub fn post(body: Value) -> Self {
        Self { method: Method::POST, body: Some(body), ..Self::default() }
    }

    /// Replace the HTTP method
    #[must_use]
    pub fn method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    /// Add a header; a later header with the same name (any casing) wins
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let name = name.into();
        self.headers.retain(|(existing, _)| !existing.eq_ignore_ascii_case(&name));
        self.headers.push((name, value.into()));
        self
    }

    /// Replace the JSON body
    #[must_use]
    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Per-call deadline overriding the caller's default
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Canonical identity of an outbound request
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestKey(String);

impl RequestKey {
    /// `METHOD:url:body:headers`, with body and header order normalised
    pub fn new(url: &str, options: &RequestOptions) -> Self {
        let body = options.body.as_ref().map(canonical_json).unwrap_or_default();
        let headers = canonical_headers(&options.headers);
        Self(format!("{}:{}:{}:{}", options.method.as_str(), url, body, headers))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Serialise `value` with object keys sorted at every depth
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<_> = map.iter().collect();
            entries.sort_by(|(a, _), (b, _)| a.cmp(b));

            out.push('{');
            for (idx, (key, nested)) in entries.into_iter().enumerate() {
                if idx > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(nested, out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (idx, item) in items.iter().enumerate() {
                if idx > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

fn canonical_headers(headers: &[(String, String)]) -> String {
    if headers.is_empty() {
        return String::new();
    }

    let sorted: BTreeMap<String, &str> =
        headers.iter().map(|(name, value)| (name.to_ascii_lowercase(), value.as_str())).collect();
    let object = sorted.into_iter().map(|(name, value)| (name, Value::from(value))).collect();
    canonical_json(&Value::Object(object))
}
