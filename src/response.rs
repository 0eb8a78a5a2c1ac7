//! Response types.
//!
//! [`RawResponse`] is the unit the response-interceptor chain transforms and
//! the deduplication table broadcasts: status, headers, and the fully read
//! body. [`ResponseBody`] is the success value of the untyped pipeline after
//! shape dispatch.

use bytes::Bytes;
use http::{HeaderMap, StatusCode};
use serde_json::{Map, Value};

/// A transport response with its body fully read.
///
/// Response interceptors receive and return this type before the pipeline
/// judges success or failure, so an interceptor may rewrite the status,
/// headers, or body and change the outcome downstream.
#[derive(Debug, Clone)]
pub struct RawResponse {
    /// The HTTP status code.
    pub status: StatusCode,
    /// The status text reported alongside the code.
    pub status_text: String,
    /// The response headers.
    pub headers: HeaderMap,
    /// The complete response body.
    pub body: Bytes,
}

impl RawResponse {
    /// `true` for 2xx statuses.
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Returns a header value by name, if present and valid UTF-8.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)?.to_str().ok()
    }

    /// Returns the `Content-Type` header value.
    pub fn content_type(&self) -> Option<&str> {
        self.header(http::header::CONTENT_TYPE.as_str())
    }

    /// Replaces the status code, keeping everything else. Primarily useful
    /// in response interceptors.
    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status_text = status.canonical_reason().unwrap_or_default().to_string();
        self.status = status;
        self
    }
}

/// The body of a successful pipeline call, shaped per the request's
/// [`ResponseShape`](crate::ResponseShape).
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseBody {
    /// A parsed JSON document.
    Json(Value),
    /// The body as UTF-8 text.
    Text(String),
    /// The raw bytes.
    Binary(Bytes),
}

impl ResponseBody {
    /// The "handled out-of-band" success value: an empty JSON object.
    pub(crate) fn empty_json() -> Self {
        ResponseBody::Json(Value::Object(Map::new()))
    }

    /// Consumes the body, returning the JSON document if this is the JSON
    /// shape.
    pub fn into_json(self) -> Option<Value> {
        match self {
            ResponseBody::Json(value) => Some(value),
            _ => None,
        }
    }

    /// Consumes the body, returning the text if this is the text shape.
    pub fn into_text(self) -> Option<String> {
        match self {
            ResponseBody::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Consumes the body, returning the bytes if this is the binary shape.
    pub fn into_bytes(self) -> Option<Bytes> {
        match self {
            ResponseBody::Binary(bytes) => Some(bytes),
            _ => None,
        }
    }
}
