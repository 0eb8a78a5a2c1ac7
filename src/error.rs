//! Error types for the request pipeline.
//!
//! Failures are normalized into [`ApiError`] as early as possible — inside a
//! single attempt — so that interceptors, the retry loop, and callers all see
//! one uniform shape. Status `0` is reserved for network-level failures where
//! no response was received; status `408` marks a client-enforced timeout.
//! The crate-level [`Error`] wraps `ApiError` alongside the failures that can
//! only happen outside the pipeline (typed decoding, serialization,
//! configuration).

use std::fmt;

use serde_json::Value;

/// The normalized error raised by the request pipeline.
///
/// Carries the HTTP status (or a synthetic one), the status text, whatever
/// structured payload the server returned, and whether the failure is
/// eligible for retry.
///
/// # Examples
///
/// ```
/// use dataspect_client::ApiError;
/// use serde_json::json;
///
/// let err = ApiError::new(
///     422,
///     "Unprocessable Entity",
///     Some(json!({"detail": [{"loc": ["body", "name"], "msg": "field required"}]})),
///     false,
/// );
///
/// assert!(err.is_client_error());
/// assert_eq!(err.validation_errors()[0].field, "body.name");
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ApiError {
    /// HTTP status, `0` for network failures, `408` for client timeouts.
    pub status: u16,
    /// The status text reported by the server, or a synthetic one.
    pub status_text: String,
    /// Structured response payload, if one could be parsed.
    pub payload: Option<Value>,
    /// Whether the retry loop may re-attempt this request.
    pub retryable: bool,
}

impl ApiError {
    /// Creates an error from its parts.
    pub fn new(
        status: u16,
        status_text: impl Into<String>,
        payload: Option<Value>,
        retryable: bool,
    ) -> Self {
        Self {
            status,
            status_text: status_text.into(),
            payload,
            retryable,
        }
    }

    /// Synthetic network-level failure (no response received). Always
    /// retryable; the source message is preserved in the payload.
    pub fn network(message: impl Into<String>) -> Self {
        Self::new(
            0,
            "Network Error",
            Some(serde_json::json!({ "message": message.into() })),
            true,
        )
    }

    /// Synthetic client-enforced timeout. Always retryable.
    pub fn timeout() -> Self {
        Self::new(408, "Request Timeout", None, true)
    }

    /// `true` for 4xx statuses.
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status)
    }

    /// `true` for statuses of 500 and above.
    pub fn is_server_error(&self) -> bool {
        self.status >= 500
    }

    /// `true` when no response was received at all.
    pub fn is_network_error(&self) -> bool {
        self.status == 0
    }

    /// `true` for client-enforced or server-reported timeouts.
    pub fn is_timeout(&self) -> bool {
        self.status == 408
    }

    /// `true` for 429 Too Many Requests.
    pub fn is_rate_limited(&self) -> bool {
        self.status == 429
    }

    /// `true` for 404 Not Found.
    pub fn is_not_found(&self) -> bool {
        self.status == 404
    }

    /// `true` for 401 Unauthorized.
    pub fn is_unauthorized(&self) -> bool {
        self.status == 401
    }

    /// `true` for 403 Forbidden.
    pub fn is_forbidden(&self) -> bool {
        self.status == 403
    }

    /// Extracts a human-readable message from the payload.
    ///
    /// Recognizes the common API error shapes — a `detail` string, a
    /// `message` string, an `error` string, or a `detail` array of
    /// `{msg|message}` objects (joined with `, `) — and falls back to the
    /// status text.
    pub fn message(&self) -> String {
        let Some(payload) = &self.payload else {
            return self.status_text.clone();
        };

        if let Some(detail) = payload.get("detail") {
            match detail {
                Value::String(s) => return s.clone(),
                Value::Array(items) => {
                    let parts: Vec<&str> = items
                        .iter()
                        .filter_map(|item| {
                            item.get("msg")
                                .or_else(|| item.get("message"))
                                .and_then(Value::as_str)
                        })
                        .collect();
                    if !parts.is_empty() {
                        return parts.join(", ");
                    }
                }
                _ => {}
            }
        }
        if let Some(message) = payload.get("message").and_then(Value::as_str) {
            return message.to_string();
        }
        if let Some(error) = payload.get("error").and_then(Value::as_str) {
            return error.to_string();
        }

        self.status_text.clone()
    }

    /// Maps an array-shaped `detail` payload into per-field validation
    /// issues, joining location path segments with `.`.
    ///
    /// Returns an empty list when the payload has no such shape.
    pub fn validation_errors(&self) -> Vec<ValidationIssue> {
        let Some(items) = self
            .payload
            .as_ref()
            .and_then(|p| p.get("detail"))
            .and_then(Value::as_array)
        else {
            return Vec::new();
        };

        items
            .iter()
            .map(|item| {
                let field = item
                    .get("loc")
                    .and_then(Value::as_array)
                    .map(|segments| {
                        segments
                            .iter()
                            .map(|segment| match segment {
                                Value::String(s) => s.clone(),
                                other => other.to_string(),
                            })
                            .collect::<Vec<_>>()
                            .join(".")
                    })
                    .unwrap_or_default();
                let message = item
                    .get("msg")
                    .or_else(|| item.get("message"))
                    .and_then(Value::as_str)
                    .unwrap_or("invalid value")
                    .to_string();
                ValidationIssue { field, message }
            })
            .collect()
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_network_error() {
            write!(f, "network error: {}", self.message())
        } else {
            write!(f, "HTTP {}: {}", self.status, self.message())
        }
    }
}

impl std::error::Error for ApiError {}

/// One field-level failure extracted from a validation error payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationIssue {
    /// Location path segments joined with `.` (e.g. `body.name`).
    pub field: String,
    /// The server-reported message for the field.
    pub message: String,
}

/// The main error type for API calls.
///
/// Pipeline failures surface as [`Error::Api`]; the remaining variants cover
/// failures outside the request pipeline itself.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The request pipeline failed: an HTTP error status, a network-level
    /// failure (status 0), or a timeout (status 408).
    #[error(transparent)]
    Api(#[from] ApiError),

    /// A successful response body could not be decoded into the requested
    /// type.
    ///
    /// Preserves the raw body and the serde message so decode failures can
    /// be debugged in production.
    #[error("failed to decode response body: {serde_error}")]
    Deserialization {
        /// The body that failed to decode.
        raw_body: String,
        /// The serde error message.
        serde_error: String,
    },

    /// The request body could not be serialized to JSON.
    #[error("failed to serialize request body: {0}")]
    Serialization(String),

    /// The client or a request was misconfigured (invalid header, missing
    /// base URL, ...).
    #[error("configuration error: {0}")]
    Configuration(String),

    /// An invalid URL was provided.
    #[error("invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

impl Error {
    /// Returns the pipeline error if this is one — the typed equivalent of
    /// an `isRequestError` guard.
    ///
    /// # Examples
    ///
    /// ```
    /// use dataspect_client::{ApiError, Error};
    ///
    /// let err = Error::from(ApiError::timeout());
    /// assert!(err.as_api().is_some_and(|api| api.is_timeout()));
    /// ```
    pub fn as_api(&self) -> Option<&ApiError> {
        match self {
            Error::Api(api) => Some(api),
            _ => None,
        }
    }

    /// `true` if the retry loop would consider this error eligible.
    pub fn is_retryable(&self) -> bool {
        self.as_api().is_some_and(|api| api.retryable)
    }
}

/// Extracts a display message from any crate error.
///
/// Delegates to [`ApiError::message`] for pipeline errors so callers can
/// render a message without re-deriving classification logic.
pub fn error_message(error: &Error) -> String {
    match error.as_api() {
        Some(api) => api.message(),
        None => error.to_string(),
    }
}

/// A specialized `Result` type for API calls.
pub type Result<T> = std::result::Result<T, Error>;
