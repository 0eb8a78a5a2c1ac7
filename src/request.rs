//! Per-request options.

use std::time::Duration;

use http::{HeaderMap, HeaderName, HeaderValue};
use tokio_util::sync::CancellationToken;

/// How the pipeline should extract the response body on success.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ResponseShape {
    /// Parse the body as JSON. Responses without a JSON content type yield
    /// an empty object instead of an error.
    #[default]
    Json,
    /// Return the body as UTF-8 text.
    Text,
    /// Return the raw bytes.
    Binary,
}

/// A query-parameter value: a single entry, or one repeated entry per
/// element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryValue {
    /// One `key=value` entry.
    One(String),
    /// One `key=value` entry per element.
    Many(Vec<String>),
}

/// Options for an individual request.
///
/// All fields have inert defaults; a plain [`RequestOptions::new`] leaves
/// the pipeline's configured behavior untouched.
///
/// # Examples
///
/// ```no_run
/// use std::time::Duration;
/// use dataspect_client::{Client, RequestOptions};
/// use serde_json::Value;
///
/// # async fn example(client: &Client) -> Result<(), dataspect_client::Error> {
/// let sources: Value = client
///     .get(
///         "/sources",
///         RequestOptions::new()
///             .query("status", "active")
///             .query_many("tags", ["prod", "daily"])
///             .timeout(Duration::from_secs(5)),
///     )
///     .await?;
/// # let _ = sources;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    /// Query parameters in insertion order.
    pub query: Vec<(String, QueryValue)>,

    /// Additional headers for this request, overriding client defaults on
    /// conflict.
    pub headers: HeaderMap,

    /// Per-attempt timeout override.
    pub timeout: Option<Duration>,

    /// External cancellation signal, combined with the per-attempt timer.
    pub cancel: Option<CancellationToken>,

    /// Per-call retry-count override.
    pub retries: Option<u32>,

    /// Forces a single attempt regardless of error classification.
    pub skip_retry: bool,

    /// Opts this call out of deduplication.
    pub skip_dedup: bool,

    /// Overrides the deduplication cache key.
    pub dedup_key: Option<String>,

    /// Requested response shape. Typed verbs force [`ResponseShape::Json`].
    pub shape: ResponseShape,
}

impl RequestOptions {
    /// Creates options with all defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a single-valued query parameter.
    pub fn query(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.query
            .push((key.into(), QueryValue::One(value.to_string())));
        self
    }

    /// Adds a query parameter serialized as one repeated entry per element.
    pub fn query_many<V: ToString>(
        mut self,
        key: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        self.query.push((
            key.into(),
            QueryValue::Many(values.into_iter().map(|v| v.to_string()).collect()),
        ));
        self
    }

    /// Adds a query parameter only when the value is present; `None` is
    /// omitted entirely.
    pub fn query_opt(self, key: impl Into<String>, value: Option<impl ToString>) -> Self {
        match value {
            Some(value) => self.query(key, value),
            None => self,
        }
    }

    /// Adds a header to the request.
    ///
    /// # Errors
    ///
    /// Returns an error if the header name or value is invalid.
    pub fn header(
        mut self,
        name: impl AsRef<str>,
        value: impl AsRef<str>,
    ) -> Result<Self, crate::Error> {
        let name = HeaderName::try_from(name.as_ref())
            .map_err(|e| crate::Error::Configuration(format!("invalid header name: {}", e)))?;
        let value = HeaderValue::try_from(value.as_ref())
            .map_err(|e| crate::Error::Configuration(format!("invalid header value: {}", e)))?;
        self.headers.insert(name, value);
        Ok(self)
    }

    /// Sets a per-attempt timeout override.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Attaches an external cancellation signal.
    pub fn cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Overrides the retry count for this call.
    pub fn retries(mut self, retries: u32) -> Self {
        self.retries = Some(retries);
        self
    }

    /// Forces a single attempt.
    pub fn skip_retry(mut self) -> Self {
        self.skip_retry = true;
        self
    }

    /// Opts out of deduplication for this call.
    pub fn skip_dedup(mut self) -> Self {
        self.skip_dedup = true;
        self
    }

    /// Overrides the deduplication cache key.
    pub fn dedup_key(mut self, key: impl Into<String>) -> Self {
        self.dedup_key = Some(key.into());
        self
    }

    /// Sets the response shape.
    pub fn shape(mut self, shape: ResponseShape) -> Self {
        self.shape = shape;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_opt_omits_none() {
        let options = RequestOptions::new()
            .query_opt("present", Some(3))
            .query_opt("absent", None::<u32>);

        assert_eq!(options.query.len(), 1);
        assert_eq!(
            options.query[0],
            ("present".to_string(), QueryValue::One("3".to_string()))
        );
    }

    #[test]
    fn query_many_keeps_element_order() {
        let options = RequestOptions::new().query_many("tags", ["a", "b"]);
        assert_eq!(
            options.query[0].1,
            QueryValue::Many(vec!["a".to_string(), "b".to_string()])
        );
    }

    #[test]
    fn invalid_header_name_is_rejected() {
        let result = RequestOptions::new().header("bad header", "value");
        assert!(matches!(result, Err(crate::Error::Configuration(_))));
    }
}
