//! The API client: request executor, retry orchestrator, and public facade.
//!
//! The [`Client`] type is the main entry point. Use [`ClientBuilder`] to
//! configure and create clients; each client owns its configuration,
//! interceptor registries, and deduplication table, so independently
//! configured clients can coexist.

use std::collections::BTreeSet;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use bytes::Bytes;
use http::{HeaderMap, HeaderName, HeaderValue, Method};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use url::Url;

use crate::config::{ClientConfig, ConfigUpdate};
use crate::dedup::{self, Checkout, FlightResult, FlightTable};
use crate::error::{ApiError, Error, Result};
use crate::interceptor::{
    ErrorDisposition, ErrorInterceptor, InterceptorHandle, Interceptors, RequestContext,
    RequestInterceptor, ResponseInterceptor,
};
use crate::request::{QueryValue, RequestOptions, ResponseShape};
use crate::response::{RawResponse, ResponseBody};
use crate::retry::backoff_delay;

/// A typed HTTP client for the Dataspect API with retries, deduplication,
/// and interceptor chains.
///
/// The client is designed to be created once and reused; it is cheap to
/// clone (clones share the same configuration, interceptors, and
/// deduplication table).
///
/// # Examples
///
/// ```no_run
/// use dataspect_client::{Client, RequestOptions};
/// use serde::Deserialize;
///
/// #[derive(Deserialize)]
/// struct Source {
///     id: u64,
///     name: String,
/// }
///
/// # async fn example() -> Result<(), dataspect_client::Error> {
/// let client = Client::builder()
///     .base_url("https://dashboard.example.com/api/v1")?
///     .max_retries(2)
///     .build()?;
///
/// let source: Source = client.get("/sources/42", RequestOptions::new()).await?;
/// println!("source: {}", source.name);
/// # let _ = source.id;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    http: reqwest::Client,
    config: RwLock<ClientConfig>,
    default_headers: HeaderMap,
    interceptors: Interceptors,
    flights: FlightTable,
}

/// Releases one caller's interest in a deduplicated flight. Running from
/// `Drop` guarantees the release happens exactly once per caller, even when
/// the caller's future is cancelled mid-await.
struct FlightGuard {
    inner: Arc<ClientInner>,
    key: String,
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        self.inner.flights.release(&self.key);
    }
}

impl Client {
    /// Creates a new [`ClientBuilder`].
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// Returns a snapshot of the current configuration.
    ///
    /// The snapshot is a defensive copy; mutating it has no effect on the
    /// client.
    pub fn config(&self) -> ClientConfig {
        self.inner.config.read().unwrap().clone()
    }

    /// Merge-updates the live configuration. In-flight requests keep the
    /// snapshot they started with.
    pub fn configure(&self, update: ConfigUpdate) {
        self.inner.config.write().unwrap().apply(update);
    }

    /// Registers a request interceptor. Interceptors run in registration
    /// order; the handle removes exactly this registration.
    pub fn on_request(&self, interceptor: Arc<dyn RequestInterceptor>) -> InterceptorHandle {
        let id = self.inner.interceptors.request.add(interceptor);
        let inner = Arc::downgrade(&self.inner);
        InterceptorHandle::new(move || {
            if let Some(inner) = inner.upgrade() {
                inner.interceptors.request.remove(id);
            }
        })
    }

    /// Registers a response interceptor.
    pub fn on_response(&self, interceptor: Arc<dyn ResponseInterceptor>) -> InterceptorHandle {
        let id = self.inner.interceptors.response.add(interceptor);
        let inner = Arc::downgrade(&self.inner);
        InterceptorHandle::new(move || {
            if let Some(inner) = inner.upgrade() {
                inner.interceptors.response.remove(id);
            }
        })
    }

    /// Registers an error interceptor.
    pub fn on_error(&self, interceptor: Arc<dyn ErrorInterceptor>) -> InterceptorHandle {
        let id = self.inner.interceptors.error.add(interceptor);
        let inner = Arc::downgrade(&self.inner);
        InterceptorHandle::new(move || {
            if let Some(inner) = inner.upgrade() {
                inner.interceptors.error.remove(id);
            }
        })
    }

    /// Removes every registered interceptor from all three registries.
    pub fn clear_interceptors(&self) {
        self.inner.interceptors.clear();
    }

    /// Number of deduplicated requests currently in flight.
    pub fn pending_requests(&self) -> usize {
        self.inner.flights.len()
    }

    /// Runs the full request pipeline and returns the shaped, untyped body.
    ///
    /// This is the entry point the typed verbs are built on. GET and HEAD
    /// calls are deduplicated when enabled both globally and per-call:
    /// concurrent callers with the same cache key share a single underlying
    /// call (retries included) and observe the same result.
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
        options: RequestOptions,
    ) -> Result<ResponseBody> {
        let dedup_eligible = (method == Method::GET || method == Method::HEAD)
            && !options.skip_dedup
            && self.config().deduplication_enabled;
        if !dedup_eligible {
            return self
                .run_attempts(method, path.to_string(), body, options)
                .await
                .map_err(Error::from);
        }

        let key = options
            .dedup_key
            .clone()
            .unwrap_or_else(|| dedup::default_key(&method, path, body.as_ref()));

        let checkout = self.inner.flights.checkout(&key);
        // Release runs on every exit path, including cancellation of this
        // caller's future.
        let _guard = FlightGuard {
            inner: self.inner.clone(),
            key: key.clone(),
        };

        let mut rx = match checkout {
            Checkout::Owner { tx, rx } => {
                let client = self.clone();
                let path = path.to_string();
                // The flight runs to completion on its own task: a joiner
                // (or this caller) abandoning its await must not cancel the
                // shared call for the others.
                tokio::spawn(async move {
                    let result = client.run_attempts(method, path, body, options).await;
                    let _ = tx.send(Some(result));
                });
                rx
            }
            Checkout::Joiner { rx } => {
                tracing::debug!(key = %key, "joining in-flight request");
                rx
            }
        };

        let result: Option<FlightResult> = match rx.wait_for(|slot| slot.is_some()).await {
            Ok(slot) => slot.clone(),
            Err(_) => None,
        };
        result
            .unwrap_or_else(|| Err(ApiError::network("deduplicated request was abandoned")))
            .map_err(Error::from)
    }

    /// The retry orchestrator: runs attempts until success, a handled
    /// error, a non-retryable error, or retry exhaustion.
    async fn run_attempts(
        &self,
        method: Method,
        path: String,
        body: Option<Value>,
        options: RequestOptions,
    ) -> FlightResult {
        let config = self.config();
        let effective_retries = if options.skip_retry {
            0
        } else {
            options.retries.unwrap_or(config.max_retries)
        };

        let mut attempt: u32 = 0;
        loop {
            match self
                .execute_once(&config, &method, &path, body.clone(), &options)
                .await
            {
                Ok(response) => {
                    tracing::debug!(
                        method = %method,
                        path = %path,
                        attempt = attempt,
                        "request succeeded"
                    );
                    return Ok(response);
                }
                Err(error) => {
                    tracing::warn!(
                        status = error.status,
                        method = %method,
                        path = %path,
                        attempt = attempt,
                        "request attempt failed"
                    );

                    match self.inner.interceptors.run_error_chain(error, &path).await {
                        ErrorDisposition::Handled => {
                            tracing::debug!(
                                method = %method,
                                path = %path,
                                "error handled by interceptor"
                            );
                            return Ok(ResponseBody::empty_json());
                        }
                        ErrorDisposition::Propagate(error) => {
                            if !error.retryable || attempt >= effective_retries {
                                return Err(error);
                            }
                            let delay = backoff_delay(attempt, config.retry_base_delay);
                            tracing::info!(
                                delay_ms = delay.as_millis() as u64,
                                attempt = attempt,
                                method = %method,
                                path = %path,
                                "retrying request after backoff"
                            );
                            tokio::time::sleep(delay).await;
                            attempt += 1;
                        }
                    }
                }
            }
        }
    }

    /// Executes a single attempt: interceptors, transport call with timeout
    /// and cancellation, response classification, and shape dispatch.
    async fn execute_once(
        &self,
        config: &ClientConfig,
        method: &Method,
        path: &str,
        body: Option<Value>,
        options: &RequestOptions,
    ) -> std::result::Result<ResponseBody, ApiError> {
        let mut headers = self.inner.default_headers.clone();
        for (name, value) in &options.headers {
            headers.insert(name, value.clone());
        }

        let context = RequestContext {
            endpoint: path.to_string(),
            headers,
            body,
        };
        let context = self.inner.interceptors.run_request_chain(context).await?;

        let url = join_endpoint(&config.base_url, &context.endpoint, &options.query)
            .map_err(|e| ApiError::network(format!("failed to build request URL: {e}")))?;

        tracing::debug!(method = %method, url = %url, "executing HTTP request");

        let mut request = self
            .inner
            .http
            .request(method.clone(), url)
            .headers(context.headers);
        if let Some(body) = &context.body {
            request = request.json(body);
        }

        let transport = async move {
            let response = request.send().await?;
            let status = response.status();
            let status_text = status.canonical_reason().unwrap_or_default().to_string();
            let headers = response.headers().clone();
            let body = response.bytes().await?;
            Ok::<RawResponse, reqwest::Error>(RawResponse {
                status,
                status_text,
                headers,
                body,
            })
        };

        let per_attempt_timeout = options.timeout.unwrap_or(config.timeout);
        let outcome = match &options.cancel {
            Some(token) if token.is_cancelled() => return Err(ApiError::timeout()),
            Some(token) => {
                tokio::select! {
                    _ = token.cancelled() => return Err(ApiError::timeout()),
                    outcome = tokio::time::timeout(per_attempt_timeout, transport) => outcome,
                }
            }
            None => tokio::time::timeout(per_attempt_timeout, transport).await,
        };

        let raw = match outcome {
            Err(_elapsed) => return Err(ApiError::timeout()),
            Ok(Err(e)) if e.is_timeout() => return Err(ApiError::timeout()),
            Ok(Err(e)) => return Err(ApiError::network(e.to_string())),
            Ok(Ok(raw)) => raw,
        };

        let raw = self
            .inner
            .interceptors
            .run_response_chain(raw, &context.endpoint)
            .await;

        if !raw.is_success() {
            let payload: Option<Value> = serde_json::from_slice(&raw.body).ok();
            let retryable = config.retryable_status_codes.contains(&raw.status.as_u16());
            return Err(ApiError::new(
                raw.status.as_u16(),
                raw.status_text,
                payload,
                retryable,
            ));
        }

        extract_body(raw, options.shape)
    }

    /// Makes a GET request and decodes the JSON response.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use dataspect_client::{Client, RequestOptions};
    /// use serde_json::Value;
    ///
    /// # async fn example(client: &Client) -> Result<(), dataspect_client::Error> {
    /// let alerts: Value = client
    ///     .get("/schema-watchers/7/alerts", RequestOptions::new())
    ///     .await?;
    /// # let _ = alerts;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn get<Res>(&self, path: &str, options: RequestOptions) -> Result<Res>
    where
        Res: DeserializeOwned,
    {
        let response = self
            .request(Method::GET, path, None, options.shape(ResponseShape::Json))
            .await?;
        decode_json(response)
    }

    /// Makes a POST request with a JSON body and decodes the JSON response.
    pub async fn post<Req, Res>(
        &self,
        path: &str,
        body: &Req,
        options: RequestOptions,
    ) -> Result<Res>
    where
        Req: Serialize,
        Res: DeserializeOwned,
    {
        let body = serde_json::to_value(body).map_err(|e| Error::Serialization(e.to_string()))?;
        let response = self
            .request(
                Method::POST,
                path,
                Some(body),
                options.shape(ResponseShape::Json),
            )
            .await?;
        decode_json(response)
    }

    /// Makes a PUT request with a JSON body and decodes the JSON response.
    pub async fn put<Req, Res>(
        &self,
        path: &str,
        body: &Req,
        options: RequestOptions,
    ) -> Result<Res>
    where
        Req: Serialize,
        Res: DeserializeOwned,
    {
        let body = serde_json::to_value(body).map_err(|e| Error::Serialization(e.to_string()))?;
        let response = self
            .request(
                Method::PUT,
                path,
                Some(body),
                options.shape(ResponseShape::Json),
            )
            .await?;
        decode_json(response)
    }

    /// Makes a PATCH request with a JSON body and decodes the JSON response.
    pub async fn patch<Req, Res>(
        &self,
        path: &str,
        body: &Req,
        options: RequestOptions,
    ) -> Result<Res>
    where
        Req: Serialize,
        Res: DeserializeOwned,
    {
        let body = serde_json::to_value(body).map_err(|e| Error::Serialization(e.to_string()))?;
        let response = self
            .request(
                Method::PATCH,
                path,
                Some(body),
                options.shape(ResponseShape::Json),
            )
            .await?;
        decode_json(response)
    }

    /// Makes a DELETE request and decodes the JSON response.
    pub async fn delete<Res>(&self, path: &str, options: RequestOptions) -> Result<Res>
    where
        Res: DeserializeOwned,
    {
        let response = self
            .request(
                Method::DELETE,
                path,
                None,
                options.shape(ResponseShape::Json),
            )
            .await?;
        decode_json(response)
    }

    /// Makes a GET request and returns the response body as text.
    pub async fn get_text(&self, path: &str, options: RequestOptions) -> Result<String> {
        let response = self
            .request(Method::GET, path, None, options.shape(ResponseShape::Text))
            .await?;
        Ok(response.into_text().unwrap_or_default())
    }

    /// Downloads the raw bytes at `path` through the full pipeline (retry
    /// and deduplication included).
    pub async fn download(&self, path: &str, options: RequestOptions) -> Result<Bytes> {
        let response = self
            .request(
                Method::GET,
                path,
                None,
                options.shape(ResponseShape::Binary),
            )
            .await?;
        Ok(response.into_bytes().unwrap_or_default())
    }

    /// Uploads a file as a multipart form, with optional extra string
    /// fields.
    ///
    /// This is a deliberately simpler path than the main pipeline: no
    /// interceptors, no retries, no deduplication — a multipart body cannot
    /// be safely replayed without re-reading a consumed stream. Exactly one
    /// transport call is made; a non-success status raises the usual
    /// [`ApiError`] with whatever structured payload could be parsed.
    pub async fn upload<Res>(
        &self,
        path: &str,
        file_name: &str,
        contents: Vec<u8>,
        fields: &[(&str, &str)],
    ) -> Result<Res>
    where
        Res: DeserializeOwned,
    {
        let config = self.config();
        let url = join_endpoint(&config.base_url, path, &[])?;

        let part = reqwest::multipart::Part::bytes(contents).file_name(file_name.to_string());
        let mut form = reqwest::multipart::Form::new().part("file", part);
        for (name, value) in fields {
            form = form.text(name.to_string(), value.to_string());
        }

        tracing::debug!(url = %url, file_name = file_name, "uploading multipart form");

        let response = self
            .inner
            .http
            .post(url)
            .headers(self.inner.default_headers.clone())
            .multipart(form)
            .timeout(config.timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ApiError::timeout()
                } else {
                    ApiError::network(e.to_string())
                }
            })?;

        let status = response.status();
        let status_text = status.canonical_reason().unwrap_or_default().to_string();
        let body = response
            .bytes()
            .await
            .map_err(|e| ApiError::network(e.to_string()))?;

        if !status.is_success() {
            let payload: Option<Value> = serde_json::from_slice(&body).ok();
            return Err(Error::from(ApiError::new(
                status.as_u16(),
                status_text,
                payload,
                false,
            )));
        }

        let value: Value = if body.is_empty() {
            Value::Object(Default::default())
        } else {
            serde_json::from_slice(&body)
                .map_err(|e| ApiError::network(format!("invalid JSON in response body: {e}")))?
        };
        decode_json(ResponseBody::Json(value))
    }
}

/// Joins the base URL (prefix included) with a relative endpoint and
/// appends encoded query pairs; `Many` values become one repeated entry per
/// element.
fn join_endpoint(
    base: &Url,
    endpoint: &str,
    query: &[(String, QueryValue)],
) -> std::result::Result<Url, url::ParseError> {
    let mut url = Url::parse(&format!(
        "{}{}",
        base.as_str().trim_end_matches('/'),
        endpoint
    ))?;
    if !query.is_empty() {
        let mut pairs = url.query_pairs_mut();
        for (key, value) in query {
            match value {
                QueryValue::One(v) => {
                    pairs.append_pair(key, v);
                }
                QueryValue::Many(vs) => {
                    for v in vs {
                        pairs.append_pair(key, v);
                    }
                }
            }
        }
    }
    Ok(url)
}

/// Shape dispatch for a successful response.
fn extract_body(
    raw: RawResponse,
    shape: ResponseShape,
) -> std::result::Result<ResponseBody, ApiError> {
    match shape {
        ResponseShape::Binary => Ok(ResponseBody::Binary(raw.body)),
        ResponseShape::Text => Ok(ResponseBody::Text(
            String::from_utf8_lossy(&raw.body).into_owned(),
        )),
        ResponseShape::Json => {
            let is_json = raw.content_type().is_some_and(|ct| ct.contains("json"));
            if !is_json || raw.body.is_empty() {
                return Ok(ResponseBody::empty_json());
            }
            serde_json::from_slice(&raw.body)
                .map(ResponseBody::Json)
                .map_err(|e| ApiError::network(format!("invalid JSON in response body: {e}")))
        }
    }
}

fn decode_json<Res: DeserializeOwned>(body: ResponseBody) -> Result<Res> {
    let value = body.into_json().unwrap_or(Value::Null);
    let raw_body = value.to_string();
    serde_json::from_value(value).map_err(|e| Error::Deserialization {
        raw_body,
        serde_error: e.to_string(),
    })
}

/// Builder for configuring and creating a [`Client`].
///
/// # Examples
///
/// ```no_run
/// use std::time::Duration;
/// use dataspect_client::ClientBuilder;
///
/// # fn example() -> Result<(), dataspect_client::Error> {
/// let client = ClientBuilder::new()
///     .base_url("https://dashboard.example.com/api/v1")?
///     .timeout(Duration::from_secs(15))
///     .max_retries(2)
///     .default_header("x-workspace", "prod")?
///     .build()?;
/// # let _ = client;
/// # Ok(())
/// # }
/// ```
pub struct ClientBuilder {
    base_url: Option<Url>,
    default_headers: HeaderMap,
    timeout: Option<Duration>,
    max_retries: Option<u32>,
    retry_base_delay: Option<Duration>,
    retryable_status_codes: Option<BTreeSet<u16>>,
    deduplication_enabled: Option<bool>,
}

impl ClientBuilder {
    /// Creates a builder with default settings.
    pub fn new() -> Self {
        Self {
            base_url: None,
            default_headers: HeaderMap::new(),
            timeout: None,
            max_retries: None,
            retry_base_delay: None,
            retryable_status_codes: None,
            deduplication_enabled: None,
        }
    }

    /// Sets the base URL, including any versioned API prefix.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid.
    pub fn base_url(mut self, url: impl AsRef<str>) -> Result<Self> {
        self.base_url = Some(Url::parse(url.as_ref())?);
        Ok(self)
    }

    /// Adds a header included in every request.
    ///
    /// # Errors
    ///
    /// Returns an error if the header name or value is invalid.
    pub fn default_header(mut self, name: impl AsRef<str>, value: impl AsRef<str>) -> Result<Self> {
        let name = HeaderName::try_from(name.as_ref())
            .map_err(|e| Error::Configuration(format!("invalid header name: {}", e)))?;
        let value = HeaderValue::try_from(value.as_ref())
            .map_err(|e| Error::Configuration(format!("invalid header value: {}", e)))?;
        self.default_headers.insert(name, value);
        Ok(self)
    }

    /// Sets the default per-attempt timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sets the default retry budget (retries beyond the first attempt).
    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    /// Sets the base delay for exponential backoff.
    pub fn retry_base_delay(mut self, delay: Duration) -> Self {
        self.retry_base_delay = Some(delay);
        self
    }

    /// Sets the HTTP statuses eligible for retry.
    pub fn retryable_status_codes(mut self, codes: impl IntoIterator<Item = u16>) -> Self {
        self.retryable_status_codes = Some(codes.into_iter().collect());
        self
    }

    /// Enables or disables request deduplication.
    pub fn deduplication_enabled(mut self, enabled: bool) -> Self {
        self.deduplication_enabled = Some(enabled);
        self
    }

    /// Builds the configured [`Client`].
    ///
    /// # Errors
    ///
    /// Returns an error if no base URL was provided or the underlying HTTP
    /// client could not be constructed.
    pub fn build(self) -> Result<Client> {
        let base_url = self
            .base_url
            .ok_or_else(|| Error::Configuration("base URL is required".to_string()))?;

        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| Error::Configuration(format!("failed to build HTTP client: {}", e)))?;

        let mut config = ClientConfig::new(base_url);
        if let Some(timeout) = self.timeout {
            config.timeout = timeout;
        }
        if let Some(max_retries) = self.max_retries {
            config.max_retries = max_retries;
        }
        if let Some(delay) = self.retry_base_delay {
            config.retry_base_delay = delay;
        }
        if let Some(codes) = self.retryable_status_codes {
            config.retryable_status_codes = codes;
        }
        if let Some(enabled) = self.deduplication_enabled {
            config.deduplication_enabled = enabled;
        }

        Ok(Client {
            inner: Arc::new(ClientInner {
                http,
                config: RwLock::new(config),
                default_headers: self.default_headers,
                interceptors: Interceptors::new(),
                flights: FlightTable::new(),
            }),
        })
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}
