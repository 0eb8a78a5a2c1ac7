//! # dataspect-client - Typed API client for the Dataspect dashboard
//!
//! This crate is the API-access layer of the Dataspect data-observability
//! dashboard: a typed, retry-aware request pipeline built on `reqwest` that
//! the per-domain API modules (sources, validation, profiling, drift,
//! anomaly detection, lineage, notifications) call into. It provides retry
//! with jittered exponential backoff, deduplication of identical concurrent
//! reads, request/response/error interceptor chains, timeout and
//! cancellation composition, and a normalized error taxonomy.
//!
//! ## Quick Start
//!
//! ```no_run
//! use dataspect_client::{Client, RequestOptions};
//! use serde::{Deserialize, Serialize};
//! use std::time::Duration;
//!
//! #[derive(Serialize)]
//! struct CreateSource {
//!     name: String,
//!     connection_uri: String,
//! }
//!
//! #[derive(Deserialize)]
//! struct Source {
//!     id: u64,
//!     name: String,
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), dataspect_client::Error> {
//!     let client = Client::builder()
//!         .base_url("https://dashboard.example.com/api/v1")?
//!         .timeout(Duration::from_secs(15))
//!         .max_retries(3)
//!         .build()?;
//!
//!     // List sources, with repeated query keys for array parameters.
//!     let sources: Vec<Source> = client
//!         .get(
//!             "/sources",
//!             RequestOptions::new().query_many("tags", ["prod", "daily"]),
//!         )
//!         .await?;
//!     println!("{} sources", sources.len());
//!
//!     // Create one.
//!     let created: Source = client
//!         .post(
//!             "/sources",
//!             &CreateSource {
//!                 name: "warehouse".to_string(),
//!                 connection_uri: "postgres://...".to_string(),
//!             },
//!             RequestOptions::new(),
//!         )
//!         .await?;
//!     println!("created source {}", created.id);
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Error Handling
//!
//! Pipeline failures are normalized into [`ApiError`] — HTTP errors keep
//! their status and parsed payload, network-level failures use status `0`,
//! and client-enforced timeouts use status `408` — so callers classify and
//! render errors without inspecting transport details:
//!
//! ```no_run
//! use dataspect_client::{error_message, Client, RequestOptions};
//! use serde_json::Value;
//!
//! # async fn example(client: &Client) {
//! match client.get::<Value>("/sources/9000", RequestOptions::new()).await {
//!     Ok(source) => println!("{source}"),
//!     Err(err) => {
//!         if let Some(api) = err.as_api() {
//!             if api.is_not_found() {
//!                 eprintln!("no such source");
//!                 return;
//!             }
//!             for issue in api.validation_errors() {
//!                 eprintln!("{}: {}", issue.field, issue.message);
//!             }
//!         }
//!         eprintln!("request failed: {}", error_message(&err));
//!     }
//! }
//! # }
//! ```
//!
//! ## Interceptors
//!
//! Three chains hook into the pipeline: request interceptors rewrite the
//! outgoing request (endpoint included), response interceptors see the raw
//! response before success or failure is judged, and error interceptors may
//! replace an error or declare it handled, which short-circuits the call to
//! an empty successful result:
//!
//! ```no_run
//! use async_trait::async_trait;
//! use dataspect_client::{
//!     ApiError, Client, ErrorDisposition, ErrorInterceptor,
//! };
//! use std::sync::Arc;
//!
//! struct RedirectToLogin;
//!
//! #[async_trait]
//! impl ErrorInterceptor for RedirectToLogin {
//!     async fn intercept(&self, error: ApiError, _endpoint: &str) -> ErrorDisposition {
//!         if error.is_unauthorized() {
//!             // Kick off re-authentication out-of-band, swallow the error.
//!             return ErrorDisposition::Handled;
//!         }
//!         ErrorDisposition::Propagate(error)
//!     }
//! }
//!
//! # fn example(client: &Client) {
//! let handle = client.on_error(Arc::new(RedirectToLogin));
//! // ... later:
//! handle.remove();
//! # }
//! ```
//!
//! ## Deduplication
//!
//! Identical concurrent GET/HEAD calls (same method, endpoint, and body —
//! or the same explicit [`RequestOptions::dedup_key`]) share a single
//! underlying call, retries included; every caller observes the same
//! result. Deduplication is on by default and can be disabled globally
//! ([`ConfigUpdate::deduplication_enabled`]) or per call
//! ([`RequestOptions::skip_dedup`]).

mod client;
pub mod config;
mod dedup;
mod error;
pub mod interceptor;
pub mod request;
mod response;
pub mod retry;

pub use client::{Client, ClientBuilder};
pub use config::{ClientConfig, ConfigUpdate};
pub use error::{error_message, ApiError, Error, Result, ValidationIssue};
pub use interceptor::{
    ErrorDisposition, ErrorInterceptor, InterceptorHandle, RequestContext, RequestInterceptor,
    ResponseInterceptor,
};
pub use request::{QueryValue, RequestOptions, ResponseShape};
pub use response::{RawResponse, ResponseBody};
pub use retry::{with_retry, RetryOptions, TimeoutGuard};
