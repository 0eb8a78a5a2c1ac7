//! Interceptor chains for requests, responses, and errors.
//!
//! Each registry holds callbacks in registration order. Registering returns
//! an [`InterceptorHandle`] that removes exactly that entry, so two
//! interceptors with identical behavior can be added and removed
//! independently. Chains run strictly in registration order; each callback
//! receives the previous one's output.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use http::HeaderMap;
use serde_json::Value;

use crate::error::ApiError;
use crate::response::RawResponse;

/// The mutable parts of an outgoing request, as seen by request
/// interceptors.
///
/// An interceptor may rewrite any field, including the endpoint itself.
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// The relative endpoint path (joined under the configured base URL
    /// after the chain runs).
    pub endpoint: String,
    /// The outgoing headers.
    pub headers: HeaderMap,
    /// The JSON body, if any.
    pub body: Option<Value>,
}

/// Transforms an outgoing request before it is issued.
///
/// Returning an error aborts the attempt; the error is normalized and fed
/// through the retry loop like any other attempt failure.
#[async_trait]
pub trait RequestInterceptor: Send + Sync {
    async fn intercept(&self, context: RequestContext) -> Result<RequestContext, ApiError>;
}

/// Transforms a raw response after the transport call returns but before
/// success or failure is judged.
///
/// Rewriting the status here changes the downstream outcome — an
/// interceptor can turn a would-be failure into a success or vice versa.
#[async_trait]
pub trait ResponseInterceptor: Send + Sync {
    async fn intercept(&self, response: RawResponse, endpoint: &str) -> RawResponse;
}

/// The outcome of an error interceptor.
#[derive(Debug, Clone, PartialEq)]
pub enum ErrorDisposition {
    /// The error was handled out-of-band; the pipeline short-circuits to an
    /// empty successful result.
    Handled,
    /// Keep propagating. The carried error replaces the one fed to the next
    /// interceptor and, ultimately, the one thrown to the caller.
    Propagate(ApiError),
}

/// Inspects or replaces a pipeline error before the retry decision.
#[async_trait]
pub trait ErrorInterceptor: Send + Sync {
    async fn intercept(&self, error: ApiError, endpoint: &str) -> ErrorDisposition;
}

/// Removes the interceptor it was returned for. Dropping the handle without
/// calling [`remove`](InterceptorHandle::remove) leaves the interceptor
/// registered.
pub struct InterceptorHandle {
    unregister: Option<Box<dyn FnOnce() + Send>>,
}

impl InterceptorHandle {
    pub(crate) fn new(unregister: impl FnOnce() + Send + 'static) -> Self {
        Self {
            unregister: Some(Box::new(unregister)),
        }
    }

    /// Removes the interceptor from its registry.
    pub fn remove(mut self) {
        if let Some(unregister) = self.unregister.take() {
            unregister();
        }
    }
}

impl std::fmt::Debug for InterceptorHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InterceptorHandle").finish_non_exhaustive()
    }
}

/// An ordered list of interceptors with id-based removal.
pub(crate) struct Registry<T: ?Sized> {
    entries: Mutex<Vec<(u64, Arc<T>)>>,
    next_id: AtomicU64,
}

impl<T: ?Sized> Registry<T> {
    fn new() -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(0),
        }
    }

    pub(crate) fn add(&self, interceptor: Arc<T>) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.entries.lock().unwrap().push((id, interceptor));
        id
    }

    pub(crate) fn remove(&self, id: u64) {
        self.entries.lock().unwrap().retain(|(entry_id, _)| *entry_id != id);
    }

    fn clear(&self) {
        self.entries.lock().unwrap().clear();
    }

    /// Registration-order snapshot; the lock is never held across an await.
    fn snapshot(&self) -> Vec<Arc<T>> {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .map(|(_, interceptor)| interceptor.clone())
            .collect()
    }
}

/// The three registries of a client.
pub(crate) struct Interceptors {
    pub(crate) request: Registry<dyn RequestInterceptor>,
    pub(crate) response: Registry<dyn ResponseInterceptor>,
    pub(crate) error: Registry<dyn ErrorInterceptor>,
}

impl Interceptors {
    pub(crate) fn new() -> Self {
        Self {
            request: Registry::new(),
            response: Registry::new(),
            error: Registry::new(),
        }
    }

    pub(crate) fn clear(&self) {
        self.request.clear();
        self.response.clear();
        self.error.clear();
    }

    pub(crate) async fn run_request_chain(
        &self,
        mut context: RequestContext,
    ) -> Result<RequestContext, ApiError> {
        for interceptor in self.request.snapshot() {
            context = interceptor.intercept(context).await?;
        }
        Ok(context)
    }

    pub(crate) async fn run_response_chain(
        &self,
        mut response: RawResponse,
        endpoint: &str,
    ) -> RawResponse {
        for interceptor in self.response.snapshot() {
            response = interceptor.intercept(response, endpoint).await;
        }
        response
    }

    pub(crate) async fn run_error_chain(
        &self,
        mut error: ApiError,
        endpoint: &str,
    ) -> ErrorDisposition {
        for interceptor in self.error.snapshot() {
            match interceptor.intercept(error, endpoint).await {
                ErrorDisposition::Handled => return ErrorDisposition::Handled,
                ErrorDisposition::Propagate(next) => error = next,
            }
        }
        ErrorDisposition::Propagate(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct TagEndpoint(&'static str);

    #[async_trait]
    impl RequestInterceptor for TagEndpoint {
        async fn intercept(&self, mut context: RequestContext) -> Result<RequestContext, ApiError> {
            context.endpoint.push_str(self.0);
            Ok(context)
        }
    }

    struct SubstituteStatus(u16);

    #[async_trait]
    impl ErrorInterceptor for SubstituteStatus {
        async fn intercept(&self, mut error: ApiError, _endpoint: &str) -> ErrorDisposition {
            error.status = self.0;
            ErrorDisposition::Propagate(error)
        }
    }

    struct Swallow;

    #[async_trait]
    impl ErrorInterceptor for Swallow {
        async fn intercept(&self, _error: ApiError, _endpoint: &str) -> ErrorDisposition {
            ErrorDisposition::Handled
        }
    }

    fn context() -> RequestContext {
        RequestContext {
            endpoint: String::new(),
            headers: HeaderMap::new(),
            body: None,
        }
    }

    #[tokio::test]
    async fn request_chain_runs_in_registration_order() {
        let interceptors = Interceptors::new();
        interceptors.request.add(Arc::new(TagEndpoint("a")));
        interceptors.request.add(Arc::new(TagEndpoint("b")));

        let result = interceptors.run_request_chain(context()).await.unwrap();
        assert_eq!(result.endpoint, "ab");
    }

    #[tokio::test]
    async fn removal_targets_exactly_one_entry_among_duplicates() {
        let interceptors = Interceptors::new();
        let first = interceptors.request.add(Arc::new(TagEndpoint("x")));
        interceptors.request.add(Arc::new(TagEndpoint("x")));

        interceptors.request.remove(first);
        let result = interceptors.run_request_chain(context()).await.unwrap();
        assert_eq!(result.endpoint, "x");
    }

    #[tokio::test]
    async fn error_chain_feeds_substituted_error_forward() {
        let interceptors = Interceptors::new();
        interceptors.error.add(Arc::new(SubstituteStatus(503)));

        let disposition = interceptors
            .run_error_chain(ApiError::new(500, "Internal Server Error", None, true), "/x")
            .await;
        match disposition {
            ErrorDisposition::Propagate(error) => assert_eq!(error.status, 503),
            other => panic!("expected Propagate, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn error_chain_short_circuits_on_handled() {
        let interceptors = Interceptors::new();
        interceptors.error.add(Arc::new(Swallow));
        // A later interceptor must never run.
        interceptors.error.add(Arc::new(SubstituteStatus(599)));

        let disposition = interceptors
            .run_error_chain(ApiError::timeout(), "/x")
            .await;
        assert_eq!(disposition, ErrorDisposition::Handled);
    }

    #[tokio::test]
    async fn clear_empties_all_registries() {
        let interceptors = Interceptors::new();
        interceptors.request.add(Arc::new(TagEndpoint("a")));
        interceptors.error.add(Arc::new(Swallow));
        interceptors.clear();

        let result = interceptors.run_request_chain(context()).await.unwrap();
        assert_eq!(result.endpoint, "");
        let disposition = interceptors
            .run_error_chain(ApiError::timeout(), "/x")
            .await;
        assert!(matches!(disposition, ErrorDisposition::Propagate(_)));
    }
}
