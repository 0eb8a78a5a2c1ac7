//! Client configuration.
//!
//! Every [`Client`](crate::Client) owns its own [`ClientConfig`], so multiple
//! independently configured clients can coexist in one process (and tests can
//! build isolated instances). Configuration is read through a snapshot
//! accessor and updated through an explicit merge, never mutated in place by
//! callers.

use std::collections::BTreeSet;
use std::time::Duration;

use url::Url;

/// HTTP statuses retried by default: request timeout, rate limiting, and the
/// transient 5xx family.
pub const DEFAULT_RETRYABLE_STATUS_CODES: [u16; 6] = [408, 429, 500, 502, 503, 504];

/// Default per-attempt timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default retry budget (retries beyond the first attempt).
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default base delay for exponential backoff.
pub const DEFAULT_RETRY_BASE_DELAY: Duration = Duration::from_secs(1);

/// Settings that apply to every request made through a client.
///
/// Obtain a snapshot with [`Client::config`](crate::Client::config) and apply
/// changes with [`Client::configure`](crate::Client::configure). The snapshot
/// is a defensive copy: mutating it has no effect on the live client.
///
/// # Examples
///
/// ```no_run
/// use dataspect_client::{Client, ConfigUpdate};
///
/// # fn example() -> Result<(), dataspect_client::Error> {
/// let client = Client::builder()
///     .base_url("https://dashboard.example.com/api/v1")?
///     .build()?;
///
/// client.configure(ConfigUpdate::new().max_retries(5));
/// assert_eq!(client.config().max_retries, 5);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Prefix prepended to every relative endpoint path, including the
    /// versioned API prefix (e.g. `https://host/api/v1`).
    pub base_url: Url,

    /// Default per-attempt timeout. A per-call override takes precedence.
    pub timeout: Duration,

    /// Default number of retries, not counting the first attempt.
    pub max_retries: u32,

    /// Base delay for exponential backoff between attempts.
    pub retry_base_delay: Duration,

    /// HTTP statuses eligible for retry.
    pub retryable_status_codes: BTreeSet<u16>,

    /// Whether identical concurrent GET/HEAD requests share one transport
    /// call.
    pub deduplication_enabled: bool,
}

impl ClientConfig {
    /// Creates a configuration with the crate defaults for the given base
    /// URL.
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            timeout: DEFAULT_TIMEOUT,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_base_delay: DEFAULT_RETRY_BASE_DELAY,
            retryable_status_codes: DEFAULT_RETRYABLE_STATUS_CODES.into_iter().collect(),
            deduplication_enabled: true,
        }
    }

    /// Merges the `Some` fields of `update` into this configuration.
    ///
    /// Later updates fully override earlier values for the same field; fields
    /// left as `None` are untouched.
    pub fn apply(&mut self, update: ConfigUpdate) {
        if let Some(base_url) = update.base_url {
            self.base_url = base_url;
        }
        if let Some(timeout) = update.timeout {
            self.timeout = timeout;
        }
        if let Some(max_retries) = update.max_retries {
            self.max_retries = max_retries;
        }
        if let Some(retry_base_delay) = update.retry_base_delay {
            self.retry_base_delay = retry_base_delay;
        }
        if let Some(codes) = update.retryable_status_codes {
            self.retryable_status_codes = codes;
        }
        if let Some(enabled) = update.deduplication_enabled {
            self.deduplication_enabled = enabled;
        }
    }
}

/// A partial configuration for merge-updates.
///
/// Only the fields set through the builder methods are applied; everything
/// else keeps its current value.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use dataspect_client::ConfigUpdate;
///
/// let update = ConfigUpdate::new()
///     .timeout(Duration::from_secs(10))
///     .deduplication_enabled(false);
/// ```
#[derive(Debug, Clone, Default)]
pub struct ConfigUpdate {
    base_url: Option<Url>,
    timeout: Option<Duration>,
    max_retries: Option<u32>,
    retry_base_delay: Option<Duration>,
    retryable_status_codes: Option<BTreeSet<u16>>,
    deduplication_enabled: Option<bool>,
}

impl ConfigUpdate {
    /// Creates an empty update.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the base URL.
    pub fn base_url(mut self, base_url: Url) -> Self {
        self.base_url = Some(base_url);
        self
    }

    /// Replaces the default per-attempt timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Replaces the default retry budget.
    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    /// Replaces the backoff base delay.
    pub fn retry_base_delay(mut self, delay: Duration) -> Self {
        self.retry_base_delay = Some(delay);
        self
    }

    /// Replaces the set of retryable HTTP statuses.
    pub fn retryable_status_codes(mut self, codes: impl IntoIterator<Item = u16>) -> Self {
        self.retryable_status_codes = Some(codes.into_iter().collect());
        self
    }

    /// Enables or disables request deduplication globally.
    pub fn deduplication_enabled(mut self, enabled: bool) -> Self {
        self.deduplication_enabled = Some(enabled);
        self
    }
}
