//! Backoff computation and standalone retry utilities.
//!
//! The backoff calculator is a pure function of its inputs so it can be unit
//! tested with a fixed jitter fraction; [`backoff_delay`] is the sampling
//! wrapper the pipeline uses. [`with_retry`] applies the same algorithm to an
//! arbitrary async operation outside the HTTP pipeline, and [`TimeoutGuard`]
//! gives callers an ad hoc cancellation source for timeout composition.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::{DEFAULT_MAX_RETRIES, DEFAULT_RETRY_BASE_DELAY};

/// Upper bound on any single backoff delay.
pub const BACKOFF_CAP: Duration = Duration::from_secs(30);

/// Exclusive upper bound on the uniform jitter fraction.
pub const MAX_JITTER: f64 = 0.3;

/// Computes the backoff delay for a zero-based retry attempt with an
/// explicit jitter fraction.
///
/// The delay is `base * 2^attempt * (1 + jitter)`, capped at
/// [`BACKOFF_CAP`]. `jitter` is expected in `[0, 0.3)`.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use dataspect_client::retry::backoff_delay_with;
///
/// assert_eq!(
///     backoff_delay_with(2, Duration::from_millis(100), 0.0),
///     Duration::from_millis(400),
/// );
/// ```
pub fn backoff_delay_with(attempt: u32, base: Duration, jitter: f64) -> Duration {
    let multiplier = 2u32.saturating_pow(attempt);
    let delay = base.saturating_mul(multiplier).mul_f64(1.0 + jitter);
    delay.min(BACKOFF_CAP)
}

/// Computes the backoff delay for a zero-based retry attempt with a random
/// jitter fraction drawn from `U(0, 0.3)`.
pub fn backoff_delay(attempt: u32, base: Duration) -> Duration {
    let jitter = rand::thread_rng().gen_range(0.0..MAX_JITTER);
    backoff_delay_with(attempt, base, jitter)
}

/// Options for [`with_retry`].
#[derive(Debug, Clone)]
pub struct RetryOptions {
    /// Number of retries beyond the first attempt.
    pub max_retries: u32,
    /// Base delay for exponential backoff.
    pub base_delay: Duration,
}

impl Default for RetryOptions {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay: DEFAULT_RETRY_BASE_DELAY,
        }
    }
}

/// Runs an async operation with exponential backoff, independent of the HTTP
/// pipeline.
///
/// The caller-supplied predicate decides which errors are worth retrying;
/// delays follow the same jittered exponential curve as the request
/// pipeline.
///
/// # Examples
///
/// ```no_run
/// use std::time::Duration;
/// use dataspect_client::retry::{with_retry, RetryOptions};
///
/// # async fn example() -> Result<(), std::io::Error> {
/// let options = RetryOptions {
///     max_retries: 2,
///     base_delay: Duration::from_millis(100),
/// };
///
/// let contents = with_retry(
///     || async { tokio::fs::read_to_string("watchers.json").await },
///     &options,
///     |err| err.kind() == std::io::ErrorKind::Interrupted,
/// )
/// .await?;
/// # let _ = contents;
/// # Ok(())
/// # }
/// ```
pub async fn with_retry<T, E, F, Fut, P>(
    mut operation: F,
    options: &RetryOptions,
    should_retry: P,
) -> std::result::Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<T, E>>,
    P: Fn(&E) -> bool,
{
    let mut attempt: u32 = 0;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(error) => {
                if attempt >= options.max_retries || !should_retry(&error) {
                    return Err(error);
                }
                let delay = backoff_delay(attempt, options.base_delay);
                tracing::info!(
                    delay_ms = delay.as_millis() as u64,
                    attempt = attempt,
                    "retrying operation after backoff"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

/// A standalone timeout source: a cancellation token that fires after a
/// fixed duration unless disarmed.
///
/// Useful for composing an ad hoc timeout with
/// [`RequestOptions::cancel`](crate::RequestOptions) outside the pipeline's
/// own per-attempt timer. Dropping the guard disarms the timer; the token
/// stays in whatever state it reached.
///
/// # Examples
///
/// ```no_run
/// use std::time::Duration;
/// use dataspect_client::retry::TimeoutGuard;
///
/// # async fn example() {
/// let guard = TimeoutGuard::arm(Duration::from_secs(5));
/// let token = guard.token();
/// // ... pass `token` to a request, then on success:
/// guard.disarm();
/// # }
/// ```
#[derive(Debug)]
pub struct TimeoutGuard {
    token: CancellationToken,
    timer: JoinHandle<()>,
}

impl TimeoutGuard {
    /// Arms a timer that cancels the token after `after`.
    pub fn arm(after: Duration) -> Self {
        let token = CancellationToken::new();
        let timer = tokio::spawn({
            let token = token.clone();
            async move {
                tokio::time::sleep(after).await;
                token.cancel();
            }
        });
        Self { token, timer }
    }

    /// Returns a clone of the cancellation token.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Stops the timer without cancelling the token.
    pub fn disarm(&self) {
        self.timer.abort();
    }
}

impl Drop for TimeoutGuard {
    fn drop(&mut self) {
        self.timer.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn backoff_doubles_per_attempt_without_jitter() {
        let base = Duration::from_millis(100);
        assert_eq!(backoff_delay_with(0, base, 0.0), Duration::from_millis(100));
        assert_eq!(backoff_delay_with(1, base, 0.0), Duration::from_millis(200));
        assert_eq!(backoff_delay_with(2, base, 0.0), Duration::from_millis(400));
        assert_eq!(backoff_delay_with(3, base, 0.0), Duration::from_millis(800));
    }

    #[test]
    fn backoff_jitter_scales_the_delay() {
        let base = Duration::from_millis(100);
        assert_eq!(backoff_delay_with(1, base, 0.3), Duration::from_millis(260));
    }

    #[test]
    fn backoff_is_capped() {
        let base = Duration::from_secs(1);
        assert_eq!(backoff_delay_with(10, base, 0.0), BACKOFF_CAP);
        // The cap applies after jitter too.
        assert_eq!(backoff_delay_with(5, Duration::from_secs(29), 0.29), BACKOFF_CAP);
    }

    #[test]
    fn sampled_backoff_stays_within_jitter_bounds() {
        let base = Duration::from_millis(100);
        for attempt in 0..4 {
            let delay = backoff_delay(attempt, base);
            let floor = backoff_delay_with(attempt, base, 0.0);
            let ceiling = backoff_delay_with(attempt, base, MAX_JITTER);
            assert!(delay >= floor, "delay {delay:?} below floor {floor:?}");
            assert!(delay <= ceiling, "delay {delay:?} above ceiling {ceiling:?}");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn with_retry_retries_until_success() {
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();

        let result = with_retry(
            move || {
                let calls = calls_clone.clone();
                async move {
                    if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err("transient")
                    } else {
                        Ok(42)
                    }
                }
            },
            &RetryOptions {
                max_retries: 3,
                base_delay: Duration::from_millis(10),
            },
            |_| true,
        )
        .await;

        assert_eq!(result, Ok(42));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn with_retry_stops_when_predicate_rejects() {
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();

        let result: std::result::Result<(), &str> = with_retry(
            move || {
                let calls = calls_clone.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err("fatal")
                }
            },
            &RetryOptions {
                max_retries: 5,
                base_delay: Duration::from_millis(10),
            },
            |err: &&str| *err != "fatal",
        )
        .await;

        assert_eq!(result, Err("fatal"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn with_retry_exhausts_the_budget() {
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();

        let result: std::result::Result<(), &str> = with_retry(
            move || {
                let calls = calls_clone.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err("transient")
                }
            },
            &RetryOptions {
                max_retries: 2,
                base_delay: Duration::from_millis(10),
            },
            |_| true,
        )
        .await;

        assert_eq!(result, Err("transient"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn timeout_guard_cancels_after_deadline() {
        let guard = TimeoutGuard::arm(Duration::from_millis(10));
        let token = guard.token();
        token.cancelled().await;
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn disarmed_guard_never_fires() {
        let guard = TimeoutGuard::arm(Duration::from_millis(10));
        let token = guard.token();
        guard.disarm();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!token.is_cancelled());
    }
}
