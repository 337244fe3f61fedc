//! Bounded retry with exponential backoff and a wall-clock budget.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::time::Instant;

use crate::error::Result;
use crate::error::TransferError;

const DEFAULT_MAX_DURATION: Duration = Duration::from_millis(60_000);
const DEFAULT_INITIAL_DELAY: Duration = Duration::from_millis(100);
const DEFAULT_BACKOFF: f64 = 2.0;
const DEFAULT_SOCKET_TIMEOUT: Duration = Duration::from_millis(30_000);
const JITTER_MAX_MS: u64 = 100;

/// Environment override for the retry duration budget, in milliseconds.
pub const ENV_MAX_RETRY: &str = "HTTPTRANSFER_MAX_RETRY";
/// Environment override for the initial retry delay, in milliseconds.
pub const ENV_INITIAL_WAIT: &str = "HTTPTRANSFER_INITIAL_WAIT";
/// Environment override for the backoff multiplier.
pub const ENV_BACKOFF: &str = "HTTPTRANSFER_BACKOFF";
/// Environment override for the socket timeout, in milliseconds.
pub const ENV_SOCKET_TIMEOUT: &str = "HTTPTRANSFER_SOCKET_TIMEOUT";

/// Context passed to the retried operation on each attempt.
#[derive(Debug, Clone, Copy)]
pub struct Attempt {
    /// 1-based attempt number.
    pub number: u32,
    /// Effective per-request socket timeout for this attempt.
    pub socket_timeout: Duration,
}

/// Retry policy for idempotent-by-range HTTP operations.
///
/// Connect errors, stream errors, and 5xx responses are retried with
/// exponential backoff plus up to 100 ms of random jitter, until either
/// the attempt budget (`max_attempts`, when set) or the wall-clock budget
/// (`max_duration`, otherwise) is exhausted. 4xx responses are retried
/// only when `retry_all_errors` is set or the user predicate accepts them.
///
/// # Examples
/// ```no_run
/// # use std::time::Duration;
/// # use httptransfer::RetryPolicy;
/// let policy = RetryPolicy::new()
///     .max_attempts(5)
///     .initial_delay(Duration::from_millis(50))
///     .retry_all_errors(false);
/// ```
#[derive(Clone)]
pub struct RetryPolicy {
    enabled: bool,
    max_duration: Duration,
    max_attempts: Option<u32>,
    initial_delay: Duration,
    backoff: f64,
    retry_all_errors: bool,
    socket_timeout: Duration,
    retry_on_response: Option<Arc<dyn Fn(&TransferError) -> bool + Send + Sync>>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            max_duration: DEFAULT_MAX_DURATION,
            max_attempts: None,
            initial_delay: DEFAULT_INITIAL_DELAY,
            backoff: DEFAULT_BACKOFF,
            retry_all_errors: false,
            socket_timeout: DEFAULT_SOCKET_TIMEOUT,
            retry_on_response: None,
        }
    }
}

impl RetryPolicy {
    /// Create a policy with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a policy with defaults overridden from the environment.
    ///
    /// Reads [`ENV_MAX_RETRY`], [`ENV_INITIAL_WAIT`], [`ENV_BACKOFF`], and
    /// [`ENV_SOCKET_TIMEOUT`]; unparseable values are ignored.
    pub fn from_env() -> Self {
        let mut policy = Self::default();
        if let Some(ms) = env_u64(ENV_MAX_RETRY) {
            policy.max_duration = Duration::from_millis(ms);
        }
        if let Some(ms) = env_u64(ENV_INITIAL_WAIT) {
            policy.initial_delay = Duration::from_millis(ms);
        }
        if let Some(backoff) = env_f64(ENV_BACKOFF) {
            policy.backoff = backoff;
        }
        if let Some(ms) = env_u64(ENV_SOCKET_TIMEOUT) {
            policy.socket_timeout = Duration::from_millis(ms);
        }
        policy
    }

    /// Enable or disable retry entirely (default: enabled).
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Set the wall-clock retry budget (default: 60 s).
    pub fn max_duration(mut self, max_duration: Duration) -> Self {
        self.max_duration = max_duration;
        self
    }

    /// Cap the total number of attempts. Overrides the duration budget.
    pub fn max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts.max(1));
        self
    }

    /// Set the delay before the first retry (default: 100 ms).
    pub fn initial_delay(mut self, initial_delay: Duration) -> Self {
        self.initial_delay = initial_delay;
        self
    }

    /// Set the backoff multiplier applied after each retry (default: 2.0).
    pub fn backoff(mut self, backoff: f64) -> Self {
        self.backoff = backoff.max(1.0);
        self
    }

    /// Retry every error, including 4xx responses (default: false).
    pub fn retry_all_errors(mut self, retry_all_errors: bool) -> Self {
        self.retry_all_errors = retry_all_errors;
        self
    }

    /// Set the per-request socket timeout (default: 30 s).
    pub fn socket_timeout(mut self, socket_timeout: Duration) -> Self {
        self.socket_timeout = socket_timeout;
        self
    }

    /// Add a predicate consulted for response errors not already retried.
    pub fn retry_on_response<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&TransferError) -> bool + Send + Sync + 'static,
    {
        self.retry_on_response = Some(Arc::new(predicate));
        self
    }

    /// Cap the retry budget by an enclosing deadline.
    ///
    /// Shrinks `max_duration` to the time remaining, and halves the socket
    /// timeout into the remaining budget when it would otherwise leave no
    /// room for a retry.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining < self.max_duration {
            self.max_duration = remaining;
        }
        if self.socket_timeout > self.max_duration {
            self.socket_timeout = self.max_duration / 2;
        }
        self
    }

    /// The effective per-request socket timeout.
    pub fn effective_socket_timeout(&self) -> Duration {
        self.socket_timeout
    }

    /// Run `op` until it succeeds or the retry budget is exhausted.
    ///
    /// On exhaustion the last error is returned unchanged.
    pub async fn retry<T, F, Fut>(&self, mut op: F) -> Result<T>
    where
        F: FnMut(Attempt) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let start = Instant::now();
        let mut delay = self.initial_delay;
        let mut attempt: u32 = 1;

        loop {
            let context = Attempt {
                number: attempt,
                socket_timeout: self.socket_timeout,
            };
            match op(context).await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    if !self.enabled || !self.should_retry(attempt, start.elapsed(), delay, &err) {
                        return Err(err);
                    }
                    let jitter = Duration::from_millis(rand::thread_rng().gen_range(0..JITTER_MAX_MS));
                    tracing::warn!(attempt, ?delay, error = %err, "retrying after error");
                    tokio::time::sleep(delay + jitter).await;
                    delay = delay.mul_f64(self.backoff);
                    attempt += 1;
                }
            }
        }
    }

    fn should_retry(
        &self,
        attempt: u32,
        elapsed: Duration,
        next_delay: Duration,
        err: &TransferError,
    ) -> bool {
        match self.max_attempts {
            Some(max) => {
                if attempt >= max {
                    return false;
                }
            }
            None => {
                if elapsed + next_delay >= self.max_duration {
                    return false;
                }
            }
        }
        if err.is_connect() || err.is_stream() {
            return true;
        }
        if let Some(status) = err.status() {
            if status >= 500 || self.retry_all_errors {
                return true;
            }
            if let Some(predicate) = &self.retry_on_response
                && predicate(err)
            {
                return true;
            }
        }
        false
    }
}

impl std::fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("enabled", &self.enabled)
            .field("max_duration", &self.max_duration)
            .field("max_attempts", &self.max_attempts)
            .field("initial_delay", &self.initial_delay)
            .field("backoff", &self.backoff)
            .field("retry_all_errors", &self.retry_all_errors)
            .field("socket_timeout", &self.socket_timeout)
            .field(
                "retry_on_response",
                &self.retry_on_response.as_ref().map(|_| "<predicate>"),
            )
            .finish()
    }
}

fn env_u64(name: &str) -> Option<u64> {
    std::env::var(name).ok()?.trim().parse().ok()
}

fn env_f64(name: &str) -> Option<f64> {
    std::env::var(name).ok()?.trim().parse().ok()
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    fn connect_error() -> TransferError {
        TransferError::Connect("refused".to_string())
    }

    fn response_error(status: u16) -> TransferError {
        TransferError::Response {
            status,
            message: "error".to_string(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn honors_max_attempts_exactly() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new().max_attempts(3);
        let result: Result<()> = policy
            .retry(|_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(connect_error()) }
            })
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn max_attempts_overrides_duration() {
        // A zero duration budget would normally forbid any retry.
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new()
            .max_duration(Duration::ZERO)
            .max_attempts(2);
        let result: Result<()> = policy
            .retry(|_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(connect_error()) }
            })
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn duration_budget_stops_retries() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new()
            .max_duration(Duration::from_millis(350))
            .initial_delay(Duration::from_millis(100));
        let result: Result<()> = policy
            .retry(|_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(connect_error()) }
            })
            .await;
        assert!(result.is_err());
        // 100ms + 200ms delays fit the budget; the 400ms delay would not.
        let made = calls.load(Ordering::SeqCst);
        assert!((2..=3).contains(&made), "made {made} attempts");
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new().max_attempts(5);
        let result = policy
            .retry(|attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt.number < 3 {
                        Err(response_error(503))
                    } else {
                        Ok(attempt.number)
                    }
                }
            })
            .await
            .unwrap();
        assert_eq!(result, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn client_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new().max_attempts(5);
        let result: Result<()> = policy
            .retry(|_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(response_error(400)) }
            })
            .await;
        assert_eq!(result.unwrap_err().status(), Some(400));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn retry_all_errors_retries_client_errors() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new().max_attempts(2).retry_all_errors(true);
        let result: Result<()> = policy
            .retry(|_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(response_error(400)) }
            })
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn user_predicate_extends_retryable_set() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new()
            .max_attempts(2)
            .retry_on_response(|err| err.status() == Some(429));
        let result: Result<()> = policy
            .retry(|_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(response_error(429)) }
            })
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn disabled_policy_makes_one_attempt() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new().enabled(false);
        let result: Result<()> = policy
            .retry(|_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(connect_error()) }
            })
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn non_retryable_errors_stop_immediately() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new().max_attempts(5);
        let result: Result<()> = policy
            .retry(|_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(TransferError::NotSupported) }
            })
            .await;
        assert!(matches!(result.unwrap_err(), TransferError::NotSupported));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_shrinks_socket_timeout() {
        let policy = RetryPolicy::new()
            .socket_timeout(Duration::from_secs(30))
            .with_deadline(Instant::now() + Duration::from_secs(10));
        assert_eq!(policy.effective_socket_timeout(), Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_keeps_smaller_socket_timeout() {
        let policy = RetryPolicy::new()
            .socket_timeout(Duration::from_secs(2))
            .with_deadline(Instant::now() + Duration::from_secs(10));
        assert_eq!(policy.effective_socket_timeout(), Duration::from_secs(2));
    }

    #[test]
    fn from_env_reads_overrides() {
        temp_env::with_vars(
            [
                (ENV_MAX_RETRY, Some("5000")),
                (ENV_INITIAL_WAIT, Some("10")),
                (ENV_BACKOFF, Some("3.0")),
                (ENV_SOCKET_TIMEOUT, Some("1000")),
            ],
            || {
                let policy = RetryPolicy::from_env();
                assert_eq!(policy.max_duration, Duration::from_millis(5000));
                assert_eq!(policy.initial_delay, Duration::from_millis(10));
                assert_eq!(policy.backoff, 3.0);
                assert_eq!(policy.socket_timeout, Duration::from_millis(1000));
            },
        );
    }

    #[test]
    fn from_env_ignores_garbage() {
        temp_env::with_vars([(ENV_MAX_RETRY, Some("not-a-number"))], || {
            let policy = RetryPolicy::from_env();
            assert_eq!(policy.max_duration, DEFAULT_MAX_DURATION);
        });
    }
}
