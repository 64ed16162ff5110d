//! Bounded retries for transient backend failures
//!
//! A [`RetryPolicy`] decides whether a failure is worth another attempt and
//! how long to wait; [`RetryExecutor`] runs an async operation under a
//! policy. Retry is always opt-in: the manager never retries on its own.
//!
//! ```ignore
//! let executor = RetryExecutor::new(network_policy());
//! let clusters = executor.execute(&ctx, || provider.list(&ctx)).await?;
//! ```

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use kubeforge_core::ClusterError;

/// Phrases retried by a default [`ExponentialBackoffPolicy`]
pub const DEFAULT_RETRYABLE_PHRASES: &[&str] = &[
    "network timeout",
    "connection refused",
    "temporary failure",
    "resource not ready",
    "cluster not ready",
    "service unavailable",
];

/// An error that may carry its own retry verdict
///
/// `Some(_)` from [`recoverable`](Recoverable::recoverable) overrides the
/// policy; `None` lets the policy match the error text against its phrases.
pub trait Recoverable: fmt::Display {
    fn recoverable(&self) -> Option<bool> {
        None
    }

    /// Delay the error asks for before the next attempt
    fn retry_after(&self) -> Option<Duration> {
        None
    }
}

/// Marker produced when the context is cancelled between attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cancelled;

impl fmt::Display for Cancelled {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("operation cancelled")
    }
}

impl std::error::Error for Cancelled {}

impl From<Cancelled> for ClusterError {
    fn from(_: Cancelled) -> Self {
        ClusterError::Cancelled
    }
}

impl Recoverable for ClusterError {
    fn recoverable(&self) -> Option<bool> {
        match self {
            ClusterError::Cancelled
            | ClusterError::InvalidConfig { .. }
            | ClusterError::ProviderNotFound { .. }
            | ClusterError::Spawn { .. }
            | ClusterError::Unsupported { .. } => Some(false),
            ClusterError::Operation { source, .. } => source.recoverable(),
            _ => None,
        }
    }
}

/// An error that is always worth retrying
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransientError {
    pub message: String,
    pub retry_after: Option<Duration>,
}

impl TransientError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retry_after: None,
        }
    }

    pub fn with_retry_after(mut self, delay: Duration) -> Self {
        self.retry_after = Some(delay);
        self
    }
}

impl fmt::Display for TransientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "transient error: {}", self.message)
    }
}

impl std::error::Error for TransientError {}

impl Recoverable for TransientError {
    fn recoverable(&self) -> Option<bool> {
        Some(true)
    }

    fn retry_after(&self) -> Option<Duration> {
        self.retry_after
    }
}

/// Decides whether and when to retry
///
/// Policies hold no mutable state, so one instance can back any number of
/// concurrent executions.
pub trait RetryPolicy: Send + Sync {
    /// `attempt` is the 0-based index of the attempt that just failed
    fn should_retry(&self, err: &dyn Recoverable, attempt: u32) -> bool;

    /// Wait before retry number `attempt` (1-based)
    fn delay(&self, attempt: u32) -> Duration;

    fn max_attempts(&self) -> u32;

    /// Upper bound for any wait, including server-suggested ones
    fn max_delay(&self) -> Option<Duration> {
        None
    }
}

fn classify(err: &dyn Recoverable, phrases: &[String]) -> bool {
    if let Some(verdict) = err.recoverable() {
        return verdict;
    }
    let text = err.to_string().to_lowercase();
    phrases.iter().any(|phrase| text.contains(phrase.as_str()))
}

fn lowercase_all<I, S>(phrases: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    phrases
        .into_iter()
        .map(|p| p.as_ref().to_lowercase())
        .collect()
}

/// Exponential backoff with an optional ±10% jitter
///
/// `delay(n) = min(max_delay, base_delay * multiplier^(n-1))`, jittered after
/// capping.
#[derive(Debug, Clone)]
pub struct ExponentialBackoffPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
    pub jitter: bool,
    retryable: Vec<String>,
}

impl Default for ExponentialBackoffPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            jitter: true,
            retryable: lowercase_all(DEFAULT_RETRYABLE_PHRASES),
        }
    }
}

impl ExponentialBackoffPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            max_delay,
            ..Default::default()
        }
    }

    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Replace the retryable phrases (matched case-insensitively)
    pub fn with_retryable<I, S>(mut self, phrases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.retryable = lowercase_all(phrases);
        self
    }

    pub fn retryable_phrases(&self) -> &[String] {
        &self.retryable
    }
}

impl RetryPolicy for ExponentialBackoffPolicy {
    fn should_retry(&self, err: &dyn Recoverable, attempt: u32) -> bool {
        if attempt >= self.max_attempts {
            return false;
        }
        classify(err, &self.retryable)
    }

    fn delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let raw = self.base_delay.as_secs_f64() * self.multiplier.powi(exponent);
        let capped = raw.min(self.max_delay.as_secs_f64());

        let secs = if self.jitter {
            capped * rand::rng().random_range(0.9..=1.1)
        } else {
            capped
        };
        Duration::try_from_secs_f64(secs.max(0.0)).unwrap_or(Duration::MAX)
    }

    fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    fn max_delay(&self) -> Option<Duration> {
        Some(self.max_delay)
    }
}

/// Linear backoff: `delay(n) = base_delay + n * increment`
#[derive(Debug, Clone)]
pub struct LinearBackoffPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub increment: Duration,
    retryable: Vec<String>,
}

impl LinearBackoffPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, increment: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            increment,
            retryable: lowercase_all(DEFAULT_RETRYABLE_PHRASES),
        }
    }

    pub fn with_retryable<I, S>(mut self, phrases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.retryable = lowercase_all(phrases);
        self
    }
}

impl RetryPolicy for LinearBackoffPolicy {
    fn should_retry(&self, err: &dyn Recoverable, attempt: u32) -> bool {
        if attempt >= self.max_attempts {
            return false;
        }
        classify(err, &self.retryable)
    }

    fn delay(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_add(self.increment.saturating_mul(attempt))
    }

    fn max_attempts(&self) -> u32 {
        self.max_attempts
    }
}

/// Tuned for flaky network calls
pub fn network_policy() -> ExponentialBackoffPolicy {
    ExponentialBackoffPolicy::new(5, Duration::from_secs(2), Duration::from_secs(30)).with_retryable([
        "network timeout",
        "connection refused",
        "connection reset",
        "no route to host",
        "dns resolution failed",
        "tls handshake timeout",
    ])
}

/// Tuned for polling until a resource becomes ready
pub fn resource_policy() -> ExponentialBackoffPolicy {
    ExponentialBackoffPolicy::new(10, Duration::from_secs(5), Duration::from_secs(120)).with_retryable([
        "resource not ready",
        "cluster not ready",
        "service unavailable",
        "temporarily unavailable",
        "resource busy",
    ])
}

/// Tuned for long-running installation steps
pub fn installation_policy() -> ExponentialBackoffPolicy {
    ExponentialBackoffPolicy::new(3, Duration::from_secs(10), Duration::from_secs(300)).with_retryable([
        "helm not ready",
        "tiller not ready",
        "resource conflict",
        "temporary failure",
        "rate limited",
    ])
}

/// Named policy selectable from configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetryPreset {
    #[default]
    None,
    Network,
    Resource,
    Installation,
}

impl RetryPreset {
    /// The policy for this preset, `None` when retries are disabled
    pub fn policy(self) -> Option<ExponentialBackoffPolicy> {
        match self {
            Self::None => None,
            Self::Network => Some(network_policy()),
            Self::Resource => Some(resource_policy()),
            Self::Installation => Some(installation_policy()),
        }
    }
}

impl fmt::Display for RetryPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::None => "none",
            Self::Network => "network",
            Self::Resource => "resource",
            Self::Installation => "installation",
        };
        f.write_str(s)
    }
}

type RetryCallback = Arc<dyn Fn(&dyn Recoverable, u32, Duration) + Send + Sync>;

/// Runs an async operation under a [`RetryPolicy`]
#[derive(Clone)]
pub struct RetryExecutor {
    policy: Arc<dyn RetryPolicy>,
    on_retry: Option<RetryCallback>,
}

impl fmt::Debug for RetryExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryExecutor")
            .field("max_attempts", &self.policy.max_attempts())
            .field("on_retry", &self.on_retry.is_some())
            .finish()
    }
}

impl RetryExecutor {
    pub fn new(policy: impl RetryPolicy + 'static) -> Self {
        Self::from_arc(Arc::new(policy))
    }

    pub fn from_arc(policy: Arc<dyn RetryPolicy>) -> Self {
        Self {
            policy,
            on_retry: None,
        }
    }

    /// Observe each retry as `(error, attempt number, delay)`
    ///
    /// Replaces the default `warn!` log line.
    pub fn with_retry_callback<F>(mut self, callback: F) -> Self
    where
        F: Fn(&dyn Recoverable, u32, Duration) + Send + Sync + 'static,
    {
        self.on_retry = Some(Arc::new(callback));
        self
    }

    pub fn policy(&self) -> &dyn RetryPolicy {
        self.policy.as_ref()
    }

    /// Run `op` until it succeeds, the policy gives up, or `ctx` is cancelled
    ///
    /// Returns the most recent error when attempts run out, and
    /// `E::from(Cancelled)` when cancelled before an attempt or while
    /// waiting between attempts.
    pub async fn execute<T, E, F, Fut>(&self, ctx: &CancellationToken, mut op: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Recoverable + From<Cancelled>,
    {
        let max_attempts = self.policy.max_attempts().max(1);
        let mut attempt = 0u32;

        loop {
            if ctx.is_cancelled() {
                return Err(E::from(Cancelled));
            }

            let err = match op().await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            if attempt + 1 >= max_attempts || !self.policy.should_retry(&err, attempt) {
                return Err(err);
            }

            let delay = match (err.retry_after(), self.policy.max_delay()) {
                (Some(after), Some(max)) => after.min(max),
                (Some(after), None) => after,
                (None, _) => self.policy.delay(attempt + 1),
            };
            self.notify(&err, attempt + 1, delay);

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = ctx.cancelled() => return Err(E::from(Cancelled)),
            }

            attempt += 1;
        }
    }

    fn notify(&self, err: &dyn Recoverable, attempt: u32, delay: Duration) {
        match &self.on_retry {
            Some(callback) => callback(err, attempt, delay),
            None => warn!(
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "operation failed, retrying"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn command_failed(stderr: &str) -> ClusterError {
        ClusterError::CommandFailed {
            command: "k3d cluster list".to_string(),
            code: Some(1),
            stderr: stderr.to_string(),
        }
    }

    fn fast_policy(max_attempts: u32) -> ExponentialBackoffPolicy {
        ExponentialBackoffPolicy::new(max_attempts, Duration::from_millis(1), Duration::from_millis(5))
            .with_jitter(false)
    }

    fn within_jitter(actual: Duration, expected: Duration) -> bool {
        let lo = expected.as_secs_f64() * 0.9 - 1e-9;
        let hi = expected.as_secs_f64() * 1.1 + 1e-9;
        (lo..=hi).contains(&actual.as_secs_f64())
    }

    #[test]
    fn test_exponential_delay_with_jitter() {
        let policy = ExponentialBackoffPolicy::new(3, Duration::from_secs(1), Duration::from_secs(30));

        for _ in 0..50 {
            assert!(within_jitter(policy.delay(1), Duration::from_secs(1)));
            assert!(within_jitter(policy.delay(2), Duration::from_secs(2)));
            assert!(within_jitter(policy.delay(3), Duration::from_secs(4)));
        }
    }

    #[test]
    fn test_exponential_delay_is_capped() {
        let policy = ExponentialBackoffPolicy::new(10, Duration::from_secs(1), Duration::from_secs(5))
            .with_jitter(false);

        assert_eq!(policy.delay(1), Duration::from_secs(1));
        assert_eq!(policy.delay(3), Duration::from_secs(4));
        assert_eq!(policy.delay(4), Duration::from_secs(5));
        assert_eq!(policy.delay(40), Duration::from_secs(5));
    }

    #[test]
    fn test_exponential_delay_saturates_near_duration_max() {
        let policy = ExponentialBackoffPolicy::new(64, Duration::from_secs(1), Duration::MAX);

        for _ in 0..50 {
            assert!(policy.delay(66) > Duration::from_secs(u64::MAX / 2));
        }
        assert!(policy.with_jitter(false).delay(200) > Duration::from_secs(u64::MAX / 2));
    }

    #[test]
    fn test_should_retry_stops_at_max_attempts() {
        let policy = ExponentialBackoffPolicy::new(3, Duration::from_secs(1), Duration::from_secs(30));
        let transient = TransientError::new("anything");

        assert!(policy.should_retry(&transient, 0));
        assert!(policy.should_retry(&transient, 2));
        assert!(!policy.should_retry(&transient, 3));
        assert!(!policy.should_retry(&command_failed("connection refused"), 3));
    }

    #[test]
    fn test_phrase_matching_is_case_insensitive() {
        let policy = ExponentialBackoffPolicy::default();

        assert!(policy.should_retry(&command_failed("dial tcp: Connection Refused"), 0));
        assert!(policy.should_retry(&command_failed("CLUSTER NOT READY yet"), 0));
        assert!(!policy.should_retry(&command_failed("invalid flag --bogus"), 0));
    }

    #[test]
    fn test_error_verdict_overrides_phrases() {
        let policy = ExponentialBackoffPolicy::default();

        let spawn = ClusterError::Spawn {
            program: "k3d".to_string(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "connection refused"),
        };
        assert!(!policy.should_retry(&spawn, 0));

        let invalid = ClusterError::invalid_config("name", "", "connection refused");
        assert!(!policy.should_retry(&invalid, 0));

        let wrapped = ClusterError::operation("create", "dev", command_failed("network timeout"));
        assert!(policy.should_retry(&wrapped, 0));

        assert!(!policy.should_retry(&ClusterError::Cancelled, 0));
    }

    #[test]
    fn test_linear_delay() {
        let policy = LinearBackoffPolicy::new(5, Duration::from_secs(1), Duration::from_millis(500));
        assert_eq!(policy.delay(1), Duration::from_millis(1500));
        assert_eq!(policy.delay(4), Duration::from_secs(3));
        assert!(!policy.should_retry(&TransientError::new("x"), 5));
    }

    #[test]
    fn test_presets_differ_only_in_tuning() {
        let network = network_policy();
        assert_eq!(network.max_attempts, 5);
        assert_eq!(network.base_delay, Duration::from_secs(2));
        assert_eq!(network.max_delay, Duration::from_secs(30));
        assert!(network.should_retry(&command_failed("connection reset by peer"), 0));
        assert!(!network.should_retry(&command_failed("cluster not ready"), 0));

        let resource = resource_policy();
        assert_eq!(resource.max_attempts, 10);
        assert!(resource.should_retry(&command_failed("resource busy"), 0));

        let install = installation_policy();
        assert_eq!(install.max_attempts, 3);
        assert_eq!(install.max_delay, Duration::from_secs(300));
        assert!(install.should_retry(&command_failed("rate limited"), 0));

        assert!(RetryPreset::None.policy().is_none());
        assert_eq!(RetryPreset::Resource.policy().map(|p| p.max_attempts), Some(10));
    }

    #[tokio::test]
    async fn test_execute_succeeds_after_transient_failures() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let executor = RetryExecutor::new(fast_policy(5));
        let ctx = CancellationToken::new();

        let result: Result<u32, ClusterError> = executor
            .execute(&ctx, || {
                let c = c.clone();
                async move {
                    match c.fetch_add(1, Ordering::SeqCst) {
                        0 | 1 => Err(command_failed("service unavailable")),
                        n => Ok(n),
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_execute_returns_last_error_when_exhausted() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let executor = RetryExecutor::new(fast_policy(3));
        let ctx = CancellationToken::new();

        let result: Result<(), ClusterError> = executor
            .execute(&ctx, || {
                let n = c.fetch_add(1, Ordering::SeqCst);
                async move { Err(command_failed(&format!("network timeout #{}", n))) }
            })
            .await;

        let err = result.unwrap_err();
        assert!(err.to_string().contains("network timeout #2"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_execute_fails_fast_on_unmatched_error() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let executor = RetryExecutor::new(fast_policy(5));
        let ctx = CancellationToken::new();

        let result: Result<(), ClusterError> = executor
            .execute(&ctx, || {
                c.fetch_add(1, Ordering::SeqCst);
                async { Err(command_failed("unknown flag: --bogus")) }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_observer_sees_one_based_attempts() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = seen.clone();
        let executor = RetryExecutor::new(fast_policy(3)).with_retry_callback(move |err, attempt, delay| {
            s.lock().unwrap().push((err.to_string(), attempt, delay));
        });
        let ctx = CancellationToken::new();

        let _: Result<(), ClusterError> = executor
            .execute(&ctx, || async { Err(command_failed("connection refused")) })
            .await;

        let seen = seen.lock().unwrap();
        let attempts: Vec<u32> = seen.iter().map(|(_, a, _)| *a).collect();
        assert_eq!(attempts, vec![1, 2]);
        assert_eq!(seen[0].2, Duration::from_millis(1));
        assert_eq!(seen[1].2, Duration::from_millis(2));
    }

    #[tokio::test]
    async fn test_cancel_during_sleep_returns_cancellation() {
        let policy = ExponentialBackoffPolicy::new(5, Duration::from_secs(60), Duration::from_secs(60));
        let ctx = CancellationToken::new();
        let cancel = ctx.clone();
        let executor = RetryExecutor::new(policy).with_retry_callback(move |_, _, _| cancel.cancel());

        let start = std::time::Instant::now();
        let result: Result<(), ClusterError> = executor
            .execute(&ctx, || async { Err(command_failed("network timeout")) })
            .await;

        let err = result.unwrap_err();
        assert!(err.is_cancelled(), "expected cancellation, got {err}");
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_cancelled_before_first_attempt() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let ctx = CancellationToken::new();
        ctx.cancel();

        let result: Result<(), ClusterError> = RetryExecutor::new(fast_policy(3))
            .execute(&ctx, || {
                c.fetch_add(1, Ordering::SeqCst);
                async { Ok(()) }
            })
            .await;

        assert!(result.unwrap_err().is_cancelled());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_retry_after_overrides_policy_delay_up_to_its_cap() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = seen.clone();
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();

        #[derive(Debug)]
        enum TestError {
            Transient(TransientError),
            Cancelled,
        }
        impl fmt::Display for TestError {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                match self {
                    Self::Transient(e) => write!(f, "{}", e),
                    Self::Cancelled => f.write_str("cancelled"),
                }
            }
        }
        impl Recoverable for TestError {
            fn recoverable(&self) -> Option<bool> {
                match self {
                    Self::Transient(e) => e.recoverable(),
                    Self::Cancelled => Some(false),
                }
            }
            fn retry_after(&self) -> Option<Duration> {
                match self {
                    Self::Transient(e) => e.retry_after(),
                    Self::Cancelled => None,
                }
            }
        }
        impl From<Cancelled> for TestError {
            fn from(_: Cancelled) -> Self {
                Self::Cancelled
            }
        }

        let executor = RetryExecutor::new(fast_policy(3)).with_retry_callback(move |_, _, delay| {
            s.lock().unwrap().push(delay);
        });
        let ctx = CancellationToken::new();

        let result: Result<&str, TestError> = executor
            .execute(&ctx, || {
                let call = c.fetch_add(1, Ordering::SeqCst);
                async move {
                    let after = match call {
                        0 => Duration::from_millis(3),
                        1 => Duration::from_secs(3600),
                        _ => return Ok("done"),
                    };
                    Err(TestError::Transient(TransientError::new("throttled").with_retry_after(after)))
                }
            })
            .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(
            *seen.lock().unwrap(),
            vec![Duration::from_millis(3), Duration::from_millis(5)]
        );
    }
}
