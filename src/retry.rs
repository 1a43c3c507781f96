//! Retry with bounded exponential backoff and a shared throttle gate.
//!
//! Remote failures are classified into a closed set of categories by
//! [`is_retryable`]: connection failures, timeouts, 5xx statuses, and the
//! transient-contention client statuses (408, 409, 423, 425, 429) retry;
//! everything else propagates immediately. Server-provided `Retry-After`
//! hints raise the computed backoff delay.
//!
//! The [`ThrottleGate`] is created once per sync run and shared by
//! reference across all callers of [`execute`]: any caller that observes a
//! retryable failure pauses every sibling until the window elapses.

use std::future::Future;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use reqwest::header::HeaderMap;

/// How long a throttled caller sleeps between re-checks of the gate, so a
/// concurrently-failing sibling can extend the pause mid-wait.
const WAIT_SLICE: Duration = Duration::from_millis(500);

/// Classified remote failure.
#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    #[error("connection failed: {0}")]
    Connect(String),

    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("remote returned {code}: {message}")]
    Status {
        code: u16,
        message: String,
        retry_after: Option<Duration>,
    },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Api(String),
}

impl RemoteError {
    /// Map a reqwest transport error into a classified category.
    pub fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            RemoteError::Timeout(err.to_string())
        } else if err.is_connect() || err.is_request() {
            RemoteError::Connect(err.to_string())
        } else {
            RemoteError::Api(err.to_string())
        }
    }

    /// Server-requested retry delay, when the failure carried one.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            RemoteError::Status { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

/// Whether an error represents a transient condition worth retrying.
pub fn is_retryable(err: &RemoteError) -> bool {
    match err {
        RemoteError::Connect(_) | RemoteError::Timeout(_) => true,
        RemoteError::Status { code, .. } => retryable_status(*code),
        RemoteError::Config(_) | RemoteError::Api(_) => false,
    }
}

fn retryable_status(code: u16) -> bool {
    matches!(code, 408 | 409 | 423 | 425 | 429) || code >= 500
}

/// Extract a server-requested retry delay from response headers:
/// `Retry-After` as delta-seconds or an HTTP date, or the millisecond
/// variant `x-ms-retry-after-ms`.
pub fn retry_after_hint(headers: &HeaderMap) -> Option<Duration> {
    if let Some(raw) = headers.get("retry-after").and_then(|v| v.to_str().ok()) {
        let raw = raw.trim();
        if !raw.is_empty() {
            if let Ok(secs) = raw.parse::<u64>() {
                return Some(Duration::from_secs(secs));
            }
            if let Ok(date) = chrono::DateTime::parse_from_rfc2822(raw) {
                let delta = date.with_timezone(&chrono::Utc) - chrono::Utc::now();
                return Some(delta.to_std().unwrap_or(Duration::ZERO));
            }
        }
    }
    if let Some(raw) = headers.get("x-ms-retry-after-ms").and_then(|v| v.to_str().ok()) {
        if let Ok(ms) = raw.trim().parse::<u64>() {
            return Some(Duration::from_millis(ms));
        }
    }
    None
}

/// Backoff parameters for [`execute`].
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts including the first (minimum 1).
    pub max_attempts: u32,
    /// Backoff floor: delay before the second attempt.
    pub base_delay: Duration,
    /// Ceiling on any single sleep.
    pub max_delay: Duration,
    /// Fraction of the computed delay added as randomness.
    pub jitter_ratio: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
            jitter_ratio: 0.2,
        }
    }
}

/// Shared pause window consulted before every remote attempt.
///
/// One instance per sync run, shared by reference across concurrent
/// callers. The `next allowed` timestamp only ever moves forward, so
/// overlapping pause requests compose monotonically instead of racing.
#[derive(Debug)]
pub struct ThrottleGate {
    enabled: bool,
    max_pause: Duration,
    next_allowed_at: Mutex<Option<Instant>>,
}

impl ThrottleGate {
    pub fn new(enabled: bool, max_pause: Duration) -> Self {
        Self {
            enabled,
            max_pause,
            next_allowed_at: Mutex::new(None),
        }
    }

    /// Block until the current pause window (if any) elapses. Sleeps in
    /// short slices and re-checks, so the window can be extended by a
    /// concurrently-failing sibling while this caller waits.
    pub async fn wait(&self) {
        if !self.enabled {
            return;
        }
        loop {
            let delay = self.remaining();
            if delay.is_zero() {
                return;
            }
            tokio::time::sleep(delay.min(WAIT_SLICE)).await;
        }
    }

    /// Request a pause of `duration`, capped at `max_pause`. Only extends
    /// the window forward; shorter concurrent requests are absorbed.
    pub fn pause(&self, duration: Duration) {
        if !self.enabled {
            return;
        }
        let capped = duration.min(self.max_pause);
        if capped.is_zero() {
            return;
        }
        let target = Instant::now() + capped;
        let mut next = self.next_allowed_at.lock().unwrap();
        if next.map_or(true, |t| target > t) {
            *next = Some(target);
        }
    }

    /// Time left in the current pause window.
    pub fn remaining(&self) -> Duration {
        if !self.enabled {
            return Duration::ZERO;
        }
        self.next_allowed_at
            .lock()
            .unwrap()
            .map(|t| t.saturating_duration_since(Instant::now()))
            .unwrap_or(Duration::ZERO)
    }
}

/// Execute `op` with exponential backoff and jitter on transient failures.
///
/// Delay for attempt *n* is `min(base * 2^(n-1), max)`, raised to any
/// server-provided retry hint, plus up to `jitter_ratio` of itself in
/// jitter, capped at `max_delay`. Exhausting `max_attempts` propagates the
/// final error unmodified.
pub async fn execute<T, F, Fut>(
    operation: &str,
    policy: &RetryPolicy,
    throttle: Option<&ThrottleGate>,
    mut op: F,
) -> Result<T, RemoteError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, RemoteError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1u32;

    loop {
        if let Some(gate) = throttle {
            gate.wait().await;
        }

        let err = match op().await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        if !is_retryable(&err) || attempt >= max_attempts {
            return Err(err);
        }

        let max_s = policy.max_delay.as_secs_f64();
        let mut delay = (policy.base_delay.as_secs_f64() * 2f64.powi(attempt as i32 - 1)).min(max_s);
        if let Some(hint) = err.retry_after() {
            delay = delay.max(hint.as_secs_f64());
        }
        let jitter = delay * policy.jitter_ratio * rand::random::<f64>();
        let sleep = Duration::from_secs_f64((delay + jitter).min(max_s));

        if let Some(gate) = throttle {
            gate.pause(sleep);
        }
        tracing::warn!(
            operation,
            attempt,
            max_attempts,
            error = %err,
            sleep_s = sleep.as_secs_f64(),
            "retrying after transient failure"
        );
        tokio::time::sleep(sleep).await;
        attempt += 1;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(10),
            jitter_ratio: 0.0,
        }
    }

    fn transient() -> RemoteError {
        RemoteError::Status {
            code: 503,
            message: "unavailable".to_string(),
            retry_after: None,
        }
    }

    #[tokio::test]
    async fn retries_exactly_max_attempts() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = execute("op", &fast_policy(4), None, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(transient()) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn non_retryable_fails_on_first_attempt() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = execute("op", &fast_policy(5), None, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async {
                Err(RemoteError::Status {
                    code: 401,
                    message: "unauthorized".to_string(),
                    retry_after: None,
                })
            }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let result = execute("op", &fast_policy(5), None, || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(transient())
                } else {
                    Ok(n)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn retry_after_hint_raises_delay() {
        let calls = AtomicU32::new(0);
        let started = Instant::now();
        let result: Result<(), _> = execute("op", &fast_policy(2), None, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async {
                Err(RemoteError::Status {
                    code: 429,
                    message: "slow down".to_string(),
                    retry_after: Some(Duration::from_millis(50)),
                })
            }
        })
        .await;
        assert!(result.is_err());
        // Hint raises the 1ms backoff, but the 10ms ceiling still caps it.
        assert!(started.elapsed() >= Duration::from_millis(8));
    }

    #[tokio::test]
    async fn retry_after_hint_observed_under_larger_cap() {
        let policy = RetryPolicy {
            max_attempts: 2,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(500),
            jitter_ratio: 0.0,
        };
        let started = Instant::now();
        let result: Result<(), _> = execute("op", &policy, None, || async {
            Err(RemoteError::Status {
                code: 429,
                message: "slow down".to_string(),
                retry_after: Some(Duration::from_millis(60)),
            })
        })
        .await;
        assert!(result.is_err());
        assert!(started.elapsed() >= Duration::from_millis(50));
    }

    #[test]
    fn status_classification() {
        for code in [408u16, 409, 423, 425, 429, 500, 502, 503] {
            let err = RemoteError::Status {
                code,
                message: String::new(),
                retry_after: None,
            };
            assert!(is_retryable(&err), "{code} should be retryable");
        }
        for code in [400u16, 401, 403, 404, 422] {
            let err = RemoteError::Status {
                code,
                message: String::new(),
                retry_after: None,
            };
            assert!(!is_retryable(&err), "{code} should not be retryable");
        }
        assert!(is_retryable(&RemoteError::Connect("refused".into())));
        assert!(is_retryable(&RemoteError::Timeout("deadline".into())));
        assert!(!is_retryable(&RemoteError::Config("missing key".into())));
        assert!(!is_retryable(&RemoteError::Api("bad payload".into())));
    }

    #[test]
    fn retry_after_header_parsing() {
        let mut headers = HeaderMap::new();
        headers.insert("retry-after", "3".parse().unwrap());
        assert_eq!(retry_after_hint(&headers), Some(Duration::from_secs(3)));

        let mut headers = HeaderMap::new();
        headers.insert("x-ms-retry-after-ms", "250".parse().unwrap());
        assert_eq!(retry_after_hint(&headers), Some(Duration::from_millis(250)));

        let mut headers = HeaderMap::new();
        headers.insert("retry-after", "Wed, 21 Oct 2015 07:28:00 GMT".parse().unwrap());
        // A date far in the past clamps to zero rather than erroring.
        assert_eq!(retry_after_hint(&headers), Some(Duration::ZERO));

        assert_eq!(retry_after_hint(&HeaderMap::new()), None);
    }

    #[test]
    fn throttle_pause_extends_monotonically() {
        let gate = ThrottleGate::new(true, Duration::from_secs(60));
        gate.pause(Duration::from_millis(100));
        let first = gate.remaining();
        assert!(first > Duration::from_millis(50));

        // A shorter concurrent request must not pull the window backward.
        gate.pause(Duration::from_millis(10));
        let second = gate.remaining();
        assert!(second > Duration::from_millis(50));
    }

    #[test]
    fn throttle_caps_at_max_pause() {
        let gate = ThrottleGate::new(true, Duration::from_millis(50));
        gate.pause(Duration::from_secs(30));
        assert!(gate.remaining() <= Duration::from_millis(50));
    }

    #[test]
    fn disabled_gate_is_a_noop() {
        let gate = ThrottleGate::new(false, Duration::from_secs(60));
        gate.pause(Duration::from_secs(30));
        assert_eq!(gate.remaining(), Duration::ZERO);
    }

    #[tokio::test]
    async fn wait_blocks_until_window_elapses() {
        let gate = ThrottleGate::new(true, Duration::from_secs(60));
        gate.pause(Duration::from_millis(30));
        let started = Instant::now();
        gate.wait().await;
        assert!(started.elapsed() >= Duration::from_millis(25));
    }

    #[tokio::test]
    async fn execute_pauses_shared_gate_on_failure() {
        let gate = ThrottleGate::new(true, Duration::from_secs(60));
        let policy = RetryPolicy {
            max_attempts: 2,
            base_delay: Duration::from_millis(40),
            max_delay: Duration::from_millis(40),
            jitter_ratio: 0.0,
        };
        let _: Result<(), _> =
            execute("op", &policy, Some(&gate), || async { Err(transient()) }).await;
        // The caller slept through the pause it requested, so the window
        // has elapsed by the time execute returns and nothing deadlocked.
        assert_eq!(gate.remaining(), Duration::ZERO);
    }
}
