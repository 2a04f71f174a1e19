//! Retry with exponential backoff and jitter.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;

use crate::provider::{ProviderError, ProviderResult};

/// Longest single wait between attempts.
pub const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// Blocks the calling thread for the given duration.
pub type Sleeper = Arc<dyn Fn(Duration) + Send + Sync>;

/// Retry policy shared by every HTTP provider.
///
/// An operation is attempted at most `max_retries + 1` times. Only
/// [`ProviderError::is_retryable`] errors trigger another attempt; the last
/// error is returned unchanged once attempts run out.
#[derive(Clone)]
pub struct RetryPolicy {
    max_retries: u32,
    cap: Duration,
    sleeper: Sleeper,
}

impl RetryPolicy {
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            cap: MAX_BACKOFF,
            sleeper: Arc::new(std::thread::sleep),
        }
    }

    /// Replace the sleep function (tests record delays instead of waiting).
    pub fn with_sleeper(mut self, sleeper: impl Fn(Duration) + Send + Sync + 'static) -> Self {
        self.sleeper = Arc::new(sleeper);
        self
    }

    pub fn with_cap(mut self, cap: Duration) -> Self {
        self.cap = cap;
        self
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// `min(2^attempt * uniform(0.5, 1.5), cap)`.
    pub fn backoff(&self, attempt: u32, rng: &mut impl Rng) -> Duration {
        let base = 2f64.powi(attempt.min(30) as i32);
        let jittered = base * rng.gen_range(0.5..1.5);
        Duration::from_secs_f64(jittered).min(self.cap)
    }

    /// Wait before retrying after `err`: the server's hint when it gave one,
    /// otherwise jittered backoff. Never longer than the cap.
    pub fn delay_for(&self, err: &ProviderError, attempt: u32, rng: &mut impl Rng) -> Duration {
        match err.retry_after() {
            Some(hint) => hint.min(self.cap),
            None => self.backoff(attempt, rng),
        }
    }

    /// Run `op` until it succeeds, fails terminally, or attempts run out.
    /// `op` receives the zero-based attempt number.
    pub fn run<T>(&self, mut op: impl FnMut(u32) -> ProviderResult<T>) -> ProviderResult<T> {
        let mut rng = rand::thread_rng();
        let mut attempt = 0;
        loop {
            match op(attempt) {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() && attempt < self.max_retries => {
                    let delay = self.delay_for(&err, attempt, &mut rng);
                    tracing::warn!(
                        attempt = attempt + 1,
                        max_attempts = self.max_retries + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "provider call failed, retrying"
                    );
                    (self.sleeper)(delay);
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

impl std::fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_retries", &self.max_retries)
            .field("cap", &self.cap)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;

    fn recording(max_retries: u32) -> (RetryPolicy, Arc<Mutex<Vec<Duration>>>) {
        let delays = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&delays);
        let policy = RetryPolicy::new(max_retries)
            .with_sleeper(move |d| sink.lock().unwrap().push(d));
        (policy, delays)
    }

    #[test]
    fn always_retryable_gives_up_after_max_retries_plus_one() {
        let (policy, delays) = recording(3);
        let mut calls = 0;
        let err = policy
            .run(|_| -> ProviderResult<()> {
                calls += 1;
                Err(ProviderError::RateLimited {
                    message: "429".into(),
                    retry_after: None,
                })
            })
            .unwrap_err();
        assert_eq!(calls, 4);
        assert!(matches!(err, ProviderError::RateLimited { .. }));
        let delays = delays.lock().unwrap();
        assert_eq!(delays.len(), 3);
        assert!(delays.iter().all(|d| *d <= MAX_BACKOFF));
    }

    #[test]
    fn terminal_error_is_not_retried() {
        let (policy, delays) = recording(5);
        let mut calls = 0;
        let err = policy
            .run(|_| -> ProviderResult<()> {
                calls += 1;
                Err(ProviderError::ContextLength {
                    message: "maximum context length".into(),
                })
            })
            .unwrap_err();
        assert_eq!(calls, 1);
        assert!(matches!(err, ProviderError::ContextLength { .. }));
        assert!(delays.lock().unwrap().is_empty());
    }

    #[test]
    fn succeeds_after_transient_failures() {
        let (policy, delays) = recording(3);
        let out = policy
            .run(|attempt| {
                if attempt < 2 {
                    Err(ProviderError::transient("connection reset"))
                } else {
                    Ok(attempt)
                }
            })
            .unwrap();
        assert_eq!(out, 2);
        assert_eq!(delays.lock().unwrap().len(), 2);
    }

    #[test]
    fn backoff_is_jittered_and_capped() {
        let policy = RetryPolicy::new(10);
        let mut rng = StdRng::seed_from_u64(7);
        for attempt in 0..4 {
            let d = policy.backoff(attempt, &mut rng).as_secs_f64();
            let base = 2f64.powi(attempt as i32);
            assert!(d >= base * 0.5 && d < base * 1.5, "attempt {attempt}: {d}");
        }
        assert_eq!(policy.backoff(12, &mut rng), MAX_BACKOFF);
    }

    #[test]
    fn server_hint_is_clamped() {
        let policy = RetryPolicy::new(3).with_cap(Duration::from_secs(10));
        let mut rng = StdRng::seed_from_u64(1);
        let err = ProviderError::RateLimited {
            message: "wait".into(),
            retry_after: Some(Duration::from_secs(120)),
        };
        assert_eq!(policy.delay_for(&err, 0, &mut rng), Duration::from_secs(10));
    }
}
