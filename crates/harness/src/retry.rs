//! Bounded, fixed-interval polling.
//!
//! A check is run up to a fixed number of times with a constant delay between
//! failing attempts. There is no backoff and no jitter, so the worst-case wait
//! of any poll is known up front ([`RetryPolicy::ceiling`]).

use std::fmt::Debug;
use std::future::Future;
use std::num::NonZeroU32;
use std::time::Duration;

use converge_config::PollConfig;

const DEFAULT_ATTEMPTS: u32 = 1000;
const DEFAULT_INTERVAL: Duration = Duration::from_millis(100);

/// How often, and how far apart, a check is attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    attempts: NonZeroU32,
    interval: Duration,
}

impl RetryPolicy {
    /// Create a policy running a check at most `attempts` times, `interval`
    /// apart. A check always runs at least once, so `0` behaves like `1`.
    pub fn new(attempts: u32, interval: Duration) -> Self {
        Self {
            attempts: NonZeroU32::new(attempts).unwrap_or(NonZeroU32::MIN),
            interval,
        }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts.get()
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Total time spent sleeping when every attempt fails. Saturates at
    /// [`Duration::MAX`].
    pub fn ceiling(&self) -> Duration {
        self.interval.saturating_mul(self.attempts.get() - 1)
    }

    /// Run `check` until it succeeds or the attempt budget is spent.
    ///
    /// Returns the first success, or the error of the final attempt. Errors of
    /// earlier attempts are dropped. The caller is suspended for
    /// [`interval`](Self::interval) after every failing attempt except the last.
    ///
    /// # Examples
    ///
    /// ```
    /// use converge_harness::RetryPolicy;
    /// use std::time::Duration;
    ///
    /// # #[tokio::main(flavor = "current_thread")]
    /// # async fn main() {
    /// let mut polls = 0;
    /// let result: Result<u32, String> = RetryPolicy::new(5, Duration::from_millis(1))
    ///     .retry(|| {
    ///         polls += 1;
    ///         let seen = polls;
    ///         async move { if seen < 3 { Err(format!("only {seen} polls")) } else { Ok(seen) } }
    ///     })
    ///     .await;
    /// assert_eq!(result, Ok(3));
    /// # }
    /// ```
    pub async fn retry<T, E, F, Fut>(&self, mut check: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Debug,
    {
        let attempts = self.attempts.get();
        let mut attempt = 1;
        loop {
            match check().await {
                Ok(value) => {
                    if attempt > 1 {
                        tracing::debug!(attempt, "Check succeeded after retrying");
                    }
                    return Ok(value);
                },
                Err(error) if attempt >= attempts => {
                    tracing::debug!(attempts, ?error, "Giving up; attempt budget exhausted");
                    return Err(error);
                },
                Err(error) => {
                    tracing::trace!(attempt, ?error, "Check failed; retrying");
                    tokio::time::sleep(self.interval).await;
                    attempt += 1;
                },
            }
        }
    }
}
impl Default for RetryPolicy {
    /// 1000 attempts, 100ms apart: a little under 100 seconds.
    fn default() -> Self {
        Self::new(DEFAULT_ATTEMPTS, DEFAULT_INTERVAL)
    }
}
impl From<PollConfig> for RetryPolicy {
    fn from(config: PollConfig) -> Self {
        Self::new(config.attempts, config.interval())
    }
}

/// Run `check` up to `attempts` times, sleeping `interval` between failures.
///
/// Shorthand for [`RetryPolicy::new(attempts, interval).retry(check)`](RetryPolicy::retry).
pub async fn retry<T, E, F, Fut>(attempts: u32, interval: Duration, check: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Debug,
{
    RetryPolicy::new(attempts, interval).retry(check).await
}
