use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use reqwest::{Request, Response};

use crate::transport::{BoxFuture, Transport};
use crate::{RequestContext, Result};

pub const DEFAULT_RETRY_COUNT: usize = 3;
pub const DEFAULT_MIN_WAIT: Duration = Duration::from_secs(1);
pub const DEFAULT_MAX_WAIT: Duration = Duration::from_secs(30);

/// 502, 503, 504 and 429.
pub fn default_retry_statuses() -> BTreeSet<u16> {
    BTreeSet::from([429, 502, 503, 504])
}

/// Retry settings as supplied by callers.
///
/// Zero counts, zero waits and an empty status set mean "use the default";
/// [`RetryPolicy::new`] resolves them.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RetryConfig {
    /// Maximum number of retries after the initial attempt.
    pub retry_count: usize,
    pub min_wait: Duration,
    pub max_wait: Duration,
    /// Response statuses that trigger another attempt.
    pub retry_statuses: BTreeSet<u16>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            retry_count: DEFAULT_RETRY_COUNT,
            min_wait: DEFAULT_MIN_WAIT,
            max_wait: DEFAULT_MAX_WAIT,
            retry_statuses: default_retry_statuses(),
        }
    }
}

/// Resolved retry settings with capped, jittered exponential backoff.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RetryPolicy {
    retry_count: usize,
    min_wait: Duration,
    max_wait: Duration,
    retry_statuses: BTreeSet<u16>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(RetryConfig::default())
    }
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        let retry_count = if config.retry_count == 0 {
            DEFAULT_RETRY_COUNT
        } else {
            config.retry_count
        };
        let min_wait = if config.min_wait.is_zero() {
            DEFAULT_MIN_WAIT
        } else {
            config.min_wait
        };
        let max_wait = if config.max_wait.is_zero() {
            DEFAULT_MAX_WAIT
        } else {
            config.max_wait
        };
        let retry_statuses = if config.retry_statuses.is_empty() {
            default_retry_statuses()
        } else {
            config.retry_statuses
        };

        Self {
            retry_count,
            min_wait,
            max_wait: max_wait.max(min_wait),
            retry_statuses,
        }
    }

    pub fn retry_count(&self) -> usize {
        self.retry_count
    }

    pub fn min_wait(&self) -> Duration {
        self.min_wait
    }

    pub fn max_wait(&self) -> Duration {
        self.max_wait
    }

    pub fn is_retryable(&self, status: u16) -> bool {
        self.retry_statuses.contains(&status)
    }

    /// Upper bound of the wait before retry `attempt` (zero-based):
    /// `min(max_wait, min_wait * 2^attempt)`.
    pub fn backoff_ceiling(&self, attempt: usize) -> Duration {
        let exp = attempt.min(31) as u32;
        self.min_wait
            .checked_mul(1u32 << exp)
            .map_or(self.max_wait, |delay| delay.min(self.max_wait))
    }

    /// Lower bound of the wait before retry `attempt`; the previous ceiling,
    /// or half of `min_wait` for the first retry.
    fn backoff_floor(&self, attempt: usize) -> Duration {
        match attempt {
            0 => self.min_wait / 2,
            n => self.backoff_ceiling(n - 1),
        }
    }

    /// Randomized wait before retry `attempt`, drawn from
    /// `[floor(attempt), ceiling(attempt)]`.
    ///
    /// Consecutive bands touch but never overlap, so waits never shrink from
    /// one retry to the next and never exceed `max_wait`.
    pub fn jittered_backoff(&self, attempt: usize) -> Duration {
        let low = self.backoff_floor(attempt);
        let high = self.backoff_ceiling(attempt);
        if high <= low {
            return high;
        }
        let low_ms = low.as_millis() as u64;
        let high_ms = high.as_millis() as u64;
        Duration::from_millis(rand::thread_rng().gen_range(low_ms..=high_ms))
    }
}

/// Re-issues requests whose response status is retryable.
///
/// Transport errors are returned immediately. Once retries run out the last
/// response is handed back as-is; callers inspect its status.
pub struct RetryTransport {
    inner: Arc<dyn Transport>,
    policy: RetryPolicy,
}

impl RetryTransport {
    pub fn new(inner: Arc<dyn Transport>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }
}

impl Transport for RetryTransport {
    fn round_trip<'a>(
        &'a self,
        request: &'a Request,
        ctx: &'a RequestContext,
    ) -> BoxFuture<'a, Result<Response>> {
        Box::pin(async move {
            let mut attempt = 0usize;
            loop {
                let response = self.inner.round_trip(request, ctx).await?;
                let status = response.status().as_u16();

                if !self.policy.is_retryable(status) {
                    return Ok(response);
                }
                if attempt >= self.policy.retry_count {
                    #[cfg(feature = "tracing")]
                    tracing::warn!(
                        status,
                        retries = attempt as u64,
                        path = request.url().path(),
                        "retries exhausted, returning last response"
                    );
                    return Ok(response);
                }

                drop(response);
                let delay = self.policy.jittered_backoff(attempt);

                #[cfg(feature = "tracing")]
                tracing::debug!(
                    "retrying {} {} after status {} in {} ms",
                    request.method(),
                    request.url().path(),
                    status,
                    delay.as_millis()
                );

                ctx.guard(async {
                    tokio::time::sleep(delay).await;
                    Ok(())
                })
                .await?;
                attempt += 1;
            }
        })
    }
}
