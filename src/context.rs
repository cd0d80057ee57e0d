use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::{GroundcoverError, Result};

/// Per-call values carried alongside a request through every transport layer.
///
/// A context lives for one logical request. Shared client configuration is
/// never touched; anything that varies per call goes here instead.
#[derive(Clone, Debug, Default)]
pub struct RequestContext {
    traceparent: Option<String>,
    cancel: Option<CancellationToken>,
    deadline: Option<Instant>,
}

impl RequestContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attaches a `traceparent` value to send with this request.
    pub fn with_traceparent(mut self, traceparent: impl Into<String>) -> Self {
        self.traceparent = Some(traceparent.into());
        self
    }

    /// Cancels the call (including any pending retry wait) when `token` fires.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Non-empty traceparent override, if one was attached.
    pub fn traceparent(&self) -> Option<&str> {
        self.traceparent.as_deref().filter(|value| !value.is_empty())
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_canceled(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(CancellationToken::is_cancelled)
    }

    /// Drives `fut` until it completes, the token fires, or the deadline passes.
    ///
    /// Cancellation wins ties so that an already-canceled context never
    /// starts new work.
    pub(crate) async fn guard<T, F>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let canceled = async {
            match &self.cancel {
                Some(token) => token.cancelled().await,
                None => std::future::pending::<()>().await,
            }
        };
        let expired = async {
            match self.deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            _ = canceled => Err(GroundcoverError::Canceled),
            _ = expired => Err(GroundcoverError::DeadlineExceeded),
            result = fut => result,
        }
    }
}
