//! Deadlines and cancellation for outbound work.
//!
//! Every suspension point of the client (network calls, rate-limiter waits,
//! inter-page delays, single-flight waits) takes a [`RequestContext`]. The
//! context carries an optional deadline and a cancellation token; whichever
//! fires first stops the pending operation with [`Error::Cancelled`].

use std::{future::Future, time::Duration};

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::{CancelReason, Error, Result};

#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    deadline: Option<Instant>,
    token: CancellationToken,
}

impl RequestContext {
    /// A context without deadline that is only stopped by [`cancel`](Self::cancel).
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_deadline(Instant::now() + timeout)
    }

    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            deadline: Some(deadline),
            token: CancellationToken::new(),
        }
    }

    /// A context that is cancelled together with `self` but may carry a
    /// tighter deadline.
    pub fn child(&self, timeout: Option<Duration>) -> Self {
        let deadline = match (self.deadline, timeout) {
            (Some(d), Some(t)) => Some(d.min(Instant::now() + t)),
            (Some(d), None) => Some(d),
            (None, Some(t)) => Some(Instant::now() + t),
            (None, None) => None,
        };
        Self {
            deadline,
            token: self.token.child_token(),
        }
    }

    /// Same deadline, independent cancellation.
    ///
    /// Background work started on behalf of one caller (a single-flight fetch)
    /// runs under a detached context so the originating caller giving up does
    /// not fail the other waiters.
    pub fn detached(&self) -> Self {
        Self {
            deadline: self.deadline,
            token: CancellationToken::new(),
        }
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left before the deadline, `None` when there is no deadline.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    pub fn is_done(&self) -> bool {
        self.token.is_cancelled() || self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Returns the error matching the current state without waiting.
    pub fn check(&self) -> Result<()> {
        if self.token.is_cancelled() {
            return Err(Error::Cancelled(CancelReason::Cancelled));
        }
        if self.deadline.is_some_and(|d| Instant::now() >= d) {
            return Err(Error::Cancelled(CancelReason::DeadlineExceeded));
        }
        Ok(())
    }

    /// Drives `fut` until it completes, the context is cancelled or the
    /// deadline passes.
    pub async fn run<F: Future>(&self, fut: F) -> Result<F::Output> {
        self.check()?;
        let deadline = async {
            match self.deadline {
                Some(d) => tokio::time::sleep_until(d).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::select! {
            biased;
            _ = self.token.cancelled() => Err(Error::Cancelled(CancelReason::Cancelled)),
            _ = deadline => Err(Error::Cancelled(CancelReason::DeadlineExceeded)),
            out = fut => Ok(out),
        }
    }

    pub async fn sleep(&self, duration: Duration) -> Result<()> {
        if duration.is_zero() {
            return self.check();
        }
        self.run(tokio::time::sleep(duration)).await
    }
}

