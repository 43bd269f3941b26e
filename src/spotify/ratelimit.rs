//! Per-host pacing and 429 backoff.
//!
//! Every outbound request first passes [`RateLimiter::gate`]. The gate keeps a
//! minimum spacing between requests to the same host by handing out time
//! slots, and holds callers back while the host is cooling down after a 429.
//! Cooldowns that do not fit the caller's budget fail fast with
//! [`Error::RateLimited`] instead of blocking.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::Duration,
};

use chrono::{DateTime, Utc};
use tokio::time::Instant;

use crate::{
    config::RetryPolicy,
    context::RequestContext,
    debug,
    error::{Error, Result},
};

#[derive(Debug, Default)]
struct HostRateState {
    /// Earliest instant the next request may start.
    next_slot: Option<Instant>,
    cooldown_until: Option<Instant>,
    backoff: Duration,
}

/// Outcome of recording a 429.
#[derive(Debug, Clone, Copy)]
pub struct Cooldown {
    pub until: Instant,
    pub backoff: Duration,
    pub retry_after: Duration,
}

impl Cooldown {
    pub fn remaining(&self) -> Duration {
        self.until.saturating_duration_since(Instant::now())
    }

    /// The cooldown deadline on the wall clock.
    pub fn until_utc(&self) -> DateTime<Utc> {
        to_utc(self.until)
    }
}

enum Step {
    Go,
    Pace(Instant),
    Cooldown { wait: Duration, until: Instant, backoff: Duration },
}

pub struct RateLimiter {
    hosts: Mutex<HashMap<String, Arc<Mutex<HostRateState>>>>,
    policy: RetryPolicy,
}

impl RateLimiter {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            hosts: Mutex::new(HashMap::new()),
            policy,
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    fn state(&self, host: &str) -> Arc<Mutex<HostRateState>> {
        let mut hosts = self.hosts.lock().unwrap_or_else(|e| e.into_inner());
        Arc::clone(hosts.entry(host.to_string()).or_default())
    }

    /// Waits until a request to `host` may be sent.
    ///
    /// # Errors
    ///
    /// [`Error::RateLimited`] when the host is cooling down for longer than
    /// both the short-cooldown threshold and the caller's wait budget, and
    /// [`Error::Cancelled`] when the context stops while waiting.
    pub async fn gate(&self, ctx: &RequestContext, host: &str) -> Result<()> {
        if host.is_empty() {
            return Ok(());
        }
        let state = self.state(host);
        let budget = self.policy.wait_budget(ctx);
        let mut reserved = false;

        loop {
            ctx.check()?;
            let now = Instant::now();
            let step = {
                let mut s = state.lock().unwrap_or_else(|e| e.into_inner());
                match s.cooldown_until {
                    Some(until) if until > now => Step::Cooldown {
                        wait: until - now,
                        until,
                        backoff: s.backoff,
                    },
                    _ if reserved => Step::Go,
                    _ => {
                        let slot = s.next_slot.map_or(now, |next| next.max(now));
                        s.next_slot = Some(slot + self.policy.min_interval);
                        if slot > now { Step::Pace(slot) } else { Step::Go }
                    }
                }
            };

            match step {
                Step::Go => return Ok(()),
                Step::Pace(slot) => {
                    reserved = true;
                    ctx.run(tokio::time::sleep_until(slot)).await?;
                }
                Step::Cooldown { wait, until, backoff } => {
                    if wait <= self.policy.short_cooldown || wait <= budget {
                        debug!("rate gate waiting {}ms for host={}", wait.as_millis(), host);
                        ctx.sleep(wait).await?;
                        continue;
                    }
                    return Err(Error::RateLimited {
                        host: host.to_string(),
                        endpoint: None,
                        retry_after: None,
                        wait,
                        cooldown_until: to_utc(until),
                        backoff,
                    });
                }
            }
        }
    }

    /// Records a 429 from `host` and returns the resulting cooldown.
    ///
    /// The first 429 backs off by `retry_after`; later ones double the
    /// previous backoff but never go below `retry_after`. The deadline is
    /// padded with the skew buffer and never moves earlier.
    pub fn note_rate_limited(&self, host: &str, retry_after: Option<Duration>) -> Cooldown {
        let retry_after = retry_after
            .filter(|d| !d.is_zero())
            .unwrap_or(self.policy.default_retry_after);
        let state = self.state(host);
        let mut s = state.lock().unwrap_or_else(|e| e.into_inner());

        let backoff = if s.backoff.is_zero() {
            retry_after
        } else {
            (s.backoff * 2).max(retry_after)
        }
        .min(self.policy.max_backoff);

        let mut until = Instant::now() + backoff + self.policy.skew_buffer;
        if let Some(existing) = s.cooldown_until {
            until = until.max(existing);
        }
        s.backoff = backoff;
        s.cooldown_until = Some(until);

        Cooldown {
            until,
            backoff,
            retry_after,
        }
    }

    /// Clears the backoff of `host` after a successful response.
    pub fn note_success(&self, host: &str) {
        if host.is_empty() {
            return;
        }
        let state = self.state(host);
        let mut s = state.lock().unwrap_or_else(|e| e.into_inner());
        s.backoff = Duration::ZERO;
    }

    /// Time left on the cooldown of `host`, if any.
    pub fn cooldown_remaining(&self, host: &str) -> Option<Duration> {
        let state = self.state(host);
        let s = state.lock().unwrap_or_else(|e| e.into_inner());
        let now = Instant::now();
        s.cooldown_until.filter(|u| *u > now).map(|u| u - now)
    }

    pub fn current_backoff(&self, host: &str) -> Duration {
        let state = self.state(host);
        let s = state.lock().unwrap_or_else(|e| e.into_inner());
        s.backoff
    }
}

fn to_utc(instant: Instant) -> DateTime<Utc> {
    let ahead = instant.saturating_duration_since(Instant::now());
    Utc::now() + chrono::Duration::from_std(ahead).unwrap_or_else(|_| chrono::Duration::zero())
}
