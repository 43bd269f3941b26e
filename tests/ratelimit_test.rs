use std::time::Duration;

use spotmeta::{
    RequestContext,
    config::RetryPolicy,
    error::Error,
    spotify::ratelimit::RateLimiter,
};
use tokio::time::Instant;

const HOST: &str = "api.spotify.com";

fn secs(n: u64) -> Duration {
    Duration::from_secs(n)
}

#[tokio::test(start_paused = true)]
async fn test_backoff_doubles_and_is_capped() {
    let limiter = RateLimiter::new(RetryPolicy::default());

    // First 429 backs off by retry-after, later ones double
    assert_eq!(limiter.note_rate_limited(HOST, Some(secs(6))).backoff, secs(6));
    assert_eq!(limiter.note_rate_limited(HOST, Some(secs(6))).backoff, secs(12));
    assert_eq!(limiter.note_rate_limited(HOST, Some(secs(6))).backoff, secs(24));

    // Never below retry-after
    assert_eq!(limiter.note_rate_limited(HOST, Some(secs(100))).backoff, secs(100));

    for _ in 0..10 {
        limiter.note_rate_limited(HOST, Some(secs(6)));
    }
    assert_eq!(limiter.current_backoff(HOST), secs(600));
}

#[tokio::test(start_paused = true)]
async fn test_cooldown_includes_skew_buffer() {
    let limiter = RateLimiter::new(RetryPolicy::default());
    let cooldown = limiter.note_rate_limited(HOST, Some(secs(6)));

    assert_eq!(cooldown.retry_after, secs(6));
    assert_eq!(cooldown.remaining(), secs(11));
    assert_eq!(limiter.cooldown_remaining(HOST), Some(secs(11)));

    // Other hosts are unaffected
    assert_eq!(limiter.cooldown_remaining("open.spotify.com"), None);
}

#[tokio::test(start_paused = true)]
async fn test_missing_retry_after_uses_default() {
    let limiter = RateLimiter::new(RetryPolicy::default());
    let cooldown = limiter.note_rate_limited(HOST, None);
    assert_eq!(cooldown.backoff, secs(5));
}

#[tokio::test(start_paused = true)]
async fn test_success_resets_backoff() {
    let limiter = RateLimiter::new(RetryPolicy::default());
    limiter.note_rate_limited(HOST, Some(secs(6)));
    limiter.note_rate_limited(HOST, Some(secs(6)));
    assert_eq!(limiter.current_backoff(HOST), secs(12));

    limiter.note_success(HOST);
    assert_eq!(limiter.current_backoff(HOST), Duration::ZERO);
    assert_eq!(limiter.note_rate_limited(HOST, Some(secs(6))).backoff, secs(6));
}

#[tokio::test(start_paused = true)]
async fn test_gate_fails_fast_when_cooldown_exceeds_budget() {
    let limiter = RateLimiter::new(RetryPolicy::default());
    limiter.note_rate_limited(HOST, Some(secs(6)));

    // 3 s deadline leaves a 1 s budget against an 11 s cooldown
    let ctx = RequestContext::with_timeout(secs(3));
    let started = Instant::now();
    let err = limiter.gate(&ctx, HOST).await.unwrap_err();

    assert!(started.elapsed() < Duration::from_millis(10));
    match &err {
        Error::RateLimited {
            host,
            endpoint,
            wait,
            backoff,
            ..
        } => {
            assert_eq!(host, HOST);
            assert!(endpoint.is_none());
            assert_eq!(*wait, secs(11));
            assert_eq!(*backoff, secs(6));
        }
        other => panic!("expected rate limit, got {other:?}"),
    }
    let message = err.to_string();
    assert!(message.starts_with("spotify rate limited host=api.spotify.com wait=11s"));
    assert!(message.ends_with("backoff=6s"));
}

#[tokio::test(start_paused = true)]
async fn test_gate_waits_through_short_cooldown() {
    let policy = RetryPolicy {
        skew_buffer: Duration::ZERO,
        ..RetryPolicy::default()
    };
    let limiter = RateLimiter::new(policy);
    limiter.note_rate_limited(HOST, Some(secs(2)));

    // Even a tight deadline waits out a cooldown of at most three seconds
    let ctx = RequestContext::with_timeout(secs(10));
    let started = Instant::now();
    limiter.gate(&ctx, HOST).await.unwrap();
    assert!(started.elapsed() >= secs(2));
}

#[tokio::test(start_paused = true)]
async fn test_gate_waits_when_budget_allows() {
    let limiter = RateLimiter::new(RetryPolicy::default());
    limiter.note_rate_limited(HOST, Some(secs(6)));

    // No deadline: two minute budget
    let ctx = RequestContext::new();
    let started = Instant::now();
    limiter.gate(&ctx, HOST).await.unwrap();
    assert!(started.elapsed() >= secs(11));
}

#[tokio::test(start_paused = true)]
async fn test_gate_paces_requests() {
    let policy = RetryPolicy {
        min_interval: Duration::from_millis(250),
        ..RetryPolicy::default()
    };
    let limiter = RateLimiter::new(policy);
    let ctx = RequestContext::new();

    let started = Instant::now();
    for _ in 0..3 {
        limiter.gate(&ctx, HOST).await.unwrap();
    }
    assert!(started.elapsed() >= Duration::from_millis(500));

    // Separate hosts have separate slots
    let other = Instant::now();
    limiter.gate(&ctx, "accounts.spotify.com").await.unwrap();
    assert!(other.elapsed() < Duration::from_millis(250));
}

#[tokio::test]
async fn test_gate_respects_cancellation() {
    let limiter = RateLimiter::new(RetryPolicy::default());
    limiter.note_rate_limited(HOST, Some(secs(6)));

    let ctx = RequestContext::new();
    ctx.cancel();
    let err = limiter.gate(&ctx, HOST).await.unwrap_err();
    assert!(err.is_cancelled());
}

#[tokio::test]
async fn test_gate_ignores_empty_host() {
    let limiter = RateLimiter::new(RetryPolicy::default());
    limiter.note_rate_limited("", Some(secs(60)));
    limiter.gate(&RequestContext::new(), "").await.unwrap();
}
