use std::{
    future::Future,
    pin::Pin,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use bytes::Bytes;
use futures::future::join_all;
use spotmeta::{
    RequestContext,
    error::{Error, Result},
    spotify::cache::ResponseCache,
};

const KEY: &str = "https://api.spotify.com/v1/albums/x";

/// A fetch that counts its invocations and answers after `delay`.
fn counted(
    calls: &Arc<AtomicUsize>,
    delay: Duration,
    body: &'static str,
) -> impl FnOnce(RequestContext) -> Pin<Box<dyn Future<Output = Result<Bytes>> + Send>>
+ Send
+ 'static {
    let calls = Arc::clone(calls);
    move |ctx: RequestContext| {
        Box::pin(async move {
            calls.fetch_add(1, Ordering::SeqCst);
            ctx.sleep(delay).await?;
            Ok(Bytes::from_static(body.as_bytes()))
        })
    }
}

#[tokio::test]
async fn test_concurrent_callers_share_one_fetch() {
    let cache = ResponseCache::new(Duration::from_secs(60));
    let calls = Arc::new(AtomicUsize::new(0));
    let ctx = RequestContext::new();

    let results = join_all((0..5).map(|_| {
        cache.get_or_fetch(&ctx, KEY, counted(&calls, Duration::from_millis(50), "{}"))
    }))
    .await;

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    for result in results {
        assert_eq!(result.unwrap(), Bytes::from_static(b"{}"));
    }
    assert_eq!(cache.len(), 1);
    assert_eq!(cache.inflight(), 0);

    // Served from cache afterwards
    let body = cache
        .get_or_fetch(&ctx, KEY, counted(&calls, Duration::ZERO, "other"))
        .await
        .unwrap();
    assert_eq!(body, Bytes::from_static(b"{}"));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_failures_are_not_cached() {
    let cache = ResponseCache::new(Duration::from_secs(60));
    let ctx = RequestContext::new();

    let err = cache
        .get_or_fetch(&ctx, KEY, |_ctx| async {
            Err(Error::Upstream {
                status: 500,
                endpoint: KEY.to_string(),
                body: String::new(),
            })
        })
        .await
        .unwrap_err();
    assert_eq!(err.status(), Some(500));
    assert!(cache.is_empty());

    let body = cache
        .get_or_fetch(&ctx, KEY, |_ctx| async { Ok(Bytes::from_static(b"[1]")) })
        .await
        .unwrap();
    assert_eq!(body, Bytes::from_static(b"[1]"));
    assert_eq!(cache.get(KEY), Some(Bytes::from_static(b"[1]")));
}

#[tokio::test]
async fn test_empty_bodies_are_not_cached() {
    let cache = ResponseCache::new(Duration::from_secs(60));
    let calls = Arc::new(AtomicUsize::new(0));
    let ctx = RequestContext::new();

    for _ in 0..2 {
        let body = cache
            .get_or_fetch(&ctx, KEY, counted(&calls, Duration::ZERO, ""))
            .await
            .unwrap();
        assert!(body.is_empty());
    }
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn test_entries_expire_after_ttl() {
    let cache = ResponseCache::new(Duration::from_secs(1));
    let calls = Arc::new(AtomicUsize::new(0));
    let ctx = RequestContext::new();

    cache
        .get_or_fetch(&ctx, KEY, counted(&calls, Duration::ZERO, "{}"))
        .await
        .unwrap();
    assert!(cache.get(KEY).is_some());

    tokio::time::advance(Duration::from_secs(2)).await;
    assert!(cache.get(KEY).is_none());

    cache
        .get_or_fetch(&ctx, KEY, counted(&calls, Duration::ZERO, "{}"))
        .await
        .unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_zero_ttl_disables_storage() {
    let cache = ResponseCache::new(Duration::ZERO);
    cache.insert(KEY, Bytes::from_static(b"{}"));
    assert!(cache.is_empty());
    assert_eq!(cache.ttl(), Duration::ZERO);
}

#[tokio::test]
async fn test_cancelled_waiter_does_not_fail_others() {
    let cache = ResponseCache::new(Duration::from_secs(60));
    let calls = Arc::new(AtomicUsize::new(0));

    let leader_ctx = RequestContext::new();
    let leader = {
        let cache = cache.clone();
        let ctx = leader_ctx.clone();
        let fetch = counted(&calls, Duration::from_millis(200), "{\"ok\":true}");
        tokio::spawn(async move { cache.get_or_fetch(&ctx, KEY, fetch).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;

    let follower = {
        let cache = cache.clone();
        let fetch = counted(&calls, Duration::ZERO, "unused");
        tokio::spawn(async move {
            cache
                .get_or_fetch(&RequestContext::new(), KEY, fetch)
                .await
        })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;

    // The caller that started the fetch gives up
    leader_ctx.cancel();
    let err = leader.await.unwrap().unwrap_err();
    assert!(err.is_cancelled());

    // The fetch keeps running for the other waiter
    let body = follower.await.unwrap().unwrap();
    assert_eq!(body, Bytes::from_static(b"{\"ok\":true}"));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_clear_drops_entries() {
    let cache = ResponseCache::new(Duration::from_secs(60));
    cache.insert(KEY, Bytes::from_static(b"{}"));
    cache.insert("https://api.spotify.com/v1/tracks/y", Bytes::from_static(b"{}"));
    assert_eq!(cache.len(), 2);

    cache.clear();
    assert!(cache.is_empty());
    assert!(cache.get(KEY).is_none());
}
