use std::time::Duration;

use spotmeta::{
    RequestContext,
    error::{CancelReason, Error},
};

#[tokio::test(start_paused = true)]
async fn test_sleep_hits_deadline() {
    let ctx = RequestContext::with_timeout(Duration::from_secs(1));

    let err = ctx.sleep(Duration::from_secs(5)).await.unwrap_err();
    assert!(matches!(err, Error::Cancelled(CancelReason::DeadlineExceeded)));
    assert!(ctx.is_done());
}

#[tokio::test(start_paused = true)]
async fn test_sleep_within_deadline() {
    let ctx = RequestContext::with_timeout(Duration::from_secs(10));
    ctx.sleep(Duration::from_secs(2)).await.unwrap();

    // Roughly eight seconds left
    let remaining = ctx.remaining().unwrap();
    assert!(remaining <= Duration::from_secs(8));
    assert!(remaining > Duration::from_secs(7));
}

#[tokio::test]
async fn test_cancel_stops_run() {
    let ctx = RequestContext::new();
    let waiter = ctx.clone();
    let handle = tokio::spawn(async move { waiter.run(std::future::pending::<()>()).await });

    ctx.cancel();
    let err = handle.await.unwrap().unwrap_err();
    assert!(matches!(err, Error::Cancelled(CancelReason::Cancelled)));
}

#[tokio::test]
async fn test_check_without_deadline() {
    let ctx = RequestContext::new();
    assert!(ctx.check().is_ok());
    assert_eq!(ctx.remaining(), None);
    assert!(!ctx.is_done());

    // Zero sleeps only check the state
    ctx.sleep(Duration::ZERO).await.unwrap();
}

#[tokio::test]
async fn test_child_follows_parent_cancellation() {
    let parent = RequestContext::new();
    let child = parent.child(Some(Duration::from_secs(30)));
    assert!(child.deadline().is_some());

    parent.cancel();
    assert!(matches!(
        child.check(),
        Err(Error::Cancelled(CancelReason::Cancelled))
    ));
}

#[tokio::test(start_paused = true)]
async fn test_child_keeps_tighter_deadline() {
    let parent = RequestContext::with_timeout(Duration::from_secs(5));
    let child = parent.child(Some(Duration::from_secs(60)));
    assert_eq!(child.deadline(), parent.deadline());
}

#[tokio::test(start_paused = true)]
async fn test_detached_keeps_deadline_but_not_cancellation() {
    let ctx = RequestContext::with_timeout(Duration::from_secs(5));
    let detached = ctx.detached();
    assert_eq!(detached.deadline(), ctx.deadline());

    ctx.cancel();
    assert!(ctx.check().is_err());
    assert!(detached.check().is_ok());

    // The deadline still applies
    tokio::time::advance(Duration::from_secs(6)).await;
    assert!(matches!(
        detached.check(),
        Err(Error::Cancelled(CancelReason::DeadlineExceeded))
    ));
}
