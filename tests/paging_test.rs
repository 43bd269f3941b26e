use std::{
    collections::HashMap,
    sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::{Value, json};
use spotmeta::{
    RequestContext,
    error::{CancelReason, Error, Result},
    spotify::paging::{JsonSource, fetch_all_pages, get_json},
    types::TrackSimplified,
};
use tokio::time::Instant;

const FIRST: &str = "https://api.spotify.com/v1/albums/a/tracks?limit=2";
const SECOND: &str = "https://api.spotify.com/v1/albums/a/tracks?offset=2&limit=2";
const THIRD: &str = "https://api.spotify.com/v1/albums/a/tracks?offset=4&limit=2";

/// Serves canned bodies by URL and remembers which URLs were asked for.
#[derive(Default)]
struct CannedSource {
    bodies: HashMap<String, Bytes>,
    requested: Mutex<Vec<String>>,
    calls: AtomicUsize,
}

impl CannedSource {
    fn with(mut self, url: &str, body: Value) -> Self {
        self.bodies
            .insert(url.to_string(), Bytes::from(body.to_string()));
        self
    }

    fn requested(&self) -> Vec<String> {
        self.requested.lock().unwrap().clone()
    }
}

#[async_trait]
impl JsonSource for CannedSource {
    async fn get_body(&self, _ctx: &RequestContext, endpoint: &str, token: &str) -> Result<Bytes> {
        assert_eq!(token, "tok");
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requested.lock().unwrap().push(endpoint.to_string());
        self.bodies
            .get(endpoint)
            .cloned()
            .ok_or_else(|| Error::Upstream {
                status: 404,
                endpoint: endpoint.to_string(),
                body: String::new(),
            })
    }
}

fn track(id: &str) -> Value {
    json!({ "id": id, "name": format!("Track {id}"), "track_number": 1 })
}

fn three_pages() -> CannedSource {
    CannedSource::default()
        .with(
            FIRST,
            json!({
                "items": [track("t1"), track("t2")],
                "next": format!("{SECOND}&locale=de-DE"),
                "total": 5
            }),
        )
        .with(
            SECOND,
            json!({ "items": [track("t3"), track("t4")], "next": THIRD, "total": 5 }),
        )
        .with(THIRD, json!({ "items": [track("t5")], "next": null, "total": 5 }))
}

#[tokio::test]
async fn test_walks_all_pages_in_order() {
    let source = three_pages();
    let ctx = RequestContext::new();

    let walk = fetch_all_pages::<_, TrackSimplified>(&source, &ctx, FIRST, "tok", Duration::ZERO)
        .await;

    assert!(walk.is_complete());
    assert_eq!(walk.page_count, 3);
    let ids: Vec<&str> = walk.items.iter().map(|t| t.id.as_str()).collect();
    assert_eq!(ids, vec!["t1", "t2", "t3", "t4", "t5"]);

    // The echoed locale is stripped before the next request
    assert_eq!(source.requested(), vec![FIRST, SECOND, THIRD]);
}

#[tokio::test(start_paused = true)]
async fn test_delay_only_between_pages() {
    let source = three_pages();
    let ctx = RequestContext::new();

    let started = Instant::now();
    let (items, pages) = fetch_all_pages::<_, TrackSimplified>(
        &source,
        &ctx,
        FIRST,
        "tok",
        Duration::from_secs(1),
    )
    .await
    .into_result()
    .unwrap();

    assert_eq!(items.len(), 5);
    assert_eq!(pages, 3);
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_secs(2));
    assert!(elapsed < Duration::from_secs(3));
}

#[tokio::test(start_paused = true)]
async fn test_deadline_during_delay_keeps_partial_items() {
    let source = three_pages();
    let ctx = RequestContext::with_timeout(Duration::from_millis(1500));

    let walk = fetch_all_pages::<_, TrackSimplified>(
        &source,
        &ctx,
        FIRST,
        "tok",
        Duration::from_secs(1),
    )
    .await;

    // Two pages made it before the second delay ran into the deadline
    assert_eq!(walk.page_count, 2);
    assert_eq!(walk.items.len(), 4);
    assert!(matches!(
        walk.error,
        Some(Error::Cancelled(CancelReason::DeadlineExceeded))
    ));
    assert!(walk.into_result().unwrap_err().is_cancelled());
}

#[tokio::test]
async fn test_failing_page_keeps_earlier_items() {
    let source = CannedSource::default().with(
        FIRST,
        json!({ "items": [track("t1")], "next": SECOND }),
    );
    let ctx = RequestContext::new();

    let walk = fetch_all_pages::<_, TrackSimplified>(&source, &ctx, FIRST, "tok", Duration::ZERO)
        .await;

    assert!(!walk.is_complete());
    assert_eq!(walk.page_count, 1);
    assert_eq!(walk.items.len(), 1);
    assert_eq!(walk.error.as_ref().and_then(Error::status), Some(404));
}

#[tokio::test]
async fn test_cancelled_context_fetches_nothing() {
    let source = three_pages();
    let ctx = RequestContext::new();
    ctx.cancel();

    let walk = fetch_all_pages::<_, TrackSimplified>(&source, &ctx, FIRST, "tok", Duration::ZERO)
        .await;

    assert_eq!(walk.page_count, 0);
    assert!(walk.items.is_empty());
    assert_eq!(source.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_null_items_decode_as_empty() {
    let source = CannedSource::default().with(FIRST, json!({ "items": null, "next": "" }));
    let ctx = RequestContext::new();

    let (items, pages) =
        fetch_all_pages::<_, TrackSimplified>(&source, &ctx, FIRST, "tok", Duration::ZERO)
            .await
            .into_result()
            .unwrap();
    assert!(items.is_empty());
    assert_eq!(pages, 1);
}

#[tokio::test]
async fn test_get_json_reports_endpoint_on_decode_error() {
    let source = CannedSource::default().with(FIRST, json!("not an object"));
    let ctx = RequestContext::new();

    let err = get_json::<_, TrackSimplified>(&source, &ctx, FIRST, "tok")
        .await
        .unwrap_err();
    match err {
        Error::Decode(message) => assert!(message.starts_with(FIRST)),
        other => panic!("expected decode error, got {other:?}"),
    }
}
