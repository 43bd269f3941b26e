#![allow(dead_code)]

use std::{
    collections::{HashMap, VecDeque},
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use axum::{
    Router,
    body::Bytes,
    extract::State,
    http::{HeaderMap, HeaderValue, Method, StatusCode, Uri, header},
    response::{IntoResponse, Response},
};
use chrono::Utc;
use serde_json::Value;
use spotmeta::{
    RequestContext,
    config::ClientConfig,
    error::Result,
    spotify::{http::HttpCore, token::TokenStrategy},
    types::{AccessToken, TokenSource},
};
use tokio::net::TcpListener;

/// A canned response of the mock server.
#[derive(Clone, Debug)]
pub struct MockResponse {
    pub status: u16,
    pub body: String,
    pub retry_after: Option<u64>,
    pub delay: Duration,
}

impl MockResponse {
    pub fn json(body: Value) -> Self {
        Self {
            status: 200,
            body: body.to_string(),
            retry_after: None,
            delay: Duration::ZERO,
        }
    }

    pub fn status(status: u16, body: &str) -> Self {
        Self {
            status,
            body: body.to_string(),
            retry_after: None,
            delay: Duration::ZERO,
        }
    }

    pub fn retry_after(mut self, secs: u64) -> Self {
        self.retry_after = Some(secs);
        self
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

/// A request as seen by the mock server.
#[derive(Clone, Debug)]
pub struct Recorded {
    pub method: String,
    pub path: String,
    pub query: String,
    pub authorization: Option<String>,
    pub body: String,
}

#[derive(Default)]
struct MockState {
    routes: Mutex<HashMap<String, VecDeque<MockResponse>>>,
    requests: Mutex<Vec<Recorded>>,
}

/// An in-process HTTP server answering from per-path response queues.
///
/// Each path serves its queued responses in order; the last one repeats.
/// Unknown paths answer 404.
pub struct MockServer {
    pub base: String,
    state: Arc<MockState>,
}

impl MockServer {
    pub async fn start() -> Self {
        let state = Arc::new(MockState::default());
        let app = Router::new()
            .fallback(handle)
            .with_state(Arc::clone(&state));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        Self {
            base: format!("http://{addr}"),
            state,
        }
    }

    pub fn route(&self, path: &str, response: MockResponse) {
        self.state
            .routes
            .lock()
            .unwrap()
            .entry(path.to_string())
            .or_default()
            .push_back(response);
    }

    pub fn hits(&self, path: &str) -> usize {
        self.requests().iter().filter(|r| r.path == path).count()
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.state.requests.lock().unwrap().clone()
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    pub fn config(&self) -> ClientConfig {
        ClientConfig::local(&self.base)
    }
}

async fn handle(
    State(state): State<Arc<MockState>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let path = uri.path().to_string();
    state.requests.lock().unwrap().push(Recorded {
        method: method.to_string(),
        path: path.clone(),
        query: uri.query().unwrap_or_default().to_string(),
        authorization: headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
        body: String::from_utf8_lossy(&body).into_owned(),
    });

    let next = {
        let mut routes = state.routes.lock().unwrap();
        match routes.get_mut(&path) {
            Some(queue) if queue.len() > 1 => queue.pop_front(),
            Some(queue) => queue.front().cloned(),
            None => None,
        }
    };

    let Some(mock) = next else {
        return (StatusCode::NOT_FOUND, "not found").into_response();
    };
    if !mock.delay.is_zero() {
        tokio::time::sleep(mock.delay).await;
    }
    let mut response = (
        StatusCode::from_u16(mock.status).unwrap(),
        [(header::CONTENT_TYPE, "application/json")],
        mock.body,
    )
        .into_response();
    if let Some(secs) = mock.retry_after {
        response
            .headers_mut()
            .insert(header::RETRY_AFTER, HeaderValue::from(secs));
    }
    response
}

/// Hands out `token-1`, `token-2`, ... and counts how often it was asked.
#[derive(Clone, Default)]
pub struct CountingStrategy {
    pub calls: Arc<AtomicUsize>,
    /// Time each acquisition takes, cut short by the caller's context.
    pub delay: Duration,
}

impl CountingStrategy {
    pub fn slow(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TokenStrategy for CountingStrategy {
    fn source(&self) -> TokenSource {
        TokenSource::Legacy
    }

    async fn acquire(&self, _http: &HttpCore, ctx: &RequestContext) -> Result<AccessToken> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        ctx.sleep(self.delay).await?;
        Ok(AccessToken {
            value: format!("token-{n}"),
            expires_at: Utc::now() + chrono::Duration::hours(1),
            source: TokenSource::Legacy,
        })
    }
}

pub fn track_json(id: &str, name: &str, isrc: &str) -> Value {
    serde_json::json!({
        "id": id,
        "name": name,
        "duration_ms": 215000,
        "track_number": 3,
        "disc_number": 1,
        "external_urls": { "spotify": format!("https://open.spotify.com/track/{id}") },
        "external_ids": { "isrc": isrc },
        "artists": [{ "id": "ar1", "name": "Artist One" }],
        "album": {
            "id": "al1",
            "name": "Album One",
            "album_type": "album",
            "release_date": "2020-01-31",
            "total_tracks": 10,
            "images": [{ "url": "https://i.scdn.co/image/cover" }],
            "external_urls": { "spotify": "https://open.spotify.com/album/al1" },
            "artists": [{ "id": "ar1", "name": "Artist One" }]
        }
    })
}

/// A unique file path under the system temp dir.
pub fn temp_path(name: &str) -> std::path::PathBuf {
    std::env::temp_dir()
        .join(format!("spotmeta-test-{}", spotmeta::utils::random_url_safe(9)))
        .join(name)
}
