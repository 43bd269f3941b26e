//! Response cache with duplicate-request coalescing.
//!
//! Bodies are keyed by the full endpoint URL and kept for a fixed TTL. A miss
//! registers an in-flight marker; callers asking for the same URL while the
//! fetch runs wait on that marker instead of issuing their own request.

use std::{
    collections::HashMap,
    future::Future,
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use bytes::Bytes;
use tokio::{sync::watch, time::Instant};

use crate::{
    context::RequestContext,
    debug,
    error::{Error, Result},
};

type Outcome = Option<Result<Bytes>>;

struct CacheEntry {
    body: Bytes,
    expires_at: Instant,
}

struct CacheInner {
    ttl: Duration,
    entries: Mutex<HashMap<String, CacheEntry>>,
    inflight: Mutex<HashMap<String, watch::Receiver<Outcome>>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

impl CacheInner {
    fn get(&self, key: &str) -> Option<Bytes> {
        let mut entries = lock(&self.entries);
        match entries.get(key) {
            Some(entry) if entry.expires_at > Instant::now() && !entry.body.is_empty() => {
                Some(entry.body.clone())
            }
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    fn store(&self, key: &str, body: Bytes) {
        if body.is_empty() || self.ttl.is_zero() {
            return;
        }
        lock(&self.entries).insert(
            key.to_string(),
            CacheEntry {
                body,
                expires_at: Instant::now() + self.ttl,
            },
        );
    }
}

/// Cheap to clone; clones share the same entries and in-flight registry.
#[derive(Clone)]
pub struct ResponseCache {
    inner: Arc<CacheInner>,
}

impl ResponseCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            inner: Arc::new(CacheInner {
                ttl,
                entries: Mutex::new(HashMap::new()),
                inflight: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.inner.ttl
    }

    /// The cached body for `key` if present and not expired. Expired entries
    /// are dropped on the way.
    pub fn get(&self, key: &str) -> Option<Bytes> {
        self.inner.get(key)
    }

    pub fn insert(&self, key: &str, body: Bytes) {
        self.inner.store(key, body);
    }

    pub fn len(&self) -> usize {
        lock(&self.inner.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of fetches currently running.
    pub fn inflight(&self) -> usize {
        lock(&self.inner.inflight).len()
    }

    pub fn clear(&self) {
        lock(&self.inner.entries).clear();
    }

    /// Returns the cached body for `key`, or runs `fetch` once for all
    /// concurrent callers of the same key.
    ///
    /// The fetch runs as a background task under a context detached from the
    /// caller's cancellation but bound by its deadline. A caller that gives
    /// up gets [`Error::Cancelled`]; the fetch continues for the others.
    /// Only successful, non-empty bodies are cached.
    pub async fn get_or_fetch<F, Fut>(
        &self,
        ctx: &RequestContext,
        key: &str,
        fetch: F,
    ) -> Result<Bytes>
    where
        F: FnOnce(RequestContext) -> Fut + Send + 'static,
        Fut: Future<Output = Result<Bytes>> + Send + 'static,
    {
        ctx.check()?;
        if let Some(body) = self.inner.get(key) {
            debug!("cache hit {}", key);
            return Ok(body);
        }

        let rx = {
            let mut inflight = lock(&self.inner.inflight);
            match inflight.get(key) {
                Some(rx) => {
                    debug!("joining in-flight request {}", key);
                    rx.clone()
                }
                None => {
                    // The previous leader may have stored the body just now.
                    if let Some(body) = self.inner.get(key) {
                        return Ok(body);
                    }
                    let (tx, rx) = watch::channel(None);
                    inflight.insert(key.to_string(), rx.clone());

                    let inner = Arc::clone(&self.inner);
                    let key = key.to_string();
                    let task_ctx = ctx.detached();
                    tokio::spawn(async move {
                        let result = fetch(task_ctx).await;
                        if let Ok(body) = &result {
                            inner.store(&key, body.clone());
                        }
                        lock(&inner.inflight).remove(&key);
                        let _ = tx.send(Some(result));
                    });
                    rx
                }
            }
        };

        wait_outcome(ctx, rx).await
    }
}

async fn wait_outcome(ctx: &RequestContext, mut rx: watch::Receiver<Outcome>) -> Result<Bytes> {
    let outcome = ctx
        .run(async move {
            match rx.wait_for(Option::is_some).await {
                Ok(value) => value.clone(),
                Err(_) => None,
            }
        })
        .await?;
    outcome.unwrap_or_else(|| Err(Error::Network("in-flight request was abandoned".into())))
}
