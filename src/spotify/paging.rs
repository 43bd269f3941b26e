//! Cursor pagination over Spotify listing endpoints.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use serde::de::DeserializeOwned;

use crate::{
    context::RequestContext,
    debug,
    error::{Error, Result},
    types::Page,
    utils,
};

/// Anything that can return the JSON body of an authenticated GET.
///
/// [`SpotifyClient`](crate::spotify::SpotifyClient) implements it on top of
/// the response cache; tests plug in canned pages.
#[async_trait]
pub trait JsonSource: Send + Sync {
    async fn get_body(&self, ctx: &RequestContext, endpoint: &str, token: &str) -> Result<Bytes>;
}

/// Fetches `endpoint` and decodes the body as `T`.
pub async fn get_json<S, T>(
    source: &S,
    ctx: &RequestContext,
    endpoint: &str,
    token: &str,
) -> Result<T>
where
    S: JsonSource + ?Sized,
    T: DeserializeOwned,
{
    let body = source.get_body(ctx, endpoint, token).await?;
    serde_json::from_slice(&body)
        .map_err(|e| Error::Decode(format!("{endpoint}: {e}")))
}

/// Items collected by a page walk.
///
/// A walk that stops early keeps what it collected so far next to the error.
#[derive(Debug)]
pub struct PageWalk<T> {
    pub items: Vec<T>,
    /// Pages fetched successfully.
    pub page_count: usize,
    pub error: Option<Error>,
}

impl<T> PageWalk<T> {
    pub fn is_complete(&self) -> bool {
        self.error.is_none()
    }

    pub fn into_result(self) -> Result<(Vec<T>, usize)> {
        match self.error {
            Some(e) => Err(e),
            None => Ok((self.items, self.page_count)),
        }
    }
}

/// Follows `next` links starting at `first_url` until the last page.
///
/// The `locale` parameter Spotify echoes into `next` is dropped so the cache
/// keys stay stable. `inter_page_delay` is slept between pages, never after
/// the last one.
pub async fn fetch_all_pages<S, T>(
    source: &S,
    ctx: &RequestContext,
    first_url: &str,
    token: &str,
    inter_page_delay: Duration,
) -> PageWalk<T>
where
    S: JsonSource + ?Sized,
    T: DeserializeOwned,
{
    let mut walk = PageWalk {
        items: Vec::new(),
        page_count: 0,
        error: None,
    };
    let mut next = Some(first_url.to_string());

    while let Some(url) = next.take() {
        if let Err(e) = ctx.check() {
            walk.error = Some(e);
            break;
        }

        let page: Page<T> = match get_json(source, ctx, &url, token).await {
            Ok(p) => p,
            Err(e) => {
                walk.error = Some(e);
                break;
            }
        };

        walk.items.extend(page.items);
        walk.page_count += 1;
        next = utils::strip_locale_param(page.next.as_deref());
        debug!(
            "page {} done items={} more={}",
            walk.page_count,
            walk.items.len(),
            next.is_some()
        );

        if next.is_some() && !inter_page_delay.is_zero() {
            if let Err(e) = ctx.sleep(inter_page_delay).await {
                walk.error = Some(e);
                break;
            }
        }
    }

    walk
}
