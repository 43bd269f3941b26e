use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use bytes::Bytes;

use crate::{
    config::ClientConfig,
    context::RequestContext,
    debug,
    error::{Error, Result},
    spotify::{
        auth,
        cache::ResponseCache,
        format::{Formatter, format_artist, format_playlist, format_track},
        http::HttpCore,
        paging::{JsonSource, fetch_all_pages, get_json},
        ratelimit::RateLimiter,
        token::{TokenManager, TokenSlot, TokenStrategy},
        totp::TotpEngine,
        uri::parse_spotify_reference,
    },
    types::{
        AccessToken, AlbumResponse, AlbumSimplified, ArtistResponse, MetadataPayload,
        OAuthStatus, OAuthToken, PlaylistResponse, PlaylistTrackItem, ReferenceKind,
        SpotifyReference, TrackFull, TrackSimplified,
    },
};

struct ClientInner {
    config: ClientConfig,
    http: HttpCore,
    cache: ResponseCache,
    tokens: TokenManager,
}

/// Metadata client. Clones share the token, the rate-limit state and the
/// response cache.
#[derive(Clone)]
pub struct SpotifyClient {
    inner: Arc<ClientInner>,
}

impl SpotifyClient {
    /// A client configured from `SPOTMETA_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::with_config(ClientConfig::from_env())
    }

    /// A client with the standard token chain: OAuth token file (when
    /// enabled), TOTP, legacy endpoint, access point.
    pub fn with_config(config: ClientConfig) -> Result<Self> {
        let slot = TokenSlot::new();
        let http = HttpCore::new(&config, slot.clone())?;
        let engine = Arc::new(TotpEngine::new(&config));
        let tokens = TokenManager::standard(&config, slot, engine);
        Ok(Self::assemble(config, http, tokens))
    }

    /// A client with a custom token chain and no OAuth override.
    pub fn with_strategies(
        config: ClientConfig,
        strategies: Vec<Box<dyn TokenStrategy>>,
    ) -> Result<Self> {
        let slot = TokenSlot::new();
        let http = HttpCore::new(&config, slot.clone())?;
        let tokens = TokenManager::new(slot, strategies, None);
        Ok(Self::assemble(config, http, tokens))
    }

    fn assemble(config: ClientConfig, http: HttpCore, tokens: TokenManager) -> Self {
        let cache = ResponseCache::new(config.cache_ttl);
        Self {
            inner: Arc::new(ClientInner {
                config,
                http,
                cache,
                tokens,
            }),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.inner.cache
    }

    pub fn rate_limiter(&self) -> &RateLimiter {
        self.inner.http.limiter()
    }

    pub fn token_slot(&self) -> &TokenSlot {
        self.inner.tokens.slot()
    }

    /// Returns a usable bearer token, running the acquisition chain when the
    /// cached one is missing or expired.
    pub async fn get_access_token(&self, ctx: &RequestContext) -> Result<AccessToken> {
        self.inner
            .tokens
            .get_access_token(&self.inner.http, ctx)
            .await
    }

    /// Resolves `url` and returns its normalized metadata.
    ///
    /// `per_page_delay` is only applied when `batch` is set. A zero `timeout`
    /// means no deadline.
    pub async fn fetch_metadata(
        &self,
        url: &str,
        batch: bool,
        per_page_delay: Duration,
        timeout: Duration,
    ) -> Result<MetadataPayload> {
        let ctx = if timeout.is_zero() {
            RequestContext::new()
        } else {
            RequestContext::with_timeout(timeout)
        };
        self.fetch_metadata_with_context(&ctx, url, batch, per_page_delay)
            .await
    }

    /// Like [`fetch_metadata`](Self::fetch_metadata) under a caller-owned
    /// context.
    ///
    /// A 401 from the API invalidates the token; the fetch is retried once
    /// with a fresh one.
    pub async fn fetch_metadata_with_context(
        &self,
        ctx: &RequestContext,
        url: &str,
        batch: bool,
        per_page_delay: Duration,
    ) -> Result<MetadataPayload> {
        debug!("fetch_metadata url={:?} batch={} delay={:?}", url, batch, per_page_delay);
        let reference = parse_spotify_reference(url)?;
        debug!(
            "parsed reference kind={} id={} discography={:?}",
            reference.kind, reference.id, reference.discography_filter
        );

        let token = self.get_access_token(ctx).await?;
        match self
            .fetch_reference(ctx, &reference, &token.value, batch, per_page_delay)
            .await
        {
            Err(e) if e.is_unauthorized() => {
                debug!("api unauthorized; refreshing token and retrying once");
                self.inner.tokens.invalidate();
                let token = self.get_access_token(ctx).await?;
                self.fetch_reference(ctx, &reference, &token.value, batch, per_page_delay)
                    .await
            }
            other => other,
        }
    }

    async fn fetch_reference(
        &self,
        ctx: &RequestContext,
        reference: &SpotifyReference,
        token: &str,
        batch: bool,
        per_page_delay: Duration,
    ) -> Result<MetadataPayload> {
        let endpoints = &self.inner.config.endpoints;
        let delay = if batch { per_page_delay } else { Duration::ZERO };
        let id = reference.id.as_str();

        match reference.kind {
            ReferenceKind::Track => {
                let raw: TrackFull = get_json(self, ctx, &endpoints.track_url(id), token).await?;
                Ok(MetadataPayload::Track(format_track(&raw)))
            }
            ReferenceKind::Artist => {
                let raw: ArtistResponse =
                    get_json(self, ctx, &endpoints.artist_url(id), token).await?;
                Ok(MetadataPayload::Artist(format_artist(&raw)))
            }
            ReferenceKind::Playlist => {
                let mut raw: PlaylistResponse =
                    get_json(self, ctx, &endpoints.playlist_url(id), token).await?;
                let (items, pages) = fetch_all_pages::<_, PlaylistTrackItem>(
                    self,
                    ctx,
                    &endpoints.playlist_tracks_url(id),
                    token,
                    delay,
                )
                .await
                .into_result()?;
                if !items.is_empty() {
                    raw.tracks.items = items;
                }
                Ok(MetadataPayload::Playlist(format_playlist(
                    &raw,
                    batch.then_some(pages),
                )))
            }
            ReferenceKind::Album => {
                let mut raw: AlbumResponse =
                    get_json(self, ctx, &endpoints.album_url(id), token).await?;
                let (items, pages) = fetch_all_pages::<_, TrackSimplified>(
                    self,
                    ctx,
                    &endpoints.album_tracks_url(id),
                    token,
                    delay,
                )
                .await
                .into_result()?;
                if !items.is_empty() {
                    raw.tracks.items = items;
                }
                let formatter = self.formatter(token);
                let payload = formatter
                    .format_album(ctx, &raw, batch.then_some(pages))
                    .await?;
                Ok(MetadataPayload::Album(payload))
            }
            ReferenceKind::ArtistDiscography => {
                let filter = reference.discography_filter.unwrap_or_default();
                let artist: ArtistResponse =
                    get_json(self, ctx, &endpoints.artist_url(id), token).await?;
                let (albums, pages) = fetch_all_pages::<_, AlbumSimplified>(
                    self,
                    ctx,
                    &endpoints.artist_albums_url(id, filter.include_groups()),
                    token,
                    delay,
                )
                .await
                .into_result()?;
                let formatter = self.formatter(token);
                let payload = formatter
                    .format_discography(ctx, &artist, &albums, filter, batch.then_some(pages))
                    .await?;
                Ok(MetadataPayload::Discography(payload))
            }
        }
    }

    fn formatter<'a>(&'a self, token: &'a str) -> Formatter<'a, Self> {
        Formatter::new(
            self,
            &self.inner.config.endpoints,
            token,
            self.inner.config.discography_concurrency,
        )
    }

    /// State of the stored OAuth login.
    pub async fn oauth_status(&self) -> OAuthStatus {
        match self.inner.tokens.oauth() {
            Some(manager) => manager.status().await,
            None => OAuthStatus::default(),
        }
    }

    /// Runs the browser login and stores the token for later requests.
    pub async fn login(&self, client_id: &str, timeout: Duration) -> Result<OAuthToken> {
        let manager = self
            .inner
            .tokens
            .oauth()
            .ok_or_else(|| Error::OAuth("oauth token storage is disabled".into()))?;
        let token = auth::login(
            &self.inner.http,
            &self.inner.config.endpoints,
            manager,
            client_id,
            timeout,
        )
        .await?;
        self.inner.tokens.invalidate();
        Ok(token)
    }

    /// Removes the stored OAuth token; later requests use anonymous tokens.
    pub async fn logout(&self) -> Result<()> {
        if let Some(manager) = self.inner.tokens.oauth() {
            manager.clear().await?;
        }
        self.inner.tokens.invalidate();
        Ok(())
    }
}

#[async_trait]
impl JsonSource for SpotifyClient {
    /// Cached, coalesced GET of `endpoint`.
    async fn get_body(&self, ctx: &RequestContext, endpoint: &str, token: &str) -> Result<Bytes> {
        let inner = Arc::clone(&self.inner);
        let url = endpoint.to_string();
        let token = token.to_string();
        self.inner
            .cache
            .get_or_fetch(ctx, endpoint, move |task_ctx| async move {
                inner.http.fetch_json_body(&task_ctx, &url, &token).await
            })
            .await
    }
}
